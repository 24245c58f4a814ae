//! Downloading objects from remote mirrors.
//!
//! A mirror exposes the same object layout as a local repository, so an
//! object's URL is its relative path appended to the remote's base URL.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use arbor_store::relative_object_path;
use arbor_types::{ObjectId, ObjectType};

use crate::cancel::Cancellable;

/// Default per-request timeout of [`HttpFetcher`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default cap on a single download of [`HttpFetcher`].
pub const DEFAULT_MAX_OBJECT_SIZE: u64 = 1 << 30;

const USER_AGENT: &str = concat!("arbor/", env!("CARGO_PKG_VERSION"));
const CHUNK_SIZE: usize = 64 * 1024;

/// Errors from a single download.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The URL scheme is not supported.
    #[error("unsupported URL {0}")]
    UnsupportedUrl(String),

    /// The server answered with a non-success status.
    #[error("server returned {status} for {url}")]
    Status { url: String, status: u16 },

    /// Connection, TLS or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object is larger than the fetcher accepts.
    #[error("{url} exceeds the {limit} byte download limit")]
    TooLarge { url: String, limit: u64 },

    /// The caller cancelled the download.
    #[error("download was cancelled")]
    Cancelled,
}

/// Fetches raw bytes by URL.
pub trait RemoteFetcher: Send + Sync {
    /// Download `url` completely. Must return [`FetchError::Cancelled`]
    /// (and nothing else) when `cancellable` fires during the transfer.
    fn fetch(&self, url: &str, cancellable: &Cancellable) -> Result<Vec<u8>, FetchError>;
}

/// URL of an object on a mirror with the given base URL.
pub fn object_url(base: &str, checksum: &ObjectId, kind: ObjectType) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative_object_path(checksum, kind)
    )
}

/// Blocking HTTP(S) fetcher that also reads `file://` URLs from disk.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    max_size: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            max_size: DEFAULT_MAX_OBJECT_SIZE,
        })
    }

    /// Refuse downloads larger than `bytes`.
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    fn fetch_http(&self, url: &str, cancellable: &Cancellable) -> Result<Vec<u8>, FetchError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if response.content_length().is_some_and(|len| len > self.max_size) {
            return Err(self.too_large(url));
        }
        read_limited(&mut response, url, self.max_size, cancellable)
    }

    fn too_large(&self, url: &str) -> FetchError {
        FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_size,
        }
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str, cancellable: &Cancellable) -> Result<Vec<u8>, FetchError> {
        if cancellable.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        debug!(%url, "fetching");
        if let Some(path) = url.strip_prefix("file://") {
            let mut file = std::fs::File::open(Path::new(path))?;
            read_limited(&mut file, url, self.max_size, cancellable)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.fetch_http(url, cancellable)
        } else {
            Err(FetchError::UnsupportedUrl(url.to_string()))
        }
    }
}

/// Read to the end, stopping once more than `limit` bytes arrive.
fn read_limited(
    reader: &mut dyn Read,
    url: &str,
    limit: u64,
    cancellable: &Cancellable,
) -> Result<Vec<u8>, FetchError> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if cancellable.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let read = reader.read(&mut buf)?;
        if read == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..read]);
        if out.len() as u64 > limit {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }
    }
}

#[derive(Default)]
struct FetcherInner {
    responses: HashMap<String, Vec<u8>>,
    failing_prefixes: HashSet<String>,
    cancel_on: Option<(String, Cancellable)>,
    attempts: Vec<String>,
}

/// URL-to-bytes table standing in for real mirrors.
///
/// Unknown URLs answer 404. Every call is logged so tests can assert which
/// remotes were tried and in what order.
#[derive(Default)]
pub struct InMemoryFetcher {
    inner: Mutex<FetcherInner>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `data`.
    pub fn serve(&self, url: impl Into<String>, data: Vec<u8>) {
        self.lock().responses.insert(url.into(), data);
    }

    /// Serve a file object's content stream from a mirror at `base`.
    pub fn serve_file(&self, base: &str, checksum: &ObjectId, stream: Vec<u8>) {
        self.serve(object_url(base, checksum, ObjectType::File), stream);
    }

    /// Fail every URL under `prefix` with a transport error.
    pub fn fail_under(&self, prefix: impl Into<String>) {
        self.lock().failing_prefixes.insert(prefix.into());
    }

    /// Fire `token` when a URL under `prefix` is fetched, as if the user
    /// cancelled mid-download.
    pub fn cancel_when_fetching(&self, prefix: impl Into<String>, token: Cancellable) {
        self.lock().cancel_on = Some((prefix.into(), token));
    }

    /// Every URL requested so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.lock().attempts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetcherInner> {
        self.inner.lock().expect("lock poisoned")
    }
}

impl RemoteFetcher for InMemoryFetcher {
    fn fetch(&self, url: &str, cancellable: &Cancellable) -> Result<Vec<u8>, FetchError> {
        let mut inner = self.lock();
        inner.attempts.push(url.to_string());

        if let Some((prefix, token)) = &inner.cancel_on {
            if url.starts_with(prefix.as_str()) {
                token.cancel();
            }
        }
        if cancellable.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if inner.failing_prefixes.iter().any(|p| url.starts_with(p.as_str())) {
            return Err(FetchError::Transport(format!("injected failure for {url}")));
        }
        inner
            .responses
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

impl std::fmt::Debug for InMemoryFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("InMemoryFetcher")
            .field("responses", &inner.responses.len())
            .field("attempts", &inner.attempts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_url_joins_layout() {
        let id = ObjectId::from_hash([0xcd; 32]);
        let url = object_url("http://mirror/repo/", &id, ObjectType::File);
        assert!(url.starts_with("http://mirror/repo/objects/cd/cdcd"));
        assert!(url.ends_with(".file"));
        assert_eq!(url, object_url("http://mirror/repo", &id, ObjectType::File));
    }

    #[test]
    fn in_memory_serves_and_logs() {
        let fetcher = InMemoryFetcher::new();
        fetcher.serve("http://a/x", b"data".to_vec());
        let token = Cancellable::new();
        assert_eq!(fetcher.fetch("http://a/x", &token).unwrap(), b"data");
        assert!(matches!(
            fetcher.fetch("http://a/y", &token),
            Err(FetchError::Status { status: 404, .. })
        ));
        assert_eq!(fetcher.attempts(), vec!["http://a/x", "http://a/y"]);
    }

    #[test]
    fn in_memory_failure_injection() {
        let fetcher = InMemoryFetcher::new();
        fetcher.serve("http://down/x", b"data".to_vec());
        fetcher.fail_under("http://down");
        let err = fetcher.fetch("http://down/x", &Cancellable::new()).unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[test]
    fn in_memory_cancellation() {
        let fetcher = InMemoryFetcher::new();
        let token = Cancellable::new();
        fetcher.cancel_when_fetching("http://slow", token.clone());
        let err = fetcher.fetch("http://slow/x", &token).unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
        assert!(token.is_cancelled());
    }

    #[test]
    fn file_urls_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("obj");
        std::fs::write(&path, b"bytes").unwrap();
        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&url, &Cancellable::new()).unwrap(), b"bytes");

        let missing = format!("file://{}", dir.path().join("nope").display());
        assert!(matches!(
            fetcher.fetch(&missing, &Cancellable::new()),
            Err(FetchError::Io(_))
        ));
    }

    #[test]
    fn oversized_downloads_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        std::fs::write(&path, vec![7u8; 100]).unwrap();
        let url = format!("file://{}", path.display());

        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap().with_max_size(64);
        match fetcher.fetch(&url, &Cancellable::new()).unwrap_err() {
            FetchError::TooLarge { url: reported, limit } => {
                assert_eq!(reported, url);
                assert_eq!(limit, 64);
            }
            other => panic!("unexpected error: {other}"),
        }

        let roomy = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap().with_max_size(100);
        assert_eq!(roomy.fetch(&url, &Cancellable::new()).unwrap().len(), 100);
    }

    #[test]
    fn http_fetcher_honours_cancellation_and_schemes() {
        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let token = Cancellable::new();
        assert!(matches!(
            fetcher.fetch("ftp://host/x", &token),
            Err(FetchError::UnsupportedUrl(_))
        ));
        token.cancel();
        assert!(matches!(
            fetcher.fetch("http://127.0.0.1:9/x", &token),
            Err(FetchError::Cancelled)
        ));
    }
}
