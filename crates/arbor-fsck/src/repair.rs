//! Remote repair of file objects.
//!
//! Each remote is tried in order through a small pipeline: resolve the base
//! URL, download, parse the content stream, re-encode it, write it under the
//! wanted checksum and verify what landed in the store. The first remote
//! that gets through every step wins.

use std::io::Cursor;

use tracing::{info, warn};

use arbor_store::{parse_content_stream, raw_file_to_content_stream, ObjectStore};
use arbor_types::{ObjectId, ObjectType};

use crate::cancel::Cancellable;
use crate::error::{FsckError, FsckResult};
use crate::fetch::{object_url, FetchError, RemoteFetcher};
use crate::verify::verify_file;

/// Result of a repair that was not cancelled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    /// The object was restored from this remote.
    Repaired { remote: String },
    /// No remote could provide a valid copy.
    Unrepaired,
}

enum AttemptError {
    Cancelled,
    Failed(String),
}

/// Everything a repair needs besides the object itself.
pub struct Repairer<'a> {
    pub store: &'a dyn ObjectStore,
    pub fetcher: &'a dyn RemoteFetcher,
    /// Remotes in the order they are tried.
    pub remotes: &'a [String],
    /// Remove a partially written object after a failed write.
    pub delete_on_corrupt: bool,
    pub cancellable: &'a Cancellable,
}

impl Repairer<'_> {
    /// Try to restore `checksum` from the remotes.
    ///
    /// Only file objects can be repaired; anything else is `Unrepaired`
    /// without touching the network. The only error is cancellation.
    pub fn repair(&self, checksum: &ObjectId, kind: ObjectType) -> FsckResult<RepairOutcome> {
        if kind != ObjectType::File {
            return Ok(RepairOutcome::Unrepaired);
        }
        for remote in self.remotes {
            match self.attempt(remote, checksum) {
                Ok(()) => {
                    info!(object = %checksum, %remote, "repaired file object");
                    return Ok(RepairOutcome::Repaired {
                        remote: remote.clone(),
                    });
                }
                Err(AttemptError::Cancelled) => return Err(FsckError::Cancelled),
                Err(AttemptError::Failed(reason)) => {
                    warn!(object = %checksum, %remote, "repair failed: {reason}");
                }
            }
        }
        Ok(RepairOutcome::Unrepaired)
    }

    fn attempt(&self, remote: &str, checksum: &ObjectId) -> Result<(), AttemptError> {
        let base = self
            .store
            .remote_base_url(remote)
            .map_err(|e| AttemptError::Failed(format!("failed to get a URL for remote: {e}")))?;
        let url = object_url(&base, checksum, ObjectType::File);

        let data = match self.fetcher.fetch(&url, self.cancellable) {
            Ok(data) => data,
            Err(FetchError::Cancelled) => return Err(AttemptError::Cancelled),
            Err(_) if self.cancellable.is_cancelled() => return Err(AttemptError::Cancelled),
            Err(e) => {
                return Err(AttemptError::Failed(format!(
                    "failed to download the object from {url}: {e}"
                )))
            }
        };

        let len = data.len() as u64;
        let file = parse_content_stream(Box::new(Cursor::new(data)), len).map_err(|e| {
            AttemptError::Failed(format!("failed to parse the content stream: {e}"))
        })?;
        let (mut stream, len) = raw_file_to_content_stream(file.content, &file.info, &file.xattrs)
            .map_err(|e| {
                AttemptError::Failed(format!("failed to create a content stream: {e}"))
            })?;

        if let Err(e) = self.store.write_content(Some(checksum), &mut stream, len) {
            if self.delete_on_corrupt {
                let _ = self.store.delete_object(checksum, ObjectType::File);
            }
            return Err(AttemptError::Failed(format!(
                "failed to write the object to the repository: {e}"
            )));
        }

        self.check_written(checksum)
    }

    /// The store files content under the checksum it is told; make sure the
    /// mirror actually served that object.
    fn check_written(&self, checksum: &ObjectId) -> Result<(), AttemptError> {
        let verdict = self
            .store
            .load_file(checksum)
            .map_err(|e| e.to_string())
            .and_then(|mut file| verify_file(checksum, &mut file).map_err(|e| e.to_string()));
        let reason = match verdict {
            Ok(v) if v.matches => return Ok(()),
            Ok(v) => format!("downloaded object does not match; actual checksum: {}", v.computed),
            Err(e) => format!("failed to re-read the written object: {e}"),
        };
        let _ = self.store.delete_object(checksum, ObjectType::File);
        Err(AttemptError::Failed(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{encode_content_stream, FileInfo, InMemoryObjectStore, Xattrs};

    use crate::fetch::InMemoryFetcher;

    struct Fixture {
        store: InMemoryObjectStore,
        fetcher: InMemoryFetcher,
        token: Cancellable,
        remotes: Vec<String>,
    }

    impl Fixture {
        fn new(remotes: &[(&str, &str)]) -> Self {
            let store = InMemoryObjectStore::new();
            for (name, url) in remotes {
                store.add_remote(*name, *url);
            }
            Self {
                store,
                fetcher: InMemoryFetcher::new(),
                token: Cancellable::new(),
                remotes: remotes.iter().map(|(n, _)| n.to_string()).collect(),
            }
        }

        fn repairer(&self) -> Repairer<'_> {
            Repairer {
                store: &self.store,
                fetcher: &self.fetcher,
                remotes: &self.remotes,
                delete_on_corrupt: true,
                cancellable: &self.token,
            }
        }
    }

    fn stream(content: &[u8]) -> Vec<u8> {
        encode_content_stream(&FileInfo::regular(0o644, 0), &Xattrs::new(), content).unwrap()
    }

    fn checksum_of(content: &[u8]) -> ObjectId {
        arbor_store::content::checksum_content_stream(&stream(content)).unwrap()
    }

    #[test]
    fn first_good_remote_wins() {
        let fx = Fixture::new(&[("a", "http://a"), ("b", "http://b"), ("c", "http://c")]);
        let id = checksum_of(b"payload");
        fx.fetcher.fail_under("http://a");
        fx.fetcher.serve_file("http://b", &id, stream(b"payload"));
        fx.fetcher.serve_file("http://c", &id, stream(b"payload"));

        let outcome = fx.repairer().repair(&id, ObjectType::File).unwrap();
        assert_eq!(outcome, RepairOutcome::Repaired { remote: "b".into() });
        assert!(fx.store.contains(&id, ObjectType::File));

        let attempts = fx.fetcher.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].starts_with("http://a/"));
        assert!(attempts[1].starts_with("http://b/"));
    }

    #[test]
    fn mismatching_mirror_is_rejected() {
        let fx = Fixture::new(&[("bad", "http://bad"), ("good", "http://good")]);
        let id = checksum_of(b"right");
        fx.fetcher.serve_file("http://bad", &id, stream(b"wrong"));
        fx.fetcher.serve_file("http://good", &id, stream(b"right"));

        let outcome = fx.repairer().repair(&id, ObjectType::File).unwrap();
        assert_eq!(outcome, RepairOutcome::Repaired { remote: "good".into() });
        let mut file = fx.store.load_file(&id).unwrap();
        assert!(verify_file(&id, &mut file).unwrap().matches);
    }

    #[test]
    fn bad_copy_is_not_left_behind() {
        let fx = Fixture::new(&[("bad", "http://bad")]);
        let id = checksum_of(b"right");
        fx.fetcher.serve_file("http://bad", &id, stream(b"wrong"));

        assert_eq!(fx.repairer().repair(&id, ObjectType::File).unwrap(), RepairOutcome::Unrepaired);
        assert!(!fx.store.contains(&id, ObjectType::File));
    }

    #[test]
    fn unparseable_download_is_skipped() {
        let fx = Fixture::new(&[("junk", "http://junk")]);
        let id = checksum_of(b"x");
        fx.fetcher.serve_file("http://junk", &id, vec![0xff; 3]);
        assert_eq!(fx.repairer().repair(&id, ObjectType::File).unwrap(), RepairOutcome::Unrepaired);
        assert_eq!(fx.store.mutation_count(), 0);
    }

    #[test]
    fn write_failure_moves_on() {
        let fx = Fixture::new(&[("a", "http://a")]);
        let id = checksum_of(b"x");
        fx.fetcher.serve_file("http://a", &id, stream(b"x"));
        fx.store.fail_writes_of(&id);
        assert_eq!(fx.repairer().repair(&id, ObjectType::File).unwrap(), RepairOutcome::Unrepaired);
    }

    #[test]
    fn unknown_remote_is_skipped() {
        let mut fx = Fixture::new(&[("good", "http://good")]);
        fx.remotes.insert(0, "ghost".into());
        let id = checksum_of(b"x");
        fx.fetcher.serve_file("http://good", &id, stream(b"x"));
        let outcome = fx.repairer().repair(&id, ObjectType::File).unwrap();
        assert_eq!(outcome, RepairOutcome::Repaired { remote: "good".into() });
    }

    #[test]
    fn metadata_is_never_fetched() {
        let fx = Fixture::new(&[("a", "http://a")]);
        let id = ObjectId::from_bytes(b"tree");
        let outcome = fx.repairer().repair(&id, ObjectType::DirTree).unwrap();
        assert_eq!(outcome, RepairOutcome::Unrepaired);
        assert!(fx.fetcher.attempts().is_empty());
    }

    #[test]
    fn cancellation_stops_remaining_remotes() {
        let fx = Fixture::new(&[("a", "http://a"), ("b", "http://b")]);
        let id = checksum_of(b"x");
        fx.fetcher.cancel_when_fetching("http://a", fx.token.clone());
        fx.fetcher.serve_file("http://b", &id, stream(b"x"));

        let err = fx.repairer().repair(&id, ObjectType::File).unwrap_err();
        assert!(matches!(err, FsckError::Cancelled));
        assert_eq!(fx.fetcher.attempts().len(), 1);
    }
}
