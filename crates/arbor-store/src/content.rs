//! File objects and the content stream encoding.
//!
//! A file object is the pair of a header (ownership, mode, symlink target,
//! xattrs) and the file's bytes. The same framing is used for local storage
//! and for objects served by remote mirrors:
//!
//! ```text
//! +----------------+----------------+-------------+---------------+
//! | header len u32 | reserved u32=0 | header JSON | content bytes |
//! +----------------+----------------+-------------+---------------+
//! ```
//!
//! Both integers are big-endian. A file's checksum covers the header JSON
//! followed by the content bytes; the framing itself is not hashed.

use std::io::{Cursor, Read};

use serde::{Deserialize, Serialize};

use arbor_crypto::ContentHasher;
use arbor_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::Xattrs;

/// File type mask.
pub const S_IFMT: u32 = 0o170000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Symbolic link.
pub const S_IFLNK: u32 = 0o120000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;

/// Length of the fixed framing before the header.
pub const CONTENT_STREAM_PREFIX_LEN: u64 = 8;

const MAX_HEADER_LEN: u64 = 1 << 20;

/// Ownership, mode and size of a file object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub uid: u32,
    pub gid: u32,
    /// Full Unix mode including the file type bits.
    pub mode: u32,
    pub rdev: u32,
    /// Target of a symlink; `None` for regular files.
    pub symlink_target: Option<String>,
    /// Length of the content in bytes (zero for symlinks).
    pub size: u64,
}

impl FileInfo {
    /// A regular file owned by root.
    pub fn regular(permissions: u32, size: u64) -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: S_IFREG | (permissions & 0o7777),
            rdev: 0,
            symlink_target: None,
            size,
        }
    }

    /// A symlink owned by root.
    pub fn symlink(target: impl Into<String>) -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: S_IFLNK | 0o777,
            rdev: 0,
            symlink_target: Some(target.into()),
            size: 0,
        }
    }

    /// The file type bits of `mode`.
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }
}

/// The hashed header of a file object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentHeader {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u32,
    pub symlink_target: Option<String>,
    pub xattrs: Xattrs,
}

impl ContentHeader {
    pub fn new(info: &FileInfo, xattrs: &Xattrs) -> Self {
        Self {
            uid: info.uid,
            gid: info.gid,
            mode: info.mode,
            rdev: info.rdev,
            symlink_target: info.symlink_target.clone(),
            xattrs: xattrs.clone(),
        }
    }

    /// Split back into file info (with the given content size) and xattrs.
    pub fn into_parts(self, size: u64) -> (FileInfo, Xattrs) {
        let info = FileInfo {
            uid: self.uid,
            gid: self.gid,
            mode: self.mode,
            rdev: self.rdev,
            symlink_target: self.symlink_target,
            size,
        };
        (info, self.xattrs)
    }

    /// Canonical serialized form.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// A file object opened for reading.
pub struct LoadedFile {
    /// The file's bytes; empty for symlinks.
    pub content: Box<dyn Read + Send>,
    pub info: FileInfo,
    pub xattrs: Xattrs,
}

impl std::fmt::Debug for LoadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedFile")
            .field("info", &self.info)
            .field("xattrs", &self.xattrs)
            .finish_non_exhaustive()
    }
}

/// Serialized header bytes that prefix the content in the file checksum.
pub fn file_header_bytes(info: &FileInfo, xattrs: &Xattrs) -> StoreResult<Vec<u8>> {
    ContentHeader::new(info, xattrs).to_bytes()
}

/// Checksum of a file object, consuming `content` to EOF.
pub fn checksum_file(
    info: &FileInfo,
    xattrs: &Xattrs,
    content: &mut dyn Read,
) -> StoreResult<ObjectId> {
    let header = file_header_bytes(info, xattrs)?;
    Ok(ContentHasher::FILE.hash_stream(&header, content)?)
}

/// Frame a file's header and content into a content stream.
///
/// Returns the stream and its exact length. The content is not buffered;
/// `info.size` must be the content length.
pub fn raw_file_to_content_stream(
    content: Box<dyn Read + Send>,
    info: &FileInfo,
    xattrs: &Xattrs,
) -> StoreResult<(Box<dyn Read + Send>, u64)> {
    let header = file_header_bytes(info, xattrs)?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| StoreError::InvalidContentStream("header too large".into()))?;

    let mut prefix = Vec::with_capacity(CONTENT_STREAM_PREFIX_LEN as usize + header.len());
    prefix.extend_from_slice(&header_len.to_be_bytes());
    prefix.extend_from_slice(&0u32.to_be_bytes());
    prefix.extend_from_slice(&header);

    let len = prefix.len() as u64 + info.size;
    let stream = Cursor::new(prefix).chain(content.take(info.size));
    Ok((Box::new(stream), len))
}

/// Encode an in-memory file as a content stream.
pub fn encode_content_stream(
    info: &FileInfo,
    xattrs: &Xattrs,
    content: &[u8],
) -> StoreResult<Vec<u8>> {
    let mut info = info.clone();
    info.size = content.len() as u64;
    let (mut stream, len) =
        raw_file_to_content_stream(Box::new(Cursor::new(content.to_vec())), &info, xattrs)?;
    let mut out = Vec::with_capacity(len as usize);
    stream.read_to_end(&mut out)?;
    Ok(out)
}

/// Parse a content stream of known total length.
///
/// The header is read eagerly; the returned content reader yields the
/// remaining `len - prefix - header` bytes lazily.
pub fn parse_content_stream(mut stream: Box<dyn Read + Send>, len: u64) -> StoreResult<LoadedFile> {
    if len < CONTENT_STREAM_PREFIX_LEN {
        return Err(StoreError::InvalidContentStream(format!(
            "stream of {len} bytes is shorter than its framing"
        )));
    }

    let mut prefix = [0u8; CONTENT_STREAM_PREFIX_LEN as usize];
    stream.read_exact(&mut prefix)?;
    let header_len = u64::from(u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]));
    let reserved = u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
    if reserved != 0 {
        return Err(StoreError::InvalidContentStream(format!(
            "reserved field is {reserved}, expected 0"
        )));
    }
    if header_len > MAX_HEADER_LEN || header_len > len - CONTENT_STREAM_PREFIX_LEN {
        return Err(StoreError::InvalidContentStream(format!(
            "header length {header_len} exceeds stream length {len}"
        )));
    }

    let mut header = vec![0u8; header_len as usize];
    stream.read_exact(&mut header)?;
    let header: ContentHeader = serde_json::from_slice(&header)
        .map_err(|e| StoreError::InvalidContentStream(format!("bad header: {e}")))?;

    let size = len - CONTENT_STREAM_PREFIX_LEN - header_len;
    let (info, xattrs) = header.into_parts(size);
    if info.is_symlink() && size != 0 {
        return Err(StoreError::InvalidContentStream(
            "symlink carries content bytes".into(),
        ));
    }

    Ok(LoadedFile {
        content: Box::new(stream.take(size)),
        info,
        xattrs,
    })
}

/// Checksum of an in-memory content stream.
pub fn checksum_content_stream(data: &[u8]) -> StoreResult<ObjectId> {
    let mut file = parse_content_stream(Box::new(Cursor::new(data.to_vec())), data.len() as u64)?;
    checksum_file(&file.info, &file.xattrs, &mut file.content)
}
