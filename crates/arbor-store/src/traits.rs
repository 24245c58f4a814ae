use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::content::{raw_file_to_content_stream, FileInfo, LoadedFile};
use crate::error::StoreResult;
use crate::object::{Commit, Xattrs};

/// Store-maintained state of a commit, kept outside the commit object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitState {
    /// The commit's object closure has not been fully fetched locally.
    pub partial: bool,
}

/// Content-addressed object repository.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the only mutation is deleting an
///   object and later writing it again.
/// - A missing object is reported as [`StoreError::NotFound`], never as
///   another variant, so callers can tell absence from failure.
/// - The store never verifies content it is asked to file under an explicit
///   checksum; verification belongs to the caller.
/// - Remote names are returned in a stable order.
///
/// [`StoreError::NotFound`]: crate::StoreError::NotFound
pub trait ObjectStore: Send + Sync {
    /// Every object currently stored, of every type.
    fn list_objects(&self) -> StoreResult<BTreeSet<ObjectName>>;

    /// Raw bytes of a metadata object.
    fn load_metadata(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<Vec<u8>>;

    /// Open a file object: header parsed, content streamed.
    fn load_file(&self, checksum: &ObjectId) -> StoreResult<LoadedFile>;

    /// Load and decode a commit together with its store-maintained state.
    fn load_commit(&self, checksum: &ObjectId) -> StoreResult<(Commit, CommitState)>;

    /// Write a content stream of `len` bytes.
    ///
    /// With `expected` set, the object is filed under that checksum as-is.
    /// Returns the checksum actually computed over what was written.
    fn write_content(
        &self,
        expected: Option<&ObjectId>,
        stream: &mut dyn Read,
        len: u64,
    ) -> StoreResult<ObjectId>;

    /// Write a metadata object, filed under the checksum of its bytes.
    fn write_metadata(&self, kind: ObjectType, data: &[u8]) -> StoreResult<ObjectId>;

    /// Remove an object. Missing objects yield `NotFound`.
    fn delete_object(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<()>;

    /// Record a tombstone under the checksum of a removed commit and return
    /// that checksum.
    ///
    /// Fails with `TombstonesDisabled` unless
    /// [`enable_tombstone_feature`](Self::enable_tombstone_feature) was called.
    fn write_tombstone(&self, commit: &ObjectId) -> StoreResult<ObjectId>;

    /// Names of the configured remotes.
    fn remote_list(&self) -> StoreResult<Vec<String>>;

    /// Base URL of a remote; `RemoteNotFound` if unknown.
    fn remote_base_url(&self, name: &str) -> StoreResult<String>;

    /// Turn on commit tombstones for this repository. Idempotent.
    fn enable_tombstone_feature(&self) -> StoreResult<()>;

    /// Write an in-memory file object and return its checksum.
    fn write_file(&self, info: &FileInfo, xattrs: &Xattrs, content: &[u8]) -> StoreResult<ObjectId> {
        let mut info = info.clone();
        info.size = content.len() as u64;
        let (mut stream, len) =
            raw_file_to_content_stream(Box::new(Cursor::new(content.to_vec())), &info, xattrs)?;
        self.write_content(None, &mut stream, len)
    }
}
