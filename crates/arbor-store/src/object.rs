use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use arbor_crypto::ContentHasher;
use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::content::checksum_content_stream;
use crate::error::{StoreError, StoreResult};

/// A stored object: kind tag + serialized data + cached size.
///
/// For metadata kinds `data` is the JSON payload; for files it is the
/// content stream (header followed by the file bytes). The store never
/// interprets `data` beyond what is needed to compute a checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectType,
    /// The serialized bytes of the object.
    pub data: Vec<u8>,
    /// The size of `data` in bytes.
    pub size: u64,
}

impl StoredObject {
    /// Create a new stored object from kind and data.
    pub fn new(kind: ObjectType, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    ///
    /// Fails only for file objects whose content stream cannot be parsed.
    pub fn compute_id(&self) -> StoreResult<ObjectId> {
        match self.kind {
            ObjectType::File => checksum_content_stream(&self.data),
            kind => Ok(ContentHasher::for_type(kind).hash(&self.data)),
        }
    }
}

/// A typed metadata payload with a canonical JSON encoding.
pub trait MetadataObject: Serialize + DeserializeOwned {
    /// The object type this payload is stored as.
    const KIND: ObjectType;

    /// Canonical serialized form (what gets hashed and stored).
    fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode a payload previously produced by [`to_bytes`](Self::to_bytes).
    fn from_bytes(checksum: &ObjectId, data: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(data).map_err(|e| StoreError::CorruptObject {
            name: ObjectName::new(*checksum, Self::KIND),
            reason: e.to_string(),
        })
    }

    /// Checksum of the canonical encoding.
    fn checksum(&self) -> StoreResult<ObjectId> {
        Ok(ContentHasher::for_type(Self::KIND).hash(&self.to_bytes()?))
    }

    /// Convert into a `StoredObject` for storage.
    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(Self::KIND, self.to_bytes()?))
    }
}

// ---------------------------------------------------------------------------
// Extended attributes
// ---------------------------------------------------------------------------

/// A single extended attribute.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Xattr {
    pub name: String,
    pub value: Vec<u8>,
}

impl Xattr {
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The extended attribute set of a file or directory, in canonical order.
pub type Xattrs = Vec<Xattr>;

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// A commit: a root tree plus optional parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Parent commit, `None` for root commits.
    pub parent: Option<ObjectId>,
    pub subject: String,
    pub body: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Root directory listing.
    pub root_tree: ObjectId,
    /// Metadata of the root directory.
    pub root_meta: ObjectId,
}

impl Commit {
    pub fn new(
        parent: Option<ObjectId>,
        subject: impl Into<String>,
        root_tree: ObjectId,
        root_meta: ObjectId,
    ) -> Self {
        Self {
            parent,
            subject: subject.into(),
            body: String::new(),
            timestamp: 0,
            root_tree,
            root_meta,
        }
    }
}

impl MetadataObject for Commit {
    const KIND: ObjectType = ObjectType::Commit;
}

// ---------------------------------------------------------------------------
// DirTree
// ---------------------------------------------------------------------------

/// A file entry in a dirtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub checksum: ObjectId,
}

/// A subdirectory entry in a dirtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub tree: ObjectId,
    pub meta: ObjectId,
}

/// Directory listing object.
///
/// `files` and `dirs` are each sorted by name; [`DirTree::new`] establishes
/// that order, decoded payloads are checked by the fsck validator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirTree {
    pub files: Vec<FileEntry>,
    pub dirs: Vec<DirEntry>,
}

impl DirTree {
    /// Create a dirtree, sorting both entry lists by name.
    pub fn new(mut files: Vec<FileEntry>, mut dirs: Vec<DirEntry>) -> Self {
        files.sort_by(|a, b| a.name.cmp(&b.name));
        dirs.sort_by(|a, b| a.name.cmp(&b.name));
        Self { files, dirs }
    }

    /// Create an empty dirtree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of entries of both kinds.
    pub fn len(&self) -> usize {
        self.files.len() + self.dirs.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

impl MetadataObject for DirTree {
    const KIND: ObjectType = ObjectType::DirTree;
}

// ---------------------------------------------------------------------------
// DirMeta
// ---------------------------------------------------------------------------

/// Directory permissions, ownership and xattrs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: Xattrs,
}

impl DirMeta {
    /// A plain directory with the given permission bits.
    pub fn new(uid: u32, gid: u32, permissions: u32) -> Self {
        Self {
            uid,
            gid,
            mode: crate::content::S_IFDIR | (permissions & 0o7777),
            xattrs: Vec::new(),
        }
    }
}

impl MetadataObject for DirMeta {
    const KIND: ObjectType = ObjectType::DirMeta;
}

// ---------------------------------------------------------------------------
// Tombstones and detached metadata
// ---------------------------------------------------------------------------

/// Placeholder recording that a commit was deliberately removed.
///
/// Stored under the removed commit's checksum, not its own hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneCommit {
    pub commit: ObjectId,
}

impl MetadataObject for TombstoneCommit {
    const KIND: ObjectType = ObjectType::TombstoneCommit;
}

/// Detached key/value metadata for a commit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMeta {
    pub entries: BTreeMap<String, String>,
}

impl MetadataObject for CommitMeta {
    const KIND: ObjectType = ObjectType::CommitMeta;
}
