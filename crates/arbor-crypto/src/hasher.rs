use std::io::{self, Read};

use arbor_types::{ObjectId, ObjectType};

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"arbor-file-v1"`,
/// `"arbor-dirtree-v1"`) that is prepended to every hash computation. A file
/// and a dirtree with identical bytes therefore produce different checksums.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for file objects (header followed by content).
    pub const FILE: Self = Self {
        domain: "arbor-file-v1",
    };
    /// Hasher for dirtree objects.
    pub const DIR_TREE: Self = Self {
        domain: "arbor-dirtree-v1",
    };
    /// Hasher for dirmeta objects.
    pub const DIR_META: Self = Self {
        domain: "arbor-dirmeta-v1",
    };
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self {
        domain: "arbor-commit-v1",
    };
    /// Hasher for commit tombstones.
    pub const TOMBSTONE_COMMIT: Self = Self {
        domain: "arbor-commit-tombstone-v1",
    };
    /// Hasher for detached commit metadata.
    pub const COMMIT_META: Self = Self {
        domain: "arbor-commitmeta-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// The hasher responsible for an object type.
    pub fn for_type(kind: ObjectType) -> &'static Self {
        match kind {
            ObjectType::File => &Self::FILE,
            ObjectType::DirTree => &Self::DIR_TREE,
            ObjectType::DirMeta => &Self::DIR_META,
            ObjectType::Commit => &Self::COMMIT,
            ObjectType::TombstoneCommit => &Self::TOMBSTONE_COMMIT,
            ObjectType::CommitMeta => &Self::COMMIT_META,
        }
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ObjectId {
        let mut hasher = self.start();
        hasher.update(data);
        ObjectId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a fixed prefix followed by everything `reader` yields.
    ///
    /// The reader is consumed to EOF. Buffering is independent of the
    /// reader's chunking, so the same bytes always give the same digest.
    pub fn hash_stream(&self, prefix: &[u8], reader: &mut dyn Read) -> io::Result<ObjectId> {
        let mut hasher = self.start();
        hasher.update(prefix);
        io::copy(reader, &mut hasher)?;
        Ok(ObjectId::from_hash(*hasher.finalize().as_bytes()))
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(&self, data: &[u8], expected: &ObjectId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}
