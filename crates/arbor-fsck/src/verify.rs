//! Checksum verification.

use arbor_crypto::ContentHasher;
use arbor_store::{checksum_file, LoadedFile};
use arbor_types::{ObjectId, ObjectType};

use crate::error::{FsckError, FsckResult};

/// Outcome of recomputing an object's checksum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    pub matches: bool,
    /// The checksum the stored content actually hashes to.
    pub computed: ObjectId,
}

impl Verification {
    fn against(expected: &ObjectId, computed: ObjectId) -> Self {
        Self {
            matches: computed == *expected,
            computed,
        }
    }
}

/// Recompute the checksum of raw metadata bytes.
pub fn verify_metadata(expected: &ObjectId, kind: ObjectType, data: &[u8]) -> Verification {
    Verification::against(expected, ContentHasher::for_type(kind).hash(data))
}

/// Recompute the checksum of a file object, consuming its content stream.
pub fn verify_file(expected: &ObjectId, file: &mut LoadedFile) -> FsckResult<Verification> {
    let computed = checksum_file(&file.info, &file.xattrs, &mut file.content)
        .map_err(FsckError::store(format!("computing checksum of file object {expected}")))?;
    Ok(Verification::against(expected, computed))
}
