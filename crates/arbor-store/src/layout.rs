//! Loose object path scheme shared by local stores and remote mirrors.
//!
//! An object lives at `objects/<first two hex digits>/<remaining 62>.<type>`.

use arbor_types::{ObjectId, ObjectName, ObjectType};

/// Top-level directory holding loose objects.
pub const OBJECTS_DIR: &str = "objects";

/// Relative path of an object inside a repository or mirror.
pub fn relative_object_path(checksum: &ObjectId, kind: ObjectType) -> String {
    let hex = checksum.to_hex();
    let (prefix, rest) = hex.split_at(2);
    format!("{OBJECTS_DIR}/{prefix}/{rest}.{kind}")
}

/// Inverse of [`relative_object_path`] for the two path components below
/// `objects/`. Returns `None` for anything that is not an object file.
pub fn parse_object_path(prefix: &str, file_name: &str) -> Option<ObjectName> {
    if prefix.len() != 2 {
        return None;
    }
    let (rest, suffix) = file_name.split_once('.')?;
    let kind: ObjectType = suffix.parse().ok()?;
    let checksum = ObjectId::from_hex(&format!("{prefix}{rest}")).ok()?;
    Some(ObjectName::new(checksum, kind))
}
