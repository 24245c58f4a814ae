use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ObjectId;

/// The kind of object stored in a repository.
///
/// `File` is the only content type; every other kind is a small metadata
/// object with a structured payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    /// File content plus its header (mode, ownership, xattrs).
    File,
    /// Directory listing: files and subdirectories by name.
    DirTree,
    /// Directory permissions, ownership and xattrs.
    DirMeta,
    /// A snapshot of a root tree with an optional parent.
    Commit,
    /// Placeholder left behind for a deleted commit.
    TombstoneCommit,
    /// Detached key/value metadata attached to a commit.
    CommitMeta,
}

impl ObjectType {
    /// Every object type, in storage order.
    pub const ALL: [ObjectType; 6] = [
        Self::File,
        Self::DirTree,
        Self::DirMeta,
        Self::Commit,
        Self::TombstoneCommit,
        Self::CommitMeta,
    ];

    /// Returns `true` for the structured metadata kinds.
    pub fn is_meta(&self) -> bool {
        !matches!(self, Self::File)
    }

    /// Name used both in messages and as the on-disk file suffix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::DirTree => "dirtree",
            Self::DirMeta => "dirmeta",
            Self::Commit => "commit",
            Self::TombstoneCommit => "commit-tombstone",
            Self::CommitMeta => "commitmeta",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| TypeError::UnknownObjectType(s.to_string()))
    }
}

/// An object's full name: its checksum and its type.
///
/// The same checksum may legitimately appear under two types (a commit and
/// its tombstone are never present together, but nothing forbids a dirmeta
/// and a file from sharing bytes), so the pair is the identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectName {
    pub checksum: ObjectId,
    pub kind: ObjectType,
}

impl ObjectName {
    pub fn new(checksum: ObjectId, kind: ObjectType) -> Self {
        Self { checksum, kind }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.checksum, self.kind)
    }
}

impl FromStr for ObjectName {
    type Err = TypeError;

    /// Parse the `<checksum>.<type>` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (checksum, kind) = s
            .split_once('.')
            .ok_or_else(|| TypeError::InvalidObjectName(s.to_string()))?;
        Ok(Self {
            checksum: checksum.parse()?,
            kind: kind.parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_file_is_content() {
        for kind in ObjectType::ALL {
            assert_eq!(kind.is_meta(), kind != ObjectType::File);
        }
    }

    #[test]
    fn type_names_parse_back() {
        for kind in ObjectType::ALL {
            assert_eq!(kind.as_str().parse::<ObjectType>().unwrap(), kind);
        }
        assert!("blob".parse::<ObjectType>().is_err());
    }

    #[test]
    fn name_display_and_parse() {
        let name = ObjectName::new(ObjectId::from_bytes(b"a"), ObjectType::DirTree);
        let text = name.to_string();
        assert!(text.ends_with(".dirtree"));
        assert_eq!(text.parse::<ObjectName>().unwrap(), name);
    }

    #[test]
    fn name_without_type_is_rejected() {
        let bare = ObjectId::from_bytes(b"a").to_hex();
        assert!(matches!(
            bare.parse::<ObjectName>(),
            Err(TypeError::InvalidObjectName(_))
        ));
    }

    #[test]
    fn names_order_by_checksum_first() {
        let low = ObjectName::new(ObjectId::from_hash([0; 32]), ObjectType::CommitMeta);
        let high = ObjectName::new(ObjectId::from_hash([1; 32]), ObjectType::File);
        assert!(low < high);
    }
}
