//! Structural validation of decoded objects.
//!
//! Each check returns a human-readable reason on failure; the public entry
//! points turn that into [`FsckError::Structural`].

use arbor_store::content::{S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use arbor_store::{
    Commit, CommitMeta, DirMeta, DirTree, FileInfo, MetadataObject, TombstoneCommit,
};
use arbor_types::{ObjectId, ObjectType};

use crate::error::{FsckError, FsckResult};

const PERMISSION_BITS: u32 = 0o7777;

/// Decode a metadata payload and check it against its type's schema.
pub fn validate_metadata(checksum: &ObjectId, kind: ObjectType, data: &[u8]) -> FsckResult<()> {
    let reason = match kind {
        ObjectType::Commit => validate_commit(&decode::<Commit>(checksum, data)?),
        ObjectType::DirTree => validate_dirtree(&decode::<DirTree>(checksum, data)?),
        ObjectType::DirMeta => validate_dirmeta(&decode::<DirMeta>(checksum, data)?),
        ObjectType::TombstoneCommit => {
            let tombstone = decode::<TombstoneCommit>(checksum, data)?;
            if tombstone.commit == *checksum {
                Ok(())
            } else {
                Err(format!("tombstone names commit {}", tombstone.commit))
            }
        }
        ObjectType::CommitMeta => {
            decode::<CommitMeta>(checksum, data)?;
            Ok(())
        }
        ObjectType::File => Err("file objects have no metadata encoding".into()),
    };
    reason.map_err(|r| FsckError::structural(checksum, kind, r))
}

/// Check the header of a file object.
pub fn validate_file(checksum: &ObjectId, info: &FileInfo) -> FsckResult<()> {
    validate_file_mode(info.mode).map_err(|r| FsckError::structural(checksum, ObjectType::File, r))
}

fn decode<T: MetadataObject>(checksum: &ObjectId, data: &[u8]) -> FsckResult<T> {
    T::from_bytes(checksum, data).map_err(|e| FsckError::structural(checksum, T::KIND, e.to_string()))
}

pub fn validate_commit(commit: &Commit) -> Result<(), String> {
    if let Some(parent) = &commit.parent {
        validate_reference(parent, "parent")?;
    }
    validate_reference(&commit.root_tree, "root tree")?;
    validate_reference(&commit.root_meta, "root dirmeta")
}

pub fn validate_dirtree(tree: &DirTree) -> Result<(), String> {
    validate_sorted(tree.files.iter().map(|f| f.name.as_str()), "file")?;
    validate_sorted(tree.dirs.iter().map(|d| d.name.as_str()), "directory")?;

    for file in &tree.files {
        validate_reference(&file.checksum, &format!("file \"{}\"", file.name))?;
    }
    for dir in &tree.dirs {
        validate_reference(&dir.tree, &format!("directory \"{}\" tree", dir.name))?;
        validate_reference(&dir.meta, &format!("directory \"{}\" dirmeta", dir.name))?;
        if tree.files.binary_search_by(|f| f.name.as_str().cmp(&dir.name)).is_ok() {
            return Err(format!("\"{}\" is both a file and a directory", dir.name));
        }
    }
    Ok(())
}

pub fn validate_dirmeta(meta: &DirMeta) -> Result<(), String> {
    if meta.mode & S_IFMT != S_IFDIR {
        return Err(format!("mode {:o} is not a directory", meta.mode));
    }
    validate_mode_bits(meta.mode)
}

/// A file mode must be a regular file or symlink with only permission bits
/// besides the type.
pub fn validate_file_mode(mode: u32) -> Result<(), String> {
    match mode & S_IFMT {
        S_IFREG | S_IFLNK => validate_mode_bits(mode),
        _ => Err(format!("invalid file mode {mode:o}")),
    }
}

fn validate_mode_bits(mode: u32) -> Result<(), String> {
    if mode & !(S_IFMT | PERMISSION_BITS) != 0 {
        return Err(format!("mode {mode:o} has unknown bits"));
    }
    Ok(())
}

/// A single path component.
pub fn validate_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("empty filename".into());
    }
    if name == "." || name == ".." {
        return Err(format!("invalid filename \"{name}\""));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(format!("invalid character in filename {name:?}"));
    }
    Ok(())
}

fn validate_sorted<'a>(names: impl Iterator<Item = &'a str>, what: &str) -> Result<(), String> {
    let mut prev: Option<&str> = None;
    for name in names {
        validate_filename(name)?;
        if let Some(prev) = prev {
            if prev >= name {
                return Err(format!(
                    "{what} entries out of order or duplicated: \"{prev}\" then \"{name}\""
                ));
            }
        }
        prev = Some(name);
    }
    Ok(())
}

fn validate_reference(checksum: &ObjectId, what: &str) -> Result<(), String> {
    if checksum.is_null() {
        Err(format!("{what} references the null checksum"))
    } else {
        Ok(())
    }
}
