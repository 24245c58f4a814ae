//! Content-addressed object storage for Arbor.
//!
//! A repository holds versioned filesystem trees as immutable objects, each
//! filed under the checksum of its canonical encoding (domain-separated by
//! object type).
//!
//! # Object Types
//!
//! - [`Commit`] -- root tree + root dirmeta + optional parent
//! - [`DirTree`] -- directory listing of files and subdirectories
//! - [`DirMeta`] -- directory ownership, mode and xattrs
//! - file objects -- [`FileInfo`] + xattrs + bytes, framed as a content stream
//! - [`TombstoneCommit`] / [`CommitMeta`] -- commit bookkeeping
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose objects on disk, TOML configuration
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; repair is delete-then-write.
//! 2. Absence is always `StoreError::NotFound`, never a generic I/O error.
//! 3. The store files content under the checksum it is given; verifying
//!    that checksum is the caller's job.
//! 4. Local storage and remote mirrors share one path scheme and one file
//!    encoding.

pub mod config;
pub mod content;
pub mod error;
pub mod fs;
pub mod layout;
pub mod memory;
pub mod object;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{CoreConfig, RemoteConfig, RepoConfig};
pub use content::{
    checksum_file, encode_content_stream, parse_content_stream, raw_file_to_content_stream,
    ContentHeader, FileInfo, LoadedFile,
};
pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use layout::relative_object_path;
pub use memory::InMemoryObjectStore;
pub use object::{
    Commit, CommitMeta, DirEntry, DirMeta, DirTree, FileEntry, MetadataObject, StoredObject,
    TombstoneCommit, Xattr, Xattrs,
};
pub use traits::{CommitState, ObjectStore};
