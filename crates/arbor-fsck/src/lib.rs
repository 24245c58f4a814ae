//! Integrity checking and repair for Arbor object repositories.
//!
//! [`run_fsck`] walks every object reachable from the repository's commits,
//! checks that each one exists, decodes as its declared type and hashes to
//! the checksum it is filed under. Problems are recorded in an
//! [`FsckReport`]; with a repair policy, corrupt objects are deleted and file
//! objects are fetched again from remote mirrors.
//!
//! # Modules
//!
//! - [`validate`] -- structural checks per object type
//! - [`verify`] -- checksum recomputation
//! - [`traverse`] -- reachability closure over a commit set
//! - [`repair`] -- sequential per-remote download and write-back
//! - [`tombstone`] -- tombstones for commits whose parent is gone
//! - [`sweep`] -- the driver tying the above together
//!
//! The store and the network are both traits ([`ObjectStore`] and
//! [`RemoteFetcher`]) so a sweep can run entirely in memory.
//!
//! [`ObjectStore`]: arbor_store::ObjectStore

pub mod cancel;
pub mod error;
pub mod fetch;
pub mod options;
pub mod progress;
pub mod repair;
pub mod sweep;
pub mod tombstone;
pub mod traverse;
pub mod validate;
pub mod verify;

pub use cancel::Cancellable;
pub use error::{FsckError, FsckResult};
pub use fetch::{FetchError, HttpFetcher, InMemoryFetcher, RemoteFetcher};
pub use options::{FsckOptions, RepairRemotes};
pub use progress::{ConsoleProgress, NullProgress, ProgressSink, RecordingProgress};
pub use repair::{RepairOutcome, Repairer};
pub use sweep::{run_fsck, run_fsck_with_progress, FsckReport, FsckStatus};
pub use verify::Verification;
