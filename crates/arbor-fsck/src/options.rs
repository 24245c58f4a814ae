use arbor_store::{ObjectStore, StoreError};

use crate::error::{FsckError, FsckResult};

/// Argument that selects every configured remote.
pub const ALL_REMOTES: &str = "-";

/// Which remotes to fetch replacements for missing or corrupt objects from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RepairRemotes {
    /// No repair; problems are only recorded.
    #[default]
    None,
    /// Every remote configured in the repository, in its listed order.
    All,
    /// These remotes, tried in the given order.
    Named(Vec<String>),
}

impl RepairRemotes {
    /// Interpret command-line remote arguments.
    ///
    /// No arguments disables repair, a lone `-` selects all remotes, and `-`
    /// cannot be combined with explicit names.
    pub fn from_args(args: &[String]) -> FsckResult<Self> {
        match args {
            [] => Ok(Self::None),
            [only] if only == ALL_REMOTES => Ok(Self::All),
            _ if args.iter().any(|a| a == ALL_REMOTES) => Err(FsckError::RemoteSelection(
                "Either list repair remotes explicitly or use - (dash) to use all available remotes"
                    .into(),
            )),
            _ => Ok(Self::Named(args.to_vec())),
        }
    }

    /// Whether the user asked for repair at all.
    pub fn is_requested(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Expand to concrete remote names, checking that named remotes exist.
    pub fn resolve(&self, store: &dyn ObjectStore) -> FsckResult<Vec<String>> {
        match self {
            Self::None => Ok(Vec::new()),
            Self::All => store
                .remote_list()
                .map_err(FsckError::store("listing remotes")),
            Self::Named(names) => {
                for name in names {
                    match store.remote_base_url(name) {
                        Ok(_) => {}
                        Err(StoreError::RemoteNotFound(_)) => {
                            return Err(FsckError::RemoteSelection(format!(
                                "remote \"{name}\" not found"
                            )))
                        }
                        Err(e) => {
                            return Err(FsckError::store(format!("resolving remote {name}"))(e))
                        }
                    }
                }
                Ok(names.clone())
            }
        }
    }
}

/// Options for a single sweep.
#[derive(Clone, Debug, Default)]
pub struct FsckOptions {
    /// Suppress progress text.
    pub quiet: bool,
    /// Delete objects whose content does not match their checksum.
    pub delete_on_corrupt: bool,
    /// Replace commits whose parent is missing with tombstones.
    pub add_tombstones: bool,
    pub repair_remotes: RepairRemotes,
}

impl FsckOptions {
    /// Whether corrupt objects are deleted rather than aborting the sweep.
    pub(crate) fn corruption_policy_active(&self) -> bool {
        self.delete_on_corrupt || self.repair_remotes.is_requested()
    }
}
