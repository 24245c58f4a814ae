//! The sweep driver.
//!
//! A sweep moves through these phases:
//!
//! 1. enumerate every stored object
//! 2. split commits into full and partial by their store-reported state
//! 3. optionally replace commits with missing parents by tombstones
//! 4. compute the objects reachable from the full commits, including the
//!    trees of full commits that were just tombstoned
//! 5. check each reachable object, repairing or recording what is wrong
//! 6. report
//!
//! Missing and corrupt objects are collected rather than raised, so one bad
//! object never stops the sweep. Anything else aborts it.

use std::collections::{BTreeMap, BTreeSet};
use std::io;

use tracing::{info, warn};

use arbor_store::{Commit, ObjectStore, StoreError};
use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::cancel::Cancellable;
use crate::error::{FsckError, FsckResult};
use crate::fetch::RemoteFetcher;
use crate::options::FsckOptions;
use crate::progress::{progress_due, ConsoleProgress, ProgressSink};
use crate::repair::{RepairOutcome, Repairer};
use crate::tombstone::{add_tombstones, find_orphaned_commits};
use crate::traverse::{reachable_objects, traverse_contents_union};
use crate::validate::{validate_file, validate_metadata};
use crate::verify::{verify_file, verify_metadata};

/// Overall outcome of a sweep that ran to completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsckStatus {
    /// Every reachable object is present and intact (possibly after repair).
    Ok,
    /// At least one object is missing or corrupt and was not repaired.
    CorruptionFound,
}

/// What a completed sweep found and did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsckReport {
    /// Objects present when the sweep started.
    pub objects_enumerated: usize,
    /// Full commits whose closure was verified.
    pub commits_verified: usize,
    /// Partially fetched commits that were skipped.
    pub partial_commits: usize,
    /// Reachable objects checked.
    pub objects_checked: usize,
    pub missing: Vec<ObjectName>,
    pub corrupted: Vec<ObjectName>,
    /// Missing or corrupt objects restored from a remote.
    pub repaired: Vec<ObjectName>,
    /// Commits replaced with tombstones.
    pub tombstoned: Vec<ObjectId>,
    /// Set when a problem was left unrepaired. Never cleared.
    pub found_corruption: bool,
}

impl FsckReport {
    pub fn status(&self) -> FsckStatus {
        if self.found_corruption {
            FsckStatus::CorruptionFound
        } else {
            FsckStatus::Ok
        }
    }
}

/// Check `store`, printing to the console.
pub fn run_fsck(
    store: &dyn ObjectStore,
    fetcher: &dyn RemoteFetcher,
    options: &FsckOptions,
    cancellable: &Cancellable,
) -> FsckResult<FsckReport> {
    run_fsck_with_progress(store, fetcher, options, cancellable, &mut ConsoleProgress)
}

/// Check `store`, sending human-readable output to `progress`.
pub fn run_fsck_with_progress(
    store: &dyn ObjectStore,
    fetcher: &dyn RemoteFetcher,
    options: &FsckOptions,
    cancellable: &Cancellable,
    progress: &mut dyn ProgressSink,
) -> FsckResult<FsckReport> {
    let remotes = options.repair_remotes.resolve(store)?;
    let mut sweep = Sweep {
        store,
        options,
        repairer: Repairer {
            store,
            fetcher,
            remotes: &remotes,
            delete_on_corrupt: options.delete_on_corrupt,
            cancellable,
        },
        cancellable,
        progress,
        report: FsckReport::default(),
    };
    sweep.run()?;
    Ok(sweep.report)
}

/// Commits found during enumeration.
#[derive(Debug, Default)]
struct CommitPartition {
    full: BTreeMap<ObjectId, Commit>,
    partial: BTreeSet<ObjectId>,
    /// `(commit, parent)` for commits that have a parent.
    lineage: Vec<(ObjectId, ObjectId)>,
}

struct Sweep<'a, 'p> {
    store: &'a dyn ObjectStore,
    options: &'a FsckOptions,
    repairer: Repairer<'a>,
    cancellable: &'a Cancellable,
    progress: &'p mut dyn ProgressSink,
    report: FsckReport,
}

impl Sweep<'_, '_> {
    fn run(&mut self) -> FsckResult<()> {
        self.status("Enumerating objects...");
        let objects = self
            .store
            .list_objects()
            .map_err(FsckError::store("listing objects"))?;
        self.report.objects_enumerated = objects.len();
        info!(objects = objects.len(), "enumerated objects");

        let mut commits = self.partition(&objects)?;
        self.report.partial_commits = commits.partial.len();
        // Full commits replaced by tombstones keep their content checked.
        let mut detached = Vec::new();

        if self.options.add_tombstones {
            let lineage = commits.lineage.iter().map(|(c, p)| (c, p));
            let orphans = find_orphaned_commits(self.store, lineage, self.cancellable)?;
            let tombstoned = add_tombstones(self.store, &orphans, &mut *self.progress)?;
            for commit in &tombstoned {
                if let Some(payload) = commits.full.remove(commit) {
                    detached.push(payload);
                }
            }
            self.report.tombstoned = tombstoned;
        }

        self.report.commits_verified = commits.full.len();
        self.status(&format!(
            "Verifying content integrity of {} commit objects...",
            commits.full.len()
        ));
        let mut reachable = reachable_objects(self.store, commits.full.keys(), self.cancellable)?;
        for commit in &detached {
            traverse_contents_union(self.store, commit, &mut reachable, self.cancellable)?;
        }
        self.verify_all(&reachable)?;

        if self.report.partial_commits > 0 {
            self.progress.status(&format!(
                "{} partial commits not verified",
                self.report.partial_commits
            ));
        }
        info!(
            checked = self.report.objects_checked,
            missing = self.report.missing.len(),
            corrupted = self.report.corrupted.len(),
            repaired = self.report.repaired.len(),
            "sweep complete"
        );
        Ok(())
    }

    fn partition(&mut self, objects: &BTreeSet<ObjectName>) -> FsckResult<CommitPartition> {
        let mut commits = CommitPartition::default();
        for name in objects.iter().filter(|n| n.kind == ObjectType::Commit) {
            self.cancellable.check()?;
            let (commit, state) = self
                .store
                .load_commit(&name.checksum)
                .map_err(FsckError::store(format!("loading commit {}", name.checksum)))?;
            if let Some(parent) = commit.parent {
                commits.lineage.push((name.checksum, parent));
            }
            if state.partial {
                commits.partial.insert(name.checksum);
            } else {
                commits.full.insert(name.checksum, commit);
            }
        }
        Ok(commits)
    }

    fn verify_all(&mut self, reachable: &BTreeSet<ObjectName>) -> FsckResult<()> {
        let total = reachable.len();
        for (i, name) in reachable.iter().enumerate() {
            self.cancellable.check()?;
            match name.kind {
                ObjectType::File => self.check_file(name)?,
                ObjectType::DirTree
                | ObjectType::DirMeta
                | ObjectType::Commit
                | ObjectType::TombstoneCommit
                | ObjectType::CommitMeta => self.check_metadata(name)?,
            }
            self.report.objects_checked += 1;
            self.progress.object_checked(i + 1, total);
            if progress_due(i, total) {
                self.status(&format!("{}/{} objects", i + 1, total));
            }
        }
        Ok(())
    }

    fn check_metadata(&mut self, name: &ObjectName) -> FsckResult<()> {
        let data = match self.store.load_metadata(&name.checksum, name.kind) {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return self.missing(name),
            Err(e) => return Err(FsckError::store(format!("loading {name}"))(e)),
        };
        validate_metadata(&name.checksum, name.kind, &data)?;
        let verdict = verify_metadata(&name.checksum, name.kind, &data);
        if verdict.matches {
            Ok(())
        } else {
            self.corrupt(name, format!("actual checksum: {}", verdict.computed))
        }
    }

    fn check_file(&mut self, name: &ObjectName) -> FsckResult<()> {
        let mut file = match self.store.load_file(&name.checksum) {
            Ok(file) => file,
            Err(e) if e.is_not_found() => return self.missing(name),
            Err(e) if is_damaged_stream(&e) => return self.corrupt(name, e.to_string()),
            Err(e) => return Err(FsckError::store(format!("loading {name}"))(e)),
        };
        validate_file(&name.checksum, &file.info)?;
        let verdict = verify_file(&name.checksum, &mut file)?;
        drop(file);
        if verdict.matches {
            Ok(())
        } else {
            self.corrupt(name, format!("actual checksum: {}", verdict.computed))
        }
    }

    fn missing(&mut self, name: &ObjectName) -> FsckResult<()> {
        warn!(object = %name, "object missing");
        self.progress.problem(&format!("Object missing: {name}"));
        self.report.missing.push(*name);
        self.try_repair(name)
    }

    fn corrupt(&mut self, name: &ObjectName, reason: String) -> FsckResult<()> {
        warn!(object = %name, %reason, "corrupted object");
        self.progress
            .problem(&format!("corrupted object {name}; {reason}"));
        self.report.corrupted.push(*name);

        if !self.options.corruption_policy_active() {
            return Err(FsckError::Corrupted {
                object: *name,
                reason,
            });
        }
        if let Err(e) = self.store.delete_object(&name.checksum, name.kind) {
            warn!(object = %name, error = %e, "failed to delete corrupted object");
        }
        self.try_repair(name)
    }

    fn try_repair(&mut self, name: &ObjectName) -> FsckResult<()> {
        if !self.repairer.remotes.is_empty() {
            if let RepairOutcome::Repaired { .. } = self.repairer.repair(&name.checksum, name.kind)? {
                self.report.repaired.push(*name);
                return Ok(());
            }
        }
        self.report.found_corruption = true;
        Ok(())
    }

    fn status(&mut self, line: &str) {
        if !self.options.quiet {
            self.progress.status(line);
        }
    }
}

/// A file object whose stored bytes cannot even be framed.
fn is_damaged_stream(e: &StoreError) -> bool {
    match e {
        StoreError::InvalidContentStream(_) => true,
        StoreError::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}
