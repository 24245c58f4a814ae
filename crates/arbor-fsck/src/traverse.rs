//! Reachability traversal.
//!
//! Computes the set of objects transitively referenced by a set of commits.
//! One marker set is shared across all roots, so an object reachable from
//! several commits is loaded and reported once.
//!
//! # Missing objects
//!
//! A referenced object that is absent is still recorded as reachable, so the
//! verification pass reports it, but its children cannot be walked.

use std::collections::BTreeSet;

use tracing::debug;

use arbor_store::{Commit, DirTree, MetadataObject, ObjectStore};
use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::cancel::Cancellable;
use crate::error::{FsckError, FsckResult};

/// The union closure of `commits`.
pub fn reachable_objects<'a>(
    store: &dyn ObjectStore,
    commits: impl IntoIterator<Item = &'a ObjectId>,
    cancellable: &Cancellable,
) -> FsckResult<BTreeSet<ObjectName>> {
    let mut reachable = BTreeSet::new();
    for commit in commits {
        traverse_commit_union(store, commit, &mut reachable, cancellable)?;
    }
    Ok(reachable)
}

/// Add the closure of `commit` to `reachable`, skipping anything already in
/// it.
pub fn traverse_commit_union(
    store: &dyn ObjectStore,
    commit: &ObjectId,
    reachable: &mut BTreeSet<ObjectName>,
    cancellable: &Cancellable,
) -> FsckResult<()> {
    let stack = vec![ObjectName::new(*commit, ObjectType::Commit)];
    walk(store, stack, reachable, cancellable)
}

/// Add the closure of an already loaded commit's root directory to
/// `reachable`. The commit object itself is not included.
pub fn traverse_contents_union(
    store: &dyn ObjectStore,
    commit: &Commit,
    reachable: &mut BTreeSet<ObjectName>,
    cancellable: &Cancellable,
) -> FsckResult<()> {
    let stack = vec![
        ObjectName::new(commit.root_meta, ObjectType::DirMeta),
        ObjectName::new(commit.root_tree, ObjectType::DirTree),
    ];
    walk(store, stack, reachable, cancellable)
}

fn walk(
    store: &dyn ObjectStore,
    mut stack: Vec<ObjectName>,
    reachable: &mut BTreeSet<ObjectName>,
    cancellable: &Cancellable,
) -> FsckResult<()> {
    while let Some(name) = stack.pop() {
        if !reachable.insert(name) {
            continue;
        }
        cancellable.check()?;

        match name.kind {
            ObjectType::Commit => {
                let Some(commit) = load_for_walk::<Commit>(store, &name)? else {
                    continue;
                };
                stack.push(ObjectName::new(commit.root_meta, ObjectType::DirMeta));
                stack.push(ObjectName::new(commit.root_tree, ObjectType::DirTree));
            }
            ObjectType::DirTree => {
                let Some(tree) = load_for_walk::<DirTree>(store, &name)? else {
                    continue;
                };
                // Reversed so entries pop in listing order.
                for dir in tree.dirs.iter().rev() {
                    stack.push(ObjectName::new(dir.meta, ObjectType::DirMeta));
                    stack.push(ObjectName::new(dir.tree, ObjectType::DirTree));
                }
                for file in tree.files.iter().rev() {
                    stack.push(ObjectName::new(file.checksum, ObjectType::File));
                }
            }
            // Leaves: no outgoing references.
            ObjectType::DirMeta
            | ObjectType::File
            | ObjectType::TombstoneCommit
            | ObjectType::CommitMeta => {}
        }
    }
    Ok(())
}

fn load_for_walk<T: MetadataObject>(
    store: &dyn ObjectStore,
    name: &ObjectName,
) -> FsckResult<Option<T>> {
    match store.load_metadata(&name.checksum, name.kind) {
        Ok(data) => T::from_bytes(&name.checksum, &data)
            .map(Some)
            .map_err(|e| FsckError::structural(&name.checksum, name.kind, e.to_string())),
        Err(e) if e.is_not_found() => {
            debug!(object = %name, "referenced object is missing, not descending");
            Ok(None)
        }
        Err(e) => Err(FsckError::store(format!("loading {name}"))(e)),
    }
}
