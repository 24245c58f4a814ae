//! Tombstones for commits whose parent has disappeared.

use tracing::info;

use arbor_store::ObjectStore;
use arbor_types::{ObjectId, ObjectType};

use crate::cancel::Cancellable;
use crate::error::{FsckError, FsckResult};
use crate::progress::ProgressSink;

/// Commits (given as `(commit, parent)` pairs) whose parent is not stored.
///
/// Any failure other than absence while probing a parent is fatal.
pub fn find_orphaned_commits<'a>(
    store: &dyn ObjectStore,
    lineage: impl IntoIterator<Item = (&'a ObjectId, &'a ObjectId)>,
    cancellable: &Cancellable,
) -> FsckResult<Vec<ObjectId>> {
    let mut orphans = Vec::new();
    for (commit, parent) in lineage {
        cancellable.check()?;
        match store.load_metadata(parent, ObjectType::Commit) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => orphans.push(*commit),
            Err(e) => {
                return Err(FsckError::store(format!(
                    "loading parent {parent} of commit {commit}"
                ))(e))
            }
        }
    }
    Ok(orphans)
}

/// Replace each orphaned commit with a tombstone under the same checksum.
///
/// The repository's tombstone feature is switched on once, before the first
/// tombstone is written. Nothing happens for an empty list.
pub fn add_tombstones(
    store: &dyn ObjectStore,
    orphans: &[ObjectId],
    progress: &mut dyn ProgressSink,
) -> FsckResult<Vec<ObjectId>> {
    if orphans.is_empty() {
        return Ok(Vec::new());
    }
    store
        .enable_tombstone_feature()
        .map_err(FsckError::store("enabling tombstone commits"))?;

    let mut written = Vec::with_capacity(orphans.len());
    for commit in orphans {
        progress.status(&format!("Adding tombstone for commit {commit}"));
        store
            .delete_object(commit, ObjectType::Commit)
            .map_err(FsckError::store(format!("deleting commit {commit}")))?;
        let tombstone = store
            .write_tombstone(commit)
            .map_err(FsckError::store(format!("writing tombstone for {commit}")))?;
        info!(commit = %commit, "replaced orphaned commit with a tombstone");
        written.push(tombstone);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_store::{Commit, InMemoryObjectStore, MetadataObject, TombstoneCommit};

    use crate::progress::RecordingProgress;

    fn commit(store: &InMemoryObjectStore, parent: Option<ObjectId>, subject: &str) -> ObjectId {
        let c = Commit::new(parent, subject, ObjectId::from_bytes(b"t"), ObjectId::from_bytes(b"m"));
        store.write_object(&c).unwrap()
    }

    #[test]
    fn finds_commits_with_missing_parents() {
        let store = InMemoryObjectStore::new();
        let root = commit(&store, None, "root");
        let child = commit(&store, Some(root), "child");
        let ghost = ObjectId::from_bytes(b"ghost");
        let orphan = commit(&store, Some(ghost), "orphan");

        let lineage = [(&child, &root), (&orphan, &ghost)];
        let found = find_orphaned_commits(&store, lineage, &Cancellable::new()).unwrap();
        assert_eq!(found, vec![orphan]);
    }

    #[test]
    fn parent_load_failure_is_fatal() {
        let store = InMemoryObjectStore::new();
        let root = commit(&store, None, "root");
        let child = commit(&store, Some(root), "child");
        store.fail_loads_of(&root, ObjectType::Commit);
        let err = find_orphaned_commits(&store, [(&child, &root)], &Cancellable::new()).unwrap_err();
        assert!(matches!(err, FsckError::Store { .. }));
    }

    #[test]
    fn tombstones_replace_commits() {
        let store = InMemoryObjectStore::new();
        let a = commit(&store, Some(ObjectId::from_bytes(b"x")), "a");
        let b = commit(&store, Some(ObjectId::from_bytes(b"y")), "b");
        let mut progress = RecordingProgress::new();

        let written = add_tombstones(&store, &[a, b], &mut progress).unwrap();
        assert_eq!(written, vec![a, b]);
        assert_eq!(store.tombstone_enable_calls(), 1);
        for id in [a, b] {
            assert!(!store.contains(&id, ObjectType::Commit));
            let stored = store.get(&id, ObjectType::TombstoneCommit).unwrap();
            let tombstone = TombstoneCommit::from_bytes(&id, &stored.data).unwrap();
            assert_eq!(tombstone.commit, id);
        }
        assert!(progress.contains(&format!("Adding tombstone for commit {a}")));
    }

    #[test]
    fn nothing_to_do_leaves_store_alone() {
        let store = InMemoryObjectStore::new();
        let mut progress = RecordingProgress::new();
        assert!(add_tombstones(&store, &[], &mut progress).unwrap().is_empty());
        assert_eq!(store.tombstone_enable_calls(), 0);
        assert_eq!(store.mutation_count(), 0);
    }
}
