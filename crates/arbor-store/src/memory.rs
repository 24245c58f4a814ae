use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{self, Cursor, Read};
use std::sync::RwLock;

use tracing::debug;

use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::content::{parse_content_stream, LoadedFile};
use crate::error::{StoreError, StoreResult};
use crate::object::{Commit, MetadataObject, StoredObject, TombstoneCommit};
use crate::traits::{CommitState, ObjectStore};

#[derive(Default)]
struct Inner {
    objects: HashMap<ObjectName, StoredObject>,
    partial: HashSet<ObjectId>,
    remotes: Vec<(String, String)>,
    tombstones_enabled: bool,
    tombstone_enable_calls: usize,
    failing_loads: HashSet<ObjectName>,
    failing_writes: HashSet<ObjectId>,
    failing_deletes: HashSet<ObjectName>,
    mutations: usize,
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Besides the [`ObjectStore`] contract it
/// exposes hooks to plant arbitrary bytes under any name and to make loads,
/// writes or deletes of chosen objects fail with an I/O error.
pub struct InMemoryObjectStore {
    inner: RwLock<Inner>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if an object with this name is stored.
    pub fn contains(&self, checksum: &ObjectId, kind: ObjectType) -> bool {
        self.inner
            .read()
            .expect("lock poisoned")
            .objects
            .contains_key(&ObjectName::new(*checksum, kind))
    }

    /// A copy of a stored object.
    pub fn get(&self, checksum: &ObjectId, kind: ObjectType) -> Option<StoredObject> {
        self.inner
            .read()
            .expect("lock poisoned")
            .objects
            .get(&ObjectName::new(*checksum, kind))
            .cloned()
    }

    /// File `data` under an arbitrary name, replacing whatever was there.
    ///
    /// Used to simulate on-disk corruption.
    pub fn put_raw(&self, checksum: ObjectId, kind: ObjectType, data: Vec<u8>) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner
            .objects
            .insert(ObjectName::new(checksum, kind), StoredObject::new(kind, data));
    }

    /// Encode and write a metadata payload.
    pub fn write_object<T: MetadataObject>(&self, object: &T) -> StoreResult<ObjectId> {
        self.write_metadata(T::KIND, &object.to_bytes()?)
    }

    /// Mark a commit as partially fetched (or clear the mark).
    pub fn set_partial(&self, commit: &ObjectId, partial: bool) {
        let mut inner = self.inner.write().expect("lock poisoned");
        if partial {
            inner.partial.insert(*commit);
        } else {
            inner.partial.remove(commit);
        }
    }

    /// Register a remote. Remotes are listed in registration order.
    pub fn add_remote(&self, name: impl Into<String>, url: impl Into<String>) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.remotes.push((name.into(), url.into()));
    }

    /// Make every load of this object fail with an I/O error.
    pub fn fail_loads_of(&self, checksum: &ObjectId, kind: ObjectType) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.failing_loads.insert(ObjectName::new(*checksum, kind));
    }

    /// Make every content write filed under this checksum fail.
    pub fn fail_writes_of(&self, checksum: &ObjectId) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.failing_writes.insert(*checksum);
    }

    /// Make every delete of this object fail with an I/O error.
    pub fn fail_deletes_of(&self, checksum: &ObjectId, kind: ObjectType) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.failing_deletes.insert(ObjectName::new(*checksum, kind));
    }

    /// Whether the tombstone feature has been enabled.
    pub fn tombstones_enabled(&self) -> bool {
        self.inner.read().expect("lock poisoned").tombstones_enabled
    }

    /// How many times `enable_tombstone_feature` was called.
    pub fn tombstone_enable_calls(&self) -> usize {
        self.inner.read().expect("lock poisoned").tombstone_enable_calls
    }

    /// Count of mutating trait calls that succeeded.
    pub fn mutation_count(&self) -> usize {
        self.inner.read().expect("lock poisoned").mutations
    }

    /// Return a sorted list of all object names in the store.
    pub fn all_names(&self) -> Vec<ObjectName> {
        let inner = self.inner.read().expect("lock poisoned");
        let mut names: Vec<ObjectName> = inner.objects.keys().copied().collect();
        names.sort();
        names
    }

    fn fetch(&self, name: ObjectName) -> StoreResult<StoredObject> {
        let inner = self.inner.read().expect("lock poisoned");
        if inner.failing_loads.contains(&name) {
            return Err(StoreError::Io(io::Error::other(format!(
                "injected read failure for {name}"
            ))));
        }
        inner
            .objects
            .get(&name)
            .cloned()
            .ok_or(StoreError::NotFound(name))
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn list_objects(&self) -> StoreResult<BTreeSet<ObjectName>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.objects.keys().copied().collect())
    }

    fn load_metadata(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<Vec<u8>> {
        Ok(self.fetch(ObjectName::new(*checksum, kind))?.data)
    }

    fn load_file(&self, checksum: &ObjectId) -> StoreResult<LoadedFile> {
        let object = self.fetch(ObjectName::new(*checksum, ObjectType::File))?;
        parse_content_stream(Box::new(Cursor::new(object.data)), object.size)
    }

    fn load_commit(&self, checksum: &ObjectId) -> StoreResult<(Commit, CommitState)> {
        let data = self.load_metadata(checksum, ObjectType::Commit)?;
        let commit = Commit::from_bytes(checksum, &data)?;
        let partial = self
            .inner
            .read()
            .expect("lock poisoned")
            .partial
            .contains(checksum);
        Ok((commit, CommitState { partial }))
    }

    fn write_content(
        &self,
        expected: Option<&ObjectId>,
        stream: &mut dyn Read,
        len: u64,
    ) -> StoreResult<ObjectId> {
        let mut data = Vec::new();
        stream.take(len).read_to_end(&mut data)?;
        if data.len() as u64 != len {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("content stream ended after {} of {len} bytes", data.len()),
            )));
        }

        let object = StoredObject::new(ObjectType::File, data);
        let computed = object.compute_id()?;
        let checksum = expected.copied().unwrap_or(computed);

        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.failing_writes.contains(&checksum) {
            return Err(StoreError::Io(io::Error::other(format!(
                "injected write failure for {checksum}"
            ))));
        }
        // Idempotent: an existing object under this name is kept.
        inner
            .objects
            .entry(ObjectName::new(checksum, ObjectType::File))
            .or_insert(object);
        inner.mutations += 1;
        debug!(object = %checksum.short_hex(), "wrote file object");
        Ok(computed)
    }

    fn write_metadata(&self, kind: ObjectType, data: &[u8]) -> StoreResult<ObjectId> {
        let object = StoredObject::new(kind, data.to_vec());
        let checksum = object.compute_id()?;
        let mut inner = self.inner.write().expect("lock poisoned");
        inner
            .objects
            .entry(ObjectName::new(checksum, kind))
            .or_insert(object);
        inner.mutations += 1;
        Ok(checksum)
    }

    fn delete_object(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<()> {
        let name = ObjectName::new(*checksum, kind);
        let mut inner = self.inner.write().expect("lock poisoned");
        if inner.failing_deletes.contains(&name) {
            return Err(StoreError::Io(io::Error::other(format!(
                "injected delete failure for {name}"
            ))));
        }
        inner
            .objects
            .remove(&name)
            .ok_or(StoreError::NotFound(name))?;
        if kind == ObjectType::Commit {
            inner.partial.remove(checksum);
        }
        inner.mutations += 1;
        Ok(())
    }

    fn write_tombstone(&self, commit: &ObjectId) -> StoreResult<ObjectId> {
        let data = TombstoneCommit { commit: *commit }.to_bytes()?;
        let mut inner = self.inner.write().expect("lock poisoned");
        if !inner.tombstones_enabled {
            return Err(StoreError::TombstonesDisabled);
        }
        inner.objects.insert(
            ObjectName::new(*commit, ObjectType::TombstoneCommit),
            StoredObject::new(ObjectType::TombstoneCommit, data),
        );
        inner.mutations += 1;
        Ok(*commit)
    }

    fn remote_list(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.remotes.iter().map(|(name, _)| name.clone()).collect())
    }

    fn remote_base_url(&self, name: &str) -> StoreResult<String> {
        let inner = self.inner.read().expect("lock poisoned");
        inner
            .remotes
            .iter()
            .find(|(remote, _)| remote == name)
            .map(|(_, url)| url.clone())
            .ok_or_else(|| StoreError::RemoteNotFound(name.to_string()))
    }

    fn enable_tombstone_feature(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.tombstone_enable_calls += 1;
        if !inner.tombstones_enabled {
            inner.tombstones_enabled = true;
            inner.mutations += 1;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{encode_content_stream, FileInfo};
    use crate::object::{DirMeta, DirTree};

    fn write_blob(store: &InMemoryObjectStore, content: &[u8]) -> ObjectId {
        store
            .write_file(&FileInfo::regular(0o644, 0), &vec![], content)
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn write_and_load_file() {
        let store = InMemoryObjectStore::new();
        let id = write_blob(&store, b"hello world");

        let mut file = store.load_file(&id).unwrap();
        let mut content = Vec::new();
        file.content.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"hello world");
        assert_eq!(file.info.size, 11);
    }

    #[test]
    fn write_and_load_commit() {
        let store = InMemoryObjectStore::new();
        let tree = store.write_object(&DirTree::empty()).unwrap();
        let meta = store.write_object(&DirMeta::new(0, 0, 0o755)).unwrap();
        let id = store.write_object(&Commit::new(None, "init", tree, meta)).unwrap();

        let (commit, state) = store.load_commit(&id).unwrap();
        assert_eq!(commit.root_tree, tree);
        assert!(!state.partial);

        store.set_partial(&id, true);
        assert!(store.load_commit(&id).unwrap().1.partial);
    }

    #[test]
    fn missing_objects_are_not_found() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"missing");
        assert!(store.load_metadata(&id, ObjectType::DirTree).unwrap_err().is_not_found());
        assert!(store.load_file(&id).unwrap_err().is_not_found());
        assert!(store.load_commit(&id).unwrap_err().is_not_found());
        assert!(store.delete_object(&id, ObjectType::File).unwrap_err().is_not_found());
    }

    // -----------------------------------------------------------------------
    // Content-addressing
    // -----------------------------------------------------------------------

    #[test]
    fn same_content_produces_same_id() {
        let store = InMemoryObjectStore::new();
        let id1 = write_blob(&store, b"identical content");
        let id2 = write_blob(&store, b"identical content");
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expected_checksum_is_trusted() {
        let store = InMemoryObjectStore::new();
        let claimed = ObjectId::from_bytes(b"claimed");
        let data = encode_content_stream(&FileInfo::regular(0o644, 0), &vec![], b"other").unwrap();
        let len = data.len() as u64;
        let computed = store
            .write_content(Some(&claimed), &mut Cursor::new(data), len)
            .unwrap();
        assert_ne!(computed, claimed);
        assert!(store.contains(&claimed, ObjectType::File));
        assert!(!store.contains(&computed, ObjectType::File));
    }

    #[test]
    fn short_stream_is_rejected() {
        let store = InMemoryObjectStore::new();
        let data = encode_content_stream(&FileInfo::regular(0o644, 0), &vec![], b"abc").unwrap();
        let len = data.len() as u64 + 10;
        let err = store.write_content(None, &mut Cursor::new(data), len).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.is_empty());
    }

    // -----------------------------------------------------------------------
    // Fault injection
    // -----------------------------------------------------------------------

    #[test]
    fn injected_load_failure_is_io_error() {
        let store = InMemoryObjectStore::new();
        let id = write_blob(&store, b"x");
        store.fail_loads_of(&id, ObjectType::File);
        let err = store.load_file(&id).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn injected_write_failure() {
        let store = InMemoryObjectStore::new();
        let data = encode_content_stream(&FileInfo::regular(0o644, 0), &vec![], b"w").unwrap();
        let id = crate::content::checksum_content_stream(&data).unwrap();
        store.fail_writes_of(&id);
        let len = data.len() as u64;
        assert!(store.write_content(Some(&id), &mut Cursor::new(data), len).is_err());
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn injected_delete_failure_keeps_object() {
        let store = InMemoryObjectStore::new();
        let id = write_blob(&store, b"d");
        store.fail_deletes_of(&id, ObjectType::File);
        let err = store.delete_object(&id, ObjectType::File).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.contains(&id, ObjectType::File));
    }

    #[test]
    fn put_raw_replaces_bytes() {
        let store = InMemoryObjectStore::new();
        let id = store.write_object(&DirMeta::new(0, 0, 0o755)).unwrap();
        store.put_raw(id, ObjectType::DirMeta, b"{}".to_vec());
        let stored = store.get(&id, ObjectType::DirMeta).unwrap();
        assert_ne!(stored.compute_id().unwrap(), id);
    }

    // -----------------------------------------------------------------------
    // Tombstones and remotes
    // -----------------------------------------------------------------------

    #[test]
    fn tombstone_requires_feature() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"commit");
        assert!(matches!(
            store.write_tombstone(&id),
            Err(StoreError::TombstonesDisabled)
        ));

        store.enable_tombstone_feature().unwrap();
        store.enable_tombstone_feature().unwrap();
        assert!(store.tombstones_enabled());
        assert_eq!(store.tombstone_enable_calls(), 2);

        store.write_tombstone(&id).unwrap();
        assert!(store.contains(&id, ObjectType::TombstoneCommit));
    }

    #[test]
    fn remotes_keep_registration_order() {
        let store = InMemoryObjectStore::new();
        store.add_remote("zeta", "http://z");
        store.add_remote("alpha", "http://a");
        assert_eq!(store.remote_list().unwrap(), vec!["zeta", "alpha"]);
        assert_eq!(store.remote_base_url("alpha").unwrap(), "http://a");
        assert!(matches!(
            store.remote_base_url("nope"),
            Err(StoreError::RemoteNotFound(_))
        ));
    }

    #[test]
    fn list_objects_includes_every_type() {
        let store = InMemoryObjectStore::new();
        let file = write_blob(&store, b"f");
        let tree = store.write_object(&DirTree::empty()).unwrap();
        let names = store.list_objects().unwrap();
        assert!(names.contains(&ObjectName::new(file, ObjectType::File)));
        assert!(names.contains(&ObjectName::new(tree, ObjectType::DirTree)));
        assert_eq!(names.len(), store.all_names().len());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryObjectStore::new();
        write_blob(&store, b"x");
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryObjectStore"));
        assert!(debug.contains("object_count"));
    }
}
