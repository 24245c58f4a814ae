//! On-disk loose-object repository.
//!
//! Layout under the repository root:
//!
//! ```text
//! config                          TOML repository configuration
//! objects/ab/cdef....<type>       one file per object (see `layout`)
//! state/<checksum>.commitpartial  marker: commit closure incomplete
//! tmp/                            staging area for atomic writes
//! ```
//!
//! File objects are stored in the content stream encoding, so a repository
//! directory can be served as-is to act as a mirror for repairs.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::WalkDir;

use arbor_crypto::ContentHasher;
use arbor_types::{ObjectId, ObjectName, ObjectType};

use crate::config::RepoConfig;
use crate::content::{checksum_file, parse_content_stream, LoadedFile};
use crate::error::{StoreError, StoreResult};
use crate::layout::{parse_object_path, relative_object_path, OBJECTS_DIR};
use crate::object::{Commit, MetadataObject, TombstoneCommit};
use crate::traits::{CommitState, ObjectStore};

const STATE_DIR: &str = "state";
const TMP_DIR: &str = "tmp";
const CONFIG_FILE: &str = "config";

/// Loose-object repository rooted at a directory.
pub struct FsObjectStore {
    root: PathBuf,
    config: RwLock<RepoConfig>,
}

impl FsObjectStore {
    /// Create the repository skeleton (if absent) and open it.
    pub fn init(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        for dir in [OBJECTS_DIR, STATE_DIR, TMP_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            RepoConfig::default().save(&config_path)?;
        }
        Self::open(root)
    }

    /// Open an existing repository.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.join(OBJECTS_DIR).is_dir() {
            return Err(StoreError::Config(format!(
                "{} is not a repository (no {OBJECTS_DIR}/ directory)",
                root.display()
            )));
        }
        fs::create_dir_all(root.join(TMP_DIR))?;
        fs::create_dir_all(root.join(STATE_DIR))?;
        let config = RepoConfig::load(&root.join(CONFIG_FILE))?;
        debug!(root = %root.display(), remotes = config.remotes.len(), "opened repository");
        Ok(Self {
            root,
            config: RwLock::new(config),
        })
    }

    /// The repository root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an object file.
    pub fn object_path(&self, checksum: &ObjectId, kind: ObjectType) -> PathBuf {
        self.root.join(relative_object_path(checksum, kind))
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> RepoConfig {
        self.config.read().expect("lock poisoned").clone()
    }

    /// Add or replace a remote and persist the configuration.
    pub fn add_remote(&self, name: &str, url: &str) -> StoreResult<()> {
        self.update_config(|config| config.set_remote(name, url))
    }

    /// Mark a commit as partially fetched (or clear the mark).
    pub fn set_partial(&self, commit: &ObjectId, partial: bool) -> StoreResult<()> {
        let marker = self.partial_marker(commit);
        if partial {
            File::create(marker)?;
        } else {
            match fs::remove_file(marker) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }

    fn update_config(&self, change: impl FnOnce(&mut RepoConfig)) -> StoreResult<()> {
        let mut config = self.config.write().expect("lock poisoned");
        let mut updated = config.clone();
        change(&mut updated);
        updated.save(&self.root.join(CONFIG_FILE))?;
        *config = updated;
        Ok(())
    }

    fn partial_marker(&self, commit: &ObjectId) -> PathBuf {
        self.root
            .join(STATE_DIR)
            .join(format!("{commit}.commitpartial"))
    }

    fn not_found(name: ObjectName) -> impl FnOnce(io::Error) -> StoreError {
        move |e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotFound(name)
            } else {
                StoreError::Io(e)
            }
        }
    }

    fn staging_file(&self) -> StoreResult<NamedTempFile> {
        Ok(NamedTempFile::new_in(self.root.join(TMP_DIR))?)
    }

    /// Move a staged file into place. Existing objects are left untouched
    /// unless `replace` is set.
    fn install(&self, name: ObjectName, staged: NamedTempFile, replace: bool) -> StoreResult<()> {
        let dest = self.object_path(&name.checksum, name.kind);
        if !replace && dest.exists() {
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        staged.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        debug!(object = %name, "installed object");
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn list_objects(&self) -> StoreResult<BTreeSet<ObjectName>> {
        let mut names = BTreeSet::new();
        for entry in WalkDir::new(self.root.join(OBJECTS_DIR))
            .min_depth(2)
            .max_depth(2)
        {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let prefix = entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .and_then(|p| p.to_str());
            let file_name = entry.file_name().to_str();
            if let Some(name) = prefix.zip(file_name).and_then(|(p, f)| parse_object_path(p, f)) {
                names.insert(name);
            }
        }
        Ok(names)
    }

    fn load_metadata(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<Vec<u8>> {
        let name = ObjectName::new(*checksum, kind);
        fs::read(self.object_path(checksum, kind)).map_err(Self::not_found(name))
    }

    fn load_file(&self, checksum: &ObjectId) -> StoreResult<LoadedFile> {
        let name = ObjectName::new(*checksum, ObjectType::File);
        let file = File::open(self.object_path(checksum, ObjectType::File))
            .map_err(Self::not_found(name))?;
        let len = file.metadata()?.len();
        parse_content_stream(Box::new(BufReader::new(file)), len)
    }

    fn load_commit(&self, checksum: &ObjectId) -> StoreResult<(Commit, CommitState)> {
        let data = self.load_metadata(checksum, ObjectType::Commit)?;
        let commit = Commit::from_bytes(checksum, &data)?;
        let partial = self.partial_marker(checksum).exists();
        Ok((commit, CommitState { partial }))
    }

    fn write_content(
        &self,
        expected: Option<&ObjectId>,
        stream: &mut dyn Read,
        len: u64,
    ) -> StoreResult<ObjectId> {
        let mut staged = self.staging_file()?;
        let copied = io::copy(&mut stream.take(len), &mut staged)?;
        if copied != len {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("content stream ended after {copied} of {len} bytes"),
            )));
        }
        staged.flush()?;

        let reread = BufReader::new(staged.reopen()?);
        let mut file = parse_content_stream(Box::new(reread), len)?;
        let computed = checksum_file(&file.info, &file.xattrs, &mut file.content)?;
        let checksum = expected.copied().unwrap_or(computed);
        drop(file);

        self.install(ObjectName::new(checksum, ObjectType::File), staged, false)?;
        Ok(computed)
    }

    fn write_metadata(&self, kind: ObjectType, data: &[u8]) -> StoreResult<ObjectId> {
        let checksum = ContentHasher::for_type(kind).hash(data);
        let mut staged = self.staging_file()?;
        staged.write_all(data)?;
        self.install(ObjectName::new(checksum, kind), staged, false)?;
        Ok(checksum)
    }

    fn delete_object(&self, checksum: &ObjectId, kind: ObjectType) -> StoreResult<()> {
        let name = ObjectName::new(*checksum, kind);
        fs::remove_file(self.object_path(checksum, kind)).map_err(Self::not_found(name))?;
        if kind == ObjectType::Commit {
            // The marker is meaningless without its commit.
            let _ = fs::remove_file(self.partial_marker(checksum));
        }
        debug!(object = %name, "deleted object");
        Ok(())
    }

    fn write_tombstone(&self, commit: &ObjectId) -> StoreResult<ObjectId> {
        if !self.config.read().expect("lock poisoned").core.tombstone_commits {
            return Err(StoreError::TombstonesDisabled);
        }
        let data = TombstoneCommit { commit: *commit }.to_bytes()?;
        let mut staged = self.staging_file()?;
        staged.write_all(&data)?;
        self.install(ObjectName::new(*commit, ObjectType::TombstoneCommit), staged, true)?;
        Ok(*commit)
    }

    fn remote_list(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .config
            .read()
            .expect("lock poisoned")
            .remotes
            .keys()
            .cloned()
            .collect())
    }

    fn remote_base_url(&self, name: &str) -> StoreResult<String> {
        self.config
            .read()
            .expect("lock poisoned")
            .remotes
            .get(name)
            .map(|remote| remote.url.clone())
            .ok_or_else(|| StoreError::RemoteNotFound(name.to_string()))
    }

    fn enable_tombstone_feature(&self) -> StoreResult<()> {
        if self.config.read().expect("lock poisoned").core.tombstone_commits {
            return Ok(());
        }
        self.update_config(|config| config.core.tombstone_commits = true)
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::FileInfo;
    use crate::object::{DirMeta, DirTree, FileEntry, Xattr};

    fn repo() -> (tempfile::TempDir, FsObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::init(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn open_requires_objects_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FsObjectStore::open(dir.path()),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn file_roundtrip_on_disk() {
        let (_dir, store) = repo();
        let xattrs = vec![Xattr::new("security.selinux", b"label".to_vec())];
        let id = store
            .write_file(&FileInfo::regular(0o755, 0), &xattrs, b"#!/bin/sh\n")
            .unwrap();
        assert!(store.object_path(&id, ObjectType::File).is_file());

        let mut file = store.load_file(&id).unwrap();
        let mut content = Vec::new();
        file.content.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"#!/bin/sh\n");
        assert_eq!(file.xattrs, xattrs);
        assert_eq!(file.info.mode & 0o7777, 0o755);
    }

    #[test]
    fn metadata_and_listing() {
        let (_dir, store) = repo();
        let file = store.write_file(&FileInfo::regular(0o644, 0), &vec![], b"a").unwrap();
        let tree = DirTree::new(vec![FileEntry { name: "a".into(), checksum: file }], vec![]);
        let tree_id = store.write_metadata(ObjectType::DirTree, &tree.to_bytes().unwrap()).unwrap();
        let meta_id = store
            .write_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes().unwrap())
            .unwrap();
        let commit = Commit::new(None, "c", tree_id, meta_id);
        let commit_id = store
            .write_metadata(ObjectType::Commit, &commit.to_bytes().unwrap())
            .unwrap();

        let names = store.list_objects().unwrap();
        assert_eq!(names.len(), 4);
        assert!(names.contains(&ObjectName::new(commit_id, ObjectType::Commit)));

        let (loaded, state) = store.load_commit(&commit_id).unwrap();
        assert_eq!(loaded, commit);
        assert!(!state.partial);
    }

    #[test]
    fn listing_skips_staging_and_strays() {
        let (dir, store) = repo();
        store.write_file(&FileInfo::regular(0o644, 0), &vec![], b"a").unwrap();
        fs::create_dir_all(dir.path().join("objects/zz")).unwrap();
        fs::write(dir.path().join("objects/zz/README"), b"stray").unwrap();
        fs::write(dir.path().join("tmp/leftover"), b"partial").unwrap();
        assert_eq!(store.list_objects().unwrap().len(), 1);
    }

    #[test]
    fn partial_markers() {
        let (_dir, store) = repo();
        let tree = store.write_metadata(ObjectType::DirTree, &DirTree::empty().to_bytes().unwrap()).unwrap();
        let meta = store
            .write_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes().unwrap())
            .unwrap();
        let id = store
            .write_metadata(ObjectType::Commit, &Commit::new(None, "c", tree, meta).to_bytes().unwrap())
            .unwrap();

        store.set_partial(&id, true).unwrap();
        assert!(store.load_commit(&id).unwrap().1.partial);
        store.set_partial(&id, false).unwrap();
        store.set_partial(&id, false).unwrap();
        assert!(!store.load_commit(&id).unwrap().1.partial);
    }

    #[test]
    fn delete_reports_missing() {
        let (_dir, store) = repo();
        let id = store.write_file(&FileInfo::regular(0o644, 0), &vec![], b"gone").unwrap();
        store.delete_object(&id, ObjectType::File).unwrap();
        assert!(store.load_file(&id).unwrap_err().is_not_found());
        assert!(store.delete_object(&id, ObjectType::File).unwrap_err().is_not_found());
    }

    #[test]
    fn tombstone_feature_persists_in_config() {
        let (dir, store) = repo();
        let id = ObjectId::from_bytes(b"commit");
        assert!(matches!(store.write_tombstone(&id), Err(StoreError::TombstonesDisabled)));

        store.enable_tombstone_feature().unwrap();
        store.write_tombstone(&id).unwrap();
        assert!(store.object_path(&id, ObjectType::TombstoneCommit).is_file());

        let reopened = FsObjectStore::open(dir.path()).unwrap();
        assert!(reopened.config().core.tombstone_commits);
    }

    #[test]
    fn remotes_from_config() {
        let (dir, store) = repo();
        store.add_remote("origin", "http://localhost:1").unwrap();
        let reopened = FsObjectStore::open(dir.path()).unwrap();
        assert_eq!(reopened.remote_list().unwrap(), vec!["origin"]);
        assert_eq!(reopened.remote_base_url("origin").unwrap(), "http://localhost:1");
        assert!(reopened.remote_base_url("other").is_err());
    }
}
