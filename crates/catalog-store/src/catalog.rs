//! The catalog facade: lifecycle, transactional writes, guarded reads and
//! lock administration over one [`Backend`].

use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use catalog_backend::{path, Backend, BackendError, LocalBackend};
use catalog_types::ObjectKey;
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::layout::{Area, Kind, Layout};
use crate::lock::DirLock;
use crate::metadata::{LockOwner, MetaRecord, UserMeta};
use crate::transaction::WriteTransaction;

/// Backend path of the lock that serializes `init`.
pub const INIT_LOCK_PATH: &str = ".init.lock";

/// Where a transaction's artifacts live while it is open.
pub(crate) const PROCESSING_SLOTS: [(Area, Kind); 2] =
    [(Area::Processing, Kind::Data), (Area::Processing, Kind::Meta)];

/// Every artifact of a key, in removal order.
const ARTIFACT_SLOTS: [(Area, Kind); 4] = [
    (Area::Completed, Kind::Data),
    (Area::Completed, Kind::Meta),
    (Area::Processing, Kind::Data),
    (Area::Processing, Kind::Meta),
];

/// How a payload is opened for reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// `"rb"`: raw bytes.
    Binary,
    /// `"r"`: bytes that must be valid UTF-8.
    Text,
}

impl FromStr for ReadMode {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rb" => Ok(Self::Binary),
            "r" => Ok(Self::Text),
            other => Err(CatalogError::UnsupportedMode(other.to_string())),
        }
    }
}

/// A key whose write lock is held, with the owner if the record says so.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockStatus {
    pub key: ObjectKey,
    pub owner: Option<LockOwner>,
}

/// Keyed blob catalog over a hierarchical backend.
///
/// Handles are cheap to clone and share one backend and layout.
#[derive(Clone)]
pub struct CatalogStore {
    backend: Arc<dyn Backend>,
    layout: Arc<Layout>,
}

impl CatalogStore {
    /// Wrap `backend` with a validated `layout`.
    pub fn new(backend: Arc<dyn Backend>, layout: Layout) -> CatalogResult<Self> {
        layout.validate()?;
        Ok(Self {
            backend,
            layout: Arc::new(layout),
        })
    }

    /// A store over a directory on the local filesystem, creating the
    /// directory if needed.
    pub fn open_local(root: impl AsRef<Path>, layout: Layout) -> CatalogResult<Self> {
        let backend = LocalBackend::new(root)?;
        Self::new(Arc::new(backend), layout)
    }

    /// A store over an existing local directory. Nothing is created; a
    /// missing root is `NotCatalog`.
    pub fn open_existing_local(root: impl AsRef<Path>, layout: Layout) -> CatalogResult<Self> {
        let root = root.as_ref();
        let backend = LocalBackend::open(root).map_err(|e| {
            if e.is_not_found() {
                CatalogError::NotCatalog(format!("{} does not exist", root.display()))
            } else {
                e.into()
            }
        })?;
        Self::new(Arc::new(backend), layout)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    // ----------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------

    /// Create the area directories and the token marker.
    ///
    /// Concurrent initializers are serialized by a directory lock; the
    /// loser of the race sees `ResourceLocked` or `AlreadyInitialized`.
    pub fn init(&self, token: &str) -> CatalogResult<()> {
        let lock = DirLock::new(self.backend(), INIT_LOCK_PATH);
        lock.with(|| {
            let token_path = self.layout.token_path();
            if self.backend.exists(token_path)? {
                return Err(CatalogError::AlreadyInitialized);
            }
            for dir in self.layout.all_dirs() {
                self.backend.make_dirs(dir)?;
            }
            let marker = serde_json::to_vec(token)
                .map_err(|e| CatalogError::Serialization(e.to_string()))?;
            self.backend.write_all(token_path, &marker)?;
            info!(token_path, "catalog initialized");
            Ok(())
        })
    }

    pub fn is_initialized(&self) -> CatalogResult<bool> {
        Ok(self.backend.exists(self.layout.token_path())?)
    }

    /// The stored token.
    pub fn token(&self) -> CatalogResult<String> {
        let token_path = self.layout.token_path();
        let bytes = self.backend.read_all(token_path).map_err(|e| {
            if e.is_not_found() {
                CatalogError::NotCatalog(format!("token marker {token_path} is missing"))
            } else {
                e.into()
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| CatalogError::JsonDecode {
            path: token_path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Remove the token marker, leaving stored objects in place.
    pub fn clear(&self, token: &str) -> CatalogResult<()> {
        if self.token()? != token {
            return Err(CatalogError::Forbidden("token does not match".into()));
        }
        self.backend.remove_recursive(self.layout.token_path())?;
        info!("catalog marker cleared");
        Ok(())
    }

    /// Remove everything under the backend root.
    pub fn cleanup(&self) -> CatalogResult<()> {
        let children = match self.backend.list_children("") {
            Ok(children) => children,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for child in &children {
            ignore_missing(self.backend.remove_recursive(child))?;
        }
        warn!(entries = children.len(), "catalog root wiped");
        Ok(())
    }

    // ----------------------------------------------------------------
    // Writes
    // ----------------------------------------------------------------

    /// Open a write transaction, taking the key's lock.
    ///
    /// The lock is the processing meta artifact itself, created
    /// exclusively; a second writer gets `ResourceLocked`. A key with a
    /// committed version is refused with `AlreadyCommitted` once the lock
    /// is held, so a failed write never touches the earlier version.
    pub fn begin_write(&self, key: &ObjectKey, user: UserMeta) -> CatalogResult<WriteTransaction<'_>> {
        let meta_path = self.layout.path(Area::Processing, Kind::Meta, key);
        if self.backend.is_file(&meta_path)? {
            return Err(CatalogError::ResourceLocked(key.to_string()));
        }
        let mut record = MetaRecord::new(user);
        record.lock = Some(LockOwner::current());
        let bytes = record.to_json()?;

        let mut sink = match self.backend.create_new(&meta_path) {
            Ok(sink) => sink,
            Err(BackendError::AlreadyExists(_)) => {
                return Err(CatalogError::ResourceLocked(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let persisted = sink
            .write_all(&bytes)
            .map_err(CatalogError::from)
            .and_then(|()| sink.finish().map_err(CatalogError::from))
            .and_then(|()| self.ensure_uncommitted(key));
        if let Err(e) = persisted {
            return Err(match self.release_processing(key) {
                Ok(()) => e,
                Err(cleanup) => e.with_rollback_failure(cleanup),
            });
        }
        debug!(key = %key, "write lock taken");
        Ok(WriteTransaction::new(self, key.clone(), record))
    }

    /// Run `f` inside a write transaction and commit when it succeeds.
    ///
    /// Any failure, from `f` or from the commit, rolls the key back.
    pub fn transaction<T, F>(&self, key: &ObjectKey, user: UserMeta, f: F) -> CatalogResult<(T, MetaRecord)>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> CatalogResult<T>,
    {
        let mut tx = self.begin_write(key, user)?;
        match f(&mut tx) {
            Ok(value) => {
                let record = tx.commit()?;
                Ok((value, record))
            }
            Err(e) => Err(tx.abort(e)),
        }
    }

    /// Store `source` under `key` with the default block size.
    pub fn write_object<R: Read>(&self, key: &ObjectKey, source: R, user: UserMeta) -> CatalogResult<MetaRecord> {
        self.write_object_with_block_size(key, source, user, None)
    }

    /// Store `source` under `key`: stream, verify, commit.
    pub fn write_object_with_block_size<R: Read>(
        &self,
        key: &ObjectKey,
        source: R,
        user: UserMeta,
        block_size: Option<u64>,
    ) -> CatalogResult<MetaRecord> {
        let ((), record) = self.transaction(key, user, |tx| {
            tx.write_stream(source, block_size)?;
            tx.verify()
        })?;
        Ok(record)
    }

    /// Remove every artifact of `key` in both areas. Absent artifacts are
    /// skipped, so rolling back an unknown key is a no-op.
    ///
    /// Only regular files count as artifacts: a directory at the key's path
    /// holds other keys and is left alone. Directories emptied by the
    /// removal are pruned up to the area root.
    pub fn rollback(&self, key: &ObjectKey) -> CatalogResult<()> {
        for (area, kind) in ARTIFACT_SLOTS {
            self.remove_if_present(&self.layout.path(area, kind, key))?;
        }
        self.prune_empty_parents(key, &ARTIFACT_SLOTS);
        debug!(key = %key, "rolled back");
        Ok(())
    }

    // ----------------------------------------------------------------
    // Reads
    // ----------------------------------------------------------------

    /// Whether a write transaction holds `key`.
    ///
    /// Only a regular file at the processing meta path is a lock. The
    /// directory holding nested keys such as `key/child` is not.
    pub fn is_locked(&self, key: &ObjectKey) -> CatalogResult<bool> {
        Ok(self
            .backend
            .is_file(&self.layout.path(Area::Processing, Kind::Meta, key))?)
    }

    /// Stream the committed payload of `key`.
    pub fn open_for_read(&self, key: &ObjectKey) -> CatalogResult<Box<dyn Read + Send>> {
        self.ensure_unlocked(key)?;
        let data_path = self.layout.path(Area::Completed, Kind::Data, key);
        self.backend
            .open_read(&data_path)
            .map_err(|e| not_found_as(e, key))
    }

    /// Open the payload in mode `"rb"` or `"r"`.
    ///
    /// Text mode buffers the payload and rejects invalid UTF-8.
    pub fn open_mode(&self, key: &ObjectKey, mode: &str) -> CatalogResult<Box<dyn Read + Send>> {
        match mode.parse::<ReadMode>()? {
            ReadMode::Binary => self.open_for_read(key),
            ReadMode::Text => {
                let mut bytes = Vec::new();
                self.open_for_read(key)?.read_to_end(&mut bytes)?;
                let text = String::from_utf8(bytes).map_err(|e| {
                    CatalogError::Internal(format!("payload of {key} is not valid UTF-8: {e}"))
                })?;
                Ok(Box::new(Cursor::new(text.into_bytes())))
            }
        }
    }

    /// The committed metadata record of `key`.
    pub fn read_metadata(&self, key: &ObjectKey) -> CatalogResult<MetaRecord> {
        self.ensure_unlocked(key)?;
        let meta_path = self.layout.path(Area::Completed, Kind::Meta, key);
        let bytes = self
            .backend
            .read_all(&meta_path)
            .map_err(|e| not_found_as(e, key))?;
        MetaRecord::from_json(&meta_path, &bytes)
    }

    /// Committed entries under `prefix`, sorted.
    ///
    /// A directory prefix yields its immediate children as keys; a prefix
    /// naming one object yields that key. The empty prefix lists the top
    /// level.
    pub fn list(&self, prefix: &str) -> CatalogResult<Vec<String>> {
        let prefix = path::normalize(prefix);
        if !prefix.is_empty() {
            ObjectKey::new(prefix)?;
        }
        let base = path::join(self.layout.dir(Area::Completed, Kind::Meta), prefix);
        match self.backend.list_children(&base) {
            Ok(children) => Ok(children
                .iter()
                .map(|child| path::join(prefix, child))
                .collect()),
            Err(BackendError::WrongKind { .. }) => Ok(vec![prefix.to_string()]),
            Err(e) if e.is_not_found() => Err(CatalogError::NotFound(prefix.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    // ----------------------------------------------------------------
    // Lock administration
    // ----------------------------------------------------------------

    /// Every key with a live processing record, sorted.
    pub fn locked_keys(&self) -> CatalogResult<Vec<ObjectKey>> {
        let meta_dir = self.layout.dir(Area::Processing, Kind::Meta);
        let mut files = Vec::new();
        self.walk_files(meta_dir, "", &mut files)?;
        files.sort();
        files
            .into_iter()
            .map(|k| ObjectKey::new(k).map_err(CatalogError::from))
            .collect()
    }

    /// Lock state of `key`, or `None` if no transaction holds it.
    ///
    /// A record that cannot be decoded (a writer died mid-write) still
    /// counts as locked, with no owner.
    pub fn lock_info(&self, key: &ObjectKey) -> CatalogResult<Option<LockStatus>> {
        if !self.is_locked(key)? {
            return Ok(None);
        }
        let meta_path = self.layout.path(Area::Processing, Kind::Meta, key);
        let bytes = match self.backend.read_all(&meta_path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let owner = MetaRecord::from_json(&meta_path, &bytes)
            .ok()
            .and_then(|record| record.lock);
        Ok(Some(LockStatus {
            key: key.clone(),
            owner,
        }))
    }

    /// Forcibly release a stale lock by removing the processing artifacts
    /// of `key`. The completed version, if any, is untouched.
    pub fn break_lock(&self, key: &ObjectKey) -> CatalogResult<Option<LockStatus>> {
        let Some(status) = self.lock_info(key)? else {
            return Ok(None);
        };
        self.release_processing(key)?;
        warn!(key = %key, owner = ?status.owner, "lock broken");
        Ok(Some(status))
    }

    // ----------------------------------------------------------------
    // Internals
    // ----------------------------------------------------------------

    fn ensure_unlocked(&self, key: &ObjectKey) -> CatalogResult<()> {
        if self.is_locked(key)? {
            return Err(CatalogError::ResourceLocked(key.to_string()));
        }
        Ok(())
    }

    fn ensure_uncommitted(&self, key: &ObjectKey) -> CatalogResult<()> {
        if self
            .backend
            .is_file(&self.layout.path(Area::Completed, Kind::Meta, key))?
        {
            return Err(CatalogError::AlreadyCommitted(key.to_string()));
        }
        Ok(())
    }

    fn release_processing(&self, key: &ObjectKey) -> CatalogResult<()> {
        self.remove_if_present(&self.layout.path(Area::Processing, Kind::Data, key))?;
        self.remove_if_present(&self.layout.path(Area::Processing, Kind::Meta, key))?;
        self.prune_empty_parents(key, &PROCESSING_SLOTS);
        Ok(())
    }

    fn remove_if_present(&self, target: &str) -> CatalogResult<()> {
        if self.backend.is_file(target)? {
            ignore_missing(self.backend.remove_recursive(target))?;
        }
        Ok(())
    }

    /// Remove the directories between each slot's area root and the key's
    /// artifact that are now empty, deepest first. The area roots stay.
    ///
    /// Failures are logged and otherwise ignored: a leftover empty
    /// directory never reads as a lock.
    pub(crate) fn prune_empty_parents(&self, key: &ObjectKey, slots: &[(Area, Kind)]) {
        for &(area, kind) in slots {
            let area_dir = self.layout.dir(area, kind);
            let target = self.layout.path(area, kind, key);
            let mut current = path::parent(&target);
            while let Some(dir) = current {
                if path::strip_dir(dir, area_dir).is_none() {
                    break;
                }
                match self.backend.remove_empty_dir(dir) {
                    Ok(true) => current = path::parent(dir),
                    Ok(false) => break,
                    Err(e) => {
                        warn!(dir, error = %e, "failed to prune empty directory");
                        break;
                    }
                }
            }
        }
    }

    fn walk_files(&self, root: &str, rel: &str, out: &mut Vec<String>) -> CatalogResult<()> {
        let children = match self.backend.list_children(&path::join(root, rel)) {
            Ok(children) => children,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for child in children {
            let child_rel = path::join(rel, &child);
            match self.backend.list_children(&path::join(root, &child_rel)) {
                Ok(_) => self.walk_files(root, &child_rel, out)?,
                Err(BackendError::WrongKind { .. }) => out.push(child_rel),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn not_found_as(err: BackendError, key: &ObjectKey) -> CatalogError {
    if err.is_not_found() {
        CatalogError::NotFound(key.to_string())
    } else {
        err.into()
    }
}

fn ignore_missing(result: Result<(), BackendError>) -> CatalogResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => Ok(other?),
    }
}
