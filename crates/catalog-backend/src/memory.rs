use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{BackendError, BackendResult};
use crate::path;
use crate::traits::{Backend, WriteSink};

/// Files and directories of an in-memory backend.
///
/// Invariant: every ancestor of every file and directory is in `dirs`.
#[derive(Default)]
struct Tree {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl Tree {
    fn is_file(&self, p: &str) -> bool {
        self.files.contains_key(p)
    }

    fn is_dir(&self, p: &str) -> bool {
        p.is_empty() || self.dirs.contains(p)
    }

    fn exists(&self, p: &str) -> bool {
        self.is_file(p) || self.is_dir(p)
    }

    /// Fail if any ancestor of `p` is a regular file.
    fn check_ancestors(&self, p: &str) -> BackendResult<()> {
        match path::ancestors(p).into_iter().find(|a| self.is_file(a)) {
            Some(a) => Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: format!("ancestor {a} is a file"),
            }),
            None => Ok(()),
        }
    }

    fn add_dirs(&mut self, p: &str) {
        for a in path::ancestors(p) {
            self.dirs.insert(a.to_string());
        }
        if !p.is_empty() {
            self.dirs.insert(p.to_string());
        }
    }

    fn add_parents(&mut self, p: &str) {
        if let Some(parent) = path::parent(p) {
            self.add_dirs(parent);
        }
    }

    fn create_file(&mut self, p: &str) -> BackendResult<()> {
        if self.is_dir(p) {
            return Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "is a directory".into(),
            });
        }
        self.check_ancestors(p)?;
        self.add_parents(p);
        self.files.insert(p.to_string(), Vec::new());
        Ok(())
    }

    fn make_dirs(&mut self, p: &str) -> BackendResult<()> {
        if self.is_file(p) {
            return Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "is a file".into(),
            });
        }
        self.check_ancestors(p)?;
        self.add_dirs(p);
        Ok(())
    }

    fn descendants(&self, dir: &str) -> (Vec<String>, Vec<String>) {
        let under = |k: &&String| path::strip_dir(k, dir).is_some();
        let files = self.files.keys().filter(under).cloned().collect();
        let dirs = self.dirs.iter().filter(under).cloned().collect();
        (files, dirs)
    }
}

/// In-memory hierarchical backend.
///
/// Intended for tests and embedding. The whole tree lives behind one
/// `RwLock`, which makes exclusive creation an atomic test-and-set. Clones
/// share the same tree, so two catalog stores built from clones see each
/// other's writes.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    tree: Arc<RwLock<Tree>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, Tree>> {
        self.tree
            .read()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, Tree>> {
        self.tree
            .write()
            .map_err(|_| BackendError::Unavailable("memory backend lock poisoned".into()))
    }

    /// Number of regular files.
    pub fn file_count(&self) -> usize {
        self.read().map(|t| t.files.len()).unwrap_or(0)
    }

    /// Sorted paths of every regular file.
    pub fn file_paths(&self) -> Vec<String> {
        self.read()
            .map(|t| t.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn writer(&self, p: &str) -> Box<dyn WriteSink> {
        Box::new(MemoryWriter {
            tree: Arc::clone(&self.tree),
            path: p.to_string(),
        })
    }
}

impl Backend for InMemoryBackend {
    fn exists(&self, p: &str) -> BackendResult<bool> {
        Ok(self.read()?.exists(path::normalize(p)))
    }

    fn open_read(&self, p: &str) -> BackendResult<Box<dyn Read + Send>> {
        let p = path::normalize(p);
        let tree = self.read()?;
        match tree.files.get(p) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None if tree.is_dir(p) => Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "is a directory".into(),
            }),
            None => Err(BackendError::NotFound(p.to_string())),
        }
    }

    fn open_write(&self, p: &str) -> BackendResult<Box<dyn WriteSink>> {
        let p = path::normalize(p);
        self.write()?.create_file(p)?;
        Ok(self.writer(p))
    }

    fn make_dirs(&self, p: &str) -> BackendResult<()> {
        self.write()?.make_dirs(path::normalize(p))
    }

    fn rename(&self, src: &str, dst: &str) -> BackendResult<()> {
        let (src, dst) = (path::normalize(src), path::normalize(dst));
        if src.is_empty() || dst.is_empty() {
            return Err(BackendError::InvalidPath {
                path: format!("{src} -> {dst}"),
                reason: "cannot move the backend root".into(),
            });
        }
        let mut tree = self.write()?;
        if let Some(data) = tree.files.remove(src) {
            if let Err(e) = tree.create_file(dst) {
                tree.files.insert(src.to_string(), data);
                return Err(e);
            }
            tree.files.insert(dst.to_string(), data);
            return Ok(());
        }
        if !tree.is_dir(src) {
            return Err(BackendError::NotFound(src.to_string()));
        }
        if tree.exists(dst) {
            return Err(BackendError::AlreadyExists(dst.to_string()));
        }
        if path::strip_dir(dst, src).is_some() {
            return Err(BackendError::InvalidPath {
                path: dst.to_string(),
                reason: format!("cannot move {src} into itself"),
            });
        }
        tree.check_ancestors(dst)?;
        let (files, dirs) = tree.descendants(src);
        tree.dirs.remove(src);
        tree.add_dirs(dst);
        for d in dirs {
            tree.dirs.remove(&d);
            let rest = path::strip_dir(&d, src).unwrap_or_default();
            tree.dirs.insert(path::join(dst, rest));
        }
        for f in files {
            if let Some(data) = tree.files.remove(&f) {
                let rest = path::strip_dir(&f, src).unwrap_or_default();
                tree.files.insert(path::join(dst, rest), data);
            }
        }
        Ok(())
    }

    fn remove_recursive(&self, p: &str) -> BackendResult<()> {
        let p = path::normalize(p);
        if p.is_empty() {
            return Err(BackendError::InvalidPath {
                path: p.to_string(),
                reason: "cannot remove the backend root".into(),
            });
        }
        let mut tree = self.write()?;
        if tree.files.remove(p).is_some() {
            return Ok(());
        }
        if !tree.is_dir(p) {
            return Err(BackendError::NotFound(p.to_string()));
        }
        let (files, dirs) = tree.descendants(p);
        for f in files {
            tree.files.remove(&f);
        }
        for d in dirs {
            tree.dirs.remove(&d);
        }
        tree.dirs.remove(p);
        Ok(())
    }

    fn list_children(&self, p: &str) -> BackendResult<Vec<String>> {
        let p = path::normalize(p);
        let tree = self.read()?;
        if tree.is_file(p) {
            return Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "not a directory".into(),
            });
        }
        if !tree.is_dir(p) {
            return Err(BackendError::NotFound(p.to_string()));
        }
        let children: BTreeSet<String> = tree
            .files
            .keys()
            .chain(tree.dirs.iter())
            .filter(|k| path::parent(k).unwrap_or("") == p && !k.is_empty())
            .map(|k| path::file_name(k).to_string())
            .collect();
        Ok(children.into_iter().collect())
    }

    fn is_file(&self, p: &str) -> BackendResult<bool> {
        Ok(self.read()?.is_file(path::normalize(p)))
    }

    fn remove_empty_dir(&self, p: &str) -> BackendResult<bool> {
        let p = path::normalize(p);
        if p.is_empty() {
            return Ok(false);
        }
        let mut tree = self.write()?;
        if !tree.dirs.contains(p) {
            return Ok(false);
        }
        let (files, dirs) = tree.descendants(p);
        if !files.is_empty() || !dirs.is_empty() {
            return Ok(false);
        }
        tree.dirs.remove(p);
        Ok(true)
    }

    fn atomic_create(&self) -> bool {
        true
    }

    fn create_dir_exclusive(&self, p: &str) -> BackendResult<()> {
        let p = path::normalize(p);
        let mut tree = self.write()?;
        if tree.exists(p) {
            return Err(BackendError::AlreadyExists(p.to_string()));
        }
        tree.make_dirs(p)
    }

    fn create_new(&self, p: &str) -> BackendResult<Box<dyn WriteSink>> {
        let p = path::normalize(p);
        {
            let mut tree = self.write()?;
            if tree.exists(p) {
                return Err(BackendError::AlreadyExists(p.to_string()));
            }
            tree.create_file(p)?;
        }
        Ok(self.writer(p))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("file_count", &self.file_count())
            .finish()
    }
}

/// Appends straight into the shared tree, so a reader opened mid-write sees
/// the bytes written so far. Writes to a file removed in the meantime are
/// discarded, matching writes to an unlinked file on disk.
struct MemoryWriter {
    tree: Arc<RwLock<Tree>>,
    path: String,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut tree = self
            .tree
            .write()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory backend lock poisoned"))?;
        if let Some(data) = tree.files.get_mut(&self.path) {
            data.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteSink for MemoryWriter {
    fn finish(self: Box<Self>) -> BackendResult<()> {
        Ok(())
    }
}
