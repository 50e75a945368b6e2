use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, WriteSink};

/// Backend rooted at a directory on the local filesystem.
///
/// `rename` maps to `std::fs::rename`, which is atomic within one
/// filesystem. Exclusive creation relies on `mkdir` and `O_EXCL`, so
/// [`atomic_create`](Backend::atomic_create) is `true`.
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// Open a backend rooted at an existing directory.
    ///
    /// Fails with [`BackendError::NotFound`] when `root` is missing and
    /// [`BackendError::WrongKind`] when it is not a directory. Nothing is
    /// created on disk.
    pub fn open(root: impl AsRef<Path>) -> BackendResult<Self> {
        let root = root.as_ref();
        let shown = root.display().to_string();
        let meta = fs::metadata(root).map_err(|e| BackendError::from_io(&shown, e))?;
        if !meta.is_dir() {
            return Err(BackendError::WrongKind {
                path: shown,
                reason: "not a directory".into(),
            });
        }
        let root = fs::canonicalize(root)?;
        Ok(Self { root })
    }

    /// The directory this backend is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject paths that could escape the backend root.
    fn validate(p: &str) -> BackendResult<()> {
        let invalid = |reason: &str| BackendError::InvalidPath {
            path: p.to_string(),
            reason: reason.to_string(),
        };
        if p.starts_with('/') || p.starts_with('\\') {
            return Err(invalid("absolute path"));
        }
        if p.contains('\\') {
            return Err(invalid("contains backslash"));
        }
        for component in Path::new(p).components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(invalid("parent traversal or prefix component")),
            }
        }
        Ok(())
    }

    /// Resolve a `/`-separated backend path to a filesystem path.
    fn resolve(&self, p: &str) -> BackendResult<PathBuf> {
        let p = p.trim_end_matches('/');
        Self::validate(p)?;
        if p.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(p))
    }

    fn ensure_parent(target: &Path) -> BackendResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn sink(file: File) -> Box<dyn WriteSink> {
        Box::new(LocalWriter {
            inner: BufWriter::new(file),
        })
    }
}

impl Backend for LocalBackend {
    fn exists(&self, p: &str) -> BackendResult<bool> {
        let target = self.resolve(p)?;
        match fs::symlink_metadata(&target) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn open_read(&self, p: &str) -> BackendResult<Box<dyn Read + Send>> {
        let target = self.resolve(p)?;
        if target.is_dir() {
            return Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "is a directory".into(),
            });
        }
        let file = File::open(&target).map_err(|e| BackendError::from_io(p, e))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, p: &str) -> BackendResult<Box<dyn WriteSink>> {
        let target = self.resolve(p)?;
        Self::ensure_parent(&target)?;
        let file = File::create(&target).map_err(|e| BackendError::from_io(p, e))?;
        Ok(Self::sink(file))
    }

    fn make_dirs(&self, p: &str) -> BackendResult<()> {
        let target = self.resolve(p)?;
        fs::create_dir_all(&target).map_err(|e| BackendError::from_io(p, e))
    }

    fn rename(&self, src: &str, dst: &str) -> BackendResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        if from == self.root || to == self.root {
            return Err(BackendError::InvalidPath {
                path: format!("{src} -> {dst}"),
                reason: "cannot move the backend root".into(),
            });
        }
        if !from.exists() {
            return Err(BackendError::NotFound(src.to_string()));
        }
        Self::ensure_parent(&to)?;
        debug!(src, dst, "rename");
        fs::rename(&from, &to).map_err(|e| BackendError::from_io(src, e))
    }

    fn remove_recursive(&self, p: &str) -> BackendResult<()> {
        let target = self.resolve(p)?;
        if target == self.root {
            return Err(BackendError::InvalidPath {
                path: p.to_string(),
                reason: "cannot remove the backend root".into(),
            });
        }
        let meta = fs::symlink_metadata(&target).map_err(|e| BackendError::from_io(p, e))?;
        if meta.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        Ok(())
    }

    fn list_children(&self, p: &str) -> BackendResult<Vec<String>> {
        let target = self.resolve(p)?;
        let meta = fs::metadata(&target).map_err(|e| BackendError::from_io(p, e))?;
        if !meta.is_dir() {
            return Err(BackendError::WrongKind {
                path: p.to_string(),
                reason: "not a directory".into(),
            });
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&target)? {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn is_file(&self, p: &str) -> BackendResult<bool> {
        let target = self.resolve(p)?;
        match fs::symlink_metadata(&target) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_empty_dir(&self, p: &str) -> BackendResult<bool> {
        let target = self.resolve(p)?;
        if target == self.root {
            return Ok(false);
        }
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        match fs::remove_dir(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(_) if fs::read_dir(&target).map(|mut d| d.next().is_some()).unwrap_or(false) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn atomic_create(&self) -> bool {
        true
    }

    fn create_dir_exclusive(&self, p: &str) -> BackendResult<()> {
        let target = self.resolve(p)?;
        Self::ensure_parent(&target)?;
        fs::create_dir(&target).map_err(|e| BackendError::from_io(p, e))
    }

    fn create_new(&self, p: &str) -> BackendResult<Box<dyn WriteSink>> {
        let target = self.resolve(p)?;
        Self::ensure_parent(&target)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| BackendError::from_io(p, e))?;
        Ok(Self::sink(file))
    }
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("root", &self.root)
            .finish()
    }
}

struct LocalWriter {
    inner: BufWriter<File>,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl WriteSink for LocalWriter {
    fn finish(self: Box<Self>) -> BackendResult<()> {
        let file = self.inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> (tempfile::TempDir, LocalBackend) {
        let dir = tempfile::tempdir().unwrap();
        let b = LocalBackend::new(dir.path()).unwrap();
        (dir, b)
    }

    #[test]
    fn validate_rejects_unsafe_paths() {
        assert!(LocalBackend::validate("/etc/passwd").is_err());
        assert!(LocalBackend::validate("\\Windows").is_err());
        assert!(LocalBackend::validate("../outside").is_err());
        assert!(LocalBackend::validate("a/../../b").is_err());
        assert!(LocalBackend::validate("a\\b").is_err());
        assert!(LocalBackend::validate("completed/data/x").is_ok());
        assert!(LocalBackend::validate("").is_ok());
    }

    #[test]
    fn write_read_roundtrip_creates_parents() {
        let (_dir, b) = backend();
        b.write_all("processing/data/k", b"payload").unwrap();
        assert_eq!(b.read_all("processing/data/k").unwrap(), b"payload");
        assert!(b.exists("processing/data").unwrap());
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, b) = backend();
        let err = b.open_read("missing").err().unwrap();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[test]
    fn rename_replaces_existing_file() {
        let (_dir, b) = backend();
        b.write_all("a", b"new").unwrap();
        b.write_all("out/b", b"old").unwrap();
        b.rename("a", "out/b").unwrap();
        assert!(!b.exists("a").unwrap());
        assert_eq!(b.read_all("out/b").unwrap(), b"new");
    }

    #[test]
    fn rename_missing_source() {
        let (_dir, b) = backend();
        assert!(b.rename("nothing", "x").unwrap_err().is_not_found());
        assert!(!b.exists("x").unwrap());
    }

    #[test]
    fn remove_recursive_and_absent() {
        let (_dir, b) = backend();
        b.write_all("d/s/f", b"1").unwrap();
        b.remove_recursive("d").unwrap();
        assert!(!b.exists("d").unwrap());
        assert!(b.remove_recursive("d").unwrap_err().is_not_found());
    }

    #[test]
    fn list_children_sorted() {
        let (_dir, b) = backend();
        b.write_all("m/z", b"").unwrap();
        b.write_all("m/a", b"").unwrap();
        b.make_dirs("m/dir").unwrap();
        assert_eq!(b.list_children("m").unwrap(), vec!["a", "dir", "z"]);
    }

    #[test]
    fn exclusive_creation() {
        let (_dir, b) = backend();
        assert!(b.atomic_create());
        b.create_dir_exclusive("locks/one").unwrap();
        assert!(matches!(
            b.create_dir_exclusive("locks/one").unwrap_err(),
            BackendError::AlreadyExists(_)
        ));
        b.create_new("meta/k").unwrap().finish().unwrap();
        assert!(matches!(
            b.create_new("meta/k").err().unwrap(),
            BackendError::AlreadyExists(_)
        ));
    }

    #[test]
    fn open_requires_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(LocalBackend::open(&missing).unwrap_err().is_not_found());
        assert!(!missing.exists());
        std::fs::write(dir.path().join("plain"), b"").unwrap();
        assert!(matches!(
            LocalBackend::open(dir.path().join("plain")).unwrap_err(),
            BackendError::WrongKind { .. }
        ));
        assert!(LocalBackend::open(dir.path()).is_ok());
    }

    #[test]
    fn file_checks_and_empty_dir_removal() {
        let (_dir, b) = backend();
        b.write_all("d/f", b"1").unwrap();
        b.make_dirs("d/empty").unwrap();
        assert!(b.is_file("d/f").unwrap());
        assert!(!b.is_file("d").unwrap());
        assert!(!b.is_file("nope").unwrap());
        assert!(b.remove_empty_dir("d/empty").unwrap());
        assert!(!b.exists("d/empty").unwrap());
        assert!(!b.remove_empty_dir("d").unwrap());
        assert!(!b.remove_empty_dir("d/f").unwrap());
        assert!(!b.remove_empty_dir("").unwrap());
        assert!(b.exists("d/f").unwrap());
    }

    #[test]
    fn root_cannot_be_removed() {
        let (_dir, b) = backend();
        assert!(matches!(
            b.remove_recursive("").unwrap_err(),
            BackendError::InvalidPath { .. }
        ));
    }
}
