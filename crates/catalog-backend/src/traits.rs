use std::io::{Read, Write};

use crate::error::{BackendError, BackendResult};

/// Byte sink returned by [`Backend::open_write`].
///
/// Bytes become durable only after [`finish`](WriteSink::finish) succeeds.
/// Dropping a sink without finishing it leaves whatever was written so far,
/// which is exactly the partial artifact a rollback removes.
pub trait WriteSink: Write + Send {
    /// Flush buffered data and make it durable.
    fn finish(self: Box<Self>) -> BackendResult<()>;
}

/// Hierarchical storage capability interface.
///
/// All implementations must satisfy these invariants:
/// - Paths are `/`-separated and relative to the backend root; `""` is the
///   root.
/// - `rename` is atomic, or fails without leaving a partial target.
/// - All I/O errors are propagated, never silently ignored.
/// - A missing path surfaces as [`BackendError::NotFound`].
/// - `open_write`, `create_new` and `rename` create missing parent
///   directories of the target.
pub trait Backend: Send + Sync {
    /// Whether anything (file or directory) exists at `path`.
    fn exists(&self, path: &str) -> BackendResult<bool>;

    /// Open a file for streaming reads.
    fn open_read(&self, path: &str) -> BackendResult<Box<dyn Read + Send>>;

    /// Open a file for writing, creating or truncating it.
    fn open_write(&self, path: &str) -> BackendResult<Box<dyn WriteSink>>;

    /// Create a directory and all missing parents. Succeeds if it exists.
    fn make_dirs(&self, path: &str) -> BackendResult<()>;

    /// Atomically move `src` to `dst`, replacing an existing file at `dst`.
    fn rename(&self, src: &str, dst: &str) -> BackendResult<()>;

    /// Remove a file, or a directory and everything below it.
    ///
    /// Fails with [`BackendError::NotFound`] if nothing is there.
    fn remove_recursive(&self, path: &str) -> BackendResult<()>;

    /// Names of the immediate children of the directory at `path`, sorted.
    fn list_children(&self, path: &str) -> BackendResult<Vec<String>>;

    /// Whether a regular file exists at `path`. Directories report `false`.
    fn is_file(&self, path: &str) -> BackendResult<bool> {
        if !self.exists(path)? {
            return Ok(false);
        }
        match self.list_children(path) {
            Ok(_) => Ok(false),
            Err(BackendError::WrongKind { .. }) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Remove the directory at `path` if it exists and has no children.
    ///
    /// Returns whether a directory was removed. A missing path, a file or a
    /// non-empty directory is left alone and reports `false`.
    fn remove_empty_dir(&self, path: &str) -> BackendResult<bool> {
        match self.list_children(path) {
            Ok(children) if children.is_empty() => {}
            Ok(_) | Err(BackendError::WrongKind { .. }) => return Ok(false),
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        }
        match self.remove_recursive(path) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether [`create_dir_exclusive`](Self::create_dir_exclusive) and
    /// [`create_new`](Self::create_new) are atomic test-and-set operations.
    ///
    /// The default implementations are check-then-act and leave a narrow
    /// race window between the check and the create.
    fn atomic_create(&self) -> bool {
        false
    }

    /// Create the directory at `path` (and parents), failing with
    /// [`BackendError::AlreadyExists`] if it is already present.
    fn create_dir_exclusive(&self, path: &str) -> BackendResult<()> {
        if self.exists(path)? {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        self.make_dirs(path)
    }

    /// Open a new file for writing, failing with
    /// [`BackendError::AlreadyExists`] if it is already present.
    fn create_new(&self, path: &str) -> BackendResult<Box<dyn WriteSink>> {
        if self.exists(path)? {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        self.open_write(path)
    }

    /// Read a whole file into memory.
    fn read_all(&self, path: &str) -> BackendResult<Vec<u8>> {
        let mut reader = self.open_read(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Replace a whole file with `data`.
    fn write_all(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let mut sink = self.open_write(path)?;
        sink.write_all(data)?;
        sink.finish()
    }
}
