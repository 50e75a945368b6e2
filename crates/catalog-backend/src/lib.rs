//! Hierarchical storage backends for the catalog store.
//!
//! The catalog engine never touches a filesystem directly. It consumes the
//! narrow [`Backend`] capability interface (existence checks, streaming
//! reads and writes, directory creation, atomic rename, recursive removal,
//! directory listing), so local disks, object stores with rename emulation
//! and in-memory trees are interchangeable.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- map-based tree for tests and embedding
//! - [`LocalBackend`] -- a directory on the local filesystem
//!
//! # Paths
//!
//! Backend paths are `/`-separated strings relative to the backend root.
//! The empty string names the root itself. See [`path`] for helpers.
//!
//! # Design Rules
//!
//! 1. `rename` is atomic or fails without leaving a partial target.
//! 2. All I/O errors are propagated, never silently ignored.
//! 3. Exclusive creation (`create_dir_exclusive`, `create_new`) is atomic
//!    when [`Backend::atomic_create`] reports `true`.

pub mod error;
pub mod local;
pub mod memory;
pub mod path;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use memory::InMemoryBackend;
pub use traits::{Backend, WriteSink};
