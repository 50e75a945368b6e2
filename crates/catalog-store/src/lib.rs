//! Transactional keyed blob catalog.
//!
//! Objects are written into a processing area, hashed block by block while
//! they stream in, verified against the caller's size and hash hints, and
//! only then moved into the completed area by two renames. The processing
//! meta artifact doubles as the key's write lock, so readers and competing
//! writers of an in-flight key see `ResourceLocked`. Every failure after
//! artifacts exist rolls the key back. Committed objects are immutable: a
//! new write of a committed key is refused until the key is rolled back.
//!
//! # Modules
//!
//! - [`catalog`] -- [`CatalogStore`], the facade over one backend
//! - [`transaction`] -- [`WriteTransaction`], one in-flight write
//! - [`metadata`] -- persisted [`MetaRecord`] and integrity checks
//! - [`layout`] -- directory [`Layout`] and system defaults
//! - [`lock`] -- [`DirLock`], exclusive-directory mutual exclusion
//! - [`error`] -- [`CatalogError`] and its problem-details mapping
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use catalog_backend::InMemoryBackend;
//! use catalog_store::{CatalogStore, Layout, UserMeta};
//! use catalog_types::ObjectKey;
//!
//! let store = CatalogStore::new(Arc::new(InMemoryBackend::new()), Layout::default()).unwrap();
//! store.init("secret").unwrap();
//! let key = ObjectKey::new("docs/a.txt").unwrap();
//! let record = store.write_object(&key, &b"hello"[..], UserMeta::new()).unwrap();
//! assert_eq!(record.system.size, Some(5));
//! ```

pub mod catalog;
pub mod error;
pub mod layout;
pub mod lock;
pub mod metadata;
pub mod transaction;

pub use catalog::{CatalogStore, LockStatus, ReadMode, INIT_LOCK_PATH};
pub use error::{CatalogError, CatalogResult};
pub use layout::{Area, AreaDirs, Kind, Layout, DEFAULT_BLOCK_SIZE};
pub use lock::{DirLock, DirLockGuard};
pub use metadata::{ChunksMeta, LockOwner, MetaRecord, SystemMeta, UserMeta};
pub use transaction::WriteTransaction;
