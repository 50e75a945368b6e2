//! Hashing primitives for the catalog store.
//!
//! Provides algorithm selection by name, a running hasher that can report
//! the digest of its current state without being consumed, and the
//! `"<algorithm>:<hex digest>"` string form persisted in metadata records.
//!
//! All digests come from established libraries (`sha1`, `sha2`, `sha3`, `md-5`, `blake2`, `blake3`);
//! no custom cryptography.

pub mod hasher;

pub use hasher::{split_digest, HashAlgorithm, HasherError, RunningHasher};
