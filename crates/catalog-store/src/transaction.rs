//! Write transactions.
//!
//! A transaction owns the processing-area artifacts of one key from
//! [`CatalogStore::begin_write`] until it is committed or rolled back.
//! Dropping an unfinished transaction rolls it back.

use std::io::{Read, Write};

use catalog_crypto::RunningHasher;
use catalog_types::ObjectKey;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, PROCESSING_SLOTS};
use crate::error::{CatalogError, CatalogResult};
use crate::layout::{Area, Kind};
use crate::metadata::{ChunksMeta, LockOwner, MetaRecord};

/// Upper bound on the buffer reserved up front for one block. Larger blocks
/// grow the buffer as bytes actually arrive.
const BLOCK_PREALLOC_LIMIT: usize = 1 << 20;

/// An open write on one key.
pub struct WriteTransaction<'s> {
    store: &'s CatalogStore,
    key: ObjectKey,
    record: MetaRecord,
    finished: bool,
}

impl<'s> WriteTransaction<'s> {
    pub(crate) fn new(store: &'s CatalogStore, key: ObjectKey, record: MetaRecord) -> Self {
        Self {
            store,
            key,
            record,
            finished: false,
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    /// The in-progress record.
    pub fn record(&self) -> &MetaRecord {
        &self.record
    }

    /// Mutable access to the in-progress record. Changes are persisted by
    /// [`commit`](Self::commit).
    pub fn record_mut(&mut self) -> &mut MetaRecord {
        &mut self.record
    }

    pub fn owner(&self) -> Option<&LockOwner> {
        self.record.lock.as_ref()
    }

    /// Stream `source` into the processing data file, hashing it in blocks.
    ///
    /// Each block is exactly `block_size` bytes except possibly the last.
    /// An empty source still yields one block digest: the digest of the
    /// empty input. Calling this again replaces the payload.
    ///
    /// A block size of zero, or one too large to address in memory, is
    /// rejected with `InvalidBlockSize`.
    pub fn write_stream<R: Read>(&mut self, mut source: R, block_size: Option<u64>) -> CatalogResult<()> {
        let store = self.store;
        let layout = store.layout();
        let block_size = block_size.unwrap_or_else(|| layout.block_size());
        let block_len = usize::try_from(block_size)
            .ok()
            .filter(|&len| len > 0 && len <= isize::MAX as usize)
            .ok_or(CatalogError::InvalidBlockSize(block_size))?;
        let algorithm = self.record.hash_algorithm(layout.hash_algorithm())?;

        let data_path = layout.path(Area::Processing, Kind::Data, &self.key);
        let mut sink = store.backend().open_write(&data_path)?;
        let mut hasher = RunningHasher::new(algorithm);
        let mut block_hashes = Vec::new();
        let mut cumulative_hashes = Vec::new();
        let mut buf = Vec::with_capacity(block_len.min(BLOCK_PREALLOC_LIMIT));

        loop {
            let n = read_block(&mut source, block_size, &mut buf)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf)?;
            hasher.update(&buf);
            block_hashes.push(algorithm.digest_string(&buf));
            cumulative_hashes.push(hasher.current());
            if n < block_len {
                break;
            }
        }
        if cumulative_hashes.is_empty() {
            let empty = hasher.current();
            block_hashes.push(empty.clone());
            cumulative_hashes.push(empty);
        }
        sink.finish()?;

        let hash = hasher.current();
        debug!(
            key = %self.key,
            size = hasher.absorbed(),
            blocks = block_hashes.len(),
            "payload written"
        );
        self.record.system.size = Some(hasher.absorbed());
        self.record.system.hash = Some(hash);
        self.record.system.chunks = ChunksMeta {
            block_size,
            block_hashes,
            cumulative_hashes,
        };
        Ok(())
    }

    /// Check the computed size and hash against the caller's hints.
    pub fn verify(&self) -> CatalogResult<()> {
        self.record.verify_integrity()
    }

    /// Persist the final record and move both artifacts to the completed
    /// area. On failure the transaction is rolled back and the error
    /// returned, merged with any rollback failure.
    pub fn commit(mut self) -> CatalogResult<MetaRecord> {
        match self.relocate() {
            Ok(record) => {
                self.finished = true;
                info!(
                    key = %self.key,
                    size = record.system.size.unwrap_or_default(),
                    hash = record.system.hash.as_deref().unwrap_or_default(),
                    "object committed"
                );
                Ok(record)
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Remove every artifact of the transaction. The key had no committed
    /// version when the transaction began, so nothing older is touched.
    pub fn rollback(mut self) -> CatalogResult<()> {
        self.finished = true;
        self.store.rollback(&self.key)
    }

    /// Roll back after `err` and return the error to report.
    pub fn abort(mut self, err: CatalogError) -> CatalogError {
        self.finished = true;
        warn!(key = %self.key, error = %err, "write failed, rolling back");
        match self.store.rollback(&self.key) {
            Ok(()) => err,
            Err(rollback_err) => err.with_rollback_failure(rollback_err),
        }
    }

    fn relocate(&self) -> CatalogResult<MetaRecord> {
        self.record.validate()?;
        let mut record = self.record.clone();
        record.lock = None;

        let layout = self.store.layout();
        let backend = self.store.backend();
        let processing_meta = layout.path(Area::Processing, Kind::Meta, &self.key);
        backend.write_all(&processing_meta, &record.to_json()?)?;
        backend.rename(
            &layout.path(Area::Processing, Kind::Data, &self.key),
            &layout.path(Area::Completed, Kind::Data, &self.key),
        )?;
        backend.rename(
            &processing_meta,
            &layout.path(Area::Completed, Kind::Meta, &self.key),
        )?;
        self.store.prune_empty_parents(&self.key, &PROCESSING_SLOTS);
        Ok(record)
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!(key = %self.key, "write transaction dropped without commit, rolling back");
        if let Err(e) = self.store.rollback(&self.key) {
            warn!(key = %self.key, error = %e, "rollback of dropped transaction failed");
        }
    }
}

impl std::fmt::Debug for WriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTransaction")
            .field("key", &self.key)
            .field("record", &self.record)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Replace the contents of `buf` with the next `limit` bytes of `source`,
/// returning fewer bytes only at end of input.
fn read_block<R: Read>(source: &mut R, limit: u64, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    buf.clear();
    source.by_ref().take(limit).read_to_end(buf)
}
