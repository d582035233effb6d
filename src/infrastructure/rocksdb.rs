use crate::domain::ports::{RolloverCondition, SequenceStore};
use crate::domain::sequence::{Block, reserve};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family holding one serialized `Block` per sequence name.
pub const CF_SEQUENCES: &str = "sequences";

/// Durable sequence counter on RocksDB.
///
/// RocksDB allows a single process per database directory, so a process-wide lock around
/// read-modify-write is enough to make every reservation atomic. Writes are synced before
/// the batch start is returned.
#[derive(Clone)]
pub struct RocksDbSequenceStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDbSequenceStore {
    /// Opens or creates the database at `path`, with the sequences column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_sequences = ColumnFamilyDescriptor::new(CF_SEQUENCES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_sequences])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn sequences(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_SEQUENCES).ok_or_else(|| {
            PaymentError::Internal(Box::new(std::io::Error::other(
                "Sequences column family not found",
            )))
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| {
            PaymentError::Internal(Box::new(std::io::Error::other(
                "sequence write lock poisoned",
            )))
        })
    }

    fn write_block(&self, name: &str, block: &Block) -> Result<()> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        let value = serde_json::to_vec(block)?;
        self.db
            .put_cf_opt(self.sequences()?, name.as_bytes(), value, &write_opts)?;
        Ok(())
    }

    /// Creates the sequence row unless it already exists. Returns whether it was created.
    pub fn provision(&self, name: &str, block: &Block) -> Result<bool> {
        let _guard = self.lock()?;
        if self.block(name)?.is_some() {
            return Ok(false);
        }
        self.write_block(name, block)?;
        Ok(true)
    }

    pub fn block(&self, name: &str) -> Result<Option<Block>> {
        match self.db.get_cf(self.sequences()?, name.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SequenceStore for RocksDbSequenceStore {
    async fn next_batch(
        &self,
        name: &str,
        batch_size: u64,
        rollover_condition: RolloverCondition<'_>,
        rollover_target: &Block,
    ) -> Result<u64> {
        let _guard = self.lock()?;
        let current = self
            .block(name)?
            .ok_or_else(|| PaymentError::UnknownSequence(name.to_string()))?;
        let (start, next) = reserve(&current, batch_size, rollover_condition, rollover_target);
        self.write_block(name, &next)?;
        Ok(start)
    }
}
