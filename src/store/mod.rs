//! Ordered key-value store abstraction
//!
//! Defines the capability the schema layer is built on, and the engines
//! shipped with the crate.
//!
//! # Implementations
//!
//! - `MemoryStore` -- volatile, for tests and caches
//! - `LogStore` -- single append-only file, replayed on open

mod log;
mod memory;

use thiserror::Error;

pub use self::log::LogStore;
pub use self::memory::MemoryStore;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Engine-level failures, passed through the schema layer unchanged
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store is closed")]
    Closed,

    #[error("Corrupted store at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    #[error("Store is read-only")]
    ReadOnly,

    #[error("Write failed ({write}) and removing the partial write failed ({rollback})")]
    RollbackFailed {
        write: std::io::Error,
        rollback: std::io::Error,
    },

    #[error("Store stopped after a write it could not roll back")]
    Failed,
}

/// Ascending `(key, value)` pairs
pub type KvIter<'a> = Box<dyn Iterator<Item = StoreResult<(Vec<u8>, Vec<u8>)>> + Send + 'a>;

/// A staged write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Writes staged for one atomic commit
///
/// Building a batch performs no I/O. Ops apply in insertion order, so a later
/// op on the same key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}

/// Ordered byte-keyed store
///
/// Implementations must make each `write_batch` all-or-nothing, including
/// across a crash, and must return iteration results in ascending byte order
/// of the full key. An iterator reflects the store as of the call that
/// created it; later writes do not show up in it.
pub trait Store: Send + Sync {
    /// Value at `key`, or `None` when absent
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Commit every op in `batch` atomically
    fn write_batch(&self, batch: Batch) -> StoreResult<()>;

    /// All entries whose key starts with `prefix`
    fn iterate(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>>;

    /// Entries under `prefix` whose key is `>= start`
    fn iterate_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<KvIter<'_>> {
        let start = start.to_vec();
        let iter = self.iterate(prefix)?;
        Ok(Box::new(iter.filter(move |item| match item {
            Ok((key, _)) => key.as_slice() >= start.as_slice(),
            Err(_) => true,
        })))
    }

    /// Number of entries `iterate_from(prefix, start)` would yield
    fn count_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<usize> {
        let mut count = 0;
        for item in self.iterate_from(prefix, start)? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.put(key, value);
        self.write_batch(batch)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.delete(key);
        self.write_batch(batch)
    }

    /// Flush and refuse further operations
    fn close(&self) -> StoreResult<()>;
}
