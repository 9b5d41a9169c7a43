//! In-memory store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use super::{Batch, BatchOp, KvIter, Store, StoreError, StoreResult};

/// Volatile store backed by a `BTreeMap`
///
/// Batches are applied under one write lock, so readers see all of a batch
/// or none of it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

/// Apply ops in order; shared with the log store's replay path
pub(super) fn apply(map: &mut BTreeMap<Vec<u8>, Vec<u8>>, ops: Vec<BatchOp>) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

fn range<'a>(
    map: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &'a [u8],
    start: &[u8],
) -> impl Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)> + 'a {
    let from = if start > prefix { start } else { prefix };
    map.range(from.to_vec()..)
        .take_while(move |(key, _)| key.starts_with(prefix))
}

/// Snapshot of the entries under `prefix` starting at `start`
pub(super) fn scan(
    map: &BTreeMap<Vec<u8>, Vec<u8>>,
    prefix: &[u8],
    start: &[u8],
) -> Vec<(Vec<u8>, Vec<u8>)> {
    range(map, prefix, start)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Size of `scan` without copying anything
pub(super) fn count(map: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8], start: &[u8]) -> usize {
    range(map, prefix, start).count()
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(map.get(key).cloned())
    }

    fn write_batch(&self, batch: Batch) -> StoreResult<()> {
        self.check_open()?;
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut map, batch.into_ops());
        Ok(())
    }

    fn iterate(&self, prefix: &[u8]) -> StoreResult<KvIter<'_>> {
        self.iterate_from(prefix, prefix)
    }

    fn iterate_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<KvIter<'_>> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let entries = scan(&map, prefix, start);
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn count_from(&self, prefix: &[u8], start: &[u8]) -> StoreResult<usize> {
        self.check_open()?;
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        Ok(count(&map, prefix, start))
    }

    fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
