//! Vectors of `u64` counters
//!
//! Slot `i` of a vector lives at `prefix ++ i.to_be_bytes()`.

use std::sync::Arc;

use crate::codec::U64Codec;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::key;
use crate::schema::FieldKind;
use crate::store::{Batch, Store};

/// Handle to one named vector
#[derive(Clone)]
pub struct Uint64Vector {
    store: Arc<dyn Store>,
    name: String,
    prefix: Vec<u8>,
}

impl std::fmt::Debug for Uint64Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uint64Vector")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Uint64Vector {
    pub fn new(db: &Db, name: &str) -> Result<Self> {
        let prefix = db.registry().resolve(name, FieldKind::Uint64Vector)?;
        Ok(Self {
            store: db.store().clone(),
            name: name.to_string(),
            prefix,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of slot `i`; `NotFound` if never written
    pub fn get(&self, i: u64) -> Result<u64> {
        let bytes = self.store.get(&self.slot_key(i))?.ok_or(Error::NotFound)?;
        U64Codec::from_bytes(&bytes).map_err(|e| Error::decode(FieldKind::Uint64Vector, e))
    }

    /// Value of slot `i`, or 0 when absent
    pub fn get_or_zero(&self, i: u64) -> Result<u64> {
        match self.get(i) {
            Err(Error::NotFound) => Ok(0),
            other => other,
        }
    }

    pub fn put(&self, i: u64, value: u64) -> Result<()> {
        self.store.put(&self.slot_key(i), &U64Codec::to_bytes(value))?;
        Ok(())
    }

    pub fn put_in_batch(&self, batch: &mut Batch, i: u64, value: u64) {
        batch.put(self.slot_key(i), U64Codec::to_bytes(value).to_vec());
    }

    /// Add one to slot `i`; returns the new value
    pub fn inc(&self, i: u64) -> Result<u64> {
        let value = self.incremented(i)?;
        self.put(i, value)?;
        Ok(value)
    }

    /// Stage `slot + 1`, reading the current value from the store
    pub fn inc_in_batch(&self, batch: &mut Batch, i: u64) -> Result<u64> {
        let value = self.incremented(i)?;
        self.put_in_batch(batch, i, value);
        Ok(value)
    }

    /// Subtract one from slot `i`, stopping at zero
    pub fn dec(&self, i: u64) -> Result<u64> {
        let value = self.get_or_zero(i)?.saturating_sub(1);
        self.put(i, value)?;
        Ok(value)
    }

    pub fn dec_in_batch(&self, batch: &mut Batch, i: u64) -> Result<u64> {
        let value = self.get_or_zero(i)?.saturating_sub(1);
        self.put_in_batch(batch, i, value);
        Ok(value)
    }

    fn incremented(&self, i: u64) -> Result<u64> {
        self.get_or_zero(i)?.checked_add(1).ok_or_else(|| Error::Overflow {
            name: format!("{}[{}]", self.name, i),
        })
    }

    fn slot_key(&self, i: u64) -> Vec<u8> {
        key::join(&self.prefix, &i.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_independent() {
        let db = Db::memory().unwrap();
        let bins = db.uint64_vector("bin-ids").unwrap();

        assert!(bins.get(0).unwrap_err().is_not_found());
        bins.put(0, 7).unwrap();
        bins.put(31, 2).unwrap();
        assert_eq!(bins.get(0).unwrap(), 7);
        assert_eq!(bins.get(31).unwrap(), 2);
        assert_eq!(bins.get_or_zero(5).unwrap(), 0);
    }

    #[test]
    fn test_inc_dec() {
        let db = Db::memory().unwrap();
        let bins = db.uint64_vector("bin-ids").unwrap();

        assert_eq!(bins.inc(3).unwrap(), 1);
        assert_eq!(bins.inc(3).unwrap(), 2);
        assert_eq!(bins.dec(3).unwrap(), 1);
        assert_eq!(bins.dec(4).unwrap(), 0);

        bins.put(9, u64::MAX).unwrap();
        assert!(matches!(bins.inc(9), Err(Error::Overflow { .. })));
    }

    #[test]
    fn test_batched_slots() {
        let db = Db::memory().unwrap();
        let bins = db.uint64_vector("bin-ids").unwrap();
        bins.put(1, 10).unwrap();

        let mut batch = db.new_batch();
        assert_eq!(bins.inc_in_batch(&mut batch, 1).unwrap(), 11);
        assert_eq!(bins.dec_in_batch(&mut batch, 2).unwrap(), 0);
        bins.put_in_batch(&mut batch, 3, 42);
        assert_eq!(bins.get(1).unwrap(), 10);

        db.write_batch(batch).unwrap();
        assert_eq!(bins.get(1).unwrap(), 11);
        assert_eq!(bins.get(2).unwrap(), 0);
        assert_eq!(bins.get(3).unwrap(), 42);
    }

    #[test]
    fn test_vector_and_field_names_share_namespace() {
        let db = Db::memory().unwrap();
        db.uint64_vector("bins").unwrap();
        assert!(matches!(
            db.uint64_field("bins"),
            Err(Error::SchemaConflict { .. })
        ));
    }
}
