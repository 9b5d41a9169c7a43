//! Typed fields
//!
//! A field is a single value stored at the exact key the registry assigns to
//! its name. The codec type parameter fixes both the value encoding and the
//! kind recorded in the catalogue, so declaring the same name through two
//! different field types fails with `SchemaConflict`.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{JsonCodec, RawCodec, StringCodec, U64Codec, ValueCodec};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::store::{Batch, Store};

/// Field holding opaque bytes
pub type RawField = Field<Vec<u8>, RawCodec>;

/// Field holding UTF-8 text
pub type StringField = Field<String, StringCodec>;

/// Field holding a `u64`, with counter helpers
pub type Uint64Field = Field<u64, U64Codec>;

/// Field holding any serde value, encoded as JSON
pub type StructField<T> = Field<T, JsonCodec>;

/// Handle to one named value
pub struct Field<T, C> {
    store: Arc<dyn Store>,
    name: String,
    key: Vec<u8>,
    _marker: PhantomData<fn() -> (T, C)>,
}

impl<T, C> Clone for Field<T, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name.clone(),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T, C> fmt::Debug for Field<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish()
    }
}

impl<T, C: ValueCodec<T>> Field<T, C> {
    /// Declare `name` with this field's kind and bind a handle to it
    pub fn new(db: &Db, name: &str) -> Result<Self> {
        let key = db.registry().resolve(name, C::KIND)?;
        Ok(Self {
            store: db.store().clone(),
            name: name.to_string(),
            key,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage key of the value
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Stored value; `NotFound` if never written or deleted
    pub fn get(&self) -> Result<T> {
        let bytes = self.store.get(&self.key)?.ok_or(Error::NotFound)?;
        C::decode(&bytes).map_err(|e| Error::decode(C::KIND, e))
    }

    pub fn has(&self) -> Result<bool> {
        Ok(self.store.has(&self.key)?)
    }

    /// Replace the stored value
    pub fn put(&self, value: &T) -> Result<()> {
        let bytes = self.encode(value)?;
        self.store.put(&self.key, &bytes)?;
        Ok(())
    }

    /// Stage a replacement of the stored value; nothing is written until the
    /// batch is committed
    pub fn put_in_batch(&self, batch: &mut Batch, value: &T) -> Result<()> {
        let bytes = self.encode(value)?;
        batch.put(self.key.clone(), bytes);
        Ok(())
    }

    pub fn delete(&self) -> Result<()> {
        self.store.delete(&self.key)?;
        Ok(())
    }

    pub fn delete_in_batch(&self, batch: &mut Batch) {
        batch.delete(self.key.clone());
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        C::encode(value).map_err(|e| Error::encode(C::KIND, e))
    }
}

impl Field<u64, U64Codec> {
    /// Stored value, or 0 when absent
    pub fn get_or_zero(&self) -> Result<u64> {
        match self.get() {
            Err(Error::NotFound) => Ok(0),
            other => other,
        }
    }

    /// Add one and store; returns the new value
    pub fn inc(&self) -> Result<u64> {
        let value = self.incremented()?;
        self.put(&value)?;
        Ok(value)
    }

    /// Stage `current + 1`
    ///
    /// The current value is read from the store, not from `batch`, so two
    /// increments staged in one batch both start from the committed value.
    pub fn inc_in_batch(&self, batch: &mut Batch) -> Result<u64> {
        let value = self.incremented()?;
        self.put_in_batch(batch, &value)?;
        Ok(value)
    }

    /// Subtract one, stopping at zero; returns the new value
    pub fn dec(&self) -> Result<u64> {
        let value = self.get_or_zero()?.saturating_sub(1);
        self.put(&value)?;
        Ok(value)
    }

    /// Stage `current - 1`, stopping at zero
    pub fn dec_in_batch(&self, batch: &mut Batch) -> Result<u64> {
        let value = self.get_or_zero()?.saturating_sub(1);
        self.put_in_batch(batch, &value)?;
        Ok(value)
    }

    fn incremented(&self) -> Result<u64> {
        self.get_or_zero()?.checked_add(1).ok_or_else(|| Error::Overflow {
            name: self.name.clone(),
        })
    }
}
