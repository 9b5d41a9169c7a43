//! Store handle plus schema registry
//!
//! `Db` is opened once per store. It owns the registry for that store and
//! hands out field, index and vector handles bound to it.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{IndexCodec, ValueCodec};
use crate::config::{Backend, ShedConfig};
use crate::error::Result;
use crate::field::{Field, RawField, StringField, StructField, Uint64Field};
use crate::index::Index;
use crate::registry::SchemaRegistry;
use crate::store::{Batch, LogStore, MemoryStore, Store};
use crate::vector::Uint64Vector;

/// An open store with its schema registry
pub struct Db {
    store: Arc<dyn Store>,
    registry: SchemaRegistry,
}

impl Db {
    /// Open the schema layer over `store`, loading its catalogue
    pub fn open(store: Arc<dyn Store>) -> Result<Self> {
        let registry = SchemaRegistry::open(store.clone())?;
        Ok(Self { store, registry })
    }

    /// Open the engine selected by `config`
    pub fn open_with_config(config: &ShedConfig) -> Result<Self> {
        let store: Arc<dyn Store> = match config.store.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Log => Arc::new(LogStore::open_with(
                config.store_path(),
                config.store.sync_writes,
            )?),
        };
        Self::open(store)
    }

    /// Fresh volatile database
    pub fn memory() -> Result<Self> {
        Self::open(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn new_batch(&self) -> Batch {
        Batch::new()
    }

    /// Commit `batch`; all of its writes become visible together or not at all
    pub fn write_batch(&self, batch: Batch) -> Result<()> {
        self.store.write_batch(batch)?;
        Ok(())
    }

    pub fn field<T, C: ValueCodec<T>>(&self, name: &str) -> Result<Field<T, C>> {
        Field::new(self, name)
    }

    pub fn raw_field(&self, name: &str) -> Result<RawField> {
        Field::new(self, name)
    }

    pub fn string_field(&self, name: &str) -> Result<StringField> {
        Field::new(self, name)
    }

    pub fn uint64_field(&self, name: &str) -> Result<Uint64Field> {
        Field::new(self, name)
    }

    pub fn struct_field<T: Serialize + DeserializeOwned>(&self, name: &str) -> Result<StructField<T>> {
        Field::new(self, name)
    }

    pub fn index<C: IndexCodec>(&self, name: &str) -> Result<Index<C>> {
        Index::new(self, name)
    }

    pub fn uint64_vector(&self, name: &str) -> Result<Uint64Vector> {
        Uint64Vector::new(self, name)
    }

    /// Close the underlying store
    ///
    /// Handles created from this `Db` keep the store alive but every operation
    /// through them fails with the store's `Closed` error from here on.
    pub fn close(self) -> Result<()> {
        tracing::debug!(entries = self.registry.len(), "Closing schema layer");
        self.store.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::Error;
    use crate::store::StoreError;
    use tempfile::tempdir;

    #[test]
    fn test_open_with_log_config() {
        let dir = tempdir().unwrap();
        let config = ShedConfig {
            store: StoreConfig {
                backend: Backend::Log,
                path: dir.path().join("nested/shed.log"),
                sync_writes: false,
            },
            ..ShedConfig::default()
        };

        {
            let db = Db::open_with_config(&config).unwrap();
            db.string_field("schema-name").unwrap().put(&"v1".to_string()).unwrap();
            db.close().unwrap();
        }

        let db = Db::open_with_config(&config).unwrap();
        assert_eq!(db.string_field("schema-name").unwrap().get().unwrap(), "v1");
    }

    #[test]
    fn test_closed_store_errors_pass_through() {
        let db = Db::memory().unwrap();
        let field = db.uint64_field("counter").unwrap();
        db.close().unwrap();

        assert!(matches!(field.get(), Err(Error::Store(StoreError::Closed))));
        assert!(matches!(field.put(&1), Err(Error::Store(StoreError::Closed))));
    }

    #[test]
    fn test_write_batch_spans_fields_and_indexes() {
        use crate::codec::BytesIndex;

        let db = Db::memory().unwrap();
        let size = db.uint64_field("size").unwrap();
        let index = db.index::<BytesIndex>("entries").unwrap();

        let mut batch = db.new_batch();
        size.put_in_batch(&mut batch, &1).unwrap();
        index.put_in_batch(&mut batch, &b"k".to_vec(), &b"v".to_vec()).unwrap();
        db.write_batch(batch).unwrap();

        assert_eq!(size.get().unwrap(), 1);
        assert_eq!(index.get(&b"k".to_vec()).unwrap(), b"v".to_vec());
    }
}
