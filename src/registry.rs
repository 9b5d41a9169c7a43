//! Schema Registry
//!
//! Append-only catalogue mapping each declared name to a kind and an id. Ids
//! come from a persisted counter, are handed out once, and are never reused,
//! so the data prefix derived from an id stays stable for the life of the
//! store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::key;
use crate::schema::{FieldKind, SchemaEntry, SchemaId, StoredEntry};
use crate::store::{Batch, Store};

struct Catalogue {
    entries: HashMap<String, SchemaEntry>,
    next_id: SchemaId,
}

/// The schema registry
///
/// Lookups of known names take a read lock only. Registering a new name
/// takes the write lock, which is the single allocation path for ids.
pub struct SchemaRegistry {
    store: Arc<dyn Store>,
    catalogue: RwLock<Catalogue>,
}

impl SchemaRegistry {
    /// Load the catalogue persisted in `store`
    pub fn open(store: Arc<dyn Store>) -> Result<Self> {
        let catalogue = load_catalogue(store.as_ref())?;
        tracing::info!(
            entries = catalogue.entries.len(),
            next_id = catalogue.next_id.get(),
            "Opened schema registry"
        );
        Ok(Self {
            store,
            catalogue: RwLock::new(catalogue),
        })
    }

    /// Key prefix for `(name, kind)`, registering the pair on first use
    pub fn resolve(&self, name: &str, kind: FieldKind) -> Result<Vec<u8>> {
        self.register(name, kind).map(|entry| entry.prefix())
    }

    /// Entry for `(name, kind)`, registering the pair on first use
    ///
    /// Fails with `SchemaConflict` when `name` is already registered with a
    /// different kind.
    pub fn register(&self, name: &str, kind: FieldKind) -> Result<SchemaEntry> {
        if name.is_empty() {
            return Err(Error::InvalidName(name.to_string()));
        }

        {
            let catalogue = self.catalogue.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = catalogue.entries.get(name) {
                return check_kind(entry, kind);
            }
        }

        let mut catalogue = self.catalogue.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have registered it between the two locks.
        if let Some(entry) = catalogue.entries.get(name) {
            return check_kind(entry, kind);
        }

        let id = catalogue.next_id;
        let next_id = id.next().ok_or(Error::IdSpaceExhausted)?;
        let entry = SchemaEntry {
            name: name.to_string(),
            kind,
            id,
            created_at: Utc::now(),
        };

        let stored = encode_stored(name, &StoredEntry::from(&entry))?;
        let mut batch = Batch::new();
        batch.put(key::entry_key(name), stored);
        batch.put(key::counter_key().to_vec(), next_id.get().to_be_bytes().to_vec());
        self.store.write_batch(batch)?;

        catalogue.next_id = next_id;
        catalogue.entries.insert(entry.name.clone(), entry.clone());

        tracing::debug!(name, kind = %kind, id = id.get(), "Registered schema entry");
        Ok(entry)
    }

    /// Entry for `name`, without registering anything
    pub fn lookup(&self, name: &str) -> Option<SchemaEntry> {
        let catalogue = self.catalogue.read().unwrap_or_else(PoisonError::into_inner);
        catalogue.entries.get(name).cloned()
    }

    /// Entry whose prefix owns `key`
    pub fn owner_of(&self, key: &[u8]) -> Option<SchemaEntry> {
        let id = key::owner(key)?;
        let catalogue = self.catalogue.read().unwrap_or_else(PoisonError::into_inner);
        catalogue.entries.values().find(|e| e.id == id).cloned()
    }

    /// All entries, in id order
    pub fn entries(&self) -> Vec<SchemaEntry> {
        let catalogue = self.catalogue.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<SchemaEntry> = catalogue.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.catalogue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fingerprint of the registered layout
    pub fn fingerprint(&self) -> Checksum {
        let catalogue = self.catalogue.read().unwrap_or_else(PoisonError::into_inner);
        Checksum::of_entries(catalogue.entries.values())
    }
}

fn check_kind(entry: &SchemaEntry, requested: FieldKind) -> Result<SchemaEntry> {
    if entry.kind != requested {
        return Err(Error::SchemaConflict {
            name: entry.name.clone(),
            registered: entry.kind,
            requested,
        });
    }
    Ok(entry.clone())
}

fn encode_stored<T: Serialize>(name: &str, stored: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(stored).map_err(|source| Error::CatalogueEncode {
        name: name.to_string(),
        source,
    })
}

fn load_catalogue(store: &dyn Store) -> Result<Catalogue> {
    let next_id = match store.get(&key::counter_key())? {
        Some(bytes) => {
            let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                Error::SchemaCorruption(format!("id counter has {} bytes, expected 4", bytes.len()))
            })?;
            Some(SchemaId(u32::from_be_bytes(raw)))
        }
        None => None,
    };

    let mut entries = HashMap::new();
    let mut seen_ids = HashSet::new();
    for item in store.iterate(&key::entry_region())? {
        let (entry_key, value) = item?;
        let name_bytes = key::entry_name(&entry_key).unwrap_or_default();
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| Error::SchemaCorruption(format!("entry key {:?} is not UTF-8", name_bytes)))?;
        let stored: StoredEntry = serde_json::from_slice(&value)
            .map_err(|e| Error::SchemaCorruption(format!("entry {}: {}", name, e)))?;

        if stored.id.get() == 0 {
            return Err(Error::SchemaCorruption(format!("entry {} has id 0", name)));
        }
        if !seen_ids.insert(stored.id) {
            return Err(Error::SchemaCorruption(format!(
                "id {} assigned more than once (at {})",
                stored.id, name
            )));
        }
        entries.insert(name.clone(), stored.into_entry(name));
    }

    let next_id = match next_id {
        Some(next) => next,
        None if entries.is_empty() => SchemaId::FIRST,
        None => {
            return Err(Error::SchemaCorruption(format!(
                "{} entries but no id counter",
                entries.len()
            )))
        }
    };

    if let Some(entry) = entries.values().find(|e| e.id >= next_id) {
        return Err(Error::SchemaCorruption(format!(
            "entry {} has id {} but the counter is at {}",
            entry.name, entry.id, next_id
        )));
    }

    Ok(Catalogue { entries, next_id })
}
