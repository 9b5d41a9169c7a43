//! Typed indexes
//!
//! An index owns every key that starts with its registry prefix. Entry keys
//! are `prefix ++ encode_key(key)`, so iterating the store over the prefix
//! visits entries in ascending order of their encoded keys.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::IndexCodec;
use crate::db::Db;
use crate::error::{Error, Result};
use crate::key;
use crate::schema::FieldKind;
use crate::store::{Batch, KvIter, Store};

/// Where and how to iterate an index
#[derive(Debug, Clone)]
pub struct IterateOptions<K> {
    /// Start at this key (inclusive unless `skip_start_from` is set)
    pub start_from: Option<K>,
    /// Exclude the `start_from` entry itself
    pub skip_start_from: bool,
    /// Only visit entries whose encoded key begins with these bytes
    pub prefix: Vec<u8>,
    /// Visit entries in descending order
    pub reverse: bool,
}

impl<K> Default for IterateOptions<K> {
    fn default() -> Self {
        Self {
            start_from: None,
            skip_start_from: false,
            prefix: Vec::new(),
            reverse: false,
        }
    }
}

impl<K> IterateOptions<K> {
    pub fn starting_at(start: K) -> Self {
        Self {
            start_from: Some(start),
            ..Self::default()
        }
    }

    pub fn after(start: K) -> Self {
        Self {
            start_from: Some(start),
            skip_start_from: true,
            ..Self::default()
        }
    }

    pub fn with_prefix(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Handle to one named index
pub struct Index<C> {
    store: Arc<dyn Store>,
    name: String,
    prefix: Vec<u8>,
    _marker: PhantomData<fn() -> C>,
}

impl<C> Clone for Index<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            _marker: PhantomData,
        }
    }
}

impl<C> fmt::Debug for Index<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<C: IndexCodec> Index<C> {
    /// Declare `name` as an index and bind a handle to it
    pub fn new(db: &Db, name: &str) -> Result<Self> {
        let prefix = db.registry().resolve(name, FieldKind::Index)?;
        Ok(Self {
            store: db.store().clone(),
            name: name.to_string(),
            prefix,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix shared by every entry of this index
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Value stored for `key`; `NotFound` if absent
    pub fn get(&self, key: &C::Key) -> Result<C::Value> {
        let bytes = self.store.get(&self.entry_key(key)?)?.ok_or(Error::NotFound)?;
        C::decode_value(&bytes).map_err(|e| Error::decode(FieldKind::Index, e))
    }

    pub fn has(&self, key: &C::Key) -> Result<bool> {
        Ok(self.store.has(&self.entry_key(key)?)?)
    }

    /// Presence of each key, in the order given
    pub fn has_multi(&self, keys: &[C::Key]) -> Result<Vec<bool>> {
        keys.iter().map(|key| self.has(key)).collect()
    }

    pub fn put(&self, key: &C::Key, value: &C::Value) -> Result<()> {
        let (entry_key, bytes) = self.encode_entry(key, value)?;
        self.store.put(&entry_key, &bytes)?;
        Ok(())
    }

    pub fn put_in_batch(&self, batch: &mut Batch, key: &C::Key, value: &C::Value) -> Result<()> {
        let (entry_key, bytes) = self.encode_entry(key, value)?;
        batch.put(entry_key, bytes);
        Ok(())
    }

    pub fn delete(&self, key: &C::Key) -> Result<()> {
        self.store.delete(&self.entry_key(key)?)?;
        Ok(())
    }

    pub fn delete_in_batch(&self, batch: &mut Batch, key: &C::Key) -> Result<()> {
        batch.delete(self.entry_key(key)?);
        Ok(())
    }

    /// Entries selected by `options`
    ///
    /// The entries are those present when `iter` is called; writes made while
    /// iterating are not seen. Ascending iteration decodes entries as they
    /// are pulled, descending iteration buffers the selected range first.
    /// Entries that fail to decode are yielded as `Decode` errors in place.
    pub fn iter(
        &self,
        options: IterateOptions<C::Key>,
    ) -> Result<impl Iterator<Item = Result<(C::Key, C::Value)>> + '_> {
        let scan_prefix = key::join(&self.prefix, &options.prefix);
        let start = match &options.start_from {
            Some(start) => Some(self.entry_key(start)?),
            None => None,
        };

        let raw: KvIter<'_> = if options.reverse {
            // Everything under the prefix up to and including `start`.
            let mut all = self
                .store
                .iterate(&scan_prefix)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            if let Some(start) = &start {
                all.retain(|(k, _)| k <= start);
            }
            all.reverse();
            Box::new(all.into_iter().map(Ok))
        } else {
            match &start {
                Some(start) => self.store.iterate_from(&scan_prefix, start)?,
                None => self.store.iterate(&scan_prefix)?,
            }
        };

        let mut raw = raw.peekable();
        if options.skip_start_from {
            if let Some(start) = &start {
                if matches!(raw.peek(), Some(Ok((first, _))) if first == start) {
                    raw.next();
                }
            }
        }

        let prefix_len = self.prefix.len();
        Ok(raw.map(move |item| {
            let (k, v) = item?;
            let key = C::decode_key(&k[prefix_len..]).map_err(|e| Error::decode(FieldKind::Index, e))?;
            let value = C::decode_value(&v).map_err(|e| Error::decode(FieldKind::Index, e))?;
            Ok((key, value))
        }))
    }

    /// First entry whose encoded key begins with `prefix`
    pub fn first(&self, prefix: &[u8]) -> Result<(C::Key, C::Value)> {
        self.iter(IterateOptions::with_prefix(prefix))?
            .next()
            .unwrap_or(Err(Error::NotFound))
    }

    /// Last entry whose encoded key begins with `prefix`
    pub fn last(&self, prefix: &[u8]) -> Result<(C::Key, C::Value)> {
        self.iter(IterateOptions::with_prefix(prefix).reversed())?
            .next()
            .unwrap_or(Err(Error::NotFound))
    }

    /// Number of entries
    pub fn count(&self) -> Result<usize> {
        Ok(self.store.count_from(&self.prefix, &self.prefix)?)
    }

    /// Number of entries at or after `start`
    pub fn count_from(&self, start: &C::Key) -> Result<usize> {
        let start = self.entry_key(start)?;
        Ok(self.store.count_from(&self.prefix, &start)?)
    }

    fn entry_key(&self, key: &C::Key) -> Result<Vec<u8>> {
        let suffix = C::encode_key(key).map_err(|e| Error::encode(FieldKind::Index, e))?;
        Ok(key::join(&self.prefix, &suffix))
    }

    fn encode_entry(&self, key: &C::Key, value: &C::Value) -> Result<(Vec<u8>, Vec<u8>)> {
        let entry_key = self.entry_key(key)?;
        let bytes = C::encode_value(value).map_err(|e| Error::encode(FieldKind::Index, e))?;
        Ok((entry_key, bytes))
    }
}
