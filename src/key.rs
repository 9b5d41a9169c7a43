//! Key derivation
//!
//! The keyspace is split into two regions by the first byte:
//!
//! ```text
//! 0x00 0x00            -> next unassigned schema id (u32 BE)
//! 0x00 0x01 <name>     -> catalogue entry for <name>
//! 0x01 <id u32 BE>     -> field value, or prefix of index/vector entries
//! ```
//!
//! Every data prefix has the same width, so no prefix is a prefix of another
//! and no separator is needed between the prefix and an entry suffix.

use crate::schema::SchemaId;

/// First byte of every catalogue key
pub const CATALOGUE_REGION: u8 = 0x00;

/// First byte of every field and index key
pub const DATA_REGION: u8 = 0x01;

/// Width of a data prefix in bytes
pub const PREFIX_LEN: usize = 1 + 4;

const COUNTER_TAG: u8 = 0x00;
const ENTRY_TAG: u8 = 0x01;

/// Key holding the next id to assign
pub fn counter_key() -> [u8; 2] {
    [CATALOGUE_REGION, COUNTER_TAG]
}

/// Prefix shared by all catalogue entries
pub fn entry_region() -> [u8; 2] {
    [CATALOGUE_REGION, ENTRY_TAG]
}

/// Catalogue key for a name
pub fn entry_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + name.len());
    key.extend_from_slice(&entry_region());
    key.extend_from_slice(name.as_bytes());
    key
}

/// Name encoded in a catalogue key, if the key is one
pub fn entry_name(key: &[u8]) -> Option<&[u8]> {
    key.strip_prefix(&entry_region()[..])
}

/// Data prefix for an id
pub fn prefix(id: SchemaId) -> Vec<u8> {
    let mut key = Vec::with_capacity(PREFIX_LEN);
    key.push(DATA_REGION);
    key.extend_from_slice(&id.get().to_be_bytes());
    key
}

/// Id owning a data key, if the key lies in the data region
pub fn owner(key: &[u8]) -> Option<SchemaId> {
    if key.len() < PREFIX_LEN || key[0] != DATA_REGION {
        return None;
    }
    let mut id = [0u8; 4];
    id.copy_from_slice(&key[1..PREFIX_LEN]);
    Some(SchemaId(u32::from_be_bytes(id)))
}

/// `prefix ++ suffix`
pub fn join(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}
