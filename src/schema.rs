//! Schema types and structures

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage shape of a declared field or index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldKind {
    /// Opaque bytes, stored as given
    Raw,
    /// UTF-8 text
    String,
    /// Fixed-width big-endian `u64`
    Uint64,
    /// Structured value encoded as JSON
    StructJson,
    /// Array of `u64` counters, one key per slot
    Uint64Vector,
    /// Ordered multi-entry collection
    Index,
}

impl FieldKind {
    /// Name as persisted in the catalogue
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Raw => "raw",
            FieldKind::String => "string",
            FieldKind::Uint64 => "uint64",
            FieldKind::StructJson => "struct-json",
            FieldKind::Uint64Vector => "uint64-vector",
            FieldKind::Index => "index",
        }
    }

    /// Whether entries live under the prefix rather than at it
    pub fn is_multi_entry(&self) -> bool {
        matches!(self, FieldKind::Uint64Vector | FieldKind::Index)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned to a (name, kind) pair on first registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub u32);

impl SchemaId {
    /// First id handed out by an empty catalogue
    pub const FIRST: SchemaId = SchemaId(1);

    pub fn get(self) -> u32 {
        self.0
    }

    /// The id after this one, if the space is not exhausted
    pub fn next(self) -> Option<SchemaId> {
        self.0.checked_add(1).map(SchemaId)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered name in the catalogue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    /// Name chosen by the declaring subsystem
    pub name: String,
    /// Storage shape
    pub kind: FieldKind,
    /// Assigned id; never changes once persisted
    pub id: SchemaId,
    /// When the name was first registered
    pub created_at: DateTime<Utc>,
}

impl SchemaEntry {
    /// Key prefix derived from the assigned id
    pub fn prefix(&self) -> Vec<u8> {
        crate::key::prefix(self.id)
    }
}

/// Persisted form of an entry; the name lives in the catalogue key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub kind: FieldKind,
    pub id: SchemaId,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn into_entry(self, name: String) -> SchemaEntry {
        SchemaEntry {
            name,
            kind: self.kind,
            id: self.id,
            created_at: self.created_at,
        }
    }
}

impl From<&SchemaEntry> for StoredEntry {
    fn from(entry: &SchemaEntry) -> Self {
        Self {
            kind: entry.kind,
            id: entry.id,
            created_at: entry.created_at,
        }
    }
}
