//! Error types for the schema layer

use thiserror::Error;

use crate::codec::CodecError;
use crate::schema::FieldKind;
use crate::store::StoreError;

/// Result type for schema layer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Schema layer errors
///
/// `NotFound` is the expected "no value yet" outcome and callers are meant to
/// branch on it. Everything else means the data, the declaration, or the
/// store is broken.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found")]
    NotFound,

    #[error("Schema conflict: {name} is registered as {registered}, requested as {requested}")]
    SchemaConflict {
        name: String,
        registered: FieldKind,
        requested: FieldKind,
    },

    #[error("Schema catalogue corrupted: {0}")]
    SchemaCorruption(String),

    #[error("Invalid schema name: {0:?}")]
    InvalidName(String),

    #[error("Failed to encode catalogue entry {name}: {source}")]
    CatalogueEncode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema id space exhausted")]
    IdSpaceExhausted,

    #[error("Counter overflow in {name}")]
    Overflow { name: String },

    #[error("Failed to encode {kind} value: {source}")]
    Encode {
        kind: FieldKind,
        #[source]
        source: CodecError,
    },

    #[error("Failed to decode {kind} value: {source}")]
    Decode {
        kind: FieldKind,
        #[source]
        source: CodecError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// True for the expected "absent" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub(crate) fn encode(kind: FieldKind, source: CodecError) -> Self {
        Error::Encode { kind, source }
    }

    pub(crate) fn decode(kind: FieldKind, source: CodecError) -> Self {
        Error::Decode { kind, source }
    }
}
