//! Value and index-key codecs
//!
//! A codec is a zero-sized type that fixes both the byte encoding of a value
//! and the [`FieldKind`] recorded for it in the catalogue. Built-in codecs
//! cover raw bytes, UTF-8 text, `u64` and JSON; callers may add their own.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::schema::FieldKind;

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Codec failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("{0}")]
    Custom(String),
}

/// Encoding of a single field value
pub trait ValueCodec<T> {
    /// Kind recorded in the catalogue for fields using this codec
    const KIND: FieldKind;

    fn encode(value: &T) -> CodecResult<Vec<u8>>;

    fn decode(bytes: &[u8]) -> CodecResult<T>;
}

/// Encoding of index entries
///
/// Entries are ordered by the bytes `encode_key` produces, so encodings that
/// should iterate numerically must be big-endian and fixed width.
pub trait IndexCodec {
    type Key;
    type Value;

    fn encode_key(key: &Self::Key) -> CodecResult<Vec<u8>>;

    fn decode_key(bytes: &[u8]) -> CodecResult<Self::Key>;

    fn encode_value(value: &Self::Value) -> CodecResult<Vec<u8>>;

    fn decode_value(bytes: &[u8]) -> CodecResult<Self::Value>;
}

/// Bytes stored as given
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ValueCodec<Vec<u8>> for RawCodec {
    const KIND: FieldKind = FieldKind::Raw;

    fn encode(value: &Vec<u8>) -> CodecResult<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(bytes: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ValueCodec<String> for StringCodec {
    const KIND: FieldKind = FieldKind::String;

    fn encode(value: &String) -> CodecResult<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> CodecResult<String> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// Eight bytes, big-endian
#[derive(Debug, Clone, Copy, Default)]
pub struct U64Codec;

impl U64Codec {
    pub fn to_bytes(value: u64) -> [u8; 8] {
        value.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<u64> {
        let array: [u8; 8] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: 8,
            actual: bytes.len(),
        })?;
        Ok(u64::from_be_bytes(array))
    }
}

impl ValueCodec<u64> for U64Codec {
    const KIND: FieldKind = FieldKind::Uint64;

    fn encode(value: &u64) -> CodecResult<Vec<u8>> {
        Ok(Self::to_bytes(*value).to_vec())
    }

    fn decode(bytes: &[u8]) -> CodecResult<u64> {
        Self::from_bytes(bytes)
    }
}

/// Any serde type, as JSON
///
/// `serde_json` writes struct fields in declaration order and map entries in
/// the map's iteration order, so the output is deterministic for a given
/// value of a given type.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> ValueCodec<T> for JsonCodec {
    const KIND: FieldKind = FieldKind::StructJson;

    fn encode(value: &T) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(bytes: &[u8]) -> CodecResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Index keyed by big-endian `u64` with JSON values
#[derive(Debug, Clone, Copy, Default)]
pub struct U64JsonIndex<V>(PhantomData<V>);

impl<V: Serialize + DeserializeOwned> IndexCodec for U64JsonIndex<V> {
    type Key = u64;
    type Value = V;

    fn encode_key(key: &u64) -> CodecResult<Vec<u8>> {
        Ok(U64Codec::to_bytes(*key).to_vec())
    }

    fn decode_key(bytes: &[u8]) -> CodecResult<u64> {
        U64Codec::from_bytes(bytes)
    }

    fn encode_value(value: &V) -> CodecResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode_value(bytes: &[u8]) -> CodecResult<V> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Index keyed by raw bytes with raw values
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesIndex;

impl IndexCodec for BytesIndex {
    type Key = Vec<u8>;
    type Value = Vec<u8>;

    fn encode_key(key: &Vec<u8>) -> CodecResult<Vec<u8>> {
        Ok(key.clone())
    }

    fn decode_key(bytes: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn encode_value(value: &Vec<u8>) -> CodecResult<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode_value(bytes: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
