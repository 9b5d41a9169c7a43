//! kv-shed
//!
//! Typed fields and indexes over one shared, ordered key-value store.
//!
//! ## Features
//!
//! - **Collision-free namespace**: every declared name gets its own key prefix
//! - **Append-only catalogue**: ids are assigned once and never reused
//! - **Typed accessors**: raw, string, `u64` and JSON fields; ordered indexes
//! - **Atomic batches**: stage writes across fields and indexes, commit once
//!
//! ## Architecture
//!
//! ```text
//! Field / Index / Uint64Vector
//!        │   resolve(name, kind) -> prefix
//!        ▼
//!  SchemaRegistry  ──  catalogue keys (0x00 ..)
//!        │
//!        ▼
//!      Store  ──  MemoryStore | LogStore | your engine
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use kv_shed::Db;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct PeerMetadata {
//!     addr: String,
//! }
//!
//! fn main() -> kv_shed::Result<()> {
//!     let db = Db::memory()?;
//!     let peers = db.struct_field::<PeerMetadata>("peer-metadata")?;
//!     peers.put(&PeerMetadata { addr: "1.2.3.4".into() })?;
//!     assert_eq!(peers.get()?.addr, "1.2.3.4");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod field;
pub mod index;
pub mod key;
pub mod registry;
pub mod schema;
pub mod store;
pub mod vector;

pub use checksum::Checksum;
pub use codec::{
    BytesIndex, CodecError, CodecResult, IndexCodec, JsonCodec, RawCodec, StringCodec, U64Codec,
    U64JsonIndex, ValueCodec,
};
pub use config::ShedConfig;
pub use db::Db;
pub use error::{Error, Result};
pub use field::{Field, RawField, StringField, StructField, Uint64Field};
pub use index::{Index, IterateOptions};
pub use registry::SchemaRegistry;
pub use schema::{FieldKind, SchemaEntry, SchemaId};
pub use store::{Batch, BatchOp, LogStore, MemoryStore, Store, StoreError, StoreResult};
pub use vector::Uint64Vector;
