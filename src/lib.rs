//! # strata
//!
//! Redis-shaped data types layered over RocksDB: strings, hashes, sets
//! and lists, each stored in its own database under one path.
//!
//! The engine only knows opaque byte keys and values; everything typed
//! lives in the encoding. Collection types keep one meta record per user
//! key (count, version, expiry) plus one engine entry per field, member
//! or list node, keyed under the meta's current version. Deleting or
//! expiring a key just rewrites the small meta record: the version bump
//! makes every old subentry invisible, and compaction filters reclaim
//! them in the background.
//!
//! ```no_run
//! use strata::{Store, StoreConfig};
//!
//! # fn main() -> strata::Result<()> {
//! let store = Store::open(StoreConfig::create(), "/tmp/strata-db")?;
//! store.set(b"greeting", b"hello")?;
//! store.hset(b"user:1", b"name", b"alice")?;
//! store.lpush(b"queue", &[b"job-1", b"job-2"])?;
//! assert_eq!(store.get(b"greeting")?, b"hello");
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod codec;
pub mod config;
pub mod error;
pub mod types;

// Support modules
pub mod glob;
pub mod lock;
pub mod version;
mod filter;

// Per-type stores and the façade
pub mod hashes;
pub mod lists;
pub mod sets;
pub mod store;
pub mod strings;

// Re-export main types for convenience
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::Store;
pub use types::{BitOpType, DataType, FieldValue, InsertPosition, KeyValue, TypeStatusMap};
