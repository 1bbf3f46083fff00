//! Durable identifier → alias table for the tagbridge system.
//!
//! The store keeps the whole table in memory and rewrites the JSON file
//! in full on every change (write-through). It is the only owner of the
//! table: device adapters read it through [`tagbridge_core::AliasLookup`],
//! and only the router mutates it.
//!
//! # Consistency
//!
//! - Mutations are serialized; two writes never interleave.
//! - A mutation is installed in memory only after its file write succeeded,
//!   so memory never runs ahead of disk and a failed batch changes nothing.
//! - Files are replaced with write-to-temp-then-rename.
//! - Listeners registered with [`AliasStore::on_change`] fire once per
//!   successful mutation, after persistence.
//!
//! # Example
//!
//! ```no_run
//! use tagbridge_storage::{AliasStore, StoreConfig};
//! use tagbridge_core::Identifier;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = AliasStore::open(StoreConfig::new("aliases.json"))?;
//!
//! let ids = ["A1B2C3", "0099AA"].map(|s| Identifier::new(s).unwrap());
//! store.assign_batch(ids, "Warehouse").await?;
//!
//! let changed = store.remove(&Identifier::new("A1B2C3")?).await?;
//! assert!(changed);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod file;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{AliasStore, StoreConfig};
