//! Registry storage abstractions.
//!
//! Two contracts back the DOI lifecycle:
//! - entity stores, one per registrable kind, owning the active DOI and the
//!   identifier history of each entity
//! - the DOI store, tracking registration status and submitted metadata
//!
//! Design stance:
//! - an entity and its identifier history are written together or not at all
//! - the DOI store's uniqueness check is what keeps issued DOIs collision-free

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryDoiStore, InMemoryEntityStore, InMemoryRegistryStorage};
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistryStorage;
pub use traits::{DoiStore, EntityStore};
