//! Registry DOI - lifecycle reconciliation for registry entities
//!
//! Decides, on every create/update of a dataset, download or derived dataset,
//! which DOI is active, which prior DOIs are kept as alternate identifiers,
//! and when a previously used GBIF DOI is reactivated instead of minting a
//! new one. Changes reach the DOI registration authority asynchronously.
//!
//! ## Flow
//!
//! ```text
//! DoiLifecycleService -> ReconciliationEngine (pure) -> EntityStore::update
//!                     -> RegistrationDispatcher -> queue -> RegistrationWorker -> DoiAuthority
//! ```
//!
//! - **issuer**: mints GBIF-prefixed DOIs with collision-free suffixes
//! - **ledger**: pure operations over an entity's identifier history
//! - **reconcile**: the decision table run on every update
//! - **dispatch / worker**: fire-and-forget registration, deletion and
//!   metadata updates
//! - **service**: per-entity orchestration

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod authority;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod metadata;
pub mod reconcile;
pub mod service;
pub mod worker;

pub use authority::{AuthorityError, DoiAuthority, RecordingAuthority};
pub use config::{DispatcherConfig, DoiConfig, RegistrationTargets};
pub use dispatch::{DoiCommand, EntityChange, QueueDispatcher, RegistrationDispatcher};
pub use error::{DoiError, DoiResult};
pub use issuer::DoiIssuer;
pub use metadata::{DataCiteMetadataBuilder, MetadataBuilder, RelatedIdentifier, RelationType};
pub use reconcile::{ActiveDoi, ReconcileInput, Reconciliation, ReconciliationEngine};
pub use service::{DoiLifecycleService, Principal, RegistryStores};
pub use worker::{CommandOutcome, RegistrationWorker, WorkerError};
