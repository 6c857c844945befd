//! Registry Types - DOI value types and registrable entities
//!
//! Every registry entity that can carry a Digital Object Identifier (datasets,
//! occurrence downloads, derived datasets) exposes the same two fields: one
//! active DOI and an ordered history of superseded identifiers. This crate
//! holds those shapes and nothing that performs I/O.
//!
//! ## Key Concepts
//!
//! - **Doi**: normalized `prefix/suffix` value, structurally comparable
//! - **GbifPrefix**: the deployment's reserved prefix; decides GBIF ownership
//! - **DoiStatus / DoiData**: persisted registration state of a DOI
//! - **AlternateIdentifier**: one entry in an entity's identifier history
//! - **Registrable**: the view of an entity the DOI lifecycle works against

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod doi;
pub mod entity;
pub mod identifier;
pub mod ids;
pub mod status;

pub use doi::{Doi, DoiKind, DoiParseError, GbifPrefix};
pub use entity::{Dataset, DerivedDataset, Download, DownloadStatus, EntityKind, Registrable};
pub use identifier::{AlternateIdentifier, IdentifierType};
pub use ids::EntityKey;
pub use status::{DoiData, DoiRecord, DoiStatus};
