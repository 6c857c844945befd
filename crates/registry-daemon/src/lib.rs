//! Registry Daemon library
//!
//! This module provides the core components for the registry daemon:
//! - REST API handlers for DOI-bearing entities and DOIs
//! - Configuration loading
//! - Server lifecycle management, including the registration worker

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError};
pub use server::Server;
