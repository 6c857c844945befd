//! API request handlers

mod datasets;
mod derived_datasets;
mod dois;
mod downloads;
mod health;

pub use datasets::*;
pub use derived_datasets::*;
pub use dois::*;
pub use downloads::*;
pub use health::*;

use axum::http::HeaderMap;
use registry_doi::Principal;

/// Header carrying the user authenticated by the fronting proxy
pub const PRINCIPAL_HEADER: &str = "x-registry-user";

/// Caller named by [`PRINCIPAL_HEADER`], if any
pub(crate) fn principal(headers: &HeaderMap) -> Option<Principal> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Principal::new)
}
