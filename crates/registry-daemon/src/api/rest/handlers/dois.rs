//! DOI handlers

use super::principal;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use registry_types::{Doi, DoiKind, DoiRecord};
use serde::Serialize;

/// Generate DOI response
#[derive(Debug, Serialize)]
pub struct GeneratedDoiResponse {
    pub doi: Doi,
}

fn parse_doi(prefix: &str, suffix: &str) -> ApiResult<Doi> {
    Doi::new(prefix, suffix).map_err(|e| ApiError::BadRequest(format!("Invalid DOI: {}", e)))
}

/// Reserve a new GBIF DOI of the given kind
pub async fn generate_doi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
) -> ApiResult<(StatusCode, Json<GeneratedDoiResponse>)> {
    let kind: DoiKind = kind.parse().map_err(ApiError::BadRequest)?;
    let caller = principal(&headers);
    let doi = state.service.generate_doi(caller.as_ref(), kind).await?;

    tracing::info!(doi = %doi, kind = %kind, "Generated DOI");
    Ok((StatusCode::CREATED, Json(GeneratedDoiResponse { doi })))
}

/// DOI status, target and last submitted metadata
pub async fn get_doi(
    State(state): State<AppState>,
    Path((prefix, suffix)): Path<(String, String)>,
) -> ApiResult<Json<DoiRecord>> {
    let doi = parse_doi(&prefix, &suffix)?;
    Ok(Json(state.service.get_doi(&doi).await?))
}

pub async fn delete_doi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((prefix, suffix)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let doi = parse_doi(&prefix, &suffix)?;
    let caller = principal(&headers);
    state.service.delete_doi(caller.as_ref(), &doi).await?;
    Ok(StatusCode::ACCEPTED)
}
