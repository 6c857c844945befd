//! Dataset handlers

use super::principal;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use registry_types::Dataset;
use uuid::Uuid;

/// Get a dataset with its DOI and identifier history
pub async fn get_dataset(
    State(state): State<AppState>,
    Path(key): Path<Uuid>,
) -> ApiResult<Json<Dataset>> {
    Ok(Json(state.service.get_dataset(key).await?))
}

/// Create a dataset; a GBIF DOI is issued when none is given
pub async fn create_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dataset): Json<Dataset>,
) -> ApiResult<(StatusCode, Json<Dataset>)> {
    let caller = principal(&headers);
    let created = state.service.create_dataset(caller.as_ref(), dataset).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a dataset
pub async fn update_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
    Json(dataset): Json<Dataset>,
) -> ApiResult<Json<Dataset>> {
    if dataset.key != key {
        return Err(ApiError::BadRequest(format!(
            "Dataset key {} does not match path {}",
            dataset.key, key
        )));
    }
    let caller = principal(&headers);
    Ok(Json(state.service.update_dataset(caller.as_ref(), dataset).await?))
}

/// Delete a dataset; its GBIF DOI is scheduled for deletion
pub async fn delete_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let caller = principal(&headers);
    state.service.delete_dataset(caller.as_ref(), key).await?;
    Ok(StatusCode::NO_CONTENT)
}
