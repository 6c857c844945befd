//! Download handlers

use super::principal;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use registry_types::Download;

pub async fn get_download(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ApiResult<Json<Download>> {
    Ok(Json(state.service.get_download(&key).await?))
}

pub async fn create_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(download): Json<Download>,
) -> ApiResult<(StatusCode, Json<Download>)> {
    let caller = principal(&headers);
    let created = state.service.create_download(caller.as_ref(), download).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a download, e.g. its status as the job progresses
pub async fn update_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
    Json(download): Json<Download>,
) -> ApiResult<Json<Download>> {
    if download.key != key {
        return Err(ApiError::BadRequest(format!(
            "Download key {} does not match path {}",
            download.key, key
        )));
    }
    let caller = principal(&headers);
    Ok(Json(state.service.update_download(caller.as_ref(), download).await?))
}

pub async fn delete_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> ApiResult<StatusCode> {
    let caller = principal(&headers);
    state.service.delete_download(caller.as_ref(), &key).await?;
    Ok(StatusCode::NO_CONTENT)
}
