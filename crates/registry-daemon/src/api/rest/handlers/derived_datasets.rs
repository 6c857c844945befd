//! Derived dataset handlers

use super::principal;
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use registry_types::DerivedDataset;
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

/// Change target request
#[derive(Debug, Deserialize)]
pub struct UpdateTargetRequest {
    pub target: Url,
}

pub async fn get_derived_dataset(
    State(state): State<AppState>,
    Path(key): Path<Uuid>,
) -> ApiResult<Json<DerivedDataset>> {
    Ok(Json(state.service.get_derived_dataset(key).await?))
}

pub async fn create_derived_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(derived): Json<DerivedDataset>,
) -> ApiResult<(StatusCode, Json<DerivedDataset>)> {
    let caller = principal(&headers);
    let created = state
        .service
        .create_derived_dataset(caller.as_ref(), derived)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_derived_dataset(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
    Json(derived): Json<DerivedDataset>,
) -> ApiResult<Json<DerivedDataset>> {
    if derived.key != key {
        return Err(ApiError::BadRequest(format!(
            "Derived dataset key {} does not match path {}",
            derived.key, key
        )));
    }
    let caller = principal(&headers);
    Ok(Json(
        state
            .service
            .update_derived_dataset(caller.as_ref(), derived)
            .await?,
    ))
}

/// Point the DOI at a new location; only registered DOIs can move
pub async fn update_derived_dataset_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(key): Path<Uuid>,
    Json(request): Json<UpdateTargetRequest>,
) -> ApiResult<Json<DerivedDataset>> {
    let caller = principal(&headers);
    Ok(Json(
        state
            .service
            .update_derived_dataset_target(caller.as_ref(), key, request.target)
            .await?,
    ))
}
