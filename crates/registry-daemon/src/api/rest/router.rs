//! API Router configuration

use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, enable_cors: bool) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Datasets
        .route("/datasets", post(handlers::create_dataset))
        .route(
            "/datasets/:key",
            get(handlers::get_dataset)
                .put(handlers::update_dataset)
                .delete(handlers::delete_dataset),
        )
        // Downloads
        .route("/downloads", post(handlers::create_download))
        .route(
            "/downloads/:key",
            get(handlers::get_download)
                .put(handlers::update_download)
                .delete(handlers::delete_download),
        )
        // Derived datasets
        .route("/derived-datasets", post(handlers::create_derived_dataset))
        .route(
            "/derived-datasets/:key",
            get(handlers::get_derived_dataset).put(handlers::update_derived_dataset),
        )
        .route(
            "/derived-datasets/:key/target",
            put(handlers::update_derived_dataset_target),
        )
        // DOIs
        .route("/doi/gen/:kind", post(handlers::generate_doi))
        .route(
            "/doi/:prefix/*suffix",
            get(handlers::get_doi).delete(handlers::delete_doi),
        );

    let router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http());

    let router = if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::handlers::PRINCIPAL_HEADER;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use registry_doi::{
        DataCiteMetadataBuilder, DoiIssuer, DoiLifecycleService, MetadataBuilder, QueueDispatcher,
        RegistrationTargets, RegistryStores,
    };
    use registry_storage::InMemoryRegistryStorage;
    use registry_types::GbifPrefix;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let storage = InMemoryRegistryStorage::new();
        let prefix = GbifPrefix::new("10.5072").unwrap();
        let metadata: Arc<dyn MetadataBuilder> = Arc::new(DataCiteMetadataBuilder::default());
        let (dispatcher, _commands) = QueueDispatcher::new(
            prefix.clone(),
            metadata.clone(),
            RegistrationTargets::from_portal("https://www.gbif.org/").unwrap(),
            Vec::new(),
            16,
        );
        let issuer = DoiIssuer::new(prefix, storage.dois.clone(), 1000);
        let service = DoiLifecycleService::new(
            RegistryStores::from(&storage),
            issuer,
            metadata,
            Arc::new(dispatcher),
        );
        create_router(AppState::new(Arc::new(service)), true)
    }

    fn request(
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(PRINCIPAL_HEADER, user);
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_200() {
        let resp = test_router()
            .oneshot(request("GET", "/api/v1/health", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "healthy");
    }

    #[tokio::test]
    async fn create_without_principal_is_401() {
        let resp = test_router()
            .oneshot(request(
                "POST",
                "/api/v1/datasets",
                None,
                Some(serde_json::json!({ "title": "Birds" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn created_dataset_doi_can_be_looked_up() {
        let app = test_router();
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/v1/datasets",
                Some("alice"),
                Some(serde_json::json!({ "title": "Birds" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let created = json_body(resp).await;
        assert_eq!(created["created_by"], "alice");
        let doi = created["doi"].as_str().unwrap().to_string();
        assert!(doi.starts_with("10.5072/"));

        let resp = app
            .oneshot(request("GET", &format!("/api/v1/doi/{}", doi), None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let record = json_body(resp).await;
        assert_eq!(record["data"]["status"], "NEW");
        assert_eq!(record["kind"], "DATASET");
    }

    #[tokio::test]
    async fn generate_doi_by_kind() {
        let app = test_router();
        let resp = app
            .clone()
            .oneshot(request("POST", "/api/v1/doi/gen/download", Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let generated = json_body(resp).await;
        assert!(generated["doi"].as_str().unwrap().starts_with("10.5072/dl."));

        let resp = app
            .oneshot(request("POST", "/api/v1/doi/gen/spaceship", Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_doi_is_accepted_or_not_found() {
        let app = test_router();
        let resp = app
            .clone()
            .oneshot(request("POST", "/api/v1/doi/gen/dataset", Some("alice"), None))
            .await
            .unwrap();
        let doi = json_body(resp).await["doi"].as_str().unwrap().to_string();

        let resp = app
            .clone()
            .oneshot(request("DELETE", &format!("/api/v1/doi/{}", doi), Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = app
            .oneshot(request("DELETE", "/api/v1/doi/10.5072/missing", Some("alice"), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mismatched_update_key_is_400() {
        let app = test_router();
        let resp = app
            .oneshot(request(
                "PUT",
                "/api/v1/datasets/00000000-0000-0000-0000-000000000000",
                Some("alice"),
                Some(serde_json::json!({
                    "key": "11111111-1111-1111-1111-111111111111",
                    "title": "Birds"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
