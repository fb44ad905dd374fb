//! Mirror builder and router

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::middleware;
use axum::response::{Json, Response};
use axum::routing::get;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::access::FilterChain;
use crate::config::MirrorConfig;
use crate::error::MirrorResult;
use crate::route::RegistryRoute;
use crate::storage::MirrorStorage;

/// Builder for the read-only mirror service
#[derive(Debug)]
pub struct MirrorBuilder {
    config: MirrorConfig,
    filters: Option<FilterChain>,
}

impl MirrorBuilder {
    /// Create a new mirror builder
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            filters: None,
        }
    }

    /// Replace the filter chain derived from the configuration
    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Build the mirror service
    ///
    /// Returns a Router that can be served with any tower-compatible server
    pub fn build(self) -> Router {
        let filters = self
            .filters
            .unwrap_or_else(|| FilterChain::from_config(&self.config));
        let storage = MirrorStorage::from(&self.config);

        Router::new()
            .route("/v2/", get(api_version_check))
            .route("/v2/{*path}", get(registry_request))
            .with_state(storage)
            .layer(middleware::from_fn_with_state(
                Arc::new(filters),
                crate::access::filter_requests,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
    }
}

/// API version check endpoint
///
/// Returns 200 OK to indicate the registry is available
async fn api_version_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({})))
}

/// Dispatch a blob or manifest request.
///
/// The raw path is parsed here rather than through axum's path extractor so
/// that nested repository names and percent-encoded separators are handled in
/// one place.
async fn registry_request(
    State(storage): State<MirrorStorage>,
    uri: Uri,
    headers: HeaderMap,
) -> MirrorResult<Response> {
    match RegistryRoute::parse(uri.path())? {
        RegistryRoute::Blob(blob) => {
            crate::blob::get_blob(&storage, &blob, &headers, uri.path()).await
        }
        RegistryRoute::Manifest(manifest) => {
            crate::manifest::get_manifest(&storage, &manifest).await
        }
    }
}
