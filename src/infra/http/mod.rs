mod middleware;
mod webhooks;

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::info;

use crate::application::error::HttpError;
use crate::application::sitemap::{SitemapError, SitemapService};
use crate::cache::InvalidationEngine;
use crate::delivery::CachedDeliveryClient;

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct AppState {
    pub delivery: CachedDeliveryClient,
    pub engine: Arc<InvalidationEngine>,
    pub sitemap: Arc<SitemapService>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/content", post(webhooks::content_webhook))
        .route("/sitemap.xml", get(sitemap))
        .route("/_health", get(health))
        .route("/_cache/stats", get(cache_stats))
        .route("/_cache/purge", post(purge_cache))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

async fn sitemap(State(state): State<AppState>) -> Response {
    match state.sitemap.sitemap_xml().await {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(SitemapError::Items(err)) => HttpError::from(err).into_response(),
    }
}

async fn cache_stats(State(state): State<AppState>) -> Response {
    let store = state.delivery.store();
    Json(json!({
        "entries": store.len(),
        "in_flight": store.in_flight(),
        "dependencies": store.index().dependency_count(),
        "linked_keys": store.index().key_count(),
        "queued_notifications": state.engine.queue().len(),
    }))
    .into_response()
}

async fn purge_cache(State(state): State<AppState>) -> Response {
    let purged = state.delivery.store().purge_all();
    info!(target = "delivery_cache::http::cache", purged, "cache purged on request");
    StatusCode::NO_CONTENT.into_response()
}
