use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

use crate::application::error::HttpError;
use crate::infra::webhook::decode_notifications;

use super::AppState;

/// Apply every notification in the payload as one invalidation pass.
pub(super) async fn content_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let notifications = match decode_notifications(&body) {
        Ok(notifications) => notifications,
        Err(err) => {
            return HttpError::from_error(
                "infra::http::webhooks::content_webhook",
                StatusCode::BAD_REQUEST,
                "Invalid webhook payload",
                &err,
            )
            .into_response();
        }
    };

    let received = notifications.len();
    let outcome = state.engine.apply(notifications);

    info!(
        target = "delivery_cache::http::webhooks",
        received,
        notifications = outcome.notifications,
        purged = outcome.purged_entries,
        purge_all = outcome.purge_all,
        "webhook applied"
    );

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "received": received,
            "notifications": outcome.notifications,
            "resolved_keys": outcome.resolved_keys,
            "purged_entries": outcome.purged_entries,
            "purge_all": outcome.purge_all,
        })),
    )
        .into_response()
}
