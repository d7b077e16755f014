//! CMS webhook payload decoding.
//!
//! Turns the JSON body of a content webhook into [`Notification`]s. Message
//! ids are stable across redeliveries, so notification ids are derived from
//! them and a replayed webhook deduplicates in the planner.

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::cache::{ChangeKind, Notification};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook payload is not valid json: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("webhook payload names no content")]
    Empty,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub message: WebhookMessage,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub operation: String,
    #[serde(default)]
    pub created_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub items: Vec<WebhookItem>,
    #[serde(default)]
    pub taxonomies: Vec<WebhookCodename>,
    #[serde(default)]
    pub types: Vec<WebhookCodename>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookItem {
    pub codename: String,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookCodename {
    pub codename: String,
}

impl WebhookPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Change kind for item messages of this operation.
    fn item_change(&self) -> ChangeKind {
        match self.message.operation.as_str() {
            "publish" => ChangeKind::Published,
            "unpublish" => ChangeKind::Unpublished,
            "archive" | "delete" => ChangeKind::Deleted,
            _ => ChangeKind::Upserted,
        }
    }

    fn timestamp(&self) -> OffsetDateTime {
        self.message
            .created_timestamp
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
            .unwrap_or_else(OffsetDateTime::now_utc)
    }

    fn namespace(&self) -> Option<Uuid> {
        self.message.id.as_deref().map(|id| {
            Uuid::parse_str(id).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()))
        })
    }

    /// One notification per item, taxonomy group or content type named.
    pub fn into_notifications(self) -> Result<Vec<Notification>, WebhookError> {
        let timestamp = self.timestamp();
        let namespace = self.namespace();
        let notification = |codename: &str, kind: ChangeKind| {
            let base = Notification::new(codename, kind).with_timestamp(timestamp);
            match namespace {
                Some(namespace) => base.with_id(Uuid::new_v5(
                    &namespace,
                    format!("{codename}|{}", kind.as_str()).as_bytes(),
                )),
                None => base,
            }
        };

        let mut notifications = Vec::new();
        match self.message.message_type.as_str() {
            "taxonomy" => {
                for taxonomy in &self.data.taxonomies {
                    notifications.push(notification(&taxonomy.codename, ChangeKind::TaxonomyChanged));
                }
            }
            "content_type" => {
                for content_type in &self.data.types {
                    notifications.push(notification(&content_type.codename, ChangeKind::TypeChanged));
                }
            }
            _ => {
                let kind = self.item_change();
                for item in &self.data.items {
                    let mut item_notification = notification(&item.codename, kind);
                    item_notification.content_type = item.content_type.clone();
                    notifications.push(item_notification);
                }
                for taxonomy in &self.data.taxonomies {
                    notifications.push(notification(&taxonomy.codename, ChangeKind::TaxonomyChanged));
                }
            }
        }

        if notifications.is_empty() {
            return Err(WebhookError::Empty);
        }
        Ok(notifications)
    }
}

/// Decode a webhook body into notifications.
pub fn decode_notifications(body: &[u8]) -> Result<Vec<Notification>, WebhookError> {
    WebhookPayload::from_slice(body)?.into_notifications()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).expect("serialize")
    }

    #[test]
    fn publish_of_items() {
        let payload = body(json!({
            "data": {
                "items": [
                    { "id": "1", "codename": "on_roasts", "language": "en-US", "type": "article" },
                    { "id": "2", "codename": "cafe_prague", "language": "en-US", "type": "cafe" }
                ]
            },
            "message": {
                "id": "e2b94fca-3a6a-4c27-8b6e-0d8a1c5f0a11",
                "type": "content_item_variant",
                "operation": "publish",
                "created_timestamp": "2019-07-18T15:07:17.6823904Z"
            }
        }));

        let notifications = decode_notifications(&payload).expect("decodes");

        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].codename, "on_roasts");
        assert_eq!(notifications[0].kind, ChangeKind::Published);
        assert_eq!(notifications[0].content_type.as_deref(), Some("article"));
        assert_eq!(notifications[0].timestamp.year(), 2019);
    }

    #[test]
    fn redelivery_keeps_notification_ids() {
        let payload = body(json!({
            "data": { "items": [{ "codename": "home" }] },
            "message": { "id": "delivery-42", "type": "content_item_variant", "operation": "archive" }
        }));

        let first = decode_notifications(&payload).expect("decodes");
        let second = decode_notifications(&payload).expect("decodes");

        assert_eq!(first[0].kind, ChangeKind::Deleted);
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn operation_mapping() {
        for (operation, kind) in [
            ("unpublish", ChangeKind::Unpublished),
            ("delete", ChangeKind::Deleted),
            ("upsert", ChangeKind::Upserted),
            ("change_workflow_step", ChangeKind::Upserted),
        ] {
            let payload = body(json!({
                "data": { "items": [{ "codename": "home" }] },
                "message": { "type": "content_item_variant", "operation": operation }
            }));
            assert_eq!(decode_notifications(&payload).expect("decodes")[0].kind, kind);
        }
    }

    #[test]
    fn schema_messages() {
        let taxonomy = body(json!({
            "data": { "taxonomies": [{ "codename": "personas" }] },
            "message": { "type": "taxonomy", "operation": "upsert" }
        }));
        let notifications = decode_notifications(&taxonomy).expect("decodes");
        assert_eq!(notifications[0].kind, ChangeKind::TaxonomyChanged);

        let content_type = body(json!({
            "data": { "types": [{ "codename": "article" }] },
            "message": { "type": "content_type", "operation": "upsert" }
        }));
        let notifications = decode_notifications(&content_type).expect("decodes");
        assert_eq!(notifications[0].kind, ChangeKind::TypeChanged);
        assert_eq!(notifications[0].codename, "article");
    }

    #[test]
    fn rejects_malformed_and_empty_payloads() {
        assert!(matches!(
            decode_notifications(b"not json"),
            Err(WebhookError::Malformed(_))
        ));

        let empty = body(json!({
            "data": { "items": [] },
            "message": { "type": "content_item_variant", "operation": "publish" }
        }));
        assert!(matches!(decode_notifications(&empty), Err(WebhookError::Empty)));
    }
}
