//! Content change notifications.
//!
//! Defines the notifications decoded from CMS webhooks and an in-memory queue
//! that holds them until the invalidation engine consumes them.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::keys::Dependency;
use super::lock;

const COMPONENT: &str = "notification_queue";
const METRIC_QUEUE_LEN: &str = "delivery_cache_notification_queue_len";
const METRIC_DROPPED: &str = "delivery_cache_notification_dropped_total";

/// Monotonic position of a notification within this process.
pub type Epoch = u64;

/// What happened to the content a notification names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Upserted,
    Deleted,
    Published,
    Unpublished,
    /// A content type's schema changed. The codename names the type.
    TypeChanged,
    /// A taxonomy group changed. The codename names the group.
    TaxonomyChanged,
}

impl ChangeKind {
    /// The item is gone from the delivery API after this change.
    pub fn removes_item(self) -> bool {
        matches!(self, ChangeKind::Deleted | ChangeKind::Unpublished)
    }

    pub fn is_schema_change(self) -> bool {
        matches!(self, ChangeKind::TypeChanged | ChangeKind::TaxonomyChanged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Upserted => "upserted",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Published => "published",
            ChangeKind::Unpublished => "unpublished",
            ChangeKind::TypeChanged => "type_changed",
            ChangeKind::TaxonomyChanged => "taxonomy_changed",
        }
    }
}

/// One change reported by the CMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Identity used to drop redelivered notifications.
    pub id: Uuid,
    /// Item codename, or the type / taxonomy group codename for schema changes.
    pub codename: String,
    pub kind: ChangeKind,
    pub timestamp: OffsetDateTime,
    /// Content type of the changed item, when the sender reports it.
    pub content_type: Option<String>,
}

impl Notification {
    pub fn new(codename: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            codename: codename.into(),
            kind,
            timestamp: OffsetDateTime::now_utc(),
            content_type: None,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The dependency this notification invalidates directly.
    pub fn dependency(&self) -> Dependency {
        match self.kind {
            ChangeKind::TypeChanged => Dependency::content_type(self.codename.clone()),
            ChangeKind::TaxonomyChanged => Dependency::taxonomy(self.codename.clone()),
            _ => Dependency::item(self.codename.clone()),
        }
    }
}

/// A queued notification with its arrival epoch.
#[derive(Debug, Clone)]
pub struct QueuedNotification {
    pub epoch: Epoch,
    pub notification: Notification,
}

/// In-memory FIFO of notifications awaiting consumption.
///
/// When bounded, the oldest notification is dropped on overflow. Dropped
/// notifications leave their entries to expire by TTL.
pub struct NotificationQueue {
    queue: Mutex<VecDeque<QueuedNotification>>,
    epoch_counter: AtomicU64,
    limit: Option<usize>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            epoch_counter: AtomicU64::new(0),
            limit: limit.map(|limit| limit.max(1)),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Enqueue a notification. Returns its epoch.
    pub fn publish(&self, notification: Notification) -> Epoch {
        let epoch = self.next_epoch();

        info!(
            notification_id = %notification.id,
            notification_epoch = epoch,
            codename = %notification.codename,
            kind = notification.kind.as_str(),
            "Notification enqueued"
        );

        let mut queue = lock::lock(&self.queue, COMPONENT, "publish");
        if let Some(limit) = self.limit {
            while queue.len() >= limit {
                if let Some(dropped) = queue.pop_front() {
                    counter!(METRIC_DROPPED).increment(1);
                    warn!(
                        notification_id = %dropped.notification.id,
                        notification_epoch = dropped.epoch,
                        limit,
                        "Notification queue full, dropped oldest notification"
                    );
                }
            }
        }
        queue.push_back(QueuedNotification {
            epoch,
            notification,
        });
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        epoch
    }

    /// Drain up to `limit` notifications in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<QueuedNotification> {
        let mut queue = lock::lock(&self.queue, COMPONENT, "drain");
        let count = limit.min(queue.len());
        let drained = queue.drain(..count).collect();
        gauge!(METRIC_QUEUE_LEN).set(queue.len() as f64);
        drained
    }

    pub fn len(&self) -> usize {
        lock::lock(&self.queue, COMPONENT, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}
