//! Webhook-driven invalidation.
//!
//! Drains notifications from the queue, merges them into an
//! [`InvalidationPlan`], resolves the affected keys through the dependency
//! index and purges them from the store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info, instrument};

use super::config::CacheConfig;
use super::events::{Epoch, Notification, NotificationQueue};
use super::keys::{CacheKey, Dependency};
use super::planner::InvalidationPlan;
use super::store::CacheStore;

const METRIC_CONSUME_MS: &str = "delivery_cache_consume_ms";

/// What one invalidation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationOutcome {
    pub notifications: usize,
    /// Keys selected for purging, cached or not.
    pub resolved_keys: usize,
    /// Entries that held a value when purged.
    pub purged_entries: usize,
    pub purge_all: bool,
}

/// Applies content change notifications to the cache.
pub struct InvalidationEngine {
    config: CacheConfig,
    store: CacheStore,
    queue: Arc<NotificationQueue>,
}

impl InvalidationEngine {
    pub fn new(config: CacheConfig, store: CacheStore, queue: Arc<NotificationQueue>) -> Self {
        Self {
            config,
            store,
            queue,
        }
    }

    /// Apply one notification immediately.
    ///
    /// Replays and notifications for content that was never cached are
    /// no-ops.
    #[instrument(skip(self, notification), fields(codename = %notification.codename, kind = notification.kind.as_str()))]
    pub fn handle(&self, notification: Notification) -> InvalidationOutcome {
        self.apply([notification])
    }

    /// Apply a batch of notifications immediately as one plan.
    ///
    /// Bypasses the queue, so its bound never drops part of the batch.
    pub fn apply(&self, notifications: impl IntoIterator<Item = Notification>) -> InvalidationOutcome {
        let plan = InvalidationPlan::from_notifications(notifications, &self.config);
        self.execute(&plan)
    }

    /// Queue a notification for the next consumption pass.
    pub fn enqueue(&self, notification: Notification) -> Epoch {
        self.queue.publish(notification)
    }

    /// Consume up to one batch of queued notifications.
    ///
    /// Returns `None` when the queue was empty.
    #[instrument(skip(self))]
    pub fn consume(&self) -> Option<InvalidationOutcome> {
        let batch = self.queue.drain(self.config.batch_limit());
        if batch.is_empty() {
            return None;
        }

        let first_epoch = batch.first().map(|queued| queued.epoch);
        let last_epoch = batch.last().map(|queued| queued.epoch);
        let plan = InvalidationPlan::from_notifications(
            batch.into_iter().map(|queued| queued.notification),
            &self.config,
        );

        info!(
            first_epoch,
            last_epoch,
            plan = %plan,
            "Invalidation consumption starting"
        );

        Some(self.execute(&plan))
    }

    /// Consume until the queue is empty.
    pub fn consume_all(&self) -> InvalidationOutcome {
        let mut total = InvalidationOutcome::default();
        while let Some(outcome) = self.consume() {
            total.notifications += outcome.notifications;
            total.resolved_keys += outcome.resolved_keys;
            total.purged_entries += outcome.purged_entries;
            total.purge_all |= outcome.purge_all;
        }
        total
    }

    /// Execute a plan against the store.
    ///
    /// In-flight fetches are fenced before dependents are resolved, so a fetch
    /// installing concurrently is either resolved here or discarded at
    /// install time.
    pub fn execute(&self, plan: &InvalidationPlan) -> InvalidationOutcome {
        let started_at = Instant::now();
        let mut outcome = InvalidationOutcome {
            notifications: plan.notification_count,
            purge_all: plan.purge_all,
            ..Default::default()
        };

        if plan.purge_all {
            outcome.purged_entries = self.store.purge_all();
        } else if !plan.is_empty() {
            let fenced: HashSet<Dependency> = plan
                .dependencies
                .iter()
                .chain(&plan.schema_changes)
                .cloned()
                .collect();
            self.store.fence(&fenced);

            let keys = self.resolve(plan);
            outcome.resolved_keys = keys.len();
            outcome.purged_entries = self.store.purge(&keys);
        }

        info!(
            notifications = outcome.notifications,
            resolved_keys = outcome.resolved_keys,
            purged_entries = outcome.purged_entries,
            purge_all = outcome.purge_all,
            "Invalidation complete"
        );
        histogram!(METRIC_CONSUME_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        outcome
    }

    fn resolve(&self, plan: &InvalidationPlan) -> HashSet<CacheKey> {
        let index = self.store.index();
        let mut keys = HashSet::new();

        for dependency in plan.dependencies.iter().chain(&plan.schema_changes) {
            let dependents = index.dependents_of(dependency);
            debug!(%dependency, dependents = dependents.len(), "Resolved dependents");
            keys.extend(dependents);
        }

        if !plan.schema_changes.is_empty() {
            keys.extend(index.untyped_keys());
        }

        for codename in &plan.direct_lookups {
            keys.extend(
                self.store
                    .keys_where(|key| key.is_item_lookup_for(codename)),
            );
        }

        keys
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::events::ChangeKind;
    use crate::cache::keys::Operation;
    use crate::cache::registry::DependencyIndex;
    use crate::cache::store::Populated;

    const TTL: Duration = Duration::from_secs(60);

    fn engine(config: CacheConfig) -> InvalidationEngine {
        let store = CacheStore::new(Arc::new(DependencyIndex::new()), None);
        InvalidationEngine::new(config, store, Arc::new(NotificationQueue::new()))
    }

    async fn populate(engine: &InvalidationEngine, key: &CacheKey, populated: Populated<()>) {
        engine
            .store()
            .get_or_populate(key.clone(), TTL, move || async move { Ok(populated) })
            .await
            .expect("populate");
    }

    #[tokio::test]
    async fn consume_empty_queue_returns_none() {
        let engine = engine(CacheConfig::default());
        assert!(engine.consume().is_none());
    }

    #[tokio::test]
    async fn consume_respects_batch_limit() {
        let engine = engine(CacheConfig {
            consume_batch_limit: 2,
            ..Default::default()
        });

        for index in 0..5 {
            engine.enqueue(Notification::new(format!("item_{index}"), ChangeKind::Upserted));
        }

        let outcome = engine.consume().expect("batch");
        assert_eq!(outcome.notifications, 2);
        assert_eq!(engine.queue().len(), 3);

        engine.consume_all();
        assert!(engine.queue().is_empty());
    }

    #[tokio::test]
    async fn deleted_item_purges_direct_lookups_without_links() {
        let engine = engine(CacheConfig::default());
        let lookup = CacheKey::build(Operation::GetItemJson, ["about_us", "depth=1"]);
        populate(&engine, &lookup, Populated::unlinked(())).await;

        let outcome = engine.handle(Notification::new("about_us", ChangeKind::Deleted));

        assert_eq!(outcome.purged_entries, 1);
        assert!(!engine.store().contains(&lookup));
    }

    #[tokio::test]
    async fn partial_schema_change_purges_group_and_untyped_keys() {
        let engine = engine(CacheConfig {
            full_purge_on_schema_change: false,
            ..Default::default()
        });
        let articles = CacheKey::build(Operation::GetItems, ["system.type=article"]);
        let untyped = CacheKey::build(Operation::GetItem, ["legacy"]);
        let cafes = CacheKey::build(Operation::GetItems, ["system.type=cafe"]);

        populate(
            &engine,
            &articles,
            Populated::unlinked(()).with_dependency(Dependency::content_type("article")),
        )
        .await;
        let mut legacy = Populated::unlinked(()).with_dependency(Dependency::item("legacy"));
        legacy.untyped = true;
        populate(&engine, &untyped, legacy).await;
        populate(
            &engine,
            &cafes,
            Populated::unlinked(()).with_dependency(Dependency::content_type("cafe")),
        )
        .await;

        let outcome = engine.handle(Notification::new("article", ChangeKind::TypeChanged));

        assert!(!outcome.purge_all);
        assert_eq!(outcome.purged_entries, 2);
        assert!(engine.store().contains(&cafes));
    }

    #[tokio::test]
    async fn apply_covers_batches_larger_than_the_queue_bound() {
        let store = CacheStore::new(Arc::new(DependencyIndex::new()), None);
        let config = CacheConfig {
            queue_limit: 2,
            ..Default::default()
        };
        let queue = Arc::new(NotificationQueue::with_limit(config.queue_bound()));
        let engine = InvalidationEngine::new(config, store, queue);

        let codenames = ["x1", "x2", "x3"];
        let keys = codenames.map(|codename| CacheKey::build(Operation::GetItem, [codename]));
        for (key, codename) in keys.iter().zip(codenames) {
            populate(
                &engine,
                key,
                Populated::unlinked(()).with_dependency(Dependency::item(codename)),
            )
            .await;
        }

        let outcome =
            engine.apply(codenames.map(|codename| Notification::new(codename, ChangeKind::Upserted)));

        assert_eq!(outcome.notifications, 3);
        assert_eq!(outcome.purged_entries, 3);
        assert!(keys.iter().all(|key| !engine.store().contains(key)));
        assert!(engine.queue().is_empty());
    }

    #[tokio::test]
    async fn full_schema_change_purges_everything() {
        let engine = engine(CacheConfig::default());
        let cafes = CacheKey::build(Operation::GetItems, ["system.type=cafe"]);
        populate(&engine, &cafes, Populated::unlinked(())).await;

        let outcome = engine.handle(Notification::new("personas", ChangeKind::TaxonomyChanged));

        assert!(outcome.purge_all);
        assert_eq!(outcome.purged_entries, 1);
        assert!(engine.store().is_empty());
    }
}
