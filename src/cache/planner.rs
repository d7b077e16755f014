//! Invalidation plan generation.
//!
//! Merges a batch of notifications into one set of purge actions.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use uuid::Uuid;

use super::config::CacheConfig;
use super::events::{ChangeKind, Notification};
use super::keys::Dependency;

/// Purge actions for one batch of notifications.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Dependencies whose dependent keys must be purged.
    pub dependencies: BTreeSet<Dependency>,
    /// Item codenames whose single-item lookups must be purged by key.
    pub direct_lookups: BTreeSet<String>,
    /// Type and taxonomy changes handled without a full purge. Keys with
    /// untyped content are purged alongside them.
    pub schema_changes: BTreeSet<Dependency>,
    /// Drop the whole cache.
    pub purge_all: bool,
    /// Notifications merged into this plan after deduplication.
    pub notification_count: usize,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ notifications: {}, dependencies: {}, direct_lookups: {}, \
             schema_changes: {}, purge_all: {} }}",
            self.notification_count,
            self.dependencies.len(),
            self.direct_lookups.len(),
            self.schema_changes.len(),
            self.purge_all,
        )
    }
}

impl InvalidationPlan {
    /// Merge notifications into a plan.
    ///
    /// - Deduplicates by notification id
    /// - Removal of an item also purges its single-item lookups by key
    /// - Schema changes purge everything unless partial purge is configured
    pub fn from_notifications(
        notifications: impl IntoIterator<Item = Notification>,
        config: &CacheConfig,
    ) -> Self {
        let mut plan = Self::default();
        let mut seen_ids: HashSet<Uuid> = HashSet::new();

        for notification in notifications {
            if !seen_ids.insert(notification.id) {
                continue;
            }
            plan.notification_count += 1;

            let dependency = notification.dependency();
            match notification.kind {
                ChangeKind::TypeChanged | ChangeKind::TaxonomyChanged => {
                    if config.full_purge_on_schema_change {
                        plan.purge_all = true;
                    } else {
                        plan.schema_changes.insert(dependency.clone());
                        if notification.kind == ChangeKind::TypeChanged {
                            plan.dependencies
                                .insert(Dependency::type_listing(notification.codename.clone()));
                        }
                    }
                }
                ChangeKind::Deleted | ChangeKind::Unpublished => {
                    plan.direct_lookups.insert(notification.codename.clone());
                }
                ChangeKind::Published | ChangeKind::Upserted => {
                    if config.cascade_to_type_listings
                        && let Some(content_type) = &notification.content_type
                    {
                        plan.dependencies
                            .insert(Dependency::type_listing(content_type.clone()));
                    }
                }
            }
            plan.dependencies.insert(dependency);
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        !self.purge_all
            && self.dependencies.is_empty()
            && self.direct_lookups.is_empty()
            && self.schema_changes.is_empty()
    }
}
