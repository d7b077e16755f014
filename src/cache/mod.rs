//! Delivery response cache.
//!
//! Caches delivery API responses and keeps them consistent with the CMS:
//!
//! - **Store**: per-key TTL entries with single-flight population
//! - **Dependency index**: which cached responses were built from which
//!   items, content types and taxonomy groups
//! - **Invalidation engine**: turns webhook notifications into purges
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `delivery-cache.toml`:
//!
//! ```toml
//! [cache]
//! default_ttl_seconds = 300
//! fetch_timeout_seconds = 30
//! full_purge_on_schema_change = true
//! # ... see config.rs for all options
//! ```

mod config;
mod digest;
mod engine;
mod error;
mod events;
mod keys;
mod lock;
mod planner;
mod registry;
mod store;

pub use config::CacheConfig;
pub use digest::{Digest, ResponseDigest};
pub use engine::{InvalidationEngine, InvalidationOutcome};
pub use error::CacheError;
pub use events::{ChangeKind, Epoch, Notification, NotificationQueue, QueuedNotification};
pub use keys::{CacheKey, Dependency, ItemIdentifier, Operation};
pub use planner::InvalidationPlan;
pub use registry::DependencyIndex;
pub use store::{CacheStore, CacheValue, Populated};
