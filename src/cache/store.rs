//! Read-through response store.
//!
//! Every cached delivery response lives in one [`Slot`] keyed by its
//! [`CacheKey`]. A slot carries the cached entry, the in-flight fetch shared by
//! all concurrent readers, and the generation that fetch was started under.
//!
//! Ordering rules:
//!
//! - Lookups, flight starts, installs and purges of one key are serialized by
//!   the slot's shard lock. The dependency index is only updated while that
//!   lock is held, so index links always match the installed entry.
//! - Generations come from one store-wide counter. A fetch installs only if its
//!   slot still carries the generation it was started under. Purging removes
//!   the slot, so a purge issued mid-flight discards the late result.
//! - Fetches are not linked until they install. Invalidations that arrive
//!   meanwhile are recorded on the slot via [`CacheStore::fence`] and checked
//!   against the fetched dependencies at install time.

use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::delivery::DeliveryError;

use super::digest::ResponseDigest;
use super::error::CacheError;
use super::keys::{CacheKey, Dependency};
use super::registry::DependencyIndex;

const METRIC_HIT: &str = "delivery_cache_hit_total";
const METRIC_MISS: &str = "delivery_cache_miss_total";
const METRIC_PURGE: &str = "delivery_cache_purge_total";
const METRIC_DISCARDED: &str = "delivery_cache_discarded_total";

/// Type-erased cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

type Flight = Shared<BoxFuture<'static, Result<CacheValue, CacheError>>>;

/// A fetched value together with what it was built from.
#[derive(Debug, Clone)]
pub struct Populated<V> {
    pub value: V,
    pub dependencies: HashSet<Dependency>,
    /// The value embeds items of unknown content type.
    pub untyped: bool,
}

impl<V> Populated<V> {
    /// A value with no dependency links. It leaves the cache only by TTL or
    /// explicit purge.
    pub fn unlinked(value: V) -> Self {
        Self {
            value,
            dependencies: HashSet::new(),
            untyped: false,
        }
    }

    pub fn from_digest(value: V, digest: &ResponseDigest) -> Self {
        Self {
            value,
            dependencies: digest.dependencies().into_iter().collect(),
            untyped: digest.untyped,
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.insert(dependency);
        self
    }
}

struct CacheEntry {
    value: CacheValue,
    expires_at: Instant,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    entry: Option<CacheEntry>,
    flight: Option<Flight>,
    /// Dependencies invalidated while the current flight was running.
    fenced: HashSet<Dependency>,
}

impl Slot {
    fn is_vacant(&self) -> bool {
        self.entry.is_none() && self.flight.is_none()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|entry| entry.expires_at <= now)
    }

    fn fence_rejects(&self, dependencies: &HashSet<Dependency>, untyped: bool) -> bool {
        if self.fenced.is_empty() {
            return false;
        }
        if untyped && self.fenced.iter().any(Dependency::is_group) {
            return true;
        }
        !self.fenced.is_disjoint(dependencies)
    }
}

struct StoreInner {
    slots: DashMap<CacheKey, Slot>,
    index: Arc<DependencyIndex>,
    generations: AtomicU64,
    fetch_timeout: Option<Duration>,
}

impl StoreInner {
    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Install a fetched value unless the key was purged or fenced meanwhile.
    fn install(
        &self,
        key: &CacheKey,
        generation: u64,
        ttl: Duration,
        value: CacheValue,
        dependencies: HashSet<Dependency>,
        untyped: bool,
    ) -> bool {
        let installed = match self.slots.get_mut(key) {
            Some(mut slot) if slot.generation == generation => {
                slot.flight = None;
                if slot.fence_rejects(&dependencies, untyped) {
                    slot.fenced.clear();
                    false
                } else {
                    slot.fenced.clear();
                    slot.entry = Some(CacheEntry {
                        value,
                        expires_at: Instant::now() + ttl,
                    });
                    self.index.relink(key, dependencies, untyped);
                    true
                }
            }
            _ => false,
        };

        if installed {
            debug!(cache_key = %key, generation, "Cache entry populated");
        } else {
            counter!(METRIC_DISCARDED).increment(1);
            self.slots.remove_if(key, |_, slot| slot.is_vacant());
            debug!(
                cache_key = %key,
                generation,
                "Discarded fetch result invalidated while in flight"
            );
        }
        installed
    }

    /// Forget a failed flight so the next reader fetches again.
    fn abandon(&self, key: &CacheKey, generation: u64) {
        if let Some(mut slot) = self.slots.get_mut(key)
            && slot.generation == generation
        {
            slot.flight = None;
            slot.fenced.clear();
        }
        self.slots.remove_if(key, |_, slot| slot.is_vacant());
    }
}

/// Response cache with per-key TTL and single-flight population.
///
/// Cloning is cheap; clones share the same slots and dependency index.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
}

impl CacheStore {
    pub fn new(index: Arc<DependencyIndex>, fetch_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                slots: DashMap::new(),
                index,
                generations: AtomicU64::new(0),
                fetch_timeout,
            }),
        }
    }

    pub fn index(&self) -> &Arc<DependencyIndex> {
        &self.inner.index
    }

    /// Return the cached value for `key`, or populate it with `fetch`.
    ///
    /// Concurrent callers for a missing or expired key share one execution of
    /// `fetch` and receive its value or its error. Failures are not cached.
    /// Joining an in-flight fetch counts as a hit.
    pub async fn get_or_populate<V, F, Fut>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
    ) -> Result<Arc<V>, CacheError>
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Populated<V>, DeliveryError>> + Send + 'static,
    {
        let flight = {
            let mut slot = self.inner.slots.entry(key.clone()).or_default();

            if slot.is_expired(Instant::now()) {
                slot.entry = None;
                self.inner.index.unlink(&key);
                debug!(cache_key = %key, "Cache entry expired");
            }

            if let Some(entry) = &slot.entry {
                counter!(METRIC_HIT).increment(1);
                let value = Arc::clone(&entry.value);
                drop(slot);
                return downcast(key, value);
            }

            let joined = slot.flight.clone();
            if let Some(flight) = joined {
                counter!(METRIC_HIT).increment(1);
                debug!(cache_key = %key, "Joined in-flight fetch");
                flight
            } else {
                counter!(METRIC_MISS).increment(1);
                let generation = self.inner.next_generation();
                let flight = self.start_flight(key.clone(), generation, ttl, fetch);
                slot.generation = generation;
                slot.fenced.clear();
                slot.flight = Some(flight.clone());
                drop(slot);
                debug!(cache_key = %key, generation, "Cache miss, fetching");
                // The flight settles its slot even if every reader goes away.
                tokio::spawn(flight.clone());
                flight
            }
        };

        let value = flight.await?;
        downcast(key, value)
    }

    fn start_flight<V, F, Fut>(
        &self,
        key: CacheKey,
        generation: u64,
        ttl: Duration,
        fetch: F,
    ) -> Flight
    where
        V: Send + Sync + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Populated<V>, DeliveryError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let fetched = match inner.fetch_timeout {
                Some(after) => match tokio::time::timeout(after, fetch()).await {
                    Ok(result) => result,
                    Err(_) => {
                        inner.abandon(&key, generation);
                        warn!(cache_key = %key, ?after, "Delivery fetch timed out");
                        return Err(CacheError::Timeout { key, after });
                    }
                },
                None => fetch().await,
            };

            match fetched {
                Ok(Populated {
                    value,
                    dependencies,
                    untyped,
                }) => {
                    let value: CacheValue = Arc::new(value);
                    inner.install(
                        &key,
                        generation,
                        ttl,
                        Arc::clone(&value),
                        dependencies,
                        untyped,
                    );
                    Ok(value)
                }
                Err(error) => {
                    inner.abandon(&key, generation);
                    warn!(cache_key = %key, error = %error, "Delivery fetch failed");
                    Err(CacheError::from(error))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Remove the entries for `keys` and their dependency links.
    ///
    /// Absent keys are a no-op. Fetches in flight for a purged key keep
    /// serving their waiters but never install. Returns the number of
    /// entries that held a value.
    pub fn purge<'a>(&self, keys: impl IntoIterator<Item = &'a CacheKey>) -> usize {
        let mut purged = 0;
        for key in keys {
            match self.inner.slots.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    self.inner.index.unlink(key);
                    let (_, slot) = occupied.remove_entry();
                    if slot.entry.is_some() {
                        purged += 1;
                    }
                }
                Entry::Vacant(_vacant) => {
                    self.inner.index.unlink(key);
                }
            }
        }
        if purged > 0 {
            counter!(METRIC_PURGE).increment(purged as u64);
        }
        purged
    }

    /// Remove every entry and cancel installation of every in-flight fetch.
    pub fn purge_all(&self) -> usize {
        let mut purged = 0;
        self.inner.slots.retain(|key, slot| {
            self.inner.index.unlink(key);
            if slot.entry.is_some() {
                purged += 1;
            }
            false
        });
        if purged > 0 {
            counter!(METRIC_PURGE).increment(purged as u64);
        }
        purged
    }

    /// Record invalidated dependencies on every in-flight fetch.
    ///
    /// A fetch whose result turns out to depend on one of them is discarded
    /// instead of installed.
    pub fn fence(&self, dependencies: &HashSet<Dependency>) {
        if dependencies.is_empty() {
            return;
        }
        for mut slot in self.inner.slots.iter_mut() {
            if slot.flight.is_some() {
                slot.fenced.extend(dependencies.iter().cloned());
            }
        }
    }

    /// Drop expired entries and their links. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut swept = 0;
        self.inner.slots.retain(|key, slot| {
            if slot.is_expired(now) {
                slot.entry = None;
                self.inner.index.unlink(key);
                swept += 1;
            }
            !slot.is_vacant()
        });
        swept
    }

    /// Keys currently holding an entry or a fetch that match `predicate`.
    pub fn keys_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> HashSet<CacheKey> {
        self.inner
            .slots
            .iter()
            .filter(|slot| predicate(slot.key()))
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Whether `key` holds an unexpired entry.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.inner.slots.get(key).is_some_and(|slot| {
            slot.entry
                .as_ref()
                .is_some_and(|entry| entry.expires_at > now)
        })
    }

    /// Number of slots holding a value, expired or not.
    pub fn len(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.entry.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.flight.is_some())
            .count()
    }
}

fn downcast<V: Send + Sync + 'static>(key: CacheKey, value: CacheValue) -> Result<Arc<V>, CacheError> {
    value
        .downcast::<V>()
        .map_err(|_| CacheError::TypeMismatch { key })
}
