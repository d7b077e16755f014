//! Bidirectional dependency index.
//!
//! Tracks which cached responses were built from which content, so a change
//! to one item, content type or taxonomy group finds every affected entry
//! with a single lookup.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{CacheKey, Dependency};
use super::lock;

const COMPONENT: &str = "dependency_index";

#[derive(Default)]
struct IndexState {
    /// Dependency to every key whose cached value was built from it.
    dependents: HashMap<Dependency, HashSet<CacheKey>>,
    /// Key to every dependency it was linked with.
    links: HashMap<CacheKey, HashSet<Dependency>>,
    /// Keys whose digest carried items without type metadata.
    untyped: HashSet<CacheKey>,
}

impl IndexState {
    fn detach(&mut self, key: &CacheKey) {
        self.untyped.remove(key);
        let Some(dependencies) = self.links.remove(key) else {
            return;
        };
        for dependency in dependencies {
            if let Some(keys) = self.dependents.get_mut(&dependency) {
                keys.remove(key);
                if keys.is_empty() {
                    self.dependents.remove(&dependency);
                }
            }
        }
    }

    fn attach(&mut self, key: &CacheKey, dependencies: impl IntoIterator<Item = Dependency>) {
        for dependency in dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(key.clone());
            self.links.entry(key.clone()).or_default().insert(dependency);
        }
    }
}

/// Tracks dependency → keys and key → dependencies mappings.
///
/// Both directions live behind one lock so every update is atomic with
/// respect to readers.
#[derive(Default)]
pub struct DependencyIndex {
    state: RwLock<IndexState>,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` to the dependent set of each dependency. Idempotent.
    pub fn link(&self, key: &CacheKey, dependencies: impl IntoIterator<Item = Dependency>) {
        let mut state = lock::write(&self.state, COMPONENT, "link");
        state.attach(key, dependencies);
    }

    /// Replace every link of `key` with `dependencies`.
    ///
    /// Used on re-population so the index reflects only the latest
    /// successful fetch for the key.
    pub fn relink(
        &self,
        key: &CacheKey,
        dependencies: impl IntoIterator<Item = Dependency>,
        untyped: bool,
    ) {
        let mut state = lock::write(&self.state, COMPONENT, "relink");
        state.detach(key);
        state.attach(key, dependencies);
        if untyped {
            state.untyped.insert(key.clone());
        }
    }

    /// Remove `key` from every dependent set it appears in.
    ///
    /// Dependencies left without dependents are dropped. Safe to call for a
    /// key that was never linked.
    pub fn unlink(&self, key: &CacheKey) {
        let mut state = lock::write(&self.state, COMPONENT, "unlink");
        state.detach(key);
    }

    /// Keys to purge for a direct change to `dependency`.
    pub fn dependents_of(&self, dependency: &Dependency) -> HashSet<CacheKey> {
        lock::read(&self.state, COMPONENT, "dependents_of")
            .dependents
            .get(dependency)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dependencies_of(&self, key: &CacheKey) -> HashSet<Dependency> {
        lock::read(&self.state, COMPONENT, "dependencies_of")
            .links
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Keys that a schema change may affect without the index knowing.
    pub fn untyped_keys(&self) -> HashSet<CacheKey> {
        lock::read(&self.state, COMPONENT, "untyped_keys")
            .untyped
            .clone()
    }

    pub fn clear(&self) {
        let mut state = lock::write(&self.state, COMPONENT, "clear");
        state.dependents.clear();
        state.links.clear();
        state.untyped.clear();
    }

    /// Number of dependencies with at least one dependent key.
    pub fn dependency_count(&self) -> usize {
        lock::read(&self.state, COMPONENT, "dependency_count")
            .dependents
            .len()
    }

    /// Number of keys with at least one link.
    pub fn key_count(&self) -> usize {
        lock::read(&self.state, COMPONENT, "key_count").links.len()
    }
}
