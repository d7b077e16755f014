use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Shared-read access to a cache structure, recovering from poisoning.
pub(crate) fn read<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(component, op, "rwlock.read");
        poisoned.into_inner()
    })
}

/// Exclusive access to a cache structure, recovering from poisoning.
pub(crate) fn write<'a, T>(
    lock: &'a RwLock<T>,
    component: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(component, op, "rwlock.write");
        poisoned.into_inner()
    })
}

pub(crate) fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    component: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        report_poisoned(component, op, "mutex.lock");
        poisoned.into_inner()
    })
}

fn report_poisoned(component: &'static str, op: &'static str, lock_kind: &'static str) {
    // A panicking writer may have left a half-applied update behind. Entries
    // that turn out stale are bounded by their TTL.
    warn!(
        op,
        component,
        lock_kind,
        result = "poisoned_recovered",
        "Recovered from poisoned cache lock"
    );
}
