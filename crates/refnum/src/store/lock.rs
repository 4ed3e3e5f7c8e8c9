use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

use super::sync::{Mutex, lock};
use crate::{CounterKey, CounterStore, StoreError};

/// A lock-based, in-memory counter store for single-node deployments.
///
/// This store keeps every counter in one `HashMap` behind a [`Mutex`], so
/// each increment is a short critical section that serializes all callers of
/// the process.
///
/// ## Features
/// - ✅ Thread-safe
/// - ✅ Fair access across threads
/// - ❌ Shared across processes
/// - ❌ Durable
///
/// ## Recommended When
/// - You run a single application instance
/// - You need a deterministic fake in tests
///
/// ## See Also
/// - [`AtomicCounterStore`]
/// - [`SqliteCounterStore`]
///
/// [`AtomicCounterStore`]: crate::AtomicCounterStore
/// [`SqliteCounterStore`]: crate::SqliteCounterStore
#[derive(Debug, Default)]
pub struct LockCounterStore {
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<HashMap<CounterKey, u64>>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<HashMap<CounterKey, u64>>,
}

impl LockCounterStore {
    /// Creates an empty store. Every counter starts at `1` on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with the last issued value of some counters.
    ///
    /// This is primarily useful for tests and for restoring state exported
    /// from a durable store. The next allocation for a seeded key returns the
    /// seeded value plus one.
    ///
    /// # Example
    /// ```
    /// use refnum::{CounterKey, CounterStore, EntityType, LockCounterStore, OrganizationId};
    ///
    /// let key = CounterKey::new(OrganizationId::new("acme").unwrap(), EntityType::WorkItem);
    /// let store = LockCounterStore::with_counters([(key.clone(), 41)]);
    /// assert_eq!(store.increment(&key).unwrap(), 42);
    /// ```
    pub fn with_counters(counters: impl IntoIterator<Item = (CounterKey, u64)>) -> Self {
        let map: HashMap<_, _> = counters.into_iter().collect();
        Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(Mutex::new(map)),
            #[cfg(not(feature = "cache-padded"))]
            state: Mutex::new(map),
        }
    }
}

impl CounterStore for LockCounterStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let mut counters = lock(&self.state)?;
        if let Some(value) = counters.get_mut(key) {
            *value = value.checked_add(1).ok_or(StoreError::Overflow)?;
            return Ok(*value);
        }
        counters.insert(key.clone(), 1);
        Ok(1)
    }

    fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError> {
        Ok(lock(&self.state)?.get(key).copied())
    }
}
