use std::sync::Arc;

use crate::{CounterKey, EntityType, OrganizationId, StoreError};

/// A durable (or in-memory) home for per-key reference counters.
///
/// Implementations must make [`CounterStore::increment`] a single atomic
/// increment-or-insert: two callers racing on the same key, in the same
/// process or in different ones, must never observe the same value. A
/// "read the current value, add one, write it back" sequence does not
/// satisfy this contract.
pub trait CounterStore: Send + Sync {
    /// Atomically increments the counter for `key` and returns the new value.
    ///
    /// The first call for a key creates the counter and returns `1`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable, a lock is
    /// poisoned, or the counter cannot be incremented without overflowing.
    /// In all error cases the counter is left untouched or advanced, never
    /// rolled back.
    fn increment(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Returns the last value issued for `key`, or `None` if nothing has
    /// been allocated for it yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError>;

    /// Returns the last issued value of every counter an organization owns,
    /// ordered by entity type.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be read.
    fn counters(&self, organization: &OrganizationId) -> Result<Vec<(EntityType, u64)>, StoreError> {
        let mut out = Vec::new();
        for entity_type in EntityType::ALL {
            let key = CounterKey::new(organization.clone(), entity_type);
            if let Some(value) = self.current(&key)? {
                out.push((entity_type, value));
            }
        }
        Ok(out)
    }
}

impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        (**self).increment(key)
    }

    fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError> {
        (**self).current(key)
    }

    fn counters(&self, organization: &OrganizationId) -> Result<Vec<(EntityType, u64)>, StoreError> {
        (**self).counters(organization)
    }
}
