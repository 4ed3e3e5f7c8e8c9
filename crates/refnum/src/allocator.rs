use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    CounterKey, CounterStore, EntityType, Error, OrganizationId, PersistError, Reference, Result,
};

/// Issues per-organization, per-entity-type references such as `WI-123`.
///
/// The allocator is stateless: every call performs exactly one atomic
/// increment on the injected [`CounterStore`] and formats the result. All
/// mutual exclusion is delegated to the store, so any number of allocators,
/// in any number of processes, may share one durable store.
///
/// Cloning is cheap and clones share the same store.
///
/// # Example
/// ```
/// use refnum::{EntityType, LockCounterStore, OrganizationId, ReferenceAllocator};
///
/// let allocator = ReferenceAllocator::new(LockCounterStore::new());
/// let acme = OrganizationId::new("acme").unwrap();
///
/// let first = allocator.allocate(&acme, EntityType::WorkItem).unwrap();
/// let second = allocator.allocate(&acme, EntityType::WorkItem).unwrap();
/// assert_eq!(first.to_string(), "WI-1");
/// assert_eq!(second.to_string(), "WI-2");
/// ```
#[derive(Debug)]
pub struct ReferenceAllocator<S> {
    store: Arc<S>,
}

impl<S> Clone for ReferenceAllocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ReferenceAllocator<S>
where
    S: CounterStore,
{
    /// Creates an allocator that owns `store`.
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    /// Creates an allocator over a store that is shared with other code.
    pub const fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the backing counter store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Allocates the next reference for `(organization, entity_type)`.
    ///
    /// The returned value is exactly one greater than the previous value
    /// issued for the pair (starting at `1`), and is never issued again, even
    /// if the caller fails to persist the entity that was meant to carry it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the store cannot perform the
    /// increment. The allocator does not retry; the caller should abort its
    /// entity creation and retry it as a whole.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn allocate(
        &self,
        organization: &OrganizationId,
        entity_type: EntityType,
    ) -> Result<Reference> {
        let key = CounterKey::new(organization.clone(), entity_type);
        match self.store.increment(&key) {
            Ok(value) => {
                let reference = Reference::new(entity_type, value);
                #[cfg(feature = "tracing")]
                tracing::trace!(%reference, "allocated");
                Ok(reference)
            }
            Err(source) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%key, error = %source, "reference allocation failed");
                Err(Error::AllocationFailed { key, source })
            }
        }
    }

    /// Returns the last reference issued for `(organization, entity_type)`,
    /// or `None` if nothing has been allocated for the pair yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the store cannot be read.
    pub fn last_issued(
        &self,
        organization: &OrganizationId,
        entity_type: EntityType,
    ) -> Result<Option<Reference>> {
        let key = CounterKey::new(organization.clone(), entity_type);
        match self.store.current(&key) {
            Ok(value) => Ok(value.map(|v| Reference::new(entity_type, v))),
            Err(source) => Err(Error::AllocationFailed { key, source }),
        }
    }

    /// Allocates a reference and hands it to `persist`, the caller's entity
    /// creation step, as one unit of work.
    ///
    /// - On success the value returned by `persist` is passed through.
    /// - If `persist` fails, the allocated value is consumed (a gap in the
    ///   sequence) and [`Error::PersistFailed`] is returned. Retrying the
    ///   whole call allocates the next value.
    /// - If `persist` reports that the reference already exists, the
    ///   uniqueness guarantee of the store was broken. This is logged as a
    ///   defect and returned as [`Error::InvariantViolated`]; it must not be
    ///   retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`], [`Error::PersistFailed`] or
    /// [`Error::InvariantViolated`] as described above.
    ///
    /// # Example
    /// ```
    /// use refnum::{EntityType, LockCounterStore, OrganizationId, PersistError, ReferenceAllocator};
    ///
    /// let allocator = ReferenceAllocator::new(LockCounterStore::new());
    /// let acme = OrganizationId::new("acme").unwrap();
    ///
    /// let failed = allocator.create_with(&acme, EntityType::Objective, |_| {
    ///     Err::<(), _>(PersistError::failed("database went away"))
    /// });
    /// assert!(failed.is_err());
    ///
    /// let title = allocator
    ///     .create_with(&acme, EntityType::Objective, |reference| {
    ///         Ok(format!("{reference}: grow revenue"))
    ///     })
    ///     .unwrap();
    /// assert_eq!(title, "O-2: grow revenue");
    /// ```
    pub fn create_with<T, F>(
        &self,
        organization: &OrganizationId,
        entity_type: EntityType,
        persist: F,
    ) -> Result<T>
    where
        F: FnOnce(Reference) -> Result<T, PersistError>,
    {
        let reference = self.allocate(organization, entity_type)?;
        match persist(reference) {
            Ok(created) => Ok(created),
            Err(PersistError::DuplicateReference(existing)) => {
                #[cfg(feature = "tracing")]
                tracing::error!(
                    organization = %organization,
                    reference = %existing,
                    "reference uniqueness violated: counter store issued a value twice"
                );
                Err(Error::InvariantViolated {
                    organization: organization.clone(),
                    reference: existing,
                })
            }
            Err(PersistError::Failed(source)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%reference, error = %source, "entity not persisted, reference skipped");
                Err(Error::PersistFailed { reference, source })
            }
        }
    }
}

#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
#[cfg(feature = "async-tokio")]
impl<S> ReferenceAllocator<S>
where
    S: CounterStore + 'static,
{
    /// Async counterpart of [`Self::allocate`].
    ///
    /// Store increments may block on I/O or on a database lock, so the call
    /// runs on Tokio's blocking thread pool and the calling task only awaits
    /// its completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailed`] if the store fails or the blocking
    /// task is cancelled or panics.
    pub async fn allocate_async(
        &self,
        organization: &OrganizationId,
        entity_type: EntityType,
    ) -> Result<Reference> {
        let this = self.clone();
        let org = organization.clone();
        match tokio::task::spawn_blocking(move || this.allocate(&org, entity_type)).await {
            Ok(result) => result,
            Err(join) => Err(Error::AllocationFailed {
                key: CounterKey::new(organization.clone(), entity_type),
                source: crate::StoreError::Unavailable(join.to_string()),
            }),
        }
    }
}

#[cfg(all(test, feature = "lock"))]
mod tests {
    use std::{collections::HashSet, sync::Mutex, thread::scope};

    use super::*;
    use crate::{LockCounterStore, StoreError};

    fn org(id: &str) -> OrganizationId {
        OrganizationId::new(id).unwrap()
    }

    /// A store whose next `failures` increments fail, as if unreachable.
    #[derive(Default)]
    struct FlakyStore {
        inner: LockCounterStore,
        failures: Mutex<usize>,
    }

    impl CounterStore for FlakyStore {
        fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            self.inner.increment(key)
        }

        fn current(&self, key: &CounterKey) -> Result<Option<u64>, StoreError> {
            self.inner.current(key)
        }
    }

    #[test]
    fn allocates_strictly_increasing_from_one() {
        let allocator = ReferenceAllocator::new(LockCounterStore::new());
        let acme = org("acme");
        let values: Vec<u64> = (0..10)
            .map(|_| allocator.allocate(&acme, EntityType::WorkItem).unwrap().value())
            .collect();
        assert_eq!(values, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn formats_with_entity_prefix() {
        let key = CounterKey::new(org("acme"), EntityType::WorkItem);
        let allocator = ReferenceAllocator::new(LockCounterStore::with_counters([(key, 122)]));
        let reference = allocator.allocate(&org("acme"), EntityType::WorkItem).unwrap();
        assert_eq!(reference.to_string(), "WI-123");

        let key = CounterKey::new(org("acme"), EntityType::Objective);
        let allocator = ReferenceAllocator::new(LockCounterStore::with_counters([(key, 6)]));
        let reference = allocator.allocate(&org("acme"), EntityType::Objective).unwrap();
        assert_eq!(reference.to_string(), "O-7");
    }

    #[test]
    fn keys_do_not_affect_each_other() {
        let allocator = ReferenceAllocator::new(LockCounterStore::new());
        let (acme, globex) = (org("acme"), org("globex"));

        for _ in 0..3 {
            allocator.allocate(&acme, EntityType::WorkItem).unwrap();
        }
        assert_eq!(
            allocator.allocate(&globex, EntityType::WorkItem).unwrap().to_string(),
            "WI-1"
        );
        assert_eq!(
            allocator.allocate(&acme, EntityType::KeyResult).unwrap().to_string(),
            "KR-1"
        );
        assert_eq!(
            allocator.last_issued(&acme, EntityType::WorkItem).unwrap(),
            Some(Reference::new(EntityType::WorkItem, 3))
        );
        assert_eq!(allocator.last_issued(&globex, EntityType::Feature).unwrap(), None);
    }

    #[test]
    fn concurrent_allocations_are_distinct() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let allocator = ReferenceAllocator::new(LockCounterStore::new());
        let acme = org("acme");
        let seen = Mutex::new(HashSet::new());

        scope(|s| {
            for _ in 0..THREADS {
                let allocator = allocator.clone();
                let (acme, seen) = (&acme, &seen);
                s.spawn(move || {
                    for _ in 0..PER_THREAD {
                        let reference = allocator.allocate(acme, EntityType::Feature).unwrap();
                        assert!(seen.lock().unwrap().insert(reference));
                    }
                });
            }
        });

        assert_eq!(seen.into_inner().unwrap().len(), THREADS * PER_THREAD);
    }

    #[test]
    fn store_failure_surfaces_as_allocation_failed() {
        let store = FlakyStore {
            failures: Mutex::new(1),
            ..FlakyStore::default()
        };
        let allocator = ReferenceAllocator::new(store);
        let acme = org("acme");

        let err = allocator.allocate(&acme, EntityType::WorkItem).unwrap_err();
        assert!(matches!(
            err,
            Error::AllocationFailed {
                ref key,
                source: StoreError::Unavailable(_),
            } if key.entity_type == EntityType::WorkItem
        ));

        // No internal retry happened; the caller's retry gets the first value.
        assert_eq!(
            allocator.allocate(&acme, EntityType::WorkItem).unwrap().value(),
            1
        );
    }

    #[test]
    fn failed_persistence_skips_values() {
        let key = CounterKey::new(org("acme"), EntityType::WorkItem);
        let allocator = ReferenceAllocator::new(LockCounterStore::with_counters([(key, 41)]));
        let acme = org("acme");
        let persisted = Mutex::new(Vec::new());

        for _ in 0..2 {
            let err = allocator
                .create_with(&acme, EntityType::WorkItem, |_| {
                    Err::<(), _>(PersistError::failed("insert rolled back"))
                })
                .unwrap_err();
            assert!(matches!(err, Error::PersistFailed { .. }));
        }

        let reference = allocator
            .create_with(&acme, EntityType::WorkItem, |reference| {
                persisted.lock().unwrap().push(reference);
                Ok(reference)
            })
            .unwrap();

        // 42 and 43 were consumed by the failed attempts.
        assert_eq!(reference.to_string(), "WI-44");
        assert_eq!(persisted.into_inner().unwrap(), vec![reference]);
    }

    #[test]
    fn duplicate_reference_is_an_invariant_violation() {
        let allocator = ReferenceAllocator::new(LockCounterStore::new());
        let acme = org("acme");

        let err = allocator
            .create_with(&acme, EntityType::KeyResult, |reference| {
                Err::<(), _>(PersistError::DuplicateReference(reference))
            })
            .unwrap_err();

        match err {
            Error::InvariantViolated {
                organization,
                reference,
            } => {
                assert_eq!(organization, acme);
                assert_eq!(reference.to_string(), "KR-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "async-tokio")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn async_allocations_are_distinct() {
        let allocator = ReferenceAllocator::new(LockCounterStore::new());
        let acme = org("acme");

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let allocator = allocator.clone();
                let acme = acme.clone();
                tokio::spawn(async move {
                    allocator
                        .allocate_async(&acme, EntityType::Objective)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            values.push(handle.await.unwrap().value());
        }
        values.sort_unstable();
        assert_eq!(values, (1..=64).collect::<Vec<_>>());
    }
}
