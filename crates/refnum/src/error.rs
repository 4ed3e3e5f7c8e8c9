use crate::{CounterKey, OrganizationId, Reference, StoreError};

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A boxed, thread-safe error used to carry caller-side failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All error variants the allocator can emit.
///
/// Only [`Error::AllocationFailed`] and [`Error::PersistFailed`] are worth
/// retrying, and only by re-running the whole entity creation: the allocator
/// itself never retries. [`Error::InvariantViolated`] is a defect.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The counter store could not perform the atomic increment (store
    /// unreachable, lock poisoned, counter exhausted, ...).
    #[error("allocation failed for {key}: {source}")]
    AllocationFailed {
        /// The counter that could not be incremented.
        key: CounterKey,
        /// The underlying store failure.
        source: StoreError,
    },

    /// The organization identifier is blank.
    #[error("organization identifier must not be blank")]
    InvalidOrganization,

    /// A reference was allocated but persisting the entity failed. The
    /// allocated value is consumed and will not be issued again.
    #[error("persisting entity {reference} failed: {source}")]
    PersistFailed {
        /// The reference that was allocated and is now skipped.
        reference: Reference,
        /// The persistence failure reported by the caller.
        source: BoxError,
    },

    /// Persisting an entity hit the entity-level uniqueness constraint on its
    /// reference. Allocation is supposed to make this impossible, so it means
    /// the atomicity guarantee of the counter store was broken.
    #[error("reference {reference} already exists in organization {organization}")]
    InvariantViolated {
        /// The organization whose reference space collided.
        organization: OrganizationId,
        /// The colliding reference.
        reference: Reference,
    },

    /// The backfill source failed to list or update entities.
    #[error("backfill source failed: {0}")]
    Backfill(#[source] BoxError),
}

/// Failure reported by the caller's persistence step inside
/// [`ReferenceAllocator::create_with`](crate::ReferenceAllocator::create_with).
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The entity table already holds this reference.
    #[error("reference {0} is already taken")]
    DuplicateReference(Reference),

    /// Any other persistence failure. The transaction was rolled back.
    #[error(transparent)]
    Failed(BoxError),
}

impl PersistError {
    /// Wraps an arbitrary persistence failure.
    pub fn failed(err: impl Into<BoxError>) -> Self {
        Self::Failed(err.into())
    }
}
