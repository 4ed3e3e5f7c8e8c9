use core::fmt;

use crate::{OrganizationId, Reference};

/// An entity that predates the allocator and has no reference yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEntity<Id> {
    /// The entity's primary key in its own table.
    pub id: Id,
    /// Creation time, in any monotonic unit (typically Unix milliseconds).
    pub created_at: i64,
}

/// A table of entities that can be backfilled with references.
pub trait BackfillSource {
    /// Primary key type of the entities.
    type Id: fmt::Debug;
    /// Error raised by the underlying storage.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists the organization's entities that have no reference, oldest
    /// first. Ties on `created_at` should be broken by a stable key.
    ///
    /// # Errors
    /// Returns an error if the entities cannot be listed.
    fn pending(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<PendingEntity<Self::Id>>, Self::Error>;

    /// Sets the reference of entity `id` if, and only if, it still has none.
    ///
    /// Returns `true` if the reference was written.
    ///
    /// # Errors
    /// Returns an error if the entity cannot be updated.
    fn assign(&self, id: &Self::Id, reference: Reference) -> Result<bool, Self::Error>;
}
