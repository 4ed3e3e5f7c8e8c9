mod interface;
#[cfg(feature = "sqlite")]
mod sqlite;
#[cfg(all(test, feature = "lock"))]
mod tests;

pub use interface::*;
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
#[cfg(feature = "sqlite")]
pub use sqlite::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{CounterStore, EntityType, Error, OrganizationId, ReferenceAllocator, Result};

/// Outcome of one [`backfill`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Entities that lacked a reference when the run started.
    pub pending: usize,
    /// Entities that received a reference during this run.
    pub assigned: usize,
    /// Entities that gained a reference from someone else between the scan
    /// and the update. Their allocated value is skipped.
    pub raced: usize,
}

/// Retroactively assigns references to entities created before the
/// allocator existed.
///
/// Entities of one organization that have no reference yet are numbered in
/// creation order, oldest first, using the regular allocator so that later
/// allocations continue after the backfilled range. Entities that already
/// carry a reference are left alone, which makes the operation idempotent:
/// a second run finds nothing pending and allocates nothing.
///
/// Backfill is an offline, single-writer administrative task. Run it before
/// enforcing the entity-level uniqueness constraint, and do not run two
/// backfills against the same entity table at once.
///
/// # Errors
///
/// Returns [`Error::Backfill`] if the source cannot be read or updated, and
/// [`Error::AllocationFailed`] if the counter store fails. Entities updated
/// before the failure keep their references; re-running resumes with the
/// remaining ones.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(allocator, source, organization), fields(organization = %organization))
)]
pub fn backfill<S, B>(
    allocator: &ReferenceAllocator<S>,
    source: &B,
    organization: &OrganizationId,
    entity_type: EntityType,
) -> Result<BackfillReport>
where
    S: CounterStore,
    B: BackfillSource + ?Sized,
{
    let mut pending = source
        .pending(organization)
        .map_err(|e| Error::Backfill(Box::new(e)))?;
    // Sources are asked for creation order already; a stable sort keeps
    // their tie-break for equal timestamps.
    pending.sort_by_key(|entity| entity.created_at);

    let mut report = BackfillReport {
        pending: pending.len(),
        ..BackfillReport::default()
    };

    for entity in pending {
        let reference = allocator.allocate(organization, entity_type)?;
        let assigned = source
            .assign(&entity.id, reference)
            .map_err(|e| Error::Backfill(Box::new(e)))?;
        if assigned {
            report.assigned += 1;
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(id = ?entity.id, %reference, "entity gained a reference concurrently");
            report.raced += 1;
        }
    }

    #[cfg(feature = "tracing")]
    tracing::info!(
        pending = report.pending,
        assigned = report.assigned,
        raced = report.raced,
        "backfill complete"
    );

    Ok(report)
}
