use std::{collections::BTreeMap, convert::Infallible, sync::Mutex};

use crate::{
    BackfillReport, BackfillSource, EntityType, LockCounterStore, OrganizationId, PendingEntity,
    Reference, ReferenceAllocator, backfill,
};

#[derive(Debug)]
struct Row {
    organization: OrganizationId,
    created_at: i64,
    reference: Option<Reference>,
}

/// An in-memory entity table keyed by id.
#[derive(Default)]
struct MemoryTable {
    rows: Mutex<BTreeMap<u32, Row>>,
}

impl MemoryTable {
    fn push(&self, id: u32, organization: &OrganizationId, created_at: i64) {
        self.rows.lock().unwrap().insert(
            id,
            Row {
                organization: organization.clone(),
                created_at,
                reference: None,
            },
        );
    }

    fn references(&self) -> BTreeMap<u32, Option<String>> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|(id, row)| (*id, row.reference.map(|r| r.to_string())))
            .collect()
    }
}

impl BackfillSource for MemoryTable {
    type Id = u32;
    type Error = Infallible;

    fn pending(&self, organization: &OrganizationId) -> Result<Vec<PendingEntity<u32>>, Infallible> {
        let mut out: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, row)| &row.organization == organization && row.reference.is_none())
            .map(|(id, row)| PendingEntity {
                id: *id,
                created_at: row.created_at,
            })
            .collect();
        out.sort_by_key(|p| (p.created_at, p.id));
        Ok(out)
    }

    fn assign(&self, id: &u32, reference: Reference) -> Result<bool, Infallible> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(id) {
            Some(row) if row.reference.is_none() => {
                row.reference = Some(reference);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn org(id: &str) -> OrganizationId {
    OrganizationId::new(id).unwrap()
}

#[test]
fn numbers_existing_entities_in_creation_order() {
    let acme = org("acme");
    let table = MemoryTable::default();
    // Ids deliberately disagree with creation order.
    for (id, created_at) in [(1, 500), (2, 100), (3, 400), (4, 200), (5, 300)] {
        table.push(id, &acme, created_at);
    }

    let allocator = ReferenceAllocator::new(LockCounterStore::new());
    let report = backfill(&allocator, &table, &acme, EntityType::WorkItem).unwrap();

    assert_eq!(
        report,
        BackfillReport {
            pending: 5,
            assigned: 5,
            raced: 0
        }
    );
    let refs = table.references();
    assert_eq!(refs[&2].as_deref(), Some("WI-1"));
    assert_eq!(refs[&4].as_deref(), Some("WI-2"));
    assert_eq!(refs[&5].as_deref(), Some("WI-3"));
    assert_eq!(refs[&3].as_deref(), Some("WI-4"));
    assert_eq!(refs[&1].as_deref(), Some("WI-5"));
}

#[test]
fn second_run_is_a_no_op() {
    let acme = org("acme");
    let table = MemoryTable::default();
    for id in 1..=5 {
        table.push(id, &acme, i64::from(id) * 10);
    }

    let allocator = ReferenceAllocator::new(LockCounterStore::new());
    backfill(&allocator, &table, &acme, EntityType::WorkItem).unwrap();
    let before = table.references();

    let report = backfill(&allocator, &table, &acme, EntityType::WorkItem).unwrap();
    assert_eq!(report, BackfillReport::default());
    assert_eq!(table.references(), before);
    assert_eq!(
        allocator.last_issued(&acme, EntityType::WorkItem).unwrap(),
        Some(Reference::new(EntityType::WorkItem, 5))
    );
}

#[test]
fn later_entities_continue_after_backfilled_range() {
    let acme = org("acme");
    let table = MemoryTable::default();
    table.push(1, &acme, 1);
    table.push(2, &acme, 2);

    let allocator = ReferenceAllocator::new(LockCounterStore::new());
    backfill(&allocator, &table, &acme, EntityType::Objective).unwrap();

    let next = allocator.allocate(&acme, EntityType::Objective).unwrap();
    assert_eq!(next.to_string(), "O-3");
}

#[test]
fn only_touches_the_requested_organization() {
    let (acme, globex) = (org("acme"), org("globex"));
    let table = MemoryTable::default();
    table.push(1, &acme, 1);
    table.push(2, &globex, 2);

    let allocator = ReferenceAllocator::new(LockCounterStore::new());
    let report = backfill(&allocator, &table, &acme, EntityType::KeyResult).unwrap();

    assert_eq!(report.assigned, 1);
    let refs = table.references();
    assert_eq!(refs[&1].as_deref(), Some("KR-1"));
    assert_eq!(refs[&2], None);
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_backfill_then_enforce_uniqueness() {
    use crate::{PersistError, SqliteCounterStore, SqliteEntityTable, SqliteOptions};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");
    let acme = org("acme");

    let table = SqliteEntityTable::open(&path, "work_items", SqliteOptions::default()).unwrap();
    table.create_if_missing().unwrap();
    let ids: Vec<i64> = [5, 1, 4, 2, 3]
        .into_iter()
        .map(|t| table.insert(&acme, t, None).unwrap())
        .collect();

    let allocator =
        ReferenceAllocator::new(SqliteCounterStore::open(&path, SqliteOptions::default()).unwrap());
    let report = backfill(&allocator, &table, &acme, EntityType::WorkItem).unwrap();
    assert_eq!(report.assigned, 5);

    let by_time: Vec<String> = ids
        .iter()
        .map(|id| table.reference_of(*id).unwrap().unwrap().to_string())
        .collect();
    assert_eq!(by_time, ["WI-5", "WI-1", "WI-4", "WI-2", "WI-3"]);

    assert_eq!(
        backfill(&allocator, &table, &acme, EntityType::WorkItem).unwrap(),
        BackfillReport::default()
    );

    table.enforce_unique_references().unwrap();

    // Steady state: new rows get their reference inside the unit of work.
    let id = allocator
        .create_with(&acme, EntityType::WorkItem, |reference| {
            table.insert(&acme, 6, Some(reference))
        })
        .unwrap();
    assert_eq!(
        table.reference_of(id).unwrap(),
        Some(Reference::new(EntityType::WorkItem, 6))
    );

    // A reference that slipped past the counter is caught by the index.
    let err = table
        .insert(&acme, 7, Some(Reference::new(EntityType::WorkItem, 6)))
        .unwrap_err();
    assert!(matches!(err, PersistError::DuplicateReference(_)));
}
