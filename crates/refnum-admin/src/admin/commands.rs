use std::{io::Write, path::Path};

use anyhow::Context;
use refnum::{
    BackfillReport, CounterStore, EntityType, OrganizationId, Reference, ReferenceAllocator,
    SqliteCounterStore, SqliteEntityTable, SqliteOptions, backfill,
};

use super::{
    config::{AdminConfig, Command},
    telemetry,
};

/// Executes the configured command, writing its result to `out`.
pub fn run(config: &AdminConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match &config.command {
        Command::Allocate {
            organization,
            entity_type,
            count,
        } => allocate(
            &config.database,
            config.sqlite,
            organization,
            *entity_type,
            *count,
            out,
        ),
        Command::Show { organization } => show(&config.database, config.sqlite, organization, out),
        Command::Backfill {
            organization,
            entity_type,
            table,
            enforce_unique,
        } => run_backfill(
            &config.database,
            config.sqlite,
            organization,
            *entity_type,
            table,
            *enforce_unique,
            out,
        ),
    }
}

fn open_allocator(
    database: &Path,
    options: SqliteOptions,
) -> anyhow::Result<ReferenceAllocator<SqliteCounterStore>> {
    let store = SqliteCounterStore::open(database, options)
        .with_context(|| format!("failed to open counter store at {}", database.display()))?;
    Ok(ReferenceAllocator::new(store))
}

#[tracing::instrument(skip(database, options, out), fields(database = %database.display()))]
fn allocate(
    database: &Path,
    options: SqliteOptions,
    organization: &OrganizationId,
    entity_type: EntityType,
    count: u32,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let allocator = open_allocator(database, options)?;

    for _ in 0..count {
        let reference = match allocator.allocate(organization, entity_type) {
            Ok(reference) => reference,
            Err(err) => {
                telemetry::increment_allocation_failures();
                return Err(err.into());
            }
        };
        telemetry::increment_references_allocated(1);
        writeln!(out, "{reference}")?;
    }

    tracing::info!(count, "allocated references");
    Ok(())
}

fn show(
    database: &Path,
    options: SqliteOptions,
    organization: &OrganizationId,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let allocator = open_allocator(database, options)?;
    let counters = allocator
        .store()
        .counters(organization)
        .with_context(|| format!("failed to read counters of {organization}"))?;

    if counters.is_empty() {
        writeln!(out, "no references allocated for {organization}")?;
        return Ok(());
    }

    for (entity_type, value) in counters {
        writeln!(
            out,
            "{:<12} {}",
            entity_type.as_str(),
            Reference::new(entity_type, value)
        )?;
    }
    Ok(())
}

#[tracing::instrument(skip(database, options, out), fields(database = %database.display()))]
fn run_backfill(
    database: &Path,
    options: SqliteOptions,
    organization: &OrganizationId,
    entity_type: EntityType,
    table: &str,
    enforce_unique: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let allocator = open_allocator(database, options)?;
    let entities = SqliteEntityTable::open(database, table, options)
        .with_context(|| format!("failed to open entity table {table:?}"))?;

    let BackfillReport {
        pending,
        assigned,
        raced,
    } = backfill(&allocator, &entities, organization, entity_type)?;
    telemetry::increment_references_backfilled(assigned as u64);
    writeln!(
        out,
        "{table}: {assigned} of {pending} pending entities numbered ({raced} already taken)"
    )?;

    if enforce_unique {
        entities
            .enforce_unique_references()
            .with_context(|| format!("failed to install unique index on {table:?}"))?;
        tracing::info!(table, "unique reference index installed");
        writeln!(out, "{table}: unique (organization_id, reference) index installed")?;
    }
    Ok(())
}
