use std::path::Path;

use rusqlite::{Connection, OptionalExtension, ffi, params};

use crate::{
    BackfillSource, OrganizationId, PendingEntity, PersistError, Reference, SqliteOptions,
    StoreError,
};

/// An entity table in a SQLite database that carries references.
///
/// The table is expected to have at least these columns:
///
/// | column            | type                 |
/// |-------------------|----------------------|
/// | `id`              | `INTEGER PRIMARY KEY` |
/// | `organization_id` | `TEXT NOT NULL`      |
/// | `created_at`      | `INTEGER NOT NULL`   |
/// | `reference`       | `TEXT` (nullable)    |
///
/// One table holds one entity type. Uniqueness of references is enforced by
/// a unique index on `(organization_id, reference)`, installed with
/// [`Self::enforce_unique_references`] once every row has a reference.
#[derive(Debug)]
pub struct SqliteEntityTable {
    conn: Connection,
    table: String,
}

impl SqliteEntityTable {
    /// Opens the database at `path` and binds to `table`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidIdentifier`] if `table` is not a plain SQL
    /// identifier, or a SQLite error if the database cannot be opened.
    pub fn open(
        path: impl AsRef<Path>,
        table: &str,
        options: SqliteOptions,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        options.apply(&conn)?;
        Self::from_connection(conn, table)
    }

    /// Binds an existing connection to `table`.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidIdentifier`] if `table` is not a plain SQL
    /// identifier.
    pub fn from_connection(conn: Connection, table: &str) -> Result<Self, StoreError> {
        if !is_identifier(table) {
            return Err(StoreError::InvalidIdentifier(table.to_owned()));
        }
        Ok(Self {
            conn,
            table: table.to_owned(),
        })
    }

    /// The bound table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table with the minimal expected columns if it does not
    /// exist yet.
    ///
    /// # Errors
    /// Returns a SQLite error if the statement fails.
    pub fn create_if_missing(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!(
            r#"CREATE TABLE IF NOT EXISTS "{t}" (
                id              INTEGER PRIMARY KEY,
                organization_id TEXT    NOT NULL,
                created_at      INTEGER NOT NULL,
                reference       TEXT
            );"#,
            t = self.table
        ))?;
        Ok(())
    }

    /// Installs the `(organization_id, reference)` unique index.
    ///
    /// Rows without a reference are not constrained (SQLite treats `NULL`s as
    /// distinct), but the index must only be installed once backfill has run,
    /// so that from then on every new row is created with a reference.
    ///
    /// # Errors
    /// Returns a SQLite error if the index cannot be built, for example
    /// because two rows already share a reference.
    pub fn enforce_unique_references(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(&format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "{t}_organization_reference_key"
               ON "{t}" (organization_id, reference);"#,
            t = self.table
        ))?;
        Ok(())
    }

    /// Inserts an entity row and returns its id.
    ///
    /// Meant to be called from the persistence step of
    /// [`ReferenceAllocator::create_with`](crate::ReferenceAllocator::create_with).
    ///
    /// # Errors
    /// Returns [`PersistError::DuplicateReference`] if the unique index
    /// rejects `reference`, and [`PersistError::Failed`] for anything else.
    pub fn insert(
        &self,
        organization: &OrganizationId,
        created_at: i64,
        reference: Option<Reference>,
    ) -> Result<i64, PersistError> {
        let sql = format!(
            r#"INSERT INTO "{}" (organization_id, created_at, reference) VALUES (?1, ?2, ?3)"#,
            self.table
        );
        let result = self.conn.prepare_cached(&sql).and_then(|mut stmt| {
            stmt.insert(params![
                organization.as_str(),
                created_at,
                reference.map(|r| r.to_string())
            ])
        });

        match (result, reference) {
            (Ok(id), _) => Ok(id),
            (Err(err), Some(reference)) if is_unique_violation(&err) => {
                Err(PersistError::DuplicateReference(reference))
            }
            (Err(err), _) => Err(PersistError::failed(err)),
        }
    }

    /// Returns the reference stored on row `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::Corrupt`] if the row holds something that is not
    /// a reference, or a SQLite error.
    pub fn reference_of(&self, id: i64) -> Result<Option<Reference>, StoreError> {
        let sql = format!(r#"SELECT reference FROM "{}" WHERE id = ?1"#, self.table);
        let raw: Option<Option<String>> = self
            .conn
            .prepare_cached(&sql)?
            .query_row(params![id], |row| row.get(0))
            .optional()?;

        raw.flatten()
            .map(|s| s.parse().map_err(|e| StoreError::Corrupt(format!("row {id}: {e}"))))
            .transpose()
    }
}

impl BackfillSource for SqliteEntityTable {
    type Id = i64;
    type Error = StoreError;

    fn pending(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<PendingEntity<i64>>, StoreError> {
        let sql = format!(
            r#"SELECT id, created_at FROM "{}"
               WHERE organization_id = ?1 AND reference IS NULL
               ORDER BY created_at, id"#,
            self.table
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![organization.as_str()], |row| {
            Ok(PendingEntity {
                id: row.get(0)?,
                created_at: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn assign(&self, id: &i64, reference: Reference) -> Result<bool, StoreError> {
        let sql = format!(
            r#"UPDATE "{}" SET reference = ?1 WHERE id = ?2 AND reference IS NULL"#,
            self.table
        );
        let changed = self
            .conn
            .prepare_cached(&sql)?
            .execute(params![reference.to_string(), id])?;
        Ok(changed == 1)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
