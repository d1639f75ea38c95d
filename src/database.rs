use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{Connection, params_from_iter, types::Value};

use crate::schema::{IndexPlan, TablePlan};

pub const MAX_BOUND_PARAMETERS: usize = 32_766;

const IMPORT_PRAGMAS: &str =
    "PRAGMA foreign_keys = OFF; PRAGMA synchronous = NORMAL; PRAGMA journal_mode = WAL;";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
    pub constraint: i64,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Opening SQLite database {path:?}"))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory().context("Opening in-memory database")?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch(IMPORT_PRAGMAS)
            .context("Applying connection pragmas")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn drop_table(&self, plan: &TablePlan) -> Result<()> {
        let sql = plan.drop_statement();
        debug!("{sql}");
        self.conn
            .execute_batch(&sql)
            .with_context(|| format!("Dropping table '{}'", plan.name))
    }

    pub fn create_table(&self, plan: &TablePlan) -> Result<()> {
        let sql = plan.create_statement();
        debug!("{sql}");
        self.conn
            .execute_batch(&sql)
            .with_context(|| format!("Creating table '{}'", plan.name))
    }

    /// Inserts `rows` inside one transaction and returns how many rows were
    /// actually written; rows ignored on conflict are not counted. Every row
    /// must hold exactly `plan.width()` values.
    pub fn insert_batch(&mut self, plan: &TablePlan, rows: &[Vec<Value>]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let rows_per_statement = (MAX_BOUND_PARAMETERS / plan.width().max(1)).max(1);
        let tx = self
            .conn
            .transaction()
            .with_context(|| format!("Starting insert transaction for '{}'", plan.name))?;
        let mut inserted = 0usize;
        for chunk in rows.chunks(rows_per_statement) {
            let sql = plan.insert_statement(chunk.len());
            let mut statement = tx
                .prepare_cached(&sql)
                .with_context(|| format!("Preparing insert into '{}'", plan.name))?;
            inserted += statement
                .execute(params_from_iter(chunk.iter().flatten()))
                .with_context(|| format!("Inserting {} row(s) into '{}'", chunk.len(), plan.name))?;
        }
        tx.commit()
            .with_context(|| format!("Committing insert batch for '{}'", plan.name))?;
        Ok(inserted)
    }

    pub fn create_index(&self, plan: &TablePlan, index: &IndexPlan) -> Result<()> {
        let sql = plan.index_statement(index);
        debug!("{sql}");
        self.conn
            .execute_batch(&sql)
            .with_context(|| format!("Creating index '{}'", index.name))
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn foreign_key_violations(&self) -> Result<Vec<ForeignKeyViolation>> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Enabling foreign key enforcement")?;
        let mut statement = self.conn.prepare("PRAGMA foreign_key_check")?;
        let violations = statement
            .query_map([], |row| {
                Ok(ForeignKeyViolation {
                    table: row.get(0)?,
                    rowid: row.get(1)?,
                    parent: row.get(2)?,
                    constraint: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Running foreign key check")?;
        Ok(violations)
    }
}
