//! DuckDB destination
//!
//! Datasets are schemas in one database file. Staged files are read into a
//! temp staging table with DuckDB's own Parquet / JSON readers, then applied
//! to the target table inside a transaction.

use super::types::{Destination, LoadRecord};
use crate::error::{Error, Result, ResultExt};
use crate::sink::StagedTable;
use crate::types::{FileFormat, WriteMode};
use async_trait::async_trait;
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const STAGING_TABLE: &str = "_apiload_staging";
const LOADS_TABLE: &str = "_loads";

/// DuckDB database used as a destination
pub struct DuckDbDestination {
    conn: Mutex<Connection>,
    location: String,
}

impl DuckDbDestination {
    /// Open (or create) a database file; `:memory:` opens an in-memory database
    pub fn open(path: &Path) -> Result<Self> {
        let location = path.display().to_string();
        let conn = if location == ":memory:" {
            Connection::open_in_memory()
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create DuckDB directory {}", parent.display())
                })?;
            }
            Connection::open(path)
        }
        .map_err(|e| Error::config(format!("Failed to open DuckDB database {location}: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    /// In-memory database
    pub fn in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Database location as given
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run a closure against the connection
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> duckdb::Result<T>) -> Result<T> {
        let conn = self.lock()?;
        Ok(f(&conn)?)
    }

    /// Number of rows in `dataset.table`
    pub fn row_count(&self, dataset: &str, table: &str) -> Result<usize> {
        let sql = format!("SELECT count(*) FROM {}", qualified(dataset, table));
        let count: i64 = self.with_connection(|conn| conn.query_row(&sql, [], |row| row.get(0)))?;
        Ok(count as usize)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::destination("duckdb", "connection lock poisoned"))
    }
}

impl std::fmt::Debug for DuckDbDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbDestination")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Destination for DuckDbDestination {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    async fn prepare(&self, dataset: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {loads} (
                 load_id VARCHAR NOT NULL,
                 pipeline_name VARCHAR,
                 status VARCHAR NOT NULL,
                 inserted_at TIMESTAMPTZ NOT NULL
             );",
            schema = quote_ident(dataset),
            loads = qualified(dataset, LOADS_TABLE),
        ))?;
        Ok(())
    }

    async fn load_table(&self, dataset: &str, table: &StagedTable) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")?;

        match apply_table(&conn, dataset, table) {
            Ok(rows) => {
                conn.execute_batch("COMMIT")?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    debug!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn complete_load(&self, dataset: &str, load: &LoadRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (load_id, pipeline_name, status, inserted_at) VALUES (?, ?, ?, ?::TIMESTAMPTZ)",
                qualified(dataset, LOADS_TABLE)
            ),
            params![
                load.load_id,
                load.pipeline_name,
                load.status,
                load.inserted_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// Table Application
// ============================================================================

fn apply_table(conn: &Connection, dataset: &str, table: &StagedTable) -> Result<usize> {
    let target = qualified(dataset, &table.spec.name);
    let exists = table_exists(conn, dataset, &table.spec.name)?;

    if table.files.is_empty() {
        // Nothing upstream: replace still empties the table
        if table.spec.write_mode == WriteMode::Replace && exists {
            conn.execute_batch(&format!("DELETE FROM {target}"))?;
        }
        return Ok(0);
    }

    conn.execute_batch(&format!(
        "CREATE OR REPLACE TEMP TABLE {STAGING_TABLE} AS SELECT * FROM {}",
        scan_files(table)
    ))?;

    let rows = match table.spec.write_mode {
        WriteMode::Replace => {
            conn.execute_batch(&format!(
                "CREATE OR REPLACE TABLE {target} AS SELECT * FROM {STAGING_TABLE}"
            ))?;
            staged_rows(conn)?
        }
        WriteMode::Append => {
            prepare_target(conn, dataset, &table.spec.name, exists)?;
            conn.execute(
                &format!("INSERT INTO {target} BY NAME SELECT * FROM {STAGING_TABLE}"),
                [],
            )?
        }
        WriteMode::Merge => {
            let key = table.spec.primary_key.as_deref().ok_or_else(|| {
                Error::config(format!(
                    "Table '{}' uses merge but declares no primary key",
                    table.spec.name
                ))
            })?;
            let key = quote_ident(key);
            prepare_target(conn, dataset, &table.spec.name, exists)?;
            conn.execute(
                &format!(
                    "DELETE FROM {target} WHERE {key} IN (SELECT {key} FROM {STAGING_TABLE})"
                ),
                [],
            )?;
            // Staging keeps file order, so the highest rowid is the last occurrence
            conn.execute(
                &format!(
                    "INSERT INTO {target} BY NAME SELECT * FROM {STAGING_TABLE} \
                     QUALIFY row_number() OVER (PARTITION BY {key} ORDER BY rowid DESC) = 1"
                ),
                [],
            )?
        }
    };

    conn.execute_batch(&format!("DROP TABLE IF EXISTS {STAGING_TABLE}"))?;
    debug!(table = %target, rows, mode = %table.spec.write_mode, "Applied staged table");
    Ok(rows)
}

/// Create the target from the staging shape, or add columns it lacks
fn prepare_target(conn: &Connection, dataset: &str, table: &str, exists: bool) -> Result<()> {
    let target = qualified(dataset, table);
    if !exists {
        conn.execute_batch(&format!(
            "CREATE TABLE {target} AS SELECT * FROM {STAGING_TABLE} LIMIT 0"
        ))?;
        return Ok(());
    }

    let existing = target_columns(conn, dataset, table)?;
    for (column, data_type) in staging_columns(conn)? {
        if !existing.contains(&column) {
            debug!(table = %target, column = %column, data_type = %data_type, "Adding column");
            conn.execute_batch(&format!(
                "ALTER TABLE {target} ADD COLUMN {} {data_type}",
                quote_ident(&column)
            ))?;
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, dataset: &str, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        params![dataset, table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn target_columns(conn: &Connection, dataset: &str, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns WHERE table_schema = ? AND table_name = ?",
    )?;
    let columns = stmt
        .query_map(params![dataset, table], |row| row.get::<_, String>(0))?
        .collect::<duckdb::Result<Vec<_>>>()?;
    Ok(columns)
}

fn staging_columns(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!("DESCRIBE {STAGING_TABLE}"))?;
    let columns = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<duckdb::Result<Vec<_>>>()?;
    Ok(columns)
}

fn staged_rows(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT count(*) FROM {STAGING_TABLE}"), [], |row| {
        row.get(0)
    })?;
    Ok(count as usize)
}

/// Table function reading every staged file of a table
fn scan_files(table: &StagedTable) -> String {
    let files = table
        .files
        .iter()
        .map(|f| quote_literal(&f.display().to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    match table.format {
        FileFormat::Parquet => format!("read_parquet([{files}], union_by_name = true)"),
        FileFormat::Jsonl => format!(
            "read_json_auto([{files}], format = 'newline_delimited', union_by_name = true)"
        ),
    }
}

fn qualified(dataset: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(dataset), quote_ident(table))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
