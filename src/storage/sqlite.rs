//! SQLite-backed storage gateway.
//!
//! Each run schema lives in its own database file `<dir>/<schema>.sqlite`;
//! the run catalogue lives in `<dir>/catalogue.sqlite`.

use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::storage::schema::{quote_ident, TableSpec};
use crate::storage::traits::{StorageGateway, StoreConnection};
use crate::storage::value::{Row, Value};
use crate::{PoreflowError, Result};

const CATALOGUE_FILE: &str = "catalogue.sqlite";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(f) => Value::Real(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Value::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

pub struct SqliteGateway {
    dir: PathBuf,
    busy_timeout: Duration,
}

impl SqliteGateway {
    pub fn open(dir: impl Into<PathBuf>, busy_timeout: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, busy_timeout })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schema_path(&self, schema: &str) -> Result<PathBuf> {
        validate_schema_name(schema)?;
        Ok(self.dir.join(format!("{}.sqlite", schema)))
    }

    fn open_file(&self, path: &Path) -> Result<SqliteConnection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(self.busy_timeout)?;
        // Pool connections write to the same file from worker threads
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(SqliteConnection { conn })
    }
}

fn validate_schema_name(schema: &str) -> Result<()> {
    if schema.is_empty()
        || schema == "catalogue"
        || schema
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0' | ':'))
    {
        return Err(PoreflowError::Storage(format!(
            "invalid schema name: {:?}",
            schema
        )));
    }
    Ok(())
}

impl StorageGateway for SqliteGateway {
    fn ping(&self) -> Result<()> {
        let conn = self.open_file(&self.dir.join(CATALOGUE_FILE))?;
        conn.conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
    }

    fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.schema_path(schema)?.exists())
    }

    fn create_schema(&self, schema: &str) -> Result<()> {
        let path = self.schema_path(schema)?;
        self.open_file(&path)?;
        tracing::debug!("Created schema {} at {}", schema, path.display());
        Ok(())
    }

    fn drop_schema(&self, schema: &str) -> Result<()> {
        let path = self.schema_path(schema)?;
        for suffix in ["", "-wal", "-shm"] {
            let file = PathBuf::from(format!("{}{}", path.display(), suffix));
            if file.exists() {
                std::fs::remove_file(&file)?;
            }
        }
        Ok(())
    }

    fn connect(&self, schema: &str) -> Result<Box<dyn StoreConnection>> {
        let path = self.schema_path(schema)?;
        if !path.exists() {
            return Err(PoreflowError::Storage(format!(
                "schema {} does not exist",
                schema
            )));
        }
        Ok(Box::new(self.open_file(&path)?))
    }

    fn catalogue(&self) -> Result<Box<dyn StoreConnection>> {
        Ok(Box::new(self.open_file(&self.dir.join(CATALOGUE_FILE))?))
    }
}

pub struct SqliteConnection {
    conn: Connection,
}

impl SqliteConnection {
    /// Open a standalone in-memory connection, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }
}

fn column_list(row: &Row) -> String {
    row.keys()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `"a" = ?N AND "b" = ?N+1 ...`, or `1` for an empty filter
fn where_clause(filter: &Row, start: usize) -> String {
    if filter.is_empty() {
        return "1".to_string();
    }
    filter
        .keys()
        .enumerate()
        .map(|(i, k)| format!("{} = ?{}", quote_ident(k), start + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn insert_sql(verb: &str, table: &str, row: &Row) -> Result<String> {
    if row.is_empty() {
        return Err(PoreflowError::Storage(format!(
            "refusing to insert an empty row into {}",
            table
        )));
    }
    Ok(format!(
        "{} INTO {} ({}) VALUES ({})",
        verb,
        quote_ident(table),
        column_list(row),
        placeholders(1, row.len())
    ))
}

fn collect_rows(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> Result<Vec<Row>> {
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), r.get::<_, Value>(i)?);
        }
        out.push(record);
    }
    Ok(out)
}

impl StoreConnection for SqliteConnection {
    fn create_table(&mut self, table: &TableSpec) -> Result<()> {
        for statement in table.create_statements() {
            self.conn.execute_batch(&statement)?;
        }
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert(&mut self, table: &str, row: &Row) -> Result<i64> {
        let sql = insert_sql("INSERT", table, row)?;
        self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<usize> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let sql = insert_sql("INSERT", table, first)?;

        let tx = self.conn.savepoint()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                if row.len() != first.len() || !row.keys().eq(first.keys()) {
                    return Err(PoreflowError::Storage(format!(
                        "batch insert into {} mixes column sets",
                        table
                    )));
                }
                stmt.execute(params_from_iter(row.values()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    fn upsert(&mut self, table: &str, row: &Row) -> Result<()> {
        let sql = insert_sql("INSERT OR REPLACE", table, row)?;
        self.conn.execute(&sql, params_from_iter(row.values()))?;
        Ok(())
    }

    fn update(&mut self, table: &str, set: &Row, filter: &Row) -> Result<usize> {
        if set.is_empty() {
            return Ok(0);
        }
        let assignments = set
            .keys()
            .enumerate()
            .map(|(i, k)| format!("{} = ?{}", quote_ident(k), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(table),
            assignments,
            where_clause(filter, set.len() + 1)
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(set.values().chain(filter.values())))?;
        Ok(changed)
    }

    fn delete(&mut self, table: &str, filter: &Row) -> Result<usize> {
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(table),
            where_clause(filter, 1)
        );
        Ok(self.conn.execute(&sql, params_from_iter(filter.values()))?)
    }

    fn select(&mut self, table: &str, filter: &Row) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            quote_ident(table),
            where_clause(filter, 1)
        );
        let params: Vec<Value> = filter.values().cloned().collect();
        let mut stmt = self.conn.prepare(&sql)?;
        collect_rows(&mut stmt, &params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        collect_rows(&mut stmt, params)
    }

    fn atomically(
        &mut self,
        work: &mut dyn FnMut(&mut dyn StoreConnection) -> Result<()>,
    ) -> Result<()> {
        // A named savepoint opens a transaction at the outermost level and
        // nests inside one otherwise
        self.conn.execute_batch("SAVEPOINT poreflow_atomic")?;
        match work(self) {
            Ok(()) => {
                self.conn.execute_batch("RELEASE poreflow_atomic")?;
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = self
                    .conn
                    .execute_batch("ROLLBACK TO poreflow_atomic; RELEASE poreflow_atomic")
                {
                    tracing::error!("Failed to roll back partial writes: {}", undo);
                }
                Err(e)
            }
        }
    }
}
