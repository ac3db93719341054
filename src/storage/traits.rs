/// Storage trait hierarchy for poreflow
///
/// A gateway owns the set of per-run schemas and the run catalogue; a
/// connection is an auto-committing handle onto one schema unless the
/// writes are grouped with `atomically`. Every
/// statement is parameterized and every row is a structured `Row`.
use crate::storage::schema::TableSpec;
use crate::storage::value::{Row, Value};
use crate::Result;

/// One auto-committing handle onto a single schema
pub trait StoreConnection: Send {
    /// Create a table (and its indexes) if it does not exist yet
    fn create_table(&mut self, table: &TableSpec) -> Result<()>;

    /// Check whether a table exists in this schema
    fn table_exists(&mut self, table: &str) -> Result<bool>;

    /// Insert one row, returning the generated row id
    fn insert(&mut self, table: &str, row: &Row) -> Result<i64>;

    /// Insert many rows sharing the same columns in one round trip
    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<usize>;

    /// Insert a row, replacing any existing row that collides on a unique key
    fn upsert(&mut self, table: &str, row: &Row) -> Result<()>;

    /// Set columns on every row matching all `filter` columns
    fn update(&mut self, table: &str, set: &Row, filter: &Row) -> Result<usize>;

    /// Delete every row matching all `filter` columns
    fn delete(&mut self, table: &str, filter: &Row) -> Result<usize>;

    /// Fetch every row matching all `filter` columns (empty filter = all rows)
    fn select(&mut self, table: &str, filter: &Row) -> Result<Vec<Row>>;

    /// Run an arbitrary parameterized read query
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run `work` so that either every write it makes lands or none does.
    /// Calls may nest.
    fn atomically(
        &mut self,
        work: &mut dyn FnMut(&mut dyn StoreConnection) -> Result<()>,
    ) -> Result<()>;
}

/// Entry point onto a store holding one schema per run plus a catalogue
pub trait StorageGateway: Send + Sync {
    /// Fail fast when the store cannot be reached
    fn ping(&self) -> Result<()>;

    fn schema_exists(&self, schema: &str) -> Result<bool>;

    fn create_schema(&self, schema: &str) -> Result<()>;

    fn drop_schema(&self, schema: &str) -> Result<()>;

    /// Open a new connection onto an existing schema
    fn connect(&self, schema: &str) -> Result<Box<dyn StoreConnection>>;

    /// Open a new connection onto the run catalogue
    fn catalogue(&self) -> Result<Box<dyn StoreConnection>>;
}
