//! Shared fixtures for the integration tests: a temporary watch directory,
//! container files written as JSON and a pipeline over a SQLite store.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use poreflow::container::{JsonSource, MemoryContainer};
use poreflow::core::config::{AlignMode, Config};
use poreflow::storage::schema::TableSpec;
use poreflow::storage::sqlite::SqliteGateway;
use poreflow::storage::value::{row, Row, Value};
use poreflow::storage::{StorageGateway, StoreConnection};
use poreflow::tools::Aligner;
use poreflow::{Pipeline, PoreflowError, Result};

pub const WORKFLOW: &str = "/Analyses/Basecall_2D_000";

/// Test environment that owns every directory a pipeline writes to
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        TestEnvironment {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    pub fn watch_dir(&self) -> PathBuf {
        self.path("watch")
    }

    /// Configuration with every directory inside the environment
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.run.operator = "alice".to_string();
        config.watch.watch_dir = Some(self.watch_dir());
        config.watch.quiescence_secs = 0;
        config.store.store_dir = Some(self.path("store"));
        config.store.log_dir = Some(self.path("logs"));
        config.store.pool_size = 2;
        config.alignment.reference_dir = Some(self.path("valid_refs"));
        config.alignment.index_dir = Some(self.path("index"));
        config
    }

    pub fn gateway(&self) -> Arc<SqliteGateway> {
        Arc::new(
            SqliteGateway::open(self.path("store"), Duration::from_secs(5))
                .expect("Failed to open store"),
        )
    }

    pub fn pipeline(&self, config: Config, aligner: Option<Box<dyn Aligner>>) -> Pipeline {
        Pipeline::with_parts(config, self.gateway(), Box::new(JsonSource), aligner)
            .expect("Failed to build pipeline")
    }

    /// Pipeline whose catalogue updates fail while the returned flag is set
    pub fn flaky_pipeline(&self, config: Config) -> (Pipeline, Arc<AtomicBool>) {
        let gateway = Arc::new(FlakyGateway {
            inner: SqliteGateway::open(self.path("store"), Duration::from_secs(5))
                .expect("Failed to open store"),
            fail_updates: Arc::new(AtomicBool::new(false)),
        });
        let flag = gateway.fail_updates.clone();
        let pipeline = Pipeline::with_parts(config, gateway, Box::new(JsonSource), None)
            .expect("Failed to build pipeline");
        (pipeline, flag)
    }

    /// Pipeline aligning with BWA semantics against a one-sequence reference
    pub fn aligning_config(&self) -> Config {
        let reference = self.write_file("refs/lambda.fasta", ">lambda phage\nACGTACGTAAACCCGGGTTTACGTACGT\n");
        let mut config = self.config();
        config.alignment.mode = AlignMode::Bwa;
        config.alignment.reference = vec![reference];
        config
    }

    pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.path(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write a container fixture under `watch/downloads/pass`
    pub fn write_read(&self, file_name: &str, template: &str) -> PathBuf {
        let basename = file_name.trim_end_matches(".fast5");
        let container = read_container(basename, template);
        let relative = format!("watch/downloads/pass/{}", file_name);
        self.write_file(&relative, &container.to_json().unwrap())
    }
}

/// A container holding one template read of `template` bases
pub fn read_container(basename: &str, template: &str) -> MemoryContainer {
    let quality = "I".repeat(template.len());
    MemoryContainer::new()
        .with_attributes(
            "/UniqueGlobalKey/tracking_id",
            row([
                ("device_id", "MN02935".into()),
                ("exp_start_time", "1457000000".into()),
                ("flow_cell_id", "FAB00001".into()),
                ("run_id", "abc123".into()),
            ]),
        )
        .with_attributes(
            "/UniqueGlobalKey/channel_id",
            row([("channel_number", "105".into()), ("sampling_rate", 3000.0.into())]),
        )
        .with_attributes(WORKFLOW, row([("version", "1.16.7".into())]))
        .with_attributes(
            &format!("{}/Configuration/general", WORKFLOW),
            row([
                ("basename", basename.into()),
                ("read_id", "3".into()),
                ("workflow_name", "Basecall_2D".into()),
            ]),
        )
        .with_attributes(
            "/Analyses/EventDetection_000/Reads/Read_3",
            row([("start_time", 900_000.into()), ("read_id", "uuid-3".into())]),
        )
        .with_attributes(
            &format!("{}/Summary/basecall_1d_template", WORKFLOW),
            row([("mean_qscore", 9.1.into())]),
        )
        .with_text(
            &format!("{}/BaseCalled_template/Fastq", WORKFLOW),
            format!("@{}\n{}\n+\n{}\n", basename, template, quality),
        )
        .with_attributes(
            &format!("{}/BaseCalled_template/Events", WORKFLOW),
            row([("start_time", 300.0.into()), ("duration", 1.5.into())]),
        )
}

pub fn seqid(path: &Path) -> String {
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".fast5"))
        .unwrap_or_default();
    format!("{}.basecalled_template", basename)
}

/// Store whose catalogue connection rejects updates on demand
pub struct FlakyGateway {
    inner: SqliteGateway,
    fail_updates: Arc<AtomicBool>,
}

impl StorageGateway for FlakyGateway {
    fn ping(&self) -> Result<()> {
        self.inner.ping()
    }

    fn schema_exists(&self, schema: &str) -> Result<bool> {
        self.inner.schema_exists(schema)
    }

    fn create_schema(&self, schema: &str) -> Result<()> {
        self.inner.create_schema(schema)
    }

    fn drop_schema(&self, schema: &str) -> Result<()> {
        self.inner.drop_schema(schema)
    }

    fn connect(&self, schema: &str) -> Result<Box<dyn StoreConnection>> {
        self.inner.connect(schema)
    }

    fn catalogue(&self) -> Result<Box<dyn StoreConnection>> {
        Ok(Box::new(FlakyConnection {
            inner: self.inner.catalogue()?,
            fail_updates: self.fail_updates.clone(),
        }))
    }
}

struct FlakyConnection {
    inner: Box<dyn StoreConnection>,
    fail_updates: Arc<AtomicBool>,
}

impl StoreConnection for FlakyConnection {
    fn create_table(&mut self, table: &TableSpec) -> Result<()> {
        self.inner.create_table(table)
    }

    fn table_exists(&mut self, table: &str) -> Result<bool> {
        self.inner.table_exists(table)
    }

    fn insert(&mut self, table: &str, row: &Row) -> Result<i64> {
        self.inner.insert(table, row)
    }

    fn insert_batch(&mut self, table: &str, rows: &[Row]) -> Result<usize> {
        self.inner.insert_batch(table, rows)
    }

    fn upsert(&mut self, table: &str, row: &Row) -> Result<()> {
        self.inner.upsert(table, row)
    }

    fn update(&mut self, table: &str, set: &Row, filter: &Row) -> Result<usize> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(PoreflowError::Storage("database is locked".to_string()));
        }
        self.inner.update(table, set, filter)
    }

    fn delete(&mut self, table: &str, filter: &Row) -> Result<usize> {
        self.inner.delete(table, filter)
    }

    fn select(&mut self, table: &str, filter: &Row) -> Result<Vec<Row>> {
        self.inner.select(table, filter)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.inner.query(sql, params)
    }

    fn atomically(
        &mut self,
        work: &mut dyn FnMut(&mut dyn StoreConnection) -> Result<()>,
    ) -> Result<()> {
        self.inner.atomically(work)
    }
}
