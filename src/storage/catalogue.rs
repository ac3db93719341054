//! The run catalogue: one row per run, a comment log and viewer grants.

use chrono::Local;

use crate::storage::schema::{self, COMMENTS, MINION_RUNS, USERRUN, USERS};
use crate::storage::traits::StoreConnection;
use crate::storage::value::{row, Row, Value};
use crate::{PoreflowError, Result};

/// Everything recorded about a run when it is first provisioned
#[derive(Debug, Clone)]
pub struct RunEntry {
    pub date: String,
    pub user_name: String,
    pub flowcell_id: String,
    pub run_name: String,
    pub comment: String,
    pub flowcell_owner: String,
    pub run_number: String,
    pub reference: String,
    pub reference_length: u64,
    pub basecaller_alg: String,
    pub version: String,
    pub process: String,
    pub watch_dir: String,
    pub host_ip: String,
}

pub struct Catalogue {
    conn: Box<dyn StoreConnection>,
}

pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Catalogue {
    /// Wrap a catalogue connection, creating the tables on first use
    pub fn open(mut conn: Box<dyn StoreConnection>) -> Result<Self> {
        for table in schema::catalogue_tables() {
            conn.create_table(&table)?;
        }
        Ok(Self { conn })
    }

    pub fn register_run(&mut self, entry: &RunEntry) -> Result<i64> {
        self.conn.insert(
            MINION_RUNS,
            &row([
                ("date", entry.date.as_str().into()),
                ("user_name", entry.user_name.as_str().into()),
                ("flowcellid", entry.flowcell_id.as_str().into()),
                ("runname", entry.run_name.as_str().into()),
                ("activeflag", 1.into()),
                ("comment", entry.comment.as_str().into()),
                ("flowcell_owner", entry.flowcell_owner.as_str().into()),
                ("run_number", entry.run_number.as_str().into()),
                ("reference", entry.reference.as_str().into()),
                ("reflength", (entry.reference_length as i64).into()),
                ("basecalleralg", entry.basecaller_alg.as_str().into()),
                ("version", entry.version.as_str().into()),
                ("poreflow_version", crate::VERSION.into()),
                ("process", entry.process.as_str().into()),
                ("watch_dir", entry.watch_dir.as_str().into()),
                ("host_ip", entry.host_ip.as_str().into()),
            ]),
        )
    }

    pub fn add_comment(
        &mut self,
        runindex: i64,
        run_name: &str,
        user_name: &str,
        comment: &str,
    ) -> Result<i64> {
        self.conn.insert(
            COMMENTS,
            &row([
                ("runindex", runindex.into()),
                ("runname", run_name.into()),
                ("user_name", user_name.into()),
                ("date", timestamp().into()),
                ("comment", comment.into()),
                ("name", user_name.into()),
            ]),
        )
    }

    pub fn set_active(&mut self, run_name: &str, active: bool) -> Result<usize> {
        self.conn.update(
            MINION_RUNS,
            &row([("activeflag", active.into())]),
            &row([("runname", run_name.into())]),
        )
    }

    /// Grant a user view access to a run, registering the user if unknown
    pub fn add_viewer(&mut self, user_name: &str, runindex: i64) -> Result<()> {
        let existing = self
            .conn
            .select(USERS, &row([("user_name", user_name.into())]))?;
        let user_id = match existing.first().and_then(|r| r.get("user_id")) {
            Some(id) => id.as_i64().ok_or_else(|| {
                PoreflowError::Storage(format!("user {} has no numeric id", user_name))
            })?,
            None => {
                tracing::info!("Registering catalogue user {}", user_name);
                self.conn
                    .insert(USERS, &row([("user_name", user_name.into())]))?
            }
        };
        self.conn.insert(
            USERRUN,
            &row([("user_id", user_id.into()), ("runindex", runindex.into())]),
        )?;
        Ok(())
    }

    /// Remove every catalogue trace of a run name (used before recreating it)
    pub fn delete_run(&mut self, run_name: &str) -> Result<()> {
        let runs = self.find_runs(run_name)?;
        for run in &runs {
            if let Some(index) = run.get("runindex") {
                self.conn
                    .delete(USERRUN, &row([("runindex", index.clone())]))?;
            }
        }
        self.conn
            .delete(MINION_RUNS, &row([("runname", run_name.into())]))?;
        Ok(())
    }

    pub fn find_runs(&mut self, run_name: &str) -> Result<Vec<Row>> {
        self.conn
            .select(MINION_RUNS, &row([("runname", run_name.into())]))
    }

    /// Most recent catalogue index for a run name
    pub fn latest_runindex(&mut self, run_name: &str) -> Result<Option<i64>> {
        Ok(self
            .find_runs(run_name)?
            .iter()
            .filter_map(|r| r.get("runindex").and_then(Value::as_i64))
            .max())
    }

    pub fn comments_for(&mut self, runindex: i64) -> Result<Vec<String>> {
        Ok(self
            .conn
            .select(COMMENTS, &row([("runindex", runindex.into())]))?
            .into_iter()
            .filter_map(|r| r.get("comment").and_then(|c| c.as_str().map(str::to_string)))
            .collect())
    }
}
