//! Run sessions known to this process, keyed by run name.
//!
//! The first file of an unseen run provisions its schema and catalogue
//! entry; a file for a different known run switches the active run. Only
//! the scheduler thread touches the registry.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AlignMode, Config};
use crate::extract::ExtractedRecord;
use crate::reference::ReferenceSet;
use crate::session::run::RunSession;
use crate::session::runlog::{RunHeader, RunLog};
use crate::storage::catalogue::{timestamp, Catalogue, RunEntry};
use crate::storage::schema::{
    barcode_assignment, run_tables, TableOptions, REFERENCE_SEQ_INFO, REF_SEQUENCE_KMER,
};
use crate::storage::traits::{StorageGateway, StoreConnection};
use crate::storage::value::{row, Row, Value};
use crate::{PoreflowError, Result, VERSION};

const NO_REFERENCE: &str = "NOREFERENCE";

/// Everything about a run that comes from configuration rather than files
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub operator: String,
    pub custom_name: Option<String>,
    pub flowcell_owner: String,
    pub run_number: String,
    pub comment: String,
    pub view_users: Vec<String>,
    pub drop_existing: bool,
    pub resume: bool,
    pub telemetry: bool,
    pub protocol: AlignMode,
    /// Open worker connections for each run
    pub pool: bool,
    pub pool_size: usize,
    pub log_dir: PathBuf,
    pub watch_dir: String,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            operator: config.run.operator.clone(),
            custom_name: config.run.custom_name.clone(),
            flowcell_owner: config.run.flowcell_owner.clone(),
            run_number: config.run.run_number.clone(),
            comment: config.run.comment.clone(),
            view_users: config.run.view_users.clone(),
            drop_existing: config.run.drop_existing,
            resume: config.run.resume,
            telemetry: config.features.telemetry,
            protocol: config.alignment.mode,
            pool: config.needs_pool(),
            pool_size: config.store.pool_size,
            log_dir: config.store.log_dir(),
            watch_dir: config
                .watch
                .watch_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Operator first, then extra viewers, without repeats
    pub fn viewers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(&self.operator)
            .chain(self.view_users.iter())
            .filter(|u| !u.is_empty() && seen.insert(u.as_str()))
            .cloned()
            .collect()
    }

    fn header_options(&self) -> Vec<(String, String)> {
        vec![
            ("operator".into(), self.operator.clone()),
            ("custom name".into(), self.custom_name.clone().unwrap_or_default()),
            ("viewers".into(), self.viewers().join(",")),
            ("flowcell owner".into(), self.flowcell_owner.clone()),
            ("run number".into(), self.run_number.clone()),
            ("watch dir".into(), self.watch_dir.clone()),
            ("alignment".into(), self.protocol.process_label().to_string()),
            ("telemetry".into(), self.telemetry.to_string()),
            ("drop existing".into(), self.drop_existing.to_string()),
            ("resume".into(), self.resume.to_string()),
        ]
    }
}

/// Address recorded in the catalogue for the machine doing the upload
pub fn host_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

pub struct SessionRegistry {
    gateway: Arc<dyn StorageGateway>,
    catalogue: Catalogue,
    settings: SessionSettings,
    sessions: IndexMap<String, RunSession>,
    active: Option<String>,
}

impl SessionRegistry {
    /// Connect to the store; an unreachable store fails here
    pub fn new(gateway: Arc<dyn StorageGateway>, settings: SessionSettings) -> Result<Self> {
        gateway.ping()?;
        let catalogue = Catalogue::open(gateway.catalogue()?)?;
        Ok(Self {
            gateway,
            catalogue,
            settings,
            sessions: IndexMap::new(),
            active: None,
        })
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn catalogue(&mut self) -> &mut Catalogue {
        &mut self.catalogue
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RunSession> {
        self.sessions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RunSession> {
        self.sessions.get_mut(name)
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Model tables already uploaded to a run (empty for unknown runs)
    pub fn uploaded_models(&self, name: &str) -> HashSet<String> {
        self.sessions
            .get(name)
            .map(|s| s.models.clone())
            .unwrap_or_default()
    }

    /// Route a record to its run, provisioning the run on first sight and
    /// making it the active one. `reference` is only consulted for new runs.
    pub fn resolve<F>(
        &mut self,
        name: &str,
        record: &ExtractedRecord,
        reference: F,
    ) -> Result<&mut RunSession>
    where
        F: FnOnce() -> Result<Option<Arc<ReferenceSet>>>,
    {
        let fresh = !self.sessions.contains_key(name);
        if fresh {
            let session = self.provision(name, record, reference()?)?;
            self.sessions.insert(name.to_string(), session);
        }
        self.make_active(name, !fresh)?;
        self.detect_barcoding(name, record)?;
        self.sessions
            .get_mut(name)
            .ok_or_else(|| PoreflowError::Storage(format!("run {} vanished from the registry", name)))
    }

    fn provision(
        &mut self,
        name: &str,
        record: &ExtractedRecord,
        reference: Option<Arc<ReferenceSet>>,
    ) -> Result<RunSession> {
        let settings = &self.settings;
        let mut resumed = false;
        if self.gateway.schema_exists(name)? {
            if settings.drop_existing {
                tracing::warn!("Dropping existing run store {}", name);
                self.gateway.drop_schema(name)?;
                self.catalogue.delete_run(name)?;
            } else if settings.resume {
                tracing::info!("Resuming existing run store {}", name);
                resumed = true;
            } else {
                return Err(PoreflowError::RunExists(name.to_string()));
            }
        }
        if !resumed {
            self.gateway.create_schema(name)?;
        }

        let mut conn = self.gateway.connect(name)?;
        let options = TableOptions {
            telemetry: settings.telemetry,
            reference: reference.is_some(),
            protocol: settings.protocol,
        };
        for table in run_tables(options) {
            conn.create_table(&table)?;
        }

        let reference_ids = match &reference {
            Some(set) => store_reference(conn.as_mut(), set, settings.telemetry)?,
            None => IndexMap::new(),
        };

        let runindex = if resumed {
            self.catalogue.latest_runindex(name)?
        } else {
            None
        };
        let runindex = match runindex {
            Some(index) => {
                self.catalogue.add_comment(
                    index,
                    name,
                    &settings.operator,
                    &format!("poreflow {} resumed", VERSION),
                )?;
                index
            }
            None => {
                let entry = RunEntry {
                    date: record.run_date(),
                    user_name: settings.operator.clone(),
                    flowcell_id: record.flowcell_id(),
                    run_name: name.to_string(),
                    comment: settings.comment.clone(),
                    flowcell_owner: settings.flowcell_owner.clone(),
                    run_number: settings.run_number.clone(),
                    reference: reference
                        .as_ref()
                        .map(|r| r.basename.clone())
                        .unwrap_or_else(|| NO_REFERENCE.to_string()),
                    reference_length: reference.as_ref().map(|r| r.total_len).unwrap_or(0),
                    basecaller_alg: record.workflow_name(),
                    version: record.workflow_version(),
                    process: settings.protocol.process_label().to_string(),
                    watch_dir: settings.watch_dir.clone(),
                    host_ip: host_ip(),
                };
                let index = self.catalogue.register_run(&entry)?;
                self.catalogue.add_comment(
                    index,
                    name,
                    &settings.operator,
                    &format!("poreflow {} started", VERSION),
                )?;
                for viewer in settings.viewers() {
                    self.catalogue.add_viewer(&viewer, index)?;
                }
                index
            }
        };

        let log = RunLog::open(&settings.log_dir, name)?;
        log.write_header(&RunHeader {
            start_time: timestamp(),
            version: VERSION.to_string(),
            options: settings.header_options(),
            reference_lines: RunHeader::reference_lines(reference.as_deref()),
            comment: settings.comment.clone(),
        })?;

        let pool = if settings.pool {
            (0..settings.pool_size)
                .map(|_| self.gateway.connect(name))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| {
                    PoreflowError::Storage(format!("cannot open worker connections for {}: {}", name, e))
                })?
        } else {
            Vec::new()
        };

        let (stored, models) = if resumed {
            existing_contents(conn.as_mut(), settings.telemetry)?
        } else {
            (HashSet::new(), HashSet::new())
        };

        tracing::info!(
            "Provisioned run {} (runindex {}, {} reference sequences, {} worker connections)",
            name,
            runindex,
            reference_ids.len(),
            pool.len()
        );

        Ok(RunSession {
            name: name.to_string(),
            runindex,
            operator: settings.operator.clone(),
            created: timestamp(),
            reference,
            reference_ids,
            conn,
            pool,
            log,
            barcoded: false,
            models,
            active: false,
            stored,
        })
    }

    fn make_active(&mut self, name: &str, switched: bool) -> Result<()> {
        if self.active.as_deref() == Some(name) {
            return Ok(());
        }

        for (other, session) in self.sessions.iter_mut() {
            if other != name && session.active {
                self.catalogue.set_active(other, false)?;
                session.active = false;
            }
        }

        let session = self
            .sessions
            .get_mut(name)
            .ok_or_else(|| PoreflowError::Storage(format!("run {} is not provisioned", name)))?;
        if switched {
            self.catalogue.add_comment(
                session.runindex,
                name,
                &session.operator,
                "poreflow switched runname",
            )?;
            session.log.record(&format!("switched to run {}", name));
        }
        self.catalogue.set_active(name, true)?;
        session.active = true;
        self.active = Some(name.to_string());
        tracing::info!("Active run is now {}", name);
        Ok(())
    }

    fn detect_barcoding(&mut self, name: &str, record: &ExtractedRecord) -> Result<()> {
        let Some(session) = self.sessions.get_mut(name) else {
            return Ok(());
        };
        if session.barcoded || record.barcode.is_none() {
            return Ok(());
        }
        session.conn.create_table(&barcode_assignment())?;
        session.barcoded = true;
        tracing::info!("Run {} is barcoded", name);
        Ok(())
    }

    /// Mark every run inactive and record that it finished cleanly
    pub fn finalize_all(&mut self) -> usize {
        let mut finished = 0;
        for (name, session) in self.sessions.iter_mut() {
            let result = self.catalogue.set_active(name, false).and_then(|_| {
                self.catalogue.add_comment(
                    session.runindex,
                    name,
                    &session.operator,
                    &format!("poreflow {} finished", VERSION),
                )
            });
            match result {
                Ok(_) => {
                    session
                        .log
                        .record(&format!("poreflow finished at:\t{}:\tset to inactive gracefully", timestamp()));
                    finished += 1;
                }
                Err(e) => {
                    tracing::error!("Could not finalize run {}: {}", name, e);
                    session.log.record(&format!("could not finalize run: {}", e));
                }
            }
            session.active = false;
        }
        self.active = None;
        finished
    }
}

/// Insert the reference rows of a run (reusing rows already present) and,
/// for new rows, their k-mer counts
fn store_reference(
    conn: &mut dyn StoreConnection,
    set: &ReferenceSet,
    telemetry: bool,
) -> Result<IndexMap<String, i64>> {
    let mut ids = IndexMap::new();
    for (name, info) in set.info_rows() {
        let existing = conn
            .select(REFERENCE_SEQ_INFO, &row([("refname", name.as_str().into())]))?
            .into_iter()
            .next()
            .and_then(|r| r.get("refid").and_then(Value::as_i64));

        let refid = match existing {
            Some(id) => id,
            None => {
                let id = conn.insert(REFERENCE_SEQ_INFO, &info)?;
                if telemetry {
                    if let Some(table) = set.kmers.get(&name) {
                        conn.insert_batch(REF_SEQUENCE_KMER, &table.rows(id))?;
                    }
                }
                id
            }
        };
        ids.insert(name, refid);
    }
    Ok(ids)
}

/// Basenames and model tables already stored in a resumed run
fn existing_contents(
    conn: &mut dyn StoreConnection,
    telemetry: bool,
) -> Result<(HashSet<String>, HashSet<String>)> {
    let text_column = |rows: Vec<Row>, column: &str| -> HashSet<String> {
        rows.into_iter()
            .filter_map(|r| r.get(column).and_then(|v| v.as_str().map(str::to_string)))
            .collect()
    };
    let stored = text_column(conn.query("SELECT basename FROM tracking_id", &[])?, "basename");
    let models = match telemetry {
        true => text_column(conn.query("SELECT DISTINCT model FROM model_data", &[])?, "model"),
        false => HashSet::new(),
    };
    Ok((stored, models))
}
