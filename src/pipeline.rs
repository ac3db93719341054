//! Per-file flow: name the run, extract the file, route it to its session,
//! store its rows, align its reads and upload its telemetry.

use std::path::Path;
use std::sync::Arc;

use crate::alignment::orchestrator::align_reads;
use crate::alignment::pool::TaskFailure;
use crate::container::{default_source, ContainerSource};
use crate::core::config::Config;
use crate::extract::{ExtractedRecord, Extractor};
use crate::reference::ReferenceManager;
use crate::session::{run_name_for_path, SessionRegistry, SessionSettings};
use crate::storage::traits::StorageGateway;
use crate::telemetry::upload_telemetry;
use crate::tools::{aligner_for, Aligner};
use crate::{PoreflowError, Result};

/// What happened to one dispatched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Stored { run: String, basename_id: i64 },
    /// Already in the run store (resumed runs)
    Skipped { run: String },
    Failed { reason: String },
}

pub struct Pipeline {
    config: Config,
    source: Box<dyn ContainerSource>,
    extractor: Extractor,
    registry: SessionRegistry,
    references: ReferenceManager,
    aligner: Option<Box<dyn Aligner>>,
}

impl Pipeline {
    /// Validate the configuration, check the aligner, prepare references
    /// and connect to the store. Every failure here is fatal.
    pub fn new(config: Config, gateway: Arc<dyn StorageGateway>) -> Result<Self> {
        config.validate()?;
        let aligner = aligner_for(&config.alignment);
        if let Some(aligner) = aligner.as_deref() {
            if !aligner.is_available() {
                return Err(PoreflowError::Tool(format!(
                    "{} was not found on PATH",
                    aligner.name()
                )));
            }
        }
        Self::with_parts(config, gateway, default_source(), aligner)
    }

    /// Assemble a pipeline around an explicit container source and aligner
    pub fn with_parts(
        config: Config,
        gateway: Arc<dyn StorageGateway>,
        source: Box<dyn ContainerSource>,
        aligner: Option<Box<dyn Aligner>>,
    ) -> Result<Self> {
        config.validate()?;
        let mut references = ReferenceManager::from_config(&config);
        let prepared = references.prepare_all(aligner.as_deref())?;
        if !prepared.is_empty() {
            tracing::info!("{} reference set(s) prepared", prepared.len());
        }

        let registry = SessionRegistry::new(gateway, SessionSettings::from_config(&config))?;
        Ok(Self {
            extractor: Extractor::new(config.features.telemetry),
            config,
            source,
            registry,
            references,
            aligner,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }

    /// Handle one dispatched file.
    ///
    /// Problems confined to the file come back as [`FileOutcome::Failed`]
    /// after being logged; an `Err` means the watch loop must stop. Only
    /// provisioning a new run (store collision, bad reference, unreachable
    /// store) is fatal.
    pub fn process_file(&mut self, path: &Path) -> Result<FileOutcome> {
        let run = match run_name_for_path(
            path,
            &self.config.run.operator,
            self.config.run.custom_name.as_deref(),
        ) {
            Ok(run) => run,
            Err(e) => return Ok(self.failed(None, path, e)),
        };

        let record = match self.read(&run, path) {
            Ok(record) => record,
            Err(e) => return Ok(self.failed(Some(&run), path, e)),
        };

        // Only provisioning a new run can stop the watch
        let known = self.registry.contains(&run);
        let references = &mut self.references;
        let aligner = self.aligner.as_deref();
        let session = match self
            .registry
            .resolve(&run, &record, || references.for_file(path, aligner))
        {
            Ok(session) => session,
            Err(e) if known => return Ok(self.failed(Some(&run), path, e)),
            Err(e) => return Err(e),
        };

        if session.is_stored(&record.basename) {
            tracing::debug!("{} is already stored in {}", record.basename, run);
            return Ok(FileOutcome::Skipped { run });
        }
        for warning in &record.warnings {
            session
                .log
                .record(&format!("{}: {}", path.display(), warning));
        }

        let basename_id = match session.store_record(&record) {
            Ok(id) => id,
            Err(e) => return Ok(self.failed(Some(&run), path, e)),
        };

        let mut failures: Vec<TaskFailure> = Vec::new();
        if let Some(aligner) = aligner {
            match align_reads(session, aligner, basename_id, &record.sequences) {
                Ok(mut f) => failures.append(&mut f),
                Err(e) => return Ok(self.failed(Some(&run), path, e)),
            }
        }
        if let Some(payload) = record.telemetry.as_ref() {
            match upload_telemetry(session, basename_id, payload) {
                Ok(mut f) => failures.append(&mut f),
                Err(e) => return Ok(self.failed(Some(&run), path, e)),
            }
        }

        for failure in &failures {
            tracing::warn!("{}: {} failed: {}", record.basename, failure.label, failure.error);
            session.log.record(&format!(
                "{}: {} failed: {}",
                path.display(),
                failure.label,
                failure.error
            ));
        }

        tracing::debug!("Stored {} as {} in {}", record.basename, basename_id, run);
        Ok(FileOutcome::Stored { run, basename_id })
    }

    fn read(&self, run: &str, path: &Path) -> Result<ExtractedRecord> {
        let container = self.source.open(path)?;
        let uploaded = self.registry.uploaded_models(run);
        self.extractor.extract(container.as_ref(), path, &uploaded)
    }

    fn failed(&self, run: Option<&str>, path: &Path, error: PoreflowError) -> FileOutcome {
        let reason = error.to_string();
        tracing::error!("{}: {}", path.display(), reason);
        if let Some(session) = run.and_then(|r| self.registry.get(r)) {
            session.log.record(&format!("{}: {}", path.display(), reason));
        }
        FileOutcome::Failed { reason }
    }

    /// Mark every run inactive; returns how many were closed
    pub fn finish(&mut self) -> usize {
        self.registry.finalize_all()
    }
}
