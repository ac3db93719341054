//! One provisioned run and the writes made on its behalf.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::extract::ExtractedRecord;
use crate::reference::ReferenceSet;
use crate::session::runlog::RunLog;
use crate::storage::schema::{BARCODE_ASSIGNMENT, BASECALL_SUMMARY, CONFIG_GENERAL, TRACKING_ID};
use crate::storage::traits::StoreConnection;
use crate::storage::value::Row;
use crate::Result;

pub struct RunSession {
    pub name: String,
    /// Catalogue id of the run row
    pub runindex: i64,
    pub operator: String,
    pub created: String,
    pub reference: Option<Arc<ReferenceSet>>,
    /// Reference sequence name → `reference_seq_info.refid` in this run
    pub reference_ids: IndexMap<String, i64>,
    /// Connection used by the scheduler thread
    pub conn: Box<dyn StoreConnection>,
    /// Connections lent to alignment and telemetry workers
    pub pool: Vec<Box<dyn StoreConnection>>,
    pub log: RunLog,
    pub barcoded: bool,
    /// Model tables already uploaded to this run
    pub models: HashSet<String>,
    pub active: bool,
    /// Basenames already in `tracking_id`
    pub stored: HashSet<String>,
}

/// Copy of `row` with `basename_id` as its first column
pub fn with_basename_id(basename_id: i64, row: &Row) -> Row {
    let mut out = Row::with_capacity(row.len() + 1);
    out.insert("basename_id".into(), basename_id.into());
    for (key, value) in row {
        if key != "basename_id" {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

impl RunSession {
    pub fn is_stored(&self, basename: &str) -> bool {
        self.stored.contains(basename)
    }

    pub fn reference_id(&self, name: &str) -> Option<i64> {
        self.reference_ids.get(name).copied()
    }

    /// Write the tracking, configuration, summary, barcode and read rows of
    /// one file in a single transaction, returning its `basename_id`
    pub fn store_record(&mut self, record: &ExtractedRecord) -> Result<i64> {
        let barcode = record.barcode.as_ref().filter(|_| self.barcoded);
        let exp_start_time = record.exp_start_time();
        let mut basename_id = 0;

        self.conn.atomically(&mut |conn| {
            basename_id = conn.insert(TRACKING_ID, &record.tracking)?;
            conn.insert(CONFIG_GENERAL, &with_basename_id(basename_id, &record.general))?;
            conn.insert(BASECALL_SUMMARY, &with_basename_id(basename_id, &record.summary))?;
            if let Some(barcode) = barcode {
                conn.insert(BARCODE_ASSIGNMENT, &with_basename_id(basename_id, barcode))?;
            }
            for sequence in &record.sequences {
                let row = sequence.to_row(basename_id, &exp_start_time, record.pass);
                conn.insert(sequence.strand.table(), &row)?;
            }
            Ok(())
        })?;

        self.stored.insert(record.basename.clone());
        Ok(basename_id)
    }
}
