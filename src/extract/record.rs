//! Records pulled out of one container file, ready for the store.

use chrono::{DateTime, Local};
use std::path::PathBuf;

use crate::bio::fasta::single_record;
use crate::bio::fastq::encode_quality;
use crate::extract::workflow::WorkflowNode;
use crate::storage::schema::{window_column, STRAND_TABLES, WINDOW_MINUTES};
use crate::storage::value::{Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Template,
    Complement,
    TwoD,
}

impl Strand {
    /// Processing order; the 2D read needs the template start time
    pub const ALL: [Strand; 3] = [Strand::Template, Strand::Complement, Strand::TwoD];

    /// Read table, also the suffix of the sequence id
    pub fn table(&self) -> &'static str {
        match self {
            Strand::Template => STRAND_TABLES[0],
            Strand::Complement => STRAND_TABLES[1],
            Strand::TwoD => STRAND_TABLES[2],
        }
    }

    /// Node under the workflow holding this strand's datasets
    pub fn node(&self) -> &'static str {
        match self {
            Strand::Template => "BaseCalled_template",
            Strand::Complement => "BaseCalled_complement",
            Strand::TwoD => "BaseCalled_2D",
        }
    }

    pub fn from_table(table: &str) -> Option<Strand> {
        Strand::ALL.into_iter().find(|s| s.table() == table)
    }

    /// Strand of a sequence id such as `read_1.basecalled_2d`
    pub fn from_seqid(seqid: &str) -> Option<Strand> {
        seqid.rsplit_once('.').and_then(|(_, suffix)| Strand::from_table(suffix))
    }
}

/// Time bucket columns for an elapsed time in minutes: `floor(minutes / w)`
pub fn window_values(minutes: f64) -> Vec<(String, Value)> {
    WINDOW_MINUTES
        .iter()
        .map(|&w| {
            let bucket = if minutes.is_finite() && minutes > 0.0 {
                (minutes / w as f64).floor() as i64
            } else {
                0
            };
            (window_column(w), Value::Integer(bucket))
        })
        .collect()
}

/// One basecalled read from a container
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    pub strand: Strand,
    /// `<basename>.<read table>`
    pub seqid: String,
    pub sequence: String,
    /// Phred scores
    pub quality: Vec<u8>,
    /// Seconds; the 2D read carries its template's start
    pub start_time: f64,
    /// Event/model attributes (template and complement only)
    pub attributes: Row,
}

impl SequenceRecord {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// The read as a one-record FASTA for an aligner's stdin
    pub fn fasta(&self) -> String {
        single_record(&self.seqid, &self.sequence)
    }

    pub fn to_row(&self, basename_id: i64, exp_start_time: &Value, pass: bool) -> Row {
        let mut row = Row::new();
        row.insert("basename_id".into(), basename_id.into());
        row.insert("seqid".into(), self.seqid.as_str().into());
        for (key, value) in &self.attributes {
            row.insert(key.clone(), value.clone());
        }
        if self.strand == Strand::TwoD {
            row.insert("start_time".into(), self.start_time.into());
        }
        row.insert("sequence".into(), self.sequence.as_str().into());
        row.insert("qual".into(), encode_quality(&self.quality).into());
        row.insert("seqlen".into(), self.len().into());
        row.extend(window_values(self.start_time / 60.0));
        row.insert("exp_start_time".into(), exp_start_time.clone());
        row.insert("pass".into(), pass.into());
        row
    }
}

/// Raw tables uploaded when telemetry is enabled
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryPayload {
    /// Last digit of the channel number
    pub channel_shard: usize,
    pub events: Vec<(Strand, Vec<Row>)>,
    pub twod_alignment: Option<Vec<Row>>,
    pub template_model: Option<String>,
    pub complement_model: Option<String>,
    /// Model tables not yet uploaded for this run
    pub models: Vec<(String, Vec<Row>)>,
}

/// Everything extracted from one container file
#[derive(Debug, Clone)]
pub struct ExtractedRecord {
    pub path: PathBuf,
    pub basename: String,
    pub workflow: WorkflowNode,
    pub pass: bool,
    pub md5sum: String,
    pub tracking: Row,
    pub general: Row,
    pub summary: Row,
    pub barcode: Option<Row>,
    pub sequences: Vec<SequenceRecord>,
    pub telemetry: Option<TelemetryPayload>,
    /// Problems that skipped part of the file without failing it
    pub warnings: Vec<String>,
}

impl ExtractedRecord {
    pub fn exp_start_time(&self) -> Value {
        self.tracking
            .get("exp_start_time")
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn sequence(&self, strand: Strand) -> Option<&SequenceRecord> {
        self.sequences.iter().find(|s| s.strand == strand)
    }

    fn text(row: &Row, key: &str) -> Option<String> {
        row.get(key).filter(|v| !v.is_null()).map(|v| v.to_string())
    }

    /// Experiment start as a calendar date, today when unknown
    pub fn run_date(&self) -> String {
        self.exp_start_time()
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|d| d.with_timezone(&Local))
            .unwrap_or_else(Local::now)
            .format("%Y-%m-%d")
            .to_string()
    }

    pub fn flowcell_id(&self) -> String {
        Self::text(&self.tracking, "device_id").unwrap_or_default()
    }

    /// Basecaller workflow version
    pub fn workflow_version(&self) -> String {
        Self::text(&self.general, "metrichor_version").unwrap_or_default()
    }

    pub fn workflow_name(&self) -> String {
        Self::text(&self.general, "workflow_name").unwrap_or_else(|| self.workflow.name().to_string())
    }
}

/// Last digit of the channel, from the workflow configuration or the device
/// channel number
pub fn channel_shard(general: &Row, tracking: &Row) -> usize {
    general
        .get("channel")
        .filter(|v| !v.is_null())
        .and_then(|c| c.to_string().trim().chars().last())
        .and_then(|c| c.to_digit(10))
        .or_else(|| {
            tracking
                .get("channel_number")
                .and_then(Value::as_i64)
                .map(|n| n.rem_euclid(10) as u32)
        })
        .unwrap_or(0) as usize
}
