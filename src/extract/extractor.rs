use std::collections::HashSet;
use std::path::Path;

use crate::bio::fastq::parse_single;
use crate::container::{allowed_attributes, Container};
use crate::extract::record::{
    channel_shard, window_values, ExtractedRecord, SequenceRecord, Strand, TelemetryPayload,
};
use crate::extract::workflow::{
    event_detection_path, locate_barcoding, locate_workflow, WorkflowNode, BARCODE_FIELDS,
    CHANNEL_FIELDS, CHANNEL_ID_PATH, EVENT_DETECTION_FIELDS, GENERAL_FIELDS, SPLIT_HAIRPIN_FIELDS,
    STRAND_EVENT_FIELDS, TRACKING_FIELDS, TRACKING_ID_PATH, TWOD_SUMMARY_FIELDS,
};
use crate::storage::schema::STRAND_SUMMARY_FIELDS;
use crate::storage::value::{Row, Value};
use crate::telemetry::models::selected_models;
use crate::{PoreflowError, Result};

/// Hex MD5 of the full file contents
pub fn file_checksum(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!("{:x}", md5::compute(&bytes)))
}

/// Files under a `pass` directory passed basecalling quality filters
pub fn is_pass(path: &Path) -> bool {
    let text = path.to_string_lossy();
    text.contains("/pass/") || text.contains("\\pass\\")
}

pub struct Extractor {
    telemetry: bool,
}

impl Extractor {
    pub fn new(telemetry: bool) -> Self {
        Self { telemetry }
    }

    /// Pull every record out of an opened container.
    ///
    /// `uploaded_models` names the models this run already stored; their
    /// tables are not read again.
    pub fn extract(
        &self,
        container: &dyn Container,
        path: &Path,
        uploaded_models: &HashSet<String>,
    ) -> Result<ExtractedRecord> {
        let workflow = locate_workflow(container)?;
        let config = container.attributes(&workflow.config())?;
        let basename = config
            .get("basename")
            .filter(|v| !v.is_null())
            .map(|v| v.to_string())
            .ok_or_else(|| {
                PoreflowError::Extraction(format!("{} has no basename", workflow.config()))
            })?;

        let pass = is_pass(path);
        let md5sum = file_checksum(path)?;
        let mut warnings = Vec::new();

        let tracking = tracking_row(container, &basename, path, &md5sum, pass)?;
        let exp_start_time = tracking.get("exp_start_time").cloned().unwrap_or(Value::Null);

        let mut general: Row = GENERAL_FIELDS
            .iter()
            .filter_map(|f| config.get(*f).map(|v| (f.to_string(), v.clone())))
            .collect();
        let node_attrs = container.attributes(&workflow.path)?;
        general.insert(
            "metrichor_version".into(),
            node_attrs.get("version").cloned().unwrap_or(Value::Null),
        );
        general.insert(
            "metrichor_time_stamp".into(),
            node_attrs.get("time_stamp").cloned().unwrap_or(Value::Null),
        );

        let read_minutes = self.event_detection(container, &mut general, &tracking, &mut warnings)?;
        general.insert("pass".into(), pass.into());
        general.insert("exp_start_time".into(), exp_start_time.clone());
        general.extend(window_values(read_minutes));

        let mut summary = summary_row(container, &workflow)?;
        summary.insert("pass".into(), pass.into());
        summary.insert("exp_start_time".into(), exp_start_time);
        summary.extend(window_values(read_minutes));

        let barcode = match locate_barcoding(container) {
            Some(node) => Some(allowed_attributes(container, &node, &BARCODE_FIELDS)?),
            None => None,
        };

        let sequences = sequences(container, &workflow, &basename, &mut warnings)?;

        let telemetry = if self.telemetry {
            let shard = channel_shard(&general, &tracking);
            Some(telemetry_payload(
                container,
                &workflow,
                shard,
                uploaded_models,
                &mut warnings,
            ))
        } else {
            None
        };

        for warning in &warnings {
            tracing::warn!("{}: {}", basename, warning);
        }

        Ok(ExtractedRecord {
            path: path.to_path_buf(),
            basename,
            workflow,
            pass,
            md5sum,
            tracking,
            general,
            summary,
            barcode,
            sequences,
            telemetry,
            warnings,
        })
    }

    /// Merge the event-detection attributes of the read into `general` and
    /// return the read start in minutes since the experiment began
    fn event_detection(
        &self,
        container: &dyn Container,
        general: &mut Row,
        tracking: &Row,
        warnings: &mut Vec<String>,
    ) -> Result<f64> {
        let read_id = general.get("read_id").filter(|v| !v.is_null()).map(|v| v.to_string());
        let Some(read_id) = read_id else {
            warnings.push("no read_id; time buckets default to 0".to_string());
            return Ok(0.0);
        };
        let node = event_detection_path(&read_id);
        if !container.exists(&node) {
            warnings.push(format!("{} missing; time buckets default to 0", node));
            return Ok(0.0);
        }

        let attrs = container.attributes(&node)?;
        for field in EVENT_DETECTION_FIELDS {
            if let Some(value) = attrs.get(field) {
                general.insert(field.to_string(), value.clone());
            }
        }
        if let Some(name) = attrs.get("read_id") {
            general.insert("read_name".into(), name.clone());
        }

        let start = attrs.get("start_time").and_then(Value::as_f64);
        let rate = tracking
            .get("sampling_rate")
            .and_then(Value::as_f64)
            .filter(|r| *r > 0.0);
        match (start, rate) {
            (Some(start), Some(rate)) => Ok(start / rate / 60.0),
            _ => {
                warnings.push("no start time or sampling rate; time buckets default to 0".to_string());
                Ok(0.0)
            }
        }
    }
}

fn tracking_row(
    container: &dyn Container,
    basename: &str,
    path: &Path,
    md5sum: &str,
    pass: bool,
) -> Result<Row> {
    let mut tracking = Row::new();
    tracking.insert("basename".into(), basename.into());
    if container.exists(TRACKING_ID_PATH) {
        tracking.extend(allowed_attributes(container, TRACKING_ID_PATH, &TRACKING_FIELDS)?);
    }
    if container.exists(CHANNEL_ID_PATH) {
        tracking.extend(allowed_attributes(container, CHANNEL_ID_PATH, &CHANNEL_FIELDS)?);
    }
    tracking.insert("file_path".into(), path.to_string_lossy().into_owned().into());
    tracking.insert("md5sum".into(), md5sum.into());
    tracking.insert("pass".into(), pass.into());
    Ok(tracking)
}

/// Split-hairpin statistics merged with the per-strand basecall summaries
fn summary_row(container: &dyn Container, workflow: &WorkflowNode) -> Result<Row> {
    let mut summary = Row::new();
    let hairpin = workflow.summary("split_hairpin");
    if container.exists(&hairpin) {
        summary = allowed_attributes(container, &hairpin, &SPLIT_HAIRPIN_FIELDS)?;
    }

    let strand_fields: Vec<&str> = STRAND_SUMMARY_FIELDS.iter().map(|(f, _)| *f).collect();
    let sections: [(&str, &[&str], &str); 3] = [
        ("basecall_1d_complement", &strand_fields, "C"),
        ("basecall_1d_template", &strand_fields, "T"),
        ("basecall_2d", &TWOD_SUMMARY_FIELDS, "2"),
    ];
    for (section, fields, suffix) in sections {
        let node = workflow.summary(section);
        if !container.exists(&node) {
            continue;
        }
        for (key, value) in allowed_attributes(container, &node, fields)? {
            summary.insert(format!("{}{}", key, suffix), value);
        }
    }
    Ok(summary)
}

fn sequences(
    container: &dyn Container,
    workflow: &WorkflowNode,
    basename: &str,
    warnings: &mut Vec<String>,
) -> Result<Vec<SequenceRecord>> {
    let mut records = Vec::new();
    let mut template_start = 0.0;

    for strand in Strand::ALL {
        let node = workflow.child(strand.node());
        let fastq_path = format!("{}/Fastq", node);
        if !container.exists(&fastq_path) {
            continue;
        }

        let fastq = match container.read_text(&fastq_path).and_then(|text| parse_single(&text)) {
            Ok(fastq) => fastq,
            Err(e) => {
                warnings.push(format!("cannot read {} FASTQ: {}", strand.table(), e));
                continue;
            }
        };

        let mut attributes = Row::new();
        let events = format!("{}/Events", node);
        let model = format!("{}/Model", node);
        if strand != Strand::TwoD && container.exists(&events) {
            attributes = allowed_attributes(container, &events, &STRAND_EVENT_FIELDS)?;
            if container.exists(&model) {
                attributes.extend(allowed_attributes(container, &model, &STRAND_EVENT_FIELDS)?);
            }
        }

        let start_time = match strand {
            Strand::TwoD => template_start,
            _ => attributes
                .get("start_time")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        };
        if strand == Strand::Template {
            template_start = start_time;
        }

        records.push(SequenceRecord {
            strand,
            seqid: format!("{}.{}", basename, strand.table()),
            sequence: fastq.sequence,
            quality: fastq.quality,
            start_time,
            attributes,
        });
    }

    Ok(records)
}

fn telemetry_payload(
    container: &dyn Container,
    workflow: &WorkflowNode,
    channel_shard: usize,
    uploaded_models: &HashSet<String>,
    warnings: &mut Vec<String>,
) -> TelemetryPayload {
    let mut payload = TelemetryPayload {
        channel_shard,
        ..TelemetryPayload::default()
    };

    for strand in [Strand::Template, Strand::Complement] {
        let events = workflow.child(&format!("{}/Events", strand.node()));
        if !container.exists(&events) {
            continue;
        }
        match container.read_events(&events) {
            Ok(rows) => payload.events.push((strand, rows)),
            Err(e) => warnings.push(format!("cannot read {} events: {}", strand.table(), e)),
        }
    }

    let alignment = workflow.child(&format!("{}/Alignment", Strand::TwoD.node()));
    if container.exists(&alignment) {
        match container.read_alignment(&alignment) {
            Ok(rows) => payload.twod_alignment = Some(rows),
            Err(e) => warnings.push(format!("cannot read 2D alignment: {}", e)),
        }
    }

    let log = workflow.log();
    if !container.exists(&log) {
        return payload;
    }
    let log = match container.read_text(&log) {
        Ok(text) => text,
        Err(e) => {
            warnings.push(format!("cannot read basecaller log: {}", e));
            return payload;
        }
    };

    let selected = selected_models(&log);
    let wanted = [
        (selected.template.clone(), Strand::Template),
        (selected.complement.clone(), Strand::Complement),
    ];
    for (name, strand) in wanted {
        let Some(name) = name else { continue };
        if uploaded_models.contains(&name) || payload.models.iter().any(|(m, _)| *m == name) {
            continue;
        }
        let table = workflow.child(&format!("{}/Model", strand.node()));
        if !container.exists(&table) {
            continue;
        }
        match container.read_model(&table) {
            Ok(rows) => payload.models.push((name, rows)),
            Err(e) => warnings.push(format!("cannot read model {}: {}", name, e)),
        }
    }
    payload.template_model = selected.template;
    payload.complement_model = selected.complement;
    payload
}
