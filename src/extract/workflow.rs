//! Where things live inside a container.

use crate::container::Container;
use crate::{PoreflowError, Result};

/// Basecaller workflow families, probed in this order for each slot
pub const WORKFLOW_FAMILIES: [&str; 2] = ["Basecall_1D_CDNA", "Basecall_2D"];

/// Slots `_000` to `_009`
pub const WORKFLOW_SLOTS: usize = 10;

pub const TRACKING_ID_PATH: &str = "/UniqueGlobalKey/tracking_id";
pub const CHANNEL_ID_PATH: &str = "/UniqueGlobalKey/channel_id";

pub const TRACKING_FIELDS: [&str; 13] = [
    "asic_id",
    "asic_id_17",
    "asic_id_eeprom",
    "asic_temp",
    "device_id",
    "exp_script_purpose",
    "exp_script_name",
    "exp_start_time",
    "flow_cell_id",
    "heatsink_temp",
    "hostname",
    "run_id",
    "version_name",
];

pub const CHANNEL_FIELDS: [&str; 4] = ["channel_number", "digitisation", "offset", "sampling_rate"];

pub const GENERAL_FIELDS: [&str; 15] = [
    "basename",
    "local_folder",
    "workflow_script",
    "workflow_name",
    "read_id",
    "use_local",
    "tag",
    "model_path",
    "complement_model",
    "max_events",
    "input",
    "min_events",
    "config",
    "template_model",
    "channel",
];

pub const EVENT_DETECTION_FIELDS: [&str; 14] = [
    "start_mux",
    "end_mux",
    "abasic_event_index",
    "abasic_found",
    "abasic_peak_height",
    "duration",
    "hairpin_event_index",
    "hairpin_found",
    "hairpin_peak_height",
    "hairpin_polyt_level",
    "median_before",
    "read_number",
    "scaling_used",
    "start_time",
];

pub const SPLIT_HAIRPIN_FIELDS: [&str; 24] = [
    "abasic_dur",
    "abasic_index",
    "abasic_peak",
    "duration_comp",
    "duration_temp",
    "end_index_comp",
    "end_index_temp",
    "hairpin_abasics",
    "hairpin_dur",
    "hairpin_events",
    "hairpin_peak",
    "median_level_comp",
    "median_level_temp",
    "median_sd_comp",
    "median_sd_temp",
    "num_comp",
    "num_events",
    "num_temp",
    "pt_level",
    "range_comp",
    "range_temp",
    "split_index",
    "start_index_comp",
    "start_index_temp",
];

pub const TWOD_SUMMARY_FIELDS: [&str; 2] = ["mean_qscore", "sequence_length"];

pub const BARCODE_FIELDS: [&str; 8] = [
    "pos0_start",
    "score",
    "design",
    "pos1_end",
    "pos0_end",
    "pos1_start",
    "variant",
    "barcode_arrangement",
];

/// Attributes of a strand's `Events` (and `Model`) dataset kept on its read row
pub const STRAND_EVENT_FIELDS: [&str; 9] = [
    "duration",
    "start_time",
    "scale",
    "shift",
    "gross_shift",
    "drift",
    "scale_sd",
    "var_sd",
    "var",
];

/// Barcoding analyses are probed in slots `_000` to `_008`
pub const BARCODE_SLOTS: usize = 9;

/// Candidate workflow nodes in probe order
pub fn candidate_nodes() -> Vec<String> {
    (0..WORKFLOW_SLOTS)
        .flat_map(|slot| {
            WORKFLOW_FAMILIES
                .iter()
                .map(move |family| format!("/Analyses/{}_{:03}", family, slot))
        })
        .collect()
}

/// The basecall workflow node holding `Configuration/general`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowNode {
    pub path: String,
}

impl WorkflowNode {
    /// Last path component, e.g. `Basecall_2D_000`
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn child(&self, relative: &str) -> String {
        format!("{}/{}", self.path, relative.trim_start_matches('/'))
    }

    pub fn config(&self) -> String {
        self.child("Configuration/general")
    }

    pub fn summary(&self, section: &str) -> String {
        self.child(&format!("Summary/{}", section))
    }

    pub fn log(&self) -> String {
        self.child("Log")
    }
}

/// First candidate whose configuration node exists
pub fn locate_workflow(container: &dyn Container) -> Result<WorkflowNode> {
    candidate_nodes()
        .into_iter()
        .map(|path| WorkflowNode { path })
        .find(|node| container.exists(&node.config()))
        .ok_or_else(|| {
            PoreflowError::Extraction(
                "no basecall workflow with Configuration/general found".to_string(),
            )
        })
}

/// First barcoding summary present, if any
pub fn locate_barcoding(container: &dyn Container) -> Option<String> {
    (0..BARCODE_SLOTS)
        .map(|slot| format!("/Analyses/Barcoding_{:03}/Summary/barcoding", slot))
        .find(|path| container.exists(path))
}

pub fn event_detection_path(read_id: &str) -> String {
    format!("/Analyses/EventDetection_000/Reads/Read_{}", read_id)
}
