use std::path::Path;

use crate::{PoreflowError, Result};

/// Longest run name the store accepts
pub const MAX_RUN_NAME: usize = 64;

/// Trailing `_`-separated fields of a file name that identify the read
/// rather than the run (channel, read, strand, ...)
const READ_FIELDS: usize = 5;

const STRIPPED: [char; 5] = ['.', '!', ',', ';', ' '];

/// Derive the run name for a container file name.
///
/// `SAMPLE_X1_Y2_ch5_read3_strand.fast5` with operator `alice` becomes
/// `alice_SAMPLE`; a custom name is inserted after the operator.
pub fn run_name(file_name: &str, operator: &str, custom: Option<&str>) -> Result<String> {
    let fields: Vec<&str> = file_name.split('_').collect();
    let keep = fields.len().saturating_sub(READ_FIELDS);
    let prefix: String = fields[..keep]
        .join("_")
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect();
    if prefix.is_empty() {
        return Err(PoreflowError::Extraction(format!(
            "cannot derive a run name from {}",
            file_name
        )));
    }

    let name = match custom.filter(|c| !c.is_empty()) {
        Some(custom) => format!("{}_{}_{}", operator, custom, prefix),
        None => format!("{}_{}", operator, prefix),
    };
    Ok(truncate(&name))
}

/// Run name for a path, from its file name
pub fn run_name_for_path(path: &Path, operator: &str, custom: Option<&str>) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PoreflowError::Extraction(format!("{} has no file name", path.display())))?;
    run_name(&file_name, operator, custom)
}

fn truncate(name: &str) -> String {
    name.chars().take(MAX_RUN_NAME).collect()
}
