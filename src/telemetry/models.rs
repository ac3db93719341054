//! Pore models named in the basecaller log.

use regex::Regex;
use std::sync::OnceLock;

use crate::storage::value::{Row, Value};

static SELECTED_MODEL: OnceLock<Option<Regex>> = OnceLock::new();

fn selected_model_re() -> Option<&'static Regex> {
    SELECTED_MODEL
        .get_or_init(|| Regex::new(r#"Selected model: "(.*)"\."#).ok())
        .as_ref()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedModels {
    pub template: Option<String>,
    pub complement: Option<String>,
}

/// Scan the log line by line; a later selection replaces an earlier one
pub fn selected_models(log: &str) -> SelectedModels {
    let mut models = SelectedModels::default();
    let Some(re) = selected_model_re() else {
        return models;
    };
    for line in log.lines() {
        let Some(name) = re.captures(line).map(|c| c[1].to_string()) else {
            continue;
        };
        if name.contains("template") {
            models.template = Some(name.clone());
        }
        if name.contains("complement") {
            models.complement = Some(name);
        }
    }
    models
}

/// The `model_list` row, present only when a template model was selected
pub fn model_list_row(basename_id: i64, models: &SelectedModels) -> Option<Row> {
    let template = models.template.as_deref()?;
    let mut row = Row::new();
    row.insert("basename_id".into(), basename_id.into());
    row.insert("template_model".into(), template.into());
    row.insert(
        "complement_model".into(),
        models.complement.as_deref().map(Value::from).unwrap_or(Value::Null),
    );
    Some(row)
}

/// Model table rows tagged with the model name
pub fn model_data_rows(model: &str, rows: &[Row]) -> Vec<Row> {
    rows.iter()
        .map(|r| {
            let mut tagged = Row::new();
            tagged.insert("model".into(), model.into());
            for column in ["kmer", "variant", "level_mean", "level_stdv", "sd_mean", "sd_stdv", "weight"] {
                tagged.insert(column.into(), r.get(column).cloned().unwrap_or(Value::Null));
            }
            tagged
        })
        .collect()
}
