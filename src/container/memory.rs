//! In-memory containers.
//!
//! Used by tests and for JSON fixture files that mirror the layout of a
//! real container: attribute sets, text datasets and tables keyed by node
//! path. Groups exist implicitly as prefixes of any stored path.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::container::{normalize, Container, ContainerSource};
use crate::storage::value::Row;
use crate::{PoreflowError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContainer {
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    attributes: IndexMap<String, Row>,
    #[serde(default)]
    text: IndexMap<String, String>,
    #[serde(default)]
    tables: IndexMap<String, Vec<Row>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, path: &str) -> Self {
        self.groups.push(normalize(path));
        self
    }

    /// Merge attributes into a node, creating it if needed
    pub fn with_attributes(mut self, path: &str, attrs: Row) -> Self {
        self.attributes
            .entry(normalize(path))
            .or_default()
            .extend(attrs);
        self
    }

    pub fn with_text(mut self, path: &str, text: impl Into<String>) -> Self {
        self.text.insert(normalize(path), text.into());
        self
    }

    pub fn with_table(mut self, path: &str, rows: Vec<Row>) -> Self {
        self.tables.insert(normalize(path), rows);
        self
    }

    pub fn from_json(data: &str) -> Result<Self> {
        let mut container: MemoryContainer = serde_json::from_str(data)
            .map_err(|e| PoreflowError::Container(format!("Invalid container fixture: {}", e)))?;
        container.normalize_keys();
        Ok(container)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PoreflowError::Container(format!("Cannot serialize container: {}", e)))
    }

    fn normalize_keys(&mut self) {
        self.groups = self.groups.iter().map(|g| normalize(g)).collect();
        self.attributes = std::mem::take(&mut self.attributes)
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        self.text = std::mem::take(&mut self.text)
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
        self.tables = std::mem::take(&mut self.tables)
            .into_iter()
            .map(|(k, v)| (normalize(&k), v))
            .collect();
    }

    fn paths(&self) -> impl Iterator<Item = &String> {
        self.groups
            .iter()
            .chain(self.attributes.keys())
            .chain(self.text.keys())
            .chain(self.tables.keys())
    }

    fn table(&self, path: &str) -> Result<Vec<Row>> {
        self.tables
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| PoreflowError::Container(format!("No table at {}", path)))
    }
}

impl Container for MemoryContainer {
    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        if path == "/" {
            return true;
        }
        let prefix = format!("{}/", path);
        self.paths().any(|p| *p == path || p.starts_with(&prefix))
    }

    fn attributes(&self, path: &str) -> Result<Row> {
        if let Some(attrs) = self.attributes.get(&normalize(path)) {
            return Ok(attrs.clone());
        }
        if self.exists(path) {
            Ok(Row::new())
        } else {
            Err(PoreflowError::Container(format!("No node at {}", path)))
        }
    }

    fn read_text(&self, path: &str) -> Result<String> {
        self.text
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| PoreflowError::Container(format!("No text dataset at {}", path)))
    }

    fn read_events(&self, path: &str) -> Result<Vec<Row>> {
        self.table(path)
    }

    fn read_alignment(&self, path: &str) -> Result<Vec<Row>> {
        self.table(path)
    }

    fn read_model(&self, path: &str) -> Result<Vec<Row>> {
        self.table(path)
    }
}

/// Reads container files written as JSON fixtures
pub struct JsonSource;

impl ContainerSource for JsonSource {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>> {
        let data = std::fs::read_to_string(path)?;
        Ok(Box::new(MemoryContainer::from_json(&data)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::{row, Value};
    use pretty_assertions::assert_eq;

    fn sample() -> MemoryContainer {
        MemoryContainer::new()
            .with_attributes(
                "/Analyses/Basecall_2D_000/Configuration/general",
                row([("basename", "read_1".into())]),
            )
            .with_text("/Analyses/Basecall_2D_000/BaseCalled_template/Fastq", "@r\nAC\n+\n!!\n")
            .with_table(
                "/Analyses/Basecall_2D_000/BaseCalled_2D/Alignment",
                vec![row([("template", 0.into()), ("complement", 3.into())])],
            )
    }

    #[test]
    fn test_groups_are_implicit() {
        let c = sample();
        assert!(c.exists("/Analyses"));
        assert!(c.exists("/Analyses/Basecall_2D_000/"));
        assert!(c.exists("Analyses/Basecall_2D_000/BaseCalled_template/Fastq"));
        assert!(!c.exists("/Analyses/Basecall_2D_00"));
        assert!(!c.exists("/Analyses/Basecall_1D_CDNA_000"));
    }

    #[test]
    fn test_attributes_of_plain_group_are_empty() {
        let c = sample();
        assert!(c.attributes("/Analyses/Basecall_2D_000").unwrap().is_empty());
        assert!(c.attributes("/Nowhere").is_err());
    }

    #[test]
    fn test_json_roundtrip_normalizes_keys() {
        let json = r#"{
            "attributes": {
                "UniqueGlobalKey/channel_id/": {"sampling_rate": 3000.0, "channel_number": 101}
            },
            "text": {"/Log": "Selected model: \"t\"."}
        }"#;
        let c = MemoryContainer::from_json(json).unwrap();
        let attrs = c.attributes("/UniqueGlobalKey/channel_id").unwrap();
        assert_eq!(attrs["sampling_rate"], Value::Real(3000.0));
        assert_eq!(attrs["channel_number"], Value::Integer(101));
        assert!(c.read_text("/Log").is_ok());

        let again = MemoryContainer::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(again, c);
    }

    #[test]
    fn test_json_source_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("read.fast5");
        std::fs::write(&path, sample().to_json().unwrap()).unwrap();

        let opened = JsonSource.open(&path).unwrap();
        assert_eq!(
            opened
                .read_alignment("/Analyses/Basecall_2D_000/BaseCalled_2D/Alignment")
                .unwrap()
                .len(),
            1
        );
        assert!(JsonSource.open(&dir.path().join("missing.fast5")).is_err());
    }
}
