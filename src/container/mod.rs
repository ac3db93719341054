//! Read access to the hierarchical per-read container files.
//!
//! Paths are `/`-separated node paths such as
//! `/Analyses/Basecall_2D_000/Configuration/general`. Attributes come back
//! as a `Row` in the container's attribute order; compound datasets come
//! back as one `Row` per element.

pub mod memory;

#[cfg(feature = "hdf5")]
pub mod hdf5;

use std::path::Path;

use crate::storage::value::Row;
use crate::Result;

pub use memory::{JsonSource, MemoryContainer};

#[cfg(feature = "hdf5")]
pub use self::hdf5::{Hdf5Container, Hdf5Source};

/// One opened container file
pub trait Container {
    /// True for an existing group or dataset
    fn exists(&self, path: &str) -> bool;

    /// Every attribute of a group or dataset
    fn attributes(&self, path: &str) -> Result<Row>;

    /// A scalar text dataset, e.g. a `Fastq` record or the basecaller `Log`
    fn read_text(&self, path: &str) -> Result<String>;

    /// Basecaller event table (`BaseCalled_template/Events`)
    fn read_events(&self, path: &str) -> Result<Vec<Row>>;

    /// Template/complement event pairing of a 2D read (`BaseCalled_2D/Alignment`)
    fn read_alignment(&self, path: &str) -> Result<Vec<Row>>;

    /// Pore model table (`BaseCalled_template/Model`)
    fn read_model(&self, path: &str) -> Result<Vec<Row>>;
}

/// Opens container files found by the watcher
pub trait ContainerSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>>;
}

/// Attributes restricted to an allow-list, in allow-list order
pub fn allowed_attributes(container: &dyn Container, path: &str, fields: &[&str]) -> Result<Row> {
    let attrs = container.attributes(path)?;
    Ok(fields
        .iter()
        .filter_map(|f| attrs.get(*f).map(|v| (f.to_string(), v.clone())))
        .collect())
}

/// Normalise a node path to a leading `/` and no trailing `/`
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

/// The source used when none is configured explicitly
pub fn default_source() -> Box<dyn ContainerSource> {
    #[cfg(feature = "hdf5")]
    {
        Box::new(Hdf5Source)
    }
    #[cfg(not(feature = "hdf5"))]
    {
        tracing::warn!("Built without the hdf5 feature; container files are read as JSON fixtures");
        Box::new(JsonSource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::value::{row, Value};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Analyses/Basecall_2D_000/"), "/Analyses/Basecall_2D_000");
        assert_eq!(normalize("/UniqueGlobalKey"), "/UniqueGlobalKey");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn test_allow_list_keeps_order_and_drops_unknown() {
        let container = MemoryContainer::new().with_attributes(
            "/UniqueGlobalKey/tracking_id",
            row([
                ("run_id", "abc".into()),
                ("device_id", "MN02935".into()),
                ("unlisted", 1.into()),
            ]),
        );
        let attrs = allowed_attributes(
            &container,
            "/UniqueGlobalKey/tracking_id",
            &["device_id", "asic_id", "run_id"],
        )
        .unwrap();

        let keys: Vec<&str> = attrs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["device_id", "run_id"]);
        assert_eq!(attrs["device_id"], Value::from("MN02935"));
    }
}
