//! HDF5-backed containers.

use hdf5::types::{FixedAscii, FixedUnicode, FloatSize, IntSize, TypeDescriptor, VarLenAscii, VarLenUnicode};
use hdf5::{Attribute, File, H5Type, Location};
use std::path::Path;

use crate::container::{normalize, Container, ContainerSource};
use crate::storage::value::{row, Row, Value};
use crate::{PoreflowError, Result};

/// Upper bound on a fixed-length text dataset (one FASTQ record or a log)
const MAX_FIXED_TEXT: usize = 1 << 20;

fn h5_err(path: &str) -> impl Fn(hdf5::Error) -> PoreflowError + '_ {
    move |e| PoreflowError::Container(format!("{}: {}", path, e))
}

pub struct Hdf5Container {
    file: File,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| PoreflowError::Container(format!("{}: {}", path.display(), e)))?;
        Ok(Self { file })
    }

    fn read_compound<T: H5Type>(&self, path: &str) -> Result<Vec<T>> {
        let path = normalize(path);
        let ds = self.file.dataset(&path).map_err(h5_err(&path))?;
        ds.read_raw::<T>().map_err(h5_err(&path))
    }
}

/// Read an attribute into a store value, dispatching on its stored type
fn attribute_value(attr: &Attribute) -> hdf5::Result<Option<Value>> {
    let value = match attr.dtype()?.to_descriptor()? {
        TypeDescriptor::Integer(_) => Value::Integer(attr.read_scalar::<i64>()?),
        TypeDescriptor::Unsigned(IntSize::U8) => Value::Integer(attr.read_scalar::<u64>()? as i64),
        TypeDescriptor::Unsigned(_) => Value::Integer(attr.read_scalar::<u32>()? as i64),
        TypeDescriptor::Float(FloatSize::U4) => Value::Real(attr.read_scalar::<f32>()? as f64),
        TypeDescriptor::Float(FloatSize::U8) => Value::Real(attr.read_scalar::<f64>()?),
        TypeDescriptor::Boolean => Value::from(attr.read_scalar::<bool>()?),
        TypeDescriptor::VarLenAscii => Value::Text(attr.read_scalar::<VarLenAscii>()?.as_str().to_string()),
        TypeDescriptor::VarLenUnicode => {
            Value::Text(attr.read_scalar::<VarLenUnicode>()?.as_str().to_string())
        }
        TypeDescriptor::FixedAscii(_) => {
            Value::Text(attr.read_scalar::<FixedAscii<256>>()?.as_str().to_string())
        }
        TypeDescriptor::FixedUnicode(_) => {
            Value::Text(attr.read_scalar::<FixedUnicode<256>>()?.as_str().to_string())
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn collect_attributes(location: &Location, path: &str) -> Result<Row> {
    let mut attrs = Row::new();
    for name in location.attr_names().map_err(h5_err(path))? {
        let attr = location.attr(&name).map_err(h5_err(path))?;
        match attribute_value(&attr) {
            Ok(Some(value)) => {
                attrs.insert(name, value);
            }
            Ok(None) => tracing::debug!("Skipping attribute {} of {}: unsupported type", name, path),
            Err(e) => tracing::debug!("Skipping attribute {} of {}: {}", name, path, e),
        }
    }
    Ok(attrs)
}

fn fixed_text(text: &FixedAscii<8>) -> Value {
    Value::Text(text.as_str().to_string())
}

#[derive(H5Type, Clone, Copy)]
#[repr(C)]
#[allow(non_snake_case)]
struct EventRecord {
    mean: f64,
    start: f64,
    stdv: f64,
    length: f64,
    model_state: FixedAscii<8>,
    model_level: f64,
    #[hdf5(rename = "move")]
    moves: i64,
    p_model_state: f64,
    mp_state: FixedAscii<8>,
    p_mp_state: f64,
    p_A: f64,
    p_C: f64,
    p_G: f64,
    p_T: f64,
    raw_index: i64,
}

#[derive(H5Type, Clone, Copy)]
#[repr(C)]
struct AlignmentRecord {
    template: i64,
    complement: i64,
    kmer: FixedAscii<8>,
}

#[derive(H5Type, Clone, Copy)]
#[repr(C)]
struct ModelRecord {
    kmer: FixedAscii<8>,
    variant: i64,
    level_mean: f64,
    level_stdv: f64,
    sd_mean: f64,
    sd_stdv: f64,
    weight: f64,
}

impl Container for Hdf5Container {
    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        if path == "/" {
            return true;
        }
        // Probe each level so a missing parent reads as absent rather than failing
        let mut current = String::new();
        path.trim_start_matches('/').split('/').all(|part| {
            current.push('/');
            current.push_str(part);
            self.file.link_exists(&current)
        })
    }

    fn attributes(&self, path: &str) -> Result<Row> {
        let norm = normalize(path);
        if let Ok(group) = self.file.group(&norm) {
            return collect_attributes(&group, path);
        }
        let dataset = self.file.dataset(&norm).map_err(h5_err(path))?;
        collect_attributes(&dataset, path)
    }

    fn read_text(&self, path: &str) -> Result<String> {
        let norm = normalize(path);
        let ds = self.file.dataset(&norm).map_err(h5_err(path))?;
        let text = match ds.dtype().and_then(|t| t.to_descriptor()).map_err(h5_err(path))? {
            TypeDescriptor::VarLenAscii => ds
                .read_scalar::<VarLenAscii>()
                .map(|s| s.as_str().to_string()),
            TypeDescriptor::VarLenUnicode => ds
                .read_scalar::<VarLenUnicode>()
                .map(|s| s.as_str().to_string()),
            TypeDescriptor::FixedAscii(_) => ds
                .read_raw::<FixedAscii<MAX_FIXED_TEXT>>()
                .map(|v| v.first().map(|s| s.as_str().to_string()).unwrap_or_default()),
            other => {
                return Err(PoreflowError::Container(format!(
                    "{} is not a text dataset ({:?})",
                    path, other
                )))
            }
        };
        text.map_err(h5_err(path))
    }

    fn read_events(&self, path: &str) -> Result<Vec<Row>> {
        Ok(self
            .read_compound::<EventRecord>(path)?
            .iter()
            .map(|e| {
                row([
                    ("mean", e.mean.into()),
                    ("start", e.start.into()),
                    ("stdv", e.stdv.into()),
                    ("length", e.length.into()),
                    ("model_state", fixed_text(&e.model_state)),
                    ("model_level", e.model_level.into()),
                    ("move", e.moves.into()),
                    ("p_model_state", e.p_model_state.into()),
                    ("mp_state", fixed_text(&e.mp_state)),
                    ("p_mp_state", e.p_mp_state.into()),
                    ("p_A", e.p_A.into()),
                    ("p_C", e.p_C.into()),
                    ("p_G", e.p_G.into()),
                    ("p_T", e.p_T.into()),
                    ("raw_index", e.raw_index.into()),
                ])
            })
            .collect())
    }

    fn read_alignment(&self, path: &str) -> Result<Vec<Row>> {
        Ok(self
            .read_compound::<AlignmentRecord>(path)?
            .iter()
            .map(|a| {
                row([
                    ("template", a.template.into()),
                    ("complement", a.complement.into()),
                    ("kmer", fixed_text(&a.kmer)),
                ])
            })
            .collect())
    }

    fn read_model(&self, path: &str) -> Result<Vec<Row>> {
        Ok(self
            .read_compound::<ModelRecord>(path)?
            .iter()
            .map(|m| {
                row([
                    ("kmer", fixed_text(&m.kmer)),
                    ("variant", m.variant.into()),
                    ("level_mean", m.level_mean.into()),
                    ("level_stdv", m.level_stdv.into()),
                    ("sd_mean", m.sd_mean.into()),
                    ("sd_stdv", m.sd_stdv.into()),
                    ("weight", m.weight.into()),
                ])
            })
            .collect())
    }
}

/// Opens `.fast5` files with the HDF5 library
pub struct Hdf5Source;

impl ContainerSource for Hdf5Source {
    fn open(&self, path: &Path) -> Result<Box<dyn Container>> {
        Ok(Box::new(Hdf5Container::open(path)?))
    }
}
