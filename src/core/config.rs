use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::core::paths;
use crate::PoreflowError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Root of the tree the instrument writes into
    pub watch_dir: Option<PathBuf>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Minimum age of a discovered file before it is read
    #[serde(default = "default_quiescence")]
    pub quiescence_secs: u64,
    /// Print a progress line after this many dispatched files
    #[serde(default = "default_status_every")]
    pub status_every: usize,
    #[serde(default = "default_marker_dir")]
    pub marker_dir: String,
    #[serde(default = "default_exclude")]
    pub exclude: String,
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding one store file per run plus the catalogue
    pub store_dir: Option<PathBuf>,
    /// Directory for per-run log files
    pub log_dir: Option<PathBuf>,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Operator name used as the run name prefix
    #[serde(default)]
    pub operator: String,
    /// Extra modifier inserted between operator and run prefix
    pub custom_name: Option<String>,
    #[serde(default = "default_flowcell_owner")]
    pub flowcell_owner: String,
    #[serde(default = "default_run_number")]
    pub run_number: String,
    #[serde(default = "default_comment")]
    pub comment: String,
    /// Additional catalogue users allowed to view the run
    #[serde(default)]
    pub view_users: Vec<String>,
    #[serde(default)]
    pub drop_existing: bool,
    #[serde(default)]
    pub resume: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default)]
    pub mode: AlignMode,
    /// Reference files shared by every run
    #[serde(default)]
    pub reference: Vec<PathBuf>,
    /// Discover references under `downloads/**/reference/` instead
    #[serde(default)]
    pub batch: bool,
    #[serde(default = "default_bwa_options")]
    pub bwa_options: String,
    #[serde(default = "default_last_options")]
    pub last_options: String,
    /// Directory for validated merged reference files
    pub reference_dir: Option<PathBuf>,
    /// Directory for aligner indexes
    pub index_dir: Option<PathBuf>,
    #[serde(default = "default_kmer_len")]
    pub kmer_len: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Upload raw event, 2D alignment and model tables
    #[serde(default)]
    pub telemetry: bool,
    #[serde(default)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    #[default]
    None,
    Bwa,
    Last,
}

impl AlignMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AlignMode::None)
    }

    /// Process label written to the run catalogue
    pub fn process_label(&self) -> &'static str {
        match self {
            AlignMode::None => "noalign",
            AlignMode::Bwa => "BWA",
            AlignMode::Last => "LAST",
        }
    }
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignMode::None => write!(f, "none"),
            AlignMode::Bwa => write!(f, "bwa"),
            AlignMode::Last => write!(f, "last"),
        }
    }
}

impl FromStr for AlignMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(AlignMode::None),
            "bwa" => Ok(AlignMode::Bwa),
            "last" | "lastal" => Ok(AlignMode::Last),
            _ => Err(format!("Unknown alignment mode: {}", s)),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_quiescence() -> u64 {
    20
}

fn default_status_every() -> usize {
    10
}

fn default_marker_dir() -> String {
    "downloads".to_string()
}

fn default_exclude() -> String {
    "muxscan".to_string()
}

fn default_extension() -> String {
    "fast5".to_string()
}

fn default_pool_size() -> usize {
    3
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_flowcell_owner() -> String {
    "minionowner".to_string()
}

fn default_run_number() -> String {
    "0".to_string()
}

fn default_comment() -> String {
    "No Comment".to_string()
}

fn default_bwa_options() -> String {
    "T0".to_string()
}

fn default_last_options() -> String {
    "s2,T0,Q0,a1".to_string()
}

fn default_kmer_len() -> usize {
    5
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: None,
            poll_interval_secs: default_poll_interval(),
            quiescence_secs: default_quiescence(),
            status_every: default_status_every(),
            marker_dir: default_marker_dir(),
            exclude: default_exclude(),
            extension: default_extension(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: None,   // falls back to ~/.poreflow/store
            log_dir: None,     // falls back to ~/.poreflow/run_logs
            pool_size: default_pool_size(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            operator: String::new(),
            custom_name: None,
            flowcell_owner: default_flowcell_owner(),
            run_number: default_run_number(),
            comment: default_comment(),
            view_users: Vec::new(),
            drop_existing: false,
            resume: false,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            mode: AlignMode::None,
            reference: Vec::new(),
            batch: false,
            bwa_options: default_bwa_options(),
            last_options: default_last_options(),
            reference_dir: None,
            index_dir: None,
            kmer_len: default_kmer_len(),
        }
    }
}

impl StoreConfig {
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(paths::store_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(paths::run_log_dir)
    }
}

impl AlignmentConfig {
    pub fn reference_dir(&self) -> PathBuf {
        self.reference_dir
            .clone()
            .unwrap_or_else(paths::valid_reference_dir)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir.clone().unwrap_or_else(paths::index_dir)
    }

    /// Options string for the selected aligner
    pub fn options(&self) -> &str {
        match self.mode {
            AlignMode::Last => &self.last_options,
            _ => &self.bwa_options,
        }
    }
}

impl Config {
    /// Reject settings that cannot be combined before anything touches the store
    pub fn validate(&self) -> Result<(), PoreflowError> {
        if self.run.operator.trim().is_empty() {
            return Err(PoreflowError::Config(
                "an operator name is required (run.operator or --operator)".to_string(),
            ));
        }
        if !self.alignment.reference.is_empty() && self.alignment.batch {
            return Err(PoreflowError::Config(
                "an explicit reference and batch reference discovery were both set; select only one"
                    .to_string(),
            ));
        }
        if self.alignment.mode.is_enabled()
            && self.alignment.reference.is_empty()
            && !self.alignment.batch
        {
            return Err(PoreflowError::Config(format!(
                "alignment with {} needs a reference file or batch reference discovery",
                self.alignment.mode
            )));
        }
        if self.run.drop_existing && self.run.resume {
            return Err(PoreflowError::Config(
                "--drop-existing and --resume cannot be combined".to_string(),
            ));
        }
        if self.store.pool_size == 0 {
            return Err(PoreflowError::Config(
                "store.pool_size must be at least 1".to_string(),
            ));
        }
        if self.alignment.kmer_len == 0 {
            return Err(PoreflowError::Config(
                "alignment.kmer_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the per-run connection pool is needed
    pub fn needs_pool(&self) -> bool {
        self.alignment.mode.is_enabled() || self.features.telemetry
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, PoreflowError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| PoreflowError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), PoreflowError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| PoreflowError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}
