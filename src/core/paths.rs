use std::path::PathBuf;
use std::sync::OnceLock;

// Cache the paths to avoid repeated environment lookups
static POREFLOW_HOME: OnceLock<PathBuf> = OnceLock::new();
static POREFLOW_STORE_DIR: OnceLock<PathBuf> = OnceLock::new();
static POREFLOW_LOG_DIR: OnceLock<PathBuf> = OnceLock::new();
static POREFLOW_REFERENCE_DIR: OnceLock<PathBuf> = OnceLock::new();
static POREFLOW_INDEX_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Get the poreflow home directory
/// Checks POREFLOW_HOME environment variable, falls back to ${HOME}/.poreflow
pub fn poreflow_home() -> PathBuf {
    POREFLOW_HOME
        .get_or_init(|| {
            if let Ok(path) = std::env::var("POREFLOW_HOME") {
                PathBuf::from(path)
            } else {
                let home = std::env::var("HOME").unwrap_or_else(|_| {
                    std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string())
                });
                PathBuf::from(home).join(".poreflow")
            }
        })
        .clone()
}

/// Get the store directory
/// Checks POREFLOW_STORE_DIR environment variable, falls back to POREFLOW_HOME/store
pub fn store_dir() -> PathBuf {
    POREFLOW_STORE_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("POREFLOW_STORE_DIR") {
                PathBuf::from(path)
            } else {
                poreflow_home().join("store")
            }
        })
        .clone()
}

/// Get the per-run log directory
/// Checks POREFLOW_LOG_DIR environment variable, falls back to POREFLOW_HOME/run_logs
pub fn run_log_dir() -> PathBuf {
    POREFLOW_LOG_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("POREFLOW_LOG_DIR") {
                PathBuf::from(path)
            } else {
                poreflow_home().join("run_logs")
            }
        })
        .clone()
}

/// Get the validated reference directory
/// Checks POREFLOW_REFERENCE_DIR environment variable, falls back to POREFLOW_HOME/valid_reference_fasta_files
pub fn valid_reference_dir() -> PathBuf {
    POREFLOW_REFERENCE_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("POREFLOW_REFERENCE_DIR") {
                PathBuf::from(path)
            } else {
                poreflow_home().join("valid_reference_fasta_files")
            }
        })
        .clone()
}

/// Get the aligner index directory
/// Checks POREFLOW_INDEX_DIR environment variable, falls back to POREFLOW_HOME/indexes
pub fn index_dir() -> PathBuf {
    POREFLOW_INDEX_DIR
        .get_or_init(|| {
            if let Ok(path) = std::env::var("POREFLOW_INDEX_DIR") {
                PathBuf::from(path)
            } else {
                poreflow_home().join("indexes")
            }
        })
        .clone()
}

/// Default location of the configuration file
pub fn default_config_path() -> PathBuf {
    poreflow_home().join("poreflow.toml")
}

/// Check if using a custom home directory
pub fn is_custom_home() -> bool {
    std::env::var("POREFLOW_HOME").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_dirs_live_under_home() {
        if std::env::var("POREFLOW_STORE_DIR").is_err() {
            assert!(store_dir().starts_with(poreflow_home()));
        }
        if std::env::var("POREFLOW_INDEX_DIR").is_err() {
            assert!(index_dir().ends_with("indexes"));
        }
        assert!(default_config_path().ends_with("poreflow.toml"));
    }
}
