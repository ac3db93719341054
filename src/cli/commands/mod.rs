pub mod reference;
pub mod watch;

use anyhow::Context;
use std::path::Path;

use crate::core::config::{load_config, Config};
use crate::core::paths;

/// Explicit config file, else the default file if it exists, else defaults
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let default = paths::default_config_path();
            if default.exists() {
                tracing::debug!("Using configuration {}", default.display());
                load_config(&default).with_context(|| {
                    format!("Failed to load configuration from {}", default.display())
                })
            } else {
                Ok(Config::default())
            }
        }
    }
}
