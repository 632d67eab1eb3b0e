//! Configuration loading.
//!
//! The configuration is read once at startup, in this order:
//!
//! 1. the file given with `--config`
//! 2. `colav.json` in the project config directory, when it exists
//!    (`~/.config/colav/colav.json` on Linux)
//! 3. built-in defaults
//!
//! Whatever the source, the result is validated before the first cycle. An
//! invalid configuration stops the server.

use std::fs;
use std::path::{Path, PathBuf};

use colav_core::ColavConfig;
use directories::ProjectDirs;
use log::{debug, info};

use crate::ServerError;

pub const CONFIG_FILE_NAME: &str = "colav.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "colav", "colav")
}

/// `colav.json` in the project config directory
pub fn default_config_path() -> Option<PathBuf> {
    get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Read and validate one configuration file
pub fn load_config_file(path: &Path) -> Result<ColavConfig, ServerError> {
    let text = fs::read_to_string(path).map_err(|e| ServerError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let config = ColavConfig::from_json(&text)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Resolve the configuration for this run
pub fn load_config(explicit: Option<&Path>) -> Result<ColavConfig, ServerError> {
    if let Some(path) = explicit {
        return load_config_file(path);
    }

    if let Some(path) = default_config_path() {
        if path.is_file() {
            return load_config_file(&path);
        }
        debug!("No configuration at {}", path.display());
    }

    info!("Using built-in default configuration");
    let config = ColavConfig::default();
    config.validate()?;
    Ok(config)
}
