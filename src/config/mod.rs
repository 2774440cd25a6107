//! Configuration and state management for Faena.
//!
//! Two KDL files live in the data directory:
//!
//! ## config.kdl - Shareable settings
//!
//! - `backend` - "local" or "remote"
//! - `remote-url` - Base URL of the hosted service
//! - `signed-url-ttl`, `refresh-interval`, `retry-delay-ms` - Document lease timing
//! - `month-width`, `frozen-columns` - Timeline layout fallbacks
//! - `output-format` - "json" or "human"
//!
//! ## state.kdl - Secrets
//!
//! - `api-key` - API key for the hosted service
//!
//! **CRITICAL**: `state.kdl` MUST be created with 0600 permissions (owner read/write only).
//!
//! The data directory is `$FAENA_DATA_DIR` when set, otherwise
//! `~/.local/share/faena`. Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    API_KEY_ENV, ConfigOverrides, REMOTE_URL_ENV, Resolved, ResolvedSettings, ValueSource, resolve,
    resolve_with_env,
};
pub use schema::{CONFIG_KEYS, FaenaConfig, FaenaState, OutputFormat, STATE_KEYS, mask_secret};
#[cfg(unix)]
pub use schema::{CONFIG_FILE_MODE, STATE_FILE_MODE};

use std::fs;
use std::path::{Path, PathBuf};

use kdl::KdlDocument;

use crate::{Error, Result};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "FAENA_DATA_DIR";

pub const CONFIG_FILE: &str = "config.kdl";
pub const STATE_FILE: &str = "state.kdl";

/// Resolve the data directory: explicit path, then `FAENA_DATA_DIR`, then
/// the platform data directory.
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::data_dir()
        .map(|d| d.join("faena"))
        .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))
}

/// Reads and writes config.kdl and state.kdl in one directory.
#[derive(Debug, Clone)]
pub struct ConfigFiles {
    dir: PathBuf,
}

impl ConfigFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn read_doc(path: &Path) -> Result<KdlDocument> {
        if !path.exists() {
            return Ok(KdlDocument::new());
        }
        let text = fs::read_to_string(path)?;
        text.parse()
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Load config.kdl; a missing file is an empty config.
    pub fn read_config(&self) -> Result<FaenaConfig> {
        let config = FaenaConfig::from_kdl(&Self::read_doc(&self.config_path())?);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", self.config_path().display(), e)))?;
        Ok(config)
    }

    /// Load state.kdl; a missing file is an empty state.
    pub fn read_state(&self) -> Result<FaenaState> {
        Ok(FaenaState::from_kdl(&Self::read_doc(&self.state_path())?))
    }

    pub fn write_config(&self, config: &FaenaConfig) -> Result<()> {
        config.validate().map_err(Error::Config)?;
        let mut doc = config.to_kdl();
        doc.autoformat();
        fs::create_dir_all(&self.dir)?;
        fs::write(self.config_path(), doc.to_string())?;
        #[cfg(unix)]
        set_mode(&self.config_path(), CONFIG_FILE_MODE)?;
        Ok(())
    }

    /// Write state.kdl with owner-only permissions.
    pub fn write_state(&self, state: &FaenaState) -> Result<()> {
        let mut doc = state.to_kdl();
        doc.autoformat();
        fs::create_dir_all(&self.dir)?;
        let path = self.state_path();
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(STATE_FILE_MODE)
                .open(&path)?;
            file.write_all(doc.to_string().as_bytes())?;
            // mode() only applies on creation
            set_mode(&path, STATE_FILE_MODE)?;
        }
        #[cfg(not(unix))]
        fs::write(&path, doc.to_string())?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}
