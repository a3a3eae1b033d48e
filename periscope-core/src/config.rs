//! Application paths.
//!
//! The workspace database and the tab-state file live in the platform data
//! directory resolved through `directories`.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DB_FILE: &str = "periscope.db";
pub const TABS_FILE: &str = "tabs.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine the application data directory")]
    NoDataDir,

    #[error("Failed to create the application data directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved locations of everything Periscope persists.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub tabs: PathBuf,
}

impl AppPaths {
    /// Resolves and creates the platform data directory.
    pub fn resolve() -> Result<Self, ConfigError> {
        let dirs =
            ProjectDirs::from("com", "periscope", "periscope").ok_or(ConfigError::NoDataDir)?;
        let data_dir = dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self::in_dir(&data_dir))
    }

    /// Uses an explicit directory; the directory must already exist.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            database: dir.join(DB_FILE),
            tabs: dir.join(TABS_FILE),
        }
    }
}
