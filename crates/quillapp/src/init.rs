//! # Locations and Startup
//!
//! Two directories, both from the `directories` crate by default:
//!
//! - **Config**: holds `app_settings.json`. Never moves.
//! - **Data**: the default storage root (`hierarchy.json`, the mirrored
//!   tree, `backups/`). On Android the settings may point the storage root
//!   somewhere else; see [`crate::store::FsBackend`].
//!
//! ## Data Path Override
//!
//! `QUILL_DATA_DIR` replaces both directories with one path. Tests use it
//! to isolate state; so can anyone who wants their notes in a synced
//! folder.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::api::QuillApi;
use crate::error::{QuillError, Result};
use crate::settings::SettingsStore;
use crate::store::{FsBackend, HierarchyStore, StoreOptions};

pub const DATA_DIR_ENV: &str = "QUILL_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuillPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl QuillPaths {
    /// Settings and data under one directory.
    pub fn at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            config_dir: dir.clone(),
            data_dir: dir,
        }
    }

    /// `QUILL_DATA_DIR` if set, else the platform's app directories.
    pub fn resolve() -> Result<Self> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::at(PathBuf::from(dir)));
        }
        let dirs = ProjectDirs::from("com", "quill", "quill").ok_or_else(|| {
            QuillError::Store("could not determine the app data directory".to_string())
        })?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }
}

/// Build the API over the real filesystem. The store initializes lazily on
/// first use; call [`QuillApi::initialize`] to surface errors up front.
pub fn open(paths: &QuillPaths, options: StoreOptions) -> QuillApi<FsBackend> {
    let settings = SettingsStore::new(&paths.config_dir);
    let custom = settings.get().custom_storage_path.map(PathBuf::from);
    let backend = FsBackend::new(&paths.data_dir).with_custom_root(custom, options.platform);
    tracing::debug!(
        config = %paths.config_dir.display(),
        data = %paths.data_dir.display(),
        "opening quill"
    );
    QuillApi::new(HierarchyStore::with_options(backend, options), settings)
}
