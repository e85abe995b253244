//! # Settings
//!
//! App settings live in `app_settings.json`, next to (not inside) the
//! hierarchy document. The file always stays in the default app directory,
//! because one of its keys decides where the hierarchy lives.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `defaultSorting` | `lastModified` | List order, see [`SortOrder`] |
//! | `revisionPages` | `5` | How many notes a story sample holds |
//! | `storyInterval` | `1.0` | Hours between automatic story refreshes |
//! | `customStoragePath` | unset | External storage root (Android only) |
//!
//! ## Caching
//!
//! [`SettingsStore`] is read-through: the first `get` loads and caches, and
//! every write drops the cache so the next `get` sees what is on disk.
//! Missing keys and a missing file fall back to defaults; a file that does
//! not parse is logged and treated as defaults rather than failing the app.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{QuillError, Result};
use crate::sorting::SortOrder;

pub const SETTINGS_FILE: &str = "app_settings.json";
pub const MAX_REVISION_PAGES: u32 = 50;

fn default_revision_pages() -> u32 {
    5
}

fn default_story_interval() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub default_sorting: SortOrder,
    #[serde(default = "default_revision_pages")]
    pub revision_pages: u32,
    /// Hours; fractional values give minute granularity.
    #[serde(default = "default_story_interval")]
    pub story_interval: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_storage_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_sorting: SortOrder::default(),
            revision_pages: default_revision_pages(),
            story_interval: default_story_interval(),
            custom_storage_path: None,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    cache: RwLock<Option<Settings>>,
}

impl SettingsStore {
    /// `dir` is the directory holding `app_settings.json`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SETTINGS_FILE),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Settings {
        if let Some(cached) = self.cache.read().as_ref() {
            return cached.clone();
        }
        let loaded = self.load();
        *self.cache.write() = Some(loaded.clone());
        loaded
    }

    fn load(&self) -> Settings {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
            Err(e) => {
                tracing::warn!("could not read settings, using defaults: {}", e);
                return Settings::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("settings file is not valid JSON, using defaults: {}", e);
            Settings::default()
        })
    }

    /// Persist `settings` and invalidate the cache.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| QuillError::classify_io(e, "create settings dir"))?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        let tmp = self
            .path
            .with_file_name(format!(".settings-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, content).map_err(|e| QuillError::classify_io(e, "write settings"))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                tracing::warn!("could not remove {}: {}", tmp.display(), cleanup);
            }
            return Err(QuillError::classify_io(e, "replace settings"));
        }
        *self.cache.write() = None;
        tracing::debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Read-modify-write helper.
    pub fn update<F>(&self, f: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let mut settings = self.get();
        f(&mut settings)?;
        self.save(&settings)?;
        Ok(settings)
    }

    pub fn set_default_sorting(&self, order: SortOrder) -> Result<Settings> {
        self.update(|s| {
            s.default_sorting = order;
            Ok(())
        })
    }

    pub fn set_revision_pages(&self, pages: u32) -> Result<Settings> {
        self.update(|s| {
            s.revision_pages = pages.clamp(1, MAX_REVISION_PAGES);
            Ok(())
        })
    }

    pub fn set_story_interval(&self, hours: f64) -> Result<Settings> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(QuillError::InvalidParams(format!(
                "story interval must be a positive number of hours, got {}",
                hours
            )));
        }
        self.update(|s| {
            s.story_interval = hours;
            Ok(())
        })
    }

    pub fn set_custom_storage_path(&self, path: Option<String>) -> Result<Settings> {
        self.update(|s| {
            s.custom_storage_path = path.filter(|p| !p.trim().is_empty());
            Ok(())
        })
    }

    pub fn clear_custom_storage_path(&self) -> Result<Settings> {
        self.set_custom_storage_path(None)
    }
}
