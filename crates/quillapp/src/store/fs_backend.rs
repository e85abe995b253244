use super::backend::StorageBackend;
use crate::error::{QuillError, Result};
use crate::paths::{normalize_path, validate_path};
use crate::platform::Platform;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Default)]
struct RootState {
    custom: Option<PathBuf>,
    active: Option<PathBuf>,
    forced_default: bool,
}

/// Filesystem backend rooted at the app data directory, or at a
/// user-chosen external directory on platforms that allow one.
pub struct FsBackend {
    default_root: PathBuf,
    platform: Platform,
    state: RwLock<RootState>,
}

impl FsBackend {
    pub fn new(default_root: impl Into<PathBuf>) -> Self {
        Self {
            default_root: default_root.into(),
            platform: Platform::current(),
            state: RwLock::new(RootState::default()),
        }
    }

    /// Use `custom` as the root when `platform` supports external storage.
    /// Ignored (with a log line) elsewhere.
    pub fn with_custom_root(mut self, custom: Option<PathBuf>, platform: Platform) -> Self {
        self.platform = platform;
        self.set_custom_root(custom);
        self
    }

    /// Change the custom root and forget the resolved one. The caller is
    /// expected to re-initialize the store afterwards.
    pub fn set_custom_root(&self, custom: Option<PathBuf>) {
        let custom = match custom {
            Some(path) if self.platform.supports_custom_storage() => Some(path),
            Some(path) => {
                tracing::info!(
                    platform = %self.platform,
                    "custom storage not supported, ignoring {}",
                    path.display()
                );
                None
            }
            None => None,
        };
        *self.state.write() = RootState {
            custom,
            ..RootState::default()
        };
    }

    pub fn default_root(&self) -> &Path {
        &self.default_root
    }

    pub fn custom_root(&self) -> Option<PathBuf> {
        self.state.read().custom.clone()
    }

    /// The resolved root, if `prepare_root` has run.
    pub fn active_root(&self) -> Option<PathBuf> {
        self.state.read().active.clone()
    }

    fn candidate_root(&self, state: &RootState) -> PathBuf {
        match &state.custom {
            Some(custom) if !state.forced_default => custom.clone(),
            _ => self.default_root.clone(),
        }
    }

    fn root(&self) -> Result<PathBuf> {
        if let Some(root) = self.state.read().active.clone() {
            return Ok(root);
        }
        self.prepare_root()?;
        self.state
            .read()
            .active
            .clone()
            .ok_or_else(|| QuillError::Store("storage root not resolved".to_string()))
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let root = self.root()?;
        if rel.is_empty() {
            return Ok(root);
        }
        let rel = normalize_path(rel)?;
        if !validate_path(&rel, self.platform)
            || rel.starts_with('/')
            || rel.split('/').any(|seg| seg == "..")
        {
            return Err(QuillError::InvalidPath(rel));
        }
        Ok(root.join(rel.trim_end_matches('/')))
    }

    fn io_err(e: io::Error, op: &str, path: &Path) -> QuillError {
        QuillError::classify_io(e, &format!("{} {}", op, path.display()))
    }
}

impl StorageBackend for FsBackend {
    fn prepare_root(&self) -> Result<String> {
        let mut state = self.state.write();
        if let Some(root) = &state.active {
            return Ok(root.display().to_string());
        }
        let root = self.candidate_root(&state);
        fs::create_dir_all(&root).map_err(|e| Self::io_err(e, "create root", &root))?;
        tracing::info!(root = %root.display(), "storage root ready");
        let display = root.display().to_string();
        state.active = Some(root);
        Ok(display)
    }

    fn fall_back_to_default(&self) -> bool {
        let mut state = self.state.write();
        if state.custom.is_none() || state.forced_default {
            return false;
        }
        tracing::warn!("custom storage unusable, falling back to the default directory");
        state.forced_default = true;
        state.active = None;
        true
    }

    fn reset_root(&self) {
        let mut state = self.state.write();
        state.active = None;
        state.forced_default = false;
    }

    fn root_display(&self) -> String {
        let state = self.state.read();
        state
            .active
            .clone()
            .unwrap_or_else(|| self.candidate_root(&state))
            .display()
            .to_string()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.exists())
    }

    fn read_file(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        match fs::read_to_string(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err(e, "read", &full)),
        }
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::write(&full, content).map_err(|e| Self::io_err(e, "write", &full))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;
        fs::rename(&src, &dst).map_err(|e| Self::io_err(e, "move", &src))
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(e, "delete", &full)),
        }
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| Self::io_err(e, "create dir", &full))
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match fs::remove_dir_all(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(e, "delete dir", &full)),
        }
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let root = self.root()?;
        let base = self.resolve(dir)?;
        if !base.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                QuillError::Store(format!("walking {}: {}", base.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&root) {
                let rel: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                files.push(rel.join("/"));
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prepares_default_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("quill");
        let backend = FsBackend::new(&root);
        backend.prepare_root().unwrap();
        assert!(root.is_dir());
        assert_eq!(backend.active_root(), Some(root));
    }

    #[test]
    fn custom_root_ignored_on_desktop() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().join("default"))
            .with_custom_root(Some(dir.path().join("custom")), Platform::Desktop);
        assert!(backend.custom_root().is_none());
    }

    #[test]
    fn falls_back_once() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path().join("default"))
            .with_custom_root(Some(dir.path().join("custom")), Platform::Android);
        backend.prepare_root().unwrap();
        assert_eq!(backend.active_root(), Some(dir.path().join("custom")));

        assert!(backend.fall_back_to_default());
        assert!(!backend.fall_back_to_default());
        backend.prepare_root().unwrap();
        assert_eq!(backend.active_root(), Some(dir.path().join("default")));

        backend.reset_root();
        backend.prepare_root().unwrap();
        assert_eq!(backend.active_root(), Some(dir.path().join("custom")));
    }

    #[test]
    fn rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        assert!(matches!(
            backend.write_file("../outside.txt", "x"),
            Err(QuillError::InvalidPath(_))
        ));
        assert!(matches!(
            backend.read_file("/etc/passwd"),
            Err(QuillError::InvalidPath(_))
        ));
    }

    #[test]
    fn idempotent_removals() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.remove_file("nope.json").unwrap();
        backend.remove_dir_all("notebooks/404").unwrap();
    }

    #[test]
    fn lists_files_relative_to_root() {
        let dir = TempDir::new().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create_dir_all("notebooks/1/chapters/2").unwrap();
        backend.write_file("notebooks/1/metadata.json", "{}").unwrap();
        backend
            .write_file("notebooks/1/chapters/2/metadata.json", "{}")
            .unwrap();
        backend.write_file("hierarchy.json", "{}").unwrap();

        let all = backend.list_files("").unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.contains(&"notebooks/1/chapters/2/metadata.json".to_string()));

        let nb = backend.list_files("notebooks/1/chapters").unwrap();
        assert_eq!(nb, vec!["notebooks/1/chapters/2/metadata.json".to_string()]);
    }
}
