use super::backend::StorageBackend;
use crate::error::{QuillError, Result};
use crate::paths::normalize_path;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct Faults {
    write_error: bool,
    failing_reads: u32,
    failing_renames: u32,
}

/// In-memory storage backend for testing.
///
/// Directories are tracked explicitly so a write into a missing directory
/// fails the same way it does on disk. Failure injection covers the cases
/// the retry and atomic-update paths need to exercise.
#[derive(Default)]
pub struct MemBackend {
    files: Mutex<BTreeMap<String, String>>,
    dirs: Mutex<BTreeSet<String>>,
    faults: Mutex<Faults>,
}

fn clean(path: &str) -> Result<String> {
    if path.is_empty() {
        return Ok(String::new());
    }
    Ok(normalize_path(path)?.trim_matches('/').to_string())
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn is_below(path: &str, dir: &str) -> bool {
    dir.is_empty() || path == dir || path.starts_with(&format!("{}/", dir))
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write and rename fails while enabled.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.faults.lock().write_error = simulate;
    }

    /// The next `n` reads fail with a recoverable `NetworkLoss`.
    pub fn fail_next_reads(&self, n: u32) {
        self.faults.lock().failing_reads = n;
    }

    /// The next `n` renames fail, leaving the source in place.
    pub fn fail_next_renames(&self, n: u32) {
        self.faults.lock().failing_renames = n;
    }

    /// Test helper: snapshot of every stored file.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.files.lock().clone()
    }

    fn check_write(&self, path: &str) -> Result<()> {
        if self.faults.lock().write_error {
            return Err(QuillError::Store(format!("Simulated write error: {}", path)));
        }
        Ok(())
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir.is_empty() || self.dirs.lock().contains(dir)
    }
}

impl StorageBackend for MemBackend {
    fn prepare_root(&self) -> Result<String> {
        Ok(self.root_display())
    }

    fn fall_back_to_default(&self) -> bool {
        false
    }

    fn reset_root(&self) {}

    fn root_display(&self) -> String {
        "memory://".to_string()
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let path = clean(path)?;
        Ok(self.dir_exists(&path) || self.files.lock().contains_key(&path))
    }

    fn read_file(&self, path: &str) -> Result<Option<String>> {
        let path = clean(path)?;
        {
            let mut faults = self.faults.lock();
            if faults.failing_reads > 0 {
                faults.failing_reads -= 1;
                return Err(QuillError::NetworkLoss(format!("Simulated read error: {}", path)));
            }
        }
        Ok(self.files.lock().get(&path).cloned())
    }

    fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let path = clean(path)?;
        self.check_write(&path)?;
        if !self.dir_exists(parent_of(&path)) {
            return Err(QuillError::FileNotFound(format!(
                "parent directory missing: {}",
                path
            )));
        }
        self.files.lock().insert(path, content.to_string());
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = clean(from)?;
        let to = clean(to)?;
        self.check_write(&to)?;
        {
            let mut faults = self.faults.lock();
            if faults.failing_renames > 0 {
                faults.failing_renames -= 1;
                return Err(QuillError::Store(format!("Simulated rename error: {}", from)));
            }
        }
        let mut files = self.files.lock();
        let content = files
            .remove(&from)
            .ok_or_else(|| QuillError::FileNotFound(from.clone()))?;
        files.insert(to, content);
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<()> {
        let path = clean(path)?;
        self.files.lock().remove(&path);
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let path = clean(path)?;
        self.check_write(&path)?;
        let mut dirs = self.dirs.lock();
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            dirs.insert(current.clone());
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &str) -> Result<()> {
        let path = clean(path)?;
        self.files.lock().retain(|file, _| !is_below(file, &path));
        self.dirs.lock().retain(|dir| !is_below(dir, &path));
        Ok(())
    }

    fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let dir = clean(dir)?;
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|file| is_below(file, &dir) && file.as_str() != dir)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_needs_parent_dir() {
        let backend = MemBackend::new();
        assert!(matches!(
            backend.write_file("notebooks/1/metadata.json", "{}"),
            Err(QuillError::FileNotFound(_))
        ));
        backend.create_dir_all("notebooks/1").unwrap();
        backend.write_file("notebooks/1/metadata.json", "{}").unwrap();
        assert!(backend.exists("notebooks").unwrap());
        assert_eq!(
            backend.read_file("notebooks//1/metadata.json").unwrap(),
            Some("{}".to_string())
        );
    }

    #[test]
    fn remove_dir_all_is_recursive_and_prefix_safe() {
        let backend = MemBackend::new();
        backend.create_dir_all("notebooks/1/chapters/2").unwrap();
        backend.create_dir_all("notebooks/10").unwrap();
        backend.write_file("notebooks/1/chapters/2/metadata.json", "{}").unwrap();
        backend.write_file("notebooks/10/metadata.json", "{}").unwrap();

        backend.remove_dir_all("notebooks/1").unwrap();
        assert!(!backend.exists("notebooks/1").unwrap());
        assert!(backend.exists("notebooks/10/metadata.json").unwrap());
        backend.remove_dir_all("notebooks/1").unwrap();
    }

    #[test]
    fn injected_failures_are_consumed() {
        let backend = MemBackend::new();
        backend.write_file("a.json", "x").unwrap();
        backend.fail_next_reads(1);
        assert!(matches!(
            backend.read_file("a.json"),
            Err(QuillError::NetworkLoss(_))
        ));
        assert!(backend.read_file("a.json").unwrap().is_some());

        backend.fail_next_renames(1);
        assert!(backend.rename("a.json", "b.json").is_err());
        backend.rename("a.json", "b.json").unwrap();
        assert!(backend.read_file("a.json").unwrap().is_none());
    }

    #[test]
    fn simulated_write_error() {
        let backend = MemBackend::new();
        backend.set_simulate_write_error(true);
        assert!(backend.write_file("a.json", "x").is_err());
        backend.set_simulate_write_error(false);
        backend.write_file("a.json", "x").unwrap();
    }
}
