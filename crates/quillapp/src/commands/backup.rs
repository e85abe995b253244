//! # Backup and Restore
//!
//! Exports wrap the hierarchy document in a [`BackupEnvelope`]:
//!
//! ```json
//! { "exportDate": "...", "appVersion": "0.3.0", "platform": "android",
//!   "storageLocation": "...", "hierarchy": { ... } }
//! ```
//!
//! - [`share_hierarchy_file`]: envelope to a temp file, handed to the
//!   platform share sheet, removed after a grace period.
//! - [`export_data`]: envelope plus every mirrored file's content keyed by
//!   relative path.
//! - [`export_archive`]: the document and the mirrored tree as a `.tar.gz`.
//!
//! ## Restore Pipeline
//!
//! 1. Validate the chosen file (`.json`, non-empty, parses, carries
//!    `hierarchy.structure`).
//! 2. Copy the live document's raw text, parseable or not, to
//!    `backups/hierarchy-safety-<ts>.json`. Best effort: a failure here is
//!    logged and the restore continues.
//! 3. Replace the live document, stamped `restored` with provenance.
//! 4. Re-initialize the store.
//! 5. Rebuild the mirrored tree from the document.
//!
//! There is no automatic rollback. If step 3 or later fails the error names
//! the safety backup; since the mirrored tree is a projection of the
//! document, rerunning [`reconstruct_file_system_structure`] or the doctor
//! repairs a partial rebuild.

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::error::{QuillError, Result};
use crate::model::Document;
use crate::store::entity_files::{assign_missing_paths, COLLECTIONS_DIR, NOTEBOOKS_DIR};
use crate::store::hierarchy::{BACKUPS_DIR, HIERARCHY_FILE};
use crate::store::{EntityFiles, HierarchyStore, StorageBackend};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const BACKUP_MIME_TYPE: &str = "application/json";

/// Default delay before a shared temp file is removed.
pub const SHARE_CLEANUP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    #[serde(default)]
    pub export_date: String,
    #[serde(default)]
    pub app_version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub storage_location: String,
    pub hierarchy: Document,
}

/// [`BackupEnvelope`] plus the raw mirrored files.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullExport {
    #[serde(flatten)]
    pub envelope: BackupEnvelope,
    pub files: BTreeMap<String, String>,
}

/// The platform share sheet.
pub trait ShareTarget {
    fn share(&self, file: &Path, mime_type: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub notebooks_restored: usize,
    pub collections_restored: usize,
    pub files_created: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_backup: Option<String>,
}

fn file_stamp() -> String {
    Utc::now().format("%Y-%m-%d_%H-%M-%S-%3f").to_string()
}

fn io_err(context: &str, path: &Path) -> impl FnOnce(std::io::Error) -> QuillError {
    let context = format!("{} {}", context, path.display());
    move |e| QuillError::classify_io(e, &context)
}

fn envelope<B: StorageBackend>(store: &HierarchyStore<B>, hierarchy: Document) -> BackupEnvelope {
    BackupEnvelope {
        export_date: Utc::now().to_rfc3339(),
        app_version: APP_VERSION.to_string(),
        platform: store.options().platform.to_string(),
        storage_location: store.backend().root_display(),
        hierarchy,
    }
}

fn mirrored_files<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<BTreeMap<String, String>> {
    let backend = store.backend();
    let mut files = BTreeMap::new();
    for dir in [NOTEBOOKS_DIR, COLLECTIONS_DIR] {
        for path in backend.list_files(dir)? {
            if let Some(content) = backend.read_file(&path)? {
                files.insert(path, content);
            }
        }
    }
    Ok(files)
}

fn write_new_file(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(io_err("create", dir))?;
    let path = dir.join(name);
    fs::write(&path, content).map_err(io_err("write", &path))?;
    Ok(path)
}

/// Write the envelope to `share_dir`, hand it to `target`, and remove it
/// after `grace` on a detached thread.
pub fn share_hierarchy_file<B: StorageBackend>(
    store: &HierarchyStore<B>,
    target: &dyn ShareTarget,
    share_dir: &Path,
    grace: Duration,
) -> Result<PathBuf> {
    let envelope = envelope(store, store.load()?);
    let content = serde_json::to_string_pretty(&envelope)?;
    let path = write_new_file(
        share_dir,
        &format!("quill-backup-{}.json", file_stamp()),
        content.as_bytes(),
    )?;

    let size = fs::metadata(&path).map_err(io_err("stat", &path))?.len();
    if size == 0 {
        if let Err(cleanup) = fs::remove_file(&path) {
            tracing::warn!("could not remove {}: {}", path.display(), cleanup);
        }
        return Err(QuillError::Backup("backup file was written empty".to_string()));
    }

    if let Err(err) = target.share(&path, BACKUP_MIME_TYPE) {
        if let Err(cleanup) = fs::remove_file(&path) {
            tracing::warn!("could not remove {}: {}", path.display(), cleanup);
        }
        return Err(err);
    }
    tracing::info!(bytes = size, "hierarchy shared");

    let cleanup_path = path.clone();
    thread::spawn(move || {
        thread::sleep(grace);
        match fs::remove_file(&cleanup_path) {
            Ok(()) => tracing::debug!(path = %cleanup_path.display(), "share file removed"),
            Err(e) => tracing::warn!("could not remove {}: {}", cleanup_path.display(), e),
        }
    });
    Ok(path)
}

/// Full JSON export to `dest_dir`.
pub fn export_data<B: StorageBackend>(store: &HierarchyStore<B>, dest_dir: &Path) -> Result<PathBuf> {
    let export = FullExport {
        envelope: envelope(store, store.load()?),
        files: mirrored_files(store)?,
    };
    let content = serde_json::to_string_pretty(&export)?;
    let path = write_new_file(
        dest_dir,
        &format!("quill-export-{}.json", file_stamp()),
        content.as_bytes(),
    )?;
    tracing::info!(files = export.files.len(), path = %path.display(), "data exported");
    Ok(path)
}

/// `.tar.gz` of the document and the mirrored tree, under a `quill/` prefix.
pub fn export_archive<B: StorageBackend>(
    store: &HierarchyStore<B>,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let mut doc = store.load()?;
    doc.recount();
    let mut entries = mirrored_files(store)?;
    entries.insert(HIERARCHY_FILE.to_string(), serde_json::to_string_pretty(&doc)?);

    fs::create_dir_all(dest_dir).map_err(io_err("create", dest_dir))?;
    let path = dest_dir.join(format!("quill-{}.tar.gz", file_stamp()));
    let file = File::create(&path).map_err(io_err("create", &path))?;
    write_archive(file, &entries)?;
    tracing::info!(entries = entries.len(), path = %path.display(), "archive exported");
    Ok(path)
}

fn write_archive<W: Write>(writer: W, entries: &BTreeMap<String, String>) -> Result<()> {
    let enc = GzEncoder::new(writer, Compression::default());
    let mut tar = tar::Builder::new(enc);

    for (rel, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, format!("quill/{}", rel), content.as_bytes())?;
    }

    tar.into_inner()?.finish()?;
    Ok(())
}

/// Parse a backup file's text into an envelope.
pub fn parse_backup(raw: &str) -> Result<BackupEnvelope> {
    if raw.trim().is_empty() {
        return Err(QuillError::Backup("backup file is empty".to_string()));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| QuillError::Backup(format!("backup file is not valid JSON: {}", e)))?;
    let has_structure = value
        .get("hierarchy")
        .and_then(|h| h.get("structure"))
        .is_some_and(Value::is_object);
    if !has_structure {
        return Err(QuillError::Backup(
            "not a quill backup: hierarchy.structure is missing".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| QuillError::Backup(format!("backup hierarchy is malformed: {}", e)))
}

fn read_backup(source: Option<&Path>) -> Result<BackupEnvelope> {
    let path = source.ok_or_else(|| QuillError::Backup("restore cancelled".to_string()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Err(QuillError::Backup(format!(
            "backup must be a .json file: {}",
            path.display()
        )));
    }
    let raw = fs::read_to_string(path).map_err(io_err("read", path))?;
    parse_backup(&raw)
}

/// Best-effort copy of the live document into `backups/`. The raw text is
/// copied unparsed so a corrupted document is preserved too.
fn write_safety_backup<B: StorageBackend>(store: &HierarchyStore<B>) -> Option<String> {
    let attempt = || -> Result<Option<String>> {
        let backend = store.backend();
        let Some(current) = backend.read_file(HIERARCHY_FILE)? else {
            return Ok(None);
        };
        backend.create_dir_all(BACKUPS_DIR)?;
        let path = format!("{}/hierarchy-safety-{}.json", BACKUPS_DIR, file_stamp());
        backend.write_file(&path, &current)?;
        Ok(Some(path))
    };
    match attempt() {
        Ok(Some(path)) => {
            tracing::info!(path = %path, "safety backup written");
            Some(path)
        }
        Ok(None) => {
            tracing::debug!("no live document, skipping safety backup");
            None
        }
        Err(err) => {
            tracing::warn!("could not write safety backup, continuing: {}", err);
            None
        }
    }
}

/// `source` is the file the user picked, `None` if they cancelled.
pub fn restore_from_backup<B: StorageBackend>(
    store: &HierarchyStore<B>,
    source: Option<&Path>,
) -> Result<RestoreReport> {
    let envelope = read_backup(source)?;
    let safety_backup = write_safety_backup(store);
    let fail = |stage: &str, err: QuillError| {
        let kept = safety_backup
            .as_deref()
            .map(|p| format!("; previous data kept in {}", p))
            .unwrap_or_default();
        tracing::error!(stage, "restore failed: {}", err);
        QuillError::Backup(format!("restore failed while {}: {}{}", stage, err, kept))
    };

    let mut doc = envelope.hierarchy;
    doc.restored = true;
    doc.restored_at = Some(Utc::now());
    doc.original_export_date = Some(envelope.export_date).filter(|d| !d.is_empty());
    doc.original_platform = Some(envelope.platform).filter(|p| !p.is_empty());
    assign_missing_paths(&mut doc).map_err(|e| fail("preparing paths", e))?;

    let doc = store
        .replace(doc)
        .map_err(|e| fail("replacing the document", e))?;
    store
        .force_refresh()
        .map_err(|e| fail("re-initializing storage", e))?;
    let files_created = reconstruct_file_system_structure(store, &doc)
        .map_err(|e| fail("rebuilding files", e))?;

    let report = RestoreReport {
        notebooks_restored: doc.structure.notebooks.values().filter(|nb| !nb.deleted).count(),
        collections_restored: doc.structure.notebook_collections.len(),
        files_created,
        safety_backup,
    };
    tracing::info!(
        notebooks = report.notebooks_restored,
        collections = report.collections_restored,
        files = report.files_created,
        "restore complete"
    );
    Ok(report)
}

/// Write the mirrored directory and files of every live entity in `doc`.
/// Existing directories are reused. Returns the number of files written.
pub fn reconstruct_file_system_structure<B: StorageBackend>(
    store: &HierarchyStore<B>,
    doc: &Document,
) -> Result<usize> {
    let files = EntityFiles::new(store.backend());
    let mut created = 0;
    for nb in doc.structure.notebooks.values().filter(|nb| !nb.deleted) {
        created += files.create(nb)?;
        for ch in nb.chapters.values().filter(|ch| !ch.deleted) {
            created += files.create(ch)?;
            for note in ch.notes.values().filter(|n| !n.deleted) {
                created += files.create(note)?;
            }
        }
    }
    for collection in doc.structure.notebook_collections.values() {
        created += files.create(collection)?;
    }
    tracing::info!(files = created, "mirrored tree rebuilt");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{collections, test_support, trash};
    use crate::store::{FsBackend, MemBackend, StoreOptions};
    use flate2::read::GzDecoder;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    struct RecordingShare {
        shared: Mutex<Vec<(PathBuf, String)>>,
        fail: bool,
    }

    impl RecordingShare {
        fn new(fail: bool) -> Self {
            Self {
                shared: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl ShareTarget for RecordingShare {
        fn share(&self, file: &Path, mime_type: &str) -> Result<()> {
            assert!(file.is_file());
            self.shared
                .lock()
                .push((file.to_path_buf(), mime_type.to_string()));
            if self.fail {
                return Err(QuillError::Backup("share sheet dismissed".into()));
            }
            Ok(())
        }
    }

    fn fs_store(dir: &Path) -> HierarchyStore<FsBackend> {
        HierarchyStore::with_options(FsBackend::new(dir), StoreOptions::immediate())
    }

    fn write_backup(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn share_writes_envelope_then_cleans_up() {
        let (store, _, _, _) = test_support::seeded();
        let share_dir = TempDir::new().unwrap();
        let target = RecordingShare::new(false);

        let path = share_hierarchy_file(
            &store,
            &target,
            share_dir.path(),
            Duration::from_millis(20),
        )
        .unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let envelope = parse_backup(&raw).unwrap();
        assert_eq!(envelope.app_version, APP_VERSION);
        assert_eq!(envelope.storage_location, "memory://");
        assert_eq!(envelope.hierarchy.structure.notebooks.len(), 1);
        assert_eq!(target.shared.lock()[0].1, BACKUP_MIME_TYPE);

        for _ in 0..100 {
            if !path.exists() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!path.exists());
    }

    #[test]
    fn failed_share_removes_file() {
        let (store, _, _, _) = test_support::seeded();
        let share_dir = TempDir::new().unwrap();
        let target = RecordingShare::new(true);
        assert!(share_hierarchy_file(&store, &target, share_dir.path(), SHARE_CLEANUP_GRACE).is_err());
        let shared = target.shared.lock()[0].0.clone();
        assert!(!shared.exists());
    }

    #[test]
    fn export_data_embeds_mirrored_files() {
        let (store, nb, ch, note) = test_support::seeded();
        let dest = TempDir::new().unwrap();
        let path = export_data(&store, dest.path()).unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(value["hierarchy"]["structure"]["notebooks"][&nb].is_object());
        let content_key = format!("notebooks/{}/chapters/{}/notes/{}/content.txt", nb, ch, note);
        assert_eq!(value["files"][&content_key], "Prophase\nMetaphase");
        assert_eq!(value["files"].as_object().unwrap().len(), 4);
    }

    #[test]
    fn export_archive_contains_document_and_tree() {
        let (store, nb, _, _) = test_support::seeded();
        let dest = TempDir::new().unwrap();
        let path = export_archive(&store, dest.path()).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"quill/hierarchy.json".to_string()));
        assert!(names.contains(&format!("quill/notebooks/{}/metadata.json", nb)));
        assert_eq!(names.len(), 5);
    }

    #[test]
    fn restore_rejects_bad_input() {
        let store = test_support::store();
        let dir = TempDir::new().unwrap();

        let cancelled = restore_from_backup(&store, None).unwrap_err();
        assert!(cancelled.to_string().contains("cancelled"));

        let txt = write_backup(&dir, "backup.txt", "{}");
        assert!(restore_from_backup(&store, Some(&txt))
            .unwrap_err()
            .to_string()
            .contains(".json"));

        let empty = write_backup(&dir, "empty.json", "  \n");
        assert!(restore_from_backup(&store, Some(&empty))
            .unwrap_err()
            .to_string()
            .contains("empty"));

        let garbage = write_backup(&dir, "garbage.json", "{ nope");
        assert!(restore_from_backup(&store, Some(&garbage))
            .unwrap_err()
            .to_string()
            .contains("valid JSON"));

        let bare = write_backup(&dir, "bare.json", r#"{"structure":{"notebooks":{}}}"#);
        assert!(restore_from_backup(&store, Some(&bare))
            .unwrap_err()
            .to_string()
            .contains("hierarchy.structure"));
    }

    #[test]
    fn restore_replaces_document_and_rebuilds_tree() {
        let (source, nb, ch, note) = test_support::seeded();
        let col = collections::create(&source, collections::CollectionDraft::named("Sci")).unwrap();
        collections::add_notebook(&source, &col, &nb).unwrap();
        let exported = TempDir::new().unwrap();
        let backup = export_data(&source, exported.path()).unwrap();

        let root = TempDir::new().unwrap();
        let target = fs_store(root.path());
        target.initialize().unwrap();
        let report = restore_from_backup(&target, Some(&backup)).unwrap();

        assert_eq!(report.notebooks_restored, 1);
        assert_eq!(report.collections_restored, 1);
        assert_eq!(report.files_created, 5);
        let safety = report.safety_backup.unwrap();
        assert!(root.path().join(&safety).is_file());

        let doc = target.load().unwrap();
        assert!(doc.restored);
        assert!(doc.restored_at.is_some());
        assert!(doc.original_export_date.is_some());
        assert_eq!(doc.note(&nb, &ch, &note).unwrap().title, "Mitosis");
        let note_dir = root.path().join(&doc.note(&nb, &ch, &note).unwrap().path);
        assert_eq!(
            fs::read_to_string(note_dir.join("content.txt")).unwrap(),
            "Prophase\nMetaphase"
        );
    }

    #[test]
    fn restore_over_corrupted_document_keeps_raw_copy() {
        let (source, nb, _, _) = test_support::seeded();
        let exported = TempDir::new().unwrap();
        let backup = export_data(&source, exported.path()).unwrap();

        let root = TempDir::new().unwrap();
        let target = fs_store(root.path());
        target.initialize().unwrap();
        let damaged = r#"{"structure":{"notebooks":{"17"#;
        fs::write(root.path().join(HIERARCHY_FILE), damaged).unwrap();

        let report = restore_from_backup(&target, Some(&backup)).unwrap();
        let safety = report.safety_backup.unwrap();
        assert!(safety.starts_with("backups/hierarchy-safety-"));
        assert_eq!(fs::read_to_string(root.path().join(&safety)).unwrap(), damaged);
        assert!(target.load().unwrap().notebook(&nb).is_ok());
    }

    #[test]
    fn reconstruction_skips_deleted_and_tolerates_existing_dirs() {
        let (store, nb, ch, note) = test_support::seeded();
        trash::soft_delete_note(&store, &nb, &ch, &note).unwrap();
        let doc = store.load().unwrap();

        let fresh = HierarchyStore::with_options(MemBackend::new(), StoreOptions::immediate());
        assert_eq!(reconstruct_file_system_structure(&fresh, &doc).unwrap(), 2);
        assert_eq!(reconstruct_file_system_structure(&fresh, &doc).unwrap(), 2);
        assert!(!fresh
            .backend()
            .exists(&format!("notebooks/{}/chapters/{}/notes/{}", nb, ch, note))
            .unwrap());
    }
}
