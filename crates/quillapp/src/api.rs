//! # API Facade
//!
//! The API layer is a **thin facade** over the command layer and the single
//! entry point for every screen.
//!
//! ## Role and Responsibilities
//!
//! The API facade:
//! - **Dispatches** to the appropriate command function
//! - **Applies settings** (the default sort order for every list)
//! - **Catches every error**: mutating calls return [`OpResult`], reads
//!   return an empty list or `None`
//!
//! ## What the API Does NOT Do
//!
//! - **Business logic**: That belongs in `commands/*.rs`
//! - **Panic or return `Err`**: nothing crosses this boundary except
//!   `{success: false, error}`
//!
//! ## Generic Over StorageBackend
//!
//! `QuillApi<B: StorageBackend>`:
//! - Production: `QuillApi<FsBackend>` (see [`crate::init`])
//! - Testing: `QuillApi<MemBackend>`
//!
//! Changing the storage location only exists on `QuillApi<FsBackend>`.
//!
//! ## Testing Strategy
//!
//! API tests check that calls are wired to the right command and that
//! failures come back as values. Command logic is tested in the command
//! modules.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::commands::backup::{self, RestoreReport, ShareTarget, SHARE_CLEANUP_GRACE};
use crate::commands::chapters::{self, ChapterDraft, ChapterPatch};
use crate::commands::collections::{self, CollectionDraft, CollectionPatch};
use crate::commands::doctor::{self, DoctorReport};
use crate::commands::notebooks::{self, NotebookDraft, NotebookPatch};
use crate::commands::notes::{self, NoteDraft, NotePatch};
use crate::commands::query::{self, NoteHit};
use crate::commands::trash::{self, RecycleBin};
use crate::commands::OpResult;
use crate::error::{QuillError, Result};
use crate::model::{Chapter, Collection, Document, Note, Notebook};
use crate::paths::validate_path;
use crate::settings::{Settings, SettingsStore};
use crate::sorting::SortOrder;
use crate::store::{FsBackend, HierarchyStore, StorageBackend};
use crate::story::StoryService;

/// [`OpResult`] plus the report of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reported<T> {
    #[serde(flatten)]
    pub result: OpResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<T>,
}

impl<T> Reported<T> {
    fn from_result(label: &str, result: Result<T>) -> Self {
        match result {
            Ok(report) => Self {
                result: OpResult::ok(),
                report: Some(report),
            },
            Err(err) => Self {
                result: OpResult::from_result::<()>(label, Err(err), |_| None),
                report: None,
            },
        }
    }
}

fn done(label: &str, result: Result<()>) -> OpResult {
    OpResult::from_result(label, result, |_| None)
}

fn created(label: &str, result: Result<String>) -> OpResult {
    OpResult::from_result(label, result, Some)
}

fn written(label: &str, result: Result<PathBuf>) -> OpResult {
    match result {
        Ok(path) => OpResult::ok_with_path(path.to_string_lossy()),
        Err(err) => OpResult::from_result::<()>(label, Err(err), |_| None),
    }
}

fn listed<T>(label: &str, result: Result<Vec<T>>) -> Vec<T> {
    result.unwrap_or_else(|err| {
        tracing::warn!(operation = label, code = err.code(), "read failed: {}", err);
        Vec::new()
    })
}

fn found<T>(label: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(operation = label, code = err.code(), "lookup failed: {}", err);
            None
        }
    }
}

/// The main API facade for quill operations.
pub struct QuillApi<B: StorageBackend + 'static> {
    store: Arc<HierarchyStore<B>>,
    settings: Arc<SettingsStore>,
    story: StoryService,
}

impl<B: StorageBackend + 'static> QuillApi<B> {
    pub fn new(store: HierarchyStore<B>, settings: SettingsStore) -> Self {
        let store = Arc::new(store);
        let settings = Arc::new(settings);
        let story = StoryService::new(store.clone(), settings.clone());
        Self {
            store,
            settings,
            story,
        }
    }

    pub fn store(&self) -> &HierarchyStore<B> {
        &self.store
    }

    pub fn story(&self) -> &StoryService {
        &self.story
    }

    fn order(&self) -> SortOrder {
        self.settings.get().default_sorting
    }

    pub fn initialize(&self) -> OpResult {
        done("initialize", self.store.initialize())
    }

    /// Messages for fatal read failures since the last call.
    pub fn take_alerts(&self) -> Vec<String> {
        self.store.take_alerts()
    }

    // --- Hierarchy ---

    /// The document without soft-deleted entities, or `None` if it cannot
    /// be read.
    pub fn get_hierarchy(&self) -> Option<Document> {
        self.store.read().map(query::visible_hierarchy)
    }

    /// The document as stored, recycle bin included.
    pub fn get_raw_hierarchy(&self) -> Option<Document> {
        self.store.read()
    }

    pub fn search_notes(&self, query: &str) -> Vec<NoteHit> {
        listed("search notes", query::search_notes(&self.store, query))
    }

    // --- Notebooks ---

    pub fn create_notebook(&self, draft: NotebookDraft) -> OpResult {
        created("create notebook", notebooks::create(&self.store, draft))
    }

    pub fn update_notebook(&self, notebook_id: &str, patch: NotebookPatch) -> OpResult {
        done("update notebook", notebooks::update(&self.store, notebook_id, patch))
    }

    pub fn get_notebooks(&self) -> Vec<Notebook> {
        listed("list notebooks", notebooks::list(&self.store, self.order()))
    }

    pub fn get_notebook(&self, notebook_id: &str) -> Option<Notebook> {
        found("get notebook", notebooks::get(&self.store, notebook_id))
    }

    pub fn soft_delete_notebook(&self, notebook_id: &str) -> OpResult {
        done("delete notebook", trash::soft_delete_notebook(&self.store, notebook_id))
    }

    pub fn restore_notebook(&self, notebook_id: &str) -> OpResult {
        done("restore notebook", trash::restore_notebook(&self.store, notebook_id))
    }

    pub fn permanently_delete_notebook(&self, notebook_id: &str) -> OpResult {
        done(
            "purge notebook",
            trash::permanently_delete_notebook(&self.store, notebook_id),
        )
    }

    pub fn get_deleted_notebooks(&self) -> Vec<Notebook> {
        listed("deleted notebooks", trash::get_deleted_notebooks(&self.store))
    }

    // --- Chapters ---

    pub fn create_chapter(&self, notebook_id: &str, draft: ChapterDraft) -> OpResult {
        created("create chapter", chapters::create(&self.store, notebook_id, draft))
    }

    pub fn update_chapter(&self, notebook_id: &str, chapter_id: &str, patch: ChapterPatch) -> OpResult {
        done(
            "update chapter",
            chapters::update(&self.store, notebook_id, chapter_id, patch),
        )
    }

    pub fn get_chapters(&self, notebook_id: &str) -> Vec<Chapter> {
        listed(
            "list chapters",
            chapters::list(&self.store, notebook_id, self.order()),
        )
    }

    pub fn get_chapter(&self, notebook_id: &str, chapter_id: &str) -> Option<Chapter> {
        found("get chapter", chapters::get(&self.store, notebook_id, chapter_id))
    }

    pub fn soft_delete_chapter(&self, notebook_id: &str, chapter_id: &str) -> OpResult {
        done(
            "delete chapter",
            trash::soft_delete_chapter(&self.store, notebook_id, chapter_id),
        )
    }

    pub fn restore_chapter(&self, notebook_id: &str, chapter_id: &str) -> OpResult {
        done(
            "restore chapter",
            trash::restore_chapter(&self.store, notebook_id, chapter_id),
        )
    }

    pub fn permanently_delete_chapter(&self, notebook_id: &str, chapter_id: &str) -> OpResult {
        done(
            "purge chapter",
            trash::permanently_delete_chapter(&self.store, notebook_id, chapter_id),
        )
    }

    pub fn get_deleted_chapters(&self) -> Vec<Chapter> {
        listed("deleted chapters", trash::get_deleted_chapters(&self.store))
    }

    // --- Notes ---

    pub fn create_note(&self, notebook_id: &str, chapter_id: &str, draft: NoteDraft) -> OpResult {
        created(
            "create note",
            notes::create(&self.store, notebook_id, chapter_id, draft),
        )
    }

    pub fn update_note(
        &self,
        notebook_id: &str,
        chapter_id: &str,
        note_id: &str,
        patch: NotePatch,
    ) -> OpResult {
        done(
            "update note",
            notes::update(&self.store, notebook_id, chapter_id, note_id, patch),
        )
    }

    pub fn get_notes(&self, notebook_id: &str, chapter_id: &str) -> Vec<Note> {
        listed(
            "list notes",
            notes::list(&self.store, notebook_id, chapter_id, self.order()),
        )
    }

    pub fn get_note(&self, notebook_id: &str, chapter_id: &str, note_id: &str) -> Option<Note> {
        found(
            "get note",
            notes::get(&self.store, notebook_id, chapter_id, note_id),
        )
    }

    pub fn soft_delete_note(&self, notebook_id: &str, chapter_id: &str, note_id: &str) -> OpResult {
        done(
            "delete note",
            trash::soft_delete_note(&self.store, notebook_id, chapter_id, note_id),
        )
    }

    pub fn restore_note(&self, notebook_id: &str, chapter_id: &str, note_id: &str) -> OpResult {
        done(
            "restore note",
            trash::restore_note(&self.store, notebook_id, chapter_id, note_id),
        )
    }

    pub fn permanently_delete_note(
        &self,
        notebook_id: &str,
        chapter_id: &str,
        note_id: &str,
    ) -> OpResult {
        done(
            "purge note",
            trash::permanently_delete_note(&self.store, notebook_id, chapter_id, note_id),
        )
    }

    pub fn get_deleted_notes(&self) -> Vec<Note> {
        listed("deleted notes", trash::get_deleted_notes(&self.store))
    }

    // --- Recycle bin ---

    pub fn recycle_bin(&self) -> RecycleBin {
        trash::recycle_bin(&self.store).unwrap_or_else(|err| {
            tracing::warn!(code = err.code(), "could not read recycle bin: {}", err);
            RecycleBin::default()
        })
    }

    pub fn empty_recycle_bin(&self) -> OpResult {
        OpResult::from_result("empty recycle bin", trash::empty_recycle_bin(&self.store), |n| {
            tracing::info!(purged = n, "recycle bin emptied");
            None
        })
    }

    // --- Collections ---

    pub fn create_notebook_collection(&self, draft: CollectionDraft) -> OpResult {
        created("create collection", collections::create(&self.store, draft))
    }

    pub fn update_notebook_collection(&self, collection_id: &str, patch: CollectionPatch) -> OpResult {
        done(
            "update collection",
            collections::update(&self.store, collection_id, patch),
        )
    }

    pub fn delete_notebook_collection(&self, collection_id: &str) -> OpResult {
        done(
            "delete collection",
            collections::delete(&self.store, collection_id),
        )
    }

    /// Adding a notebook that is already a member succeeds.
    pub fn add_notebook_to_collection(&self, collection_id: &str, notebook_id: &str) -> OpResult {
        OpResult::from_result(
            "add notebook to collection",
            collections::add_notebook(&self.store, collection_id, notebook_id),
            |_| None,
        )
    }

    pub fn remove_notebook_from_collection(&self, collection_id: &str, notebook_id: &str) -> OpResult {
        OpResult::from_result(
            "remove notebook from collection",
            collections::remove_notebook(&self.store, collection_id, notebook_id),
            |_| None,
        )
    }

    pub fn get_notebook_collections(&self) -> Vec<Collection> {
        listed("list collections", collections::list(&self.store, self.order()))
    }

    pub fn get_notebook_collection(&self, collection_id: &str) -> Option<Collection> {
        found("get collection", collections::get(&self.store, collection_id))
    }

    pub fn get_notebooks_in_collection(&self, collection_id: &str) -> Vec<Notebook> {
        listed(
            "collection notebooks",
            collections::notebooks_in(&self.store, collection_id, self.order()),
        )
    }

    pub fn get_available_notebooks_for_collection(&self, collection_id: &str) -> Vec<Notebook> {
        listed(
            "available notebooks",
            collections::available_notebooks(&self.store, collection_id, self.order()),
        )
    }

    pub fn get_collections_for_notebook(&self, notebook_id: &str) -> Vec<Collection> {
        listed(
            "notebook collections",
            collections::collections_for_notebook(&self.store, notebook_id, self.order()),
        )
    }

    // --- Backup ---

    /// Share with the default cleanup grace period.
    pub fn share_hierarchy_file(&self, target: &dyn ShareTarget, share_dir: &Path) -> OpResult {
        written(
            "share hierarchy",
            backup::share_hierarchy_file(&self.store, target, share_dir, SHARE_CLEANUP_GRACE),
        )
    }

    pub fn export_data(&self, dest_dir: &Path) -> OpResult {
        written("export data", backup::export_data(&self.store, dest_dir))
    }

    pub fn export_archive(&self, dest_dir: &Path) -> OpResult {
        written("export archive", backup::export_archive(&self.store, dest_dir))
    }

    /// `source` is `None` when the user dismissed the file picker.
    pub fn restore_from_backup(&self, source: Option<&Path>) -> Reported<RestoreReport> {
        let outcome = Reported::from_result(
            "restore backup",
            backup::restore_from_backup(&self.store, source),
        );
        if outcome.result.success {
            self.story.refresh();
        }
        outcome
    }

    pub fn doctor(&self) -> Reported<DoctorReport> {
        Reported::from_result("doctor", doctor::run(&self.store))
    }

    // --- Settings ---

    pub fn get_settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn set_default_sorting(&self, order: SortOrder) -> OpResult {
        done(
            "set default sorting",
            self.settings.set_default_sorting(order).map(|_| ()),
        )
    }

    pub fn set_revision_pages(&self, pages: u32) -> OpResult {
        done(
            "set revision pages",
            self.settings.set_revision_pages(pages).map(|_| ()),
        )
    }

    /// Saves the interval and restarts a running story timer with it.
    pub fn set_story_interval(&self, hours: f64) -> OpResult {
        done(
            "set story interval",
            self.settings
                .set_story_interval(hours)
                .and_then(|_| self.story.update_refresh_interval()),
        )
    }

    // --- Stories ---

    pub fn start_stories(&self) -> OpResult {
        done("start stories", self.story.start_auto_refresh())
    }

    pub fn stop_stories(&self) {
        self.story.stop_auto_refresh();
    }
}

impl QuillApi<FsBackend> {
    /// Move the storage root to `path` (or back to the default with `None`)
    /// and re-initialize. Existing data is not copied.
    pub fn change_storage_location(&self, path: Option<PathBuf>) -> OpResult {
        done("change storage location", self.relocate(path))
    }

    fn relocate(&self, path: Option<PathBuf>) -> Result<()> {
        let platform = self.store.options().platform;
        if let Some(path) = &path {
            if !platform.supports_custom_storage() {
                return Err(QuillError::InvalidParams(format!(
                    "custom storage is not available on {}",
                    platform
                )));
            }
            let text = path.to_string_lossy();
            if !validate_path(&text, platform) {
                return Err(QuillError::InvalidPath(text.into_owned()));
            }
        }
        self.settings
            .set_custom_storage_path(path.as_ref().map(|p| p.to_string_lossy().into_owned()))?;
        self.store.backend().set_custom_root(path);
        self.store.force_refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::store::{MemBackend, StoreOptions};
    use tempfile::TempDir;

    fn api() -> (QuillApi<MemBackend>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = HierarchyStore::with_options(MemBackend::new(), StoreOptions::immediate());
        (QuillApi::new(store, SettingsStore::new(dir.path())), dir)
    }

    #[test]
    fn mutations_return_ids_and_errors_as_values() {
        let (api, _dir) = api();
        let nb = api.create_notebook(NotebookDraft::titled("Biology"));
        assert!(nb.success);
        let nb = nb.id.unwrap();

        let bad = api.create_chapter("missing", ChapterDraft::titled("Cells"));
        assert!(!bad.success);
        assert!(bad.error.unwrap().contains("missing"));

        let empty = api.create_notebook(NotebookDraft::titled("  "));
        assert!(!empty.success);
        assert_eq!(api.get_notebooks().len(), 1);
        assert!(api.get_notebook(&nb).is_some());
        assert!(api.get_notebook("missing").is_none());
    }

    #[test]
    fn lists_follow_default_sorting() {
        let (api, _dir) = api();
        for title in ["b", "C", "a"] {
            api.create_notebook(NotebookDraft::titled(title));
        }
        assert!(api.set_default_sorting(SortOrder::Name).success);
        let titles: Vec<String> = api.get_notebooks().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["a", "b", "C"]);
    }

    #[test]
    fn reads_degrade_when_storage_is_broken() {
        let (api, _dir) = api();
        api.store().backend().fail_next_reads(10);
        assert!(api.get_notebooks().is_empty());
        assert!(api.get_hierarchy().is_none());
    }

    #[test]
    fn corrupted_document_queues_alert() {
        let (api, _dir) = api();
        assert!(api.initialize().success);
        api.store()
            .backend()
            .write_file("hierarchy.json", "{ broken")
            .unwrap();
        assert!(api.get_hierarchy().is_none());
        let alerts = api.take_alerts();
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("damaged"));
    }

    #[test]
    fn restore_cancel_is_reported() {
        let (api, _dir) = api();
        let outcome = api.restore_from_backup(None);
        assert!(!outcome.result.success);
        assert!(outcome.report.is_none());
        let wire = serde_json::to_value(&outcome).unwrap();
        assert_eq!(wire["success"], false);
    }

    #[test]
    fn doctor_reports() {
        let (api, _dir) = api();
        api.create_notebook(NotebookDraft::titled("Biology"));
        let outcome = api.doctor();
        assert!(outcome.result.success);
        assert!(outcome.report.unwrap().is_clean());
    }

    #[test]
    fn invalid_story_interval_is_rejected() {
        let (api, _dir) = api();
        assert!(!api.set_story_interval(-1.0).success);
        assert!(api.set_story_interval(0.5).success);
        assert_eq!(api.get_settings().story_interval, 0.5);
    }

    #[test]
    fn storage_location_change_on_unsupported_platform_fails() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let options = StoreOptions {
            platform: Platform::Desktop,
            ..StoreOptions::immediate()
        };
        let store = HierarchyStore::with_options(FsBackend::new(root.path()), options);
        let api = QuillApi::new(store, SettingsStore::new(root.path()));

        let result = api.change_storage_location(Some(other.path().to_path_buf()));
        assert!(!result.success);
        assert!(api.get_settings().custom_storage_path.is_none());
    }

    #[test]
    fn storage_location_change_moves_root() {
        let root = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let options = StoreOptions {
            platform: Platform::Android,
            ..StoreOptions::immediate()
        };
        let backend = FsBackend::new(root.path()).with_custom_root(None, Platform::Android);
        let api = QuillApi::new(
            HierarchyStore::with_options(backend, options),
            SettingsStore::new(root.path()),
        );
        api.create_notebook(NotebookDraft::titled("Biology"));

        assert!(api
            .change_storage_location(Some(other.path().to_path_buf()))
            .success);
        assert!(other.path().join("hierarchy.json").is_file());
        assert!(api.get_notebooks().is_empty());

        assert!(api.change_storage_location(None).success);
        assert_eq!(api.get_notebooks().len(), 1);
    }
}
