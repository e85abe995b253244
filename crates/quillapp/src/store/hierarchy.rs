use super::backend::StorageBackend;
use super::entity_files::EntityFiles;
use crate::error::{QuillError, Result};
use crate::model::Document;
use crate::platform::Platform;
use crate::retry::{with_retry, RetryPolicy};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub const HIERARCHY_FILE: &str = "hierarchy.json";
pub const BACKUPS_DIR: &str = "backups";

/// Retry budgets for the operations that most often hit transient storage
/// failures.
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub init_retry: RetryPolicy,
    pub read_retry: RetryPolicy,
    pub note_retry: RetryPolicy,
    pub platform: Platform,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            init_retry: RetryPolicy::new(2, Duration::from_millis(1500)),
            read_retry: RetryPolicy::new(3, Duration::from_millis(1000)),
            note_retry: RetryPolicy::new(3, Duration::from_millis(1000)),
            platform: Platform::current(),
        }
    }
}

impl StoreOptions {
    /// Same attempt budgets without sleeping.
    pub fn immediate() -> Self {
        Self {
            init_retry: RetryPolicy::immediate(2),
            read_retry: RetryPolicy::immediate(3),
            note_retry: RetryPolicy::immediate(3),
            ..Self::default()
        }
    }
}

/// Owner of the hierarchy document.
///
/// Reads go through [`HierarchyStore::load`] (typed errors) or
/// [`HierarchyStore::read`] (degrades to `None`). Every mutation goes
/// through [`HierarchyStore::mutate`], which holds the writer lock across
/// load, change and persist so two in-process callers cannot lose each
/// other's updates.
pub struct HierarchyStore<B: StorageBackend> {
    pub(crate) backend: B,
    options: StoreOptions,
    initialized: AtomicBool,
    init_lock: Mutex<()>,
    writer: Mutex<()>,
    alerts: Mutex<Vec<String>>,
}

/// Parse and validate raw document text.
pub fn parse_document(raw: &str) -> Result<Document> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| QuillError::HierarchyCorrupted(e.to_string()))?;
    let has_notebooks = value
        .get("structure")
        .and_then(|s| s.get("notebooks"))
        .is_some_and(Value::is_object);
    if !has_notebooks {
        return Err(QuillError::HierarchyInvalidStructure(
            "structure.notebooks is missing".to_string(),
        ));
    }
    serde_json::from_value(value).map_err(|e| QuillError::HierarchyCorrupted(e.to_string()))
}

impl<B: StorageBackend> HierarchyStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, StoreOptions::default())
    }

    pub fn with_options(backend: B, options: StoreOptions) -> Self {
        Self {
            backend,
            options,
            initialized: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            writer: Mutex::new(()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn files(&self) -> EntityFiles<'_, B> {
        EntityFiles::new(&self.backend)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Resolve the root and make sure the document exists. Short-circuits
    /// once it has succeeded.
    pub fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        let _guard = self.init_lock.lock();
        if self.is_initialized() {
            return Ok(());
        }

        let outcome = match with_retry(self.options.init_retry, "initialize", || self.init_once()) {
            Err(err) if self.backend.fall_back_to_default() => {
                tracing::warn!("initialization failed on custom storage: {}", err);
                with_retry(self.options.init_retry, "initialize default", || {
                    self.init_once()
                })
            }
            other => other,
        };
        outcome?;

        self.initialized.store(true, Ordering::Release);
        tracing::info!(root = %self.backend.root_display(), "hierarchy store initialized");
        Ok(())
    }

    /// Forget all resolved state and initialize again. Used after a restore
    /// or a storage location change.
    pub fn force_refresh(&self) -> Result<()> {
        {
            let _guard = self.init_lock.lock();
            self.initialized.store(false, Ordering::Release);
            self.backend.reset_root();
        }
        self.initialize()
    }

    fn init_once(&self) -> Result<()> {
        self.backend.prepare_root()?;
        if !self.backend.exists(HIERARCHY_FILE)? {
            tracing::info!("no hierarchy document yet, writing an empty one");
            self.persist(&mut Document::empty())?;
        }
        Ok(())
    }

    /// Load the document, with typed errors.
    pub fn load(&self) -> Result<Document> {
        self.initialize()?;
        with_retry(self.options.read_retry, "read hierarchy", || self.load_once())
    }

    fn load_once(&self) -> Result<Document> {
        let raw = match self.backend.read_file(HIERARCHY_FILE)? {
            Some(raw) => raw,
            None => {
                tracing::warn!("hierarchy document missing, recreating");
                self.persist(&mut Document::empty()).map_err(|e| {
                    QuillError::HierarchyAccess(format!("could not recreate document: {}", e))
                })?;
                self.backend.read_file(HIERARCHY_FILE)?.ok_or_else(|| {
                    QuillError::HierarchyAccess("document still missing after recreate".into())
                })?
            }
        };
        parse_document(&raw)
    }

    /// Load the document, or `None` so callers can fall back to an empty
    /// state. Fatal errors queue a user-facing alert.
    pub fn read(&self) -> Option<Document> {
        match self.load() {
            Ok(doc) => Some(doc),
            Err(err) => {
                tracing::error!(code = err.code(), "could not read hierarchy: {}", err);
                if !err.is_recoverable() {
                    self.alerts.lock().push(err.user_message());
                }
                None
            }
        }
    }

    /// Stamp, recount and atomically replace the document file.
    fn persist(&self, doc: &mut Document) -> Result<()> {
        doc.last_modified = Utc::now();
        doc.recount();
        let content = serde_json::to_string_pretty(doc)?;

        let tmp = format!(".hierarchy-{}.tmp", Uuid::new_v4());
        self.backend.write_file(&tmp, &content)?;
        if let Err(err) = self.backend.rename(&tmp, HIERARCHY_FILE) {
            if let Err(cleanup) = self.backend.remove_file(&tmp) {
                tracing::warn!("could not remove {}: {}", tmp, cleanup);
            }
            return Err(err);
        }
        tracing::debug!(bytes = content.len(), "hierarchy persisted");
        Ok(())
    }

    /// Persist `doc`. `false` means the changes were lost.
    pub fn write(&self, doc: &mut Document) -> bool {
        let _writer = self.writer.lock();
        match self.initialize().and_then(|_| self.persist(doc)) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(code = err.code(), "could not write hierarchy: {}", err);
                false
            }
        }
    }

    /// Read-modify-write under the writer lock. Nothing is persisted if `f`
    /// fails.
    pub fn mutate<T, F>(&self, label: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document, &EntityFiles<'_, B>) -> Result<T>,
    {
        let _writer = self.writer.lock();
        let mut doc = self.load()?;
        let files = self.files();
        let out = f(&mut doc, &files)?;
        self.persist(&mut doc)?;
        tracing::debug!(operation = label, "hierarchy updated");
        Ok(out)
    }

    /// Replace the live document wholesale. Returns it as persisted.
    pub fn replace(&self, mut doc: Document) -> Result<Document> {
        let _writer = self.writer.lock();
        self.initialize()?;
        self.persist(&mut doc)?;
        Ok(doc)
    }

    /// Drain the user-facing messages queued by failed reads.
    pub fn take_alerts(&self) -> Vec<String> {
        std::mem::take(&mut *self.alerts.lock())
    }
}
