//! # Command Layer
//!
//! The business logic of quill. Each concern lives in its own submodule as
//! plain functions over a [`HierarchyStore`](crate::store::HierarchyStore).
//!
//! ## Role and Responsibilities
//!
//! - Validate inputs (titles, chapter numbers, parent state)
//! - Allocate ids and mirrored paths for new entities
//! - Run every change through `HierarchyStore::mutate`, so the document and
//!   the mirrored files move together, one writer at a time
//! - Return typed `Result`s; the API facade turns them into [`OpResult`]
//!
//! ## What Commands Do NOT Do
//!
//! - Touch the storage root directly: all I/O below it goes through the
//!   backend (exports write to caller-chosen destinations outside it)
//! - Swallow errors: that happens once, at the facade
//! - Present anything: no strings meant for a screen beyond error text
//!
//! ## Testing Strategy
//!
//! Command tests use `MemBackend` with `StoreOptions::immediate()` and cover
//! each branch. Anything that must prove real files end up right (atomic
//! update, reconstruction, archive export) uses `FsBackend` on a `TempDir`.
//!
//! ## Command Modules
//!
//! - [`notebooks`], [`chapters`], [`notes`]: create, update, list, get
//! - [`collections`]: collections and their notebook membership
//! - [`trash`]: soft delete, restore, purge, recycle bin
//! - [`query`]: search and the visible hierarchy
//! - [`backup`]: share, export, archive, restore, reconstruction
//! - [`doctor`]: repair the mirrored tree from the document

use serde::Serialize;

use crate::error::{QuillError, Result};

pub mod backup;
pub mod chapters;
pub mod collections;
pub mod doctor;
pub mod notebooks;
pub mod notes;
pub mod query;
pub mod trash;

/// Outcome of a mutating operation, as seen by the UI.
///
/// `{success: true, id?, path?}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// File written by an export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl OpResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            id: None,
            path: None,
        }
    }

    pub fn ok_with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::ok()
        }
    }

    pub fn ok_with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::ok()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            id: None,
            path: None,
        }
    }

    pub fn from_result<T>(label: &str, result: Result<T>, id: impl FnOnce(T) -> Option<String>) -> Self {
        match result {
            Ok(value) => Self {
                id: id(value),
                ..Self::ok()
            },
            Err(err) => {
                tracing::warn!(operation = label, code = err.code(), "operation failed: {}", err);
                Self::failed(err.to_string())
            }
        }
    }
}

/// Address of any entity in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef {
    Notebook {
        notebook_id: String,
    },
    Chapter {
        notebook_id: String,
        chapter_id: String,
    },
    Note {
        notebook_id: String,
        chapter_id: String,
        note_id: String,
    },
    Collection {
        collection_id: String,
    },
}

impl ItemRef {
    pub fn notebook(notebook_id: impl Into<String>) -> Self {
        ItemRef::Notebook {
            notebook_id: notebook_id.into(),
        }
    }

    pub fn chapter(notebook_id: impl Into<String>, chapter_id: impl Into<String>) -> Self {
        ItemRef::Chapter {
            notebook_id: notebook_id.into(),
            chapter_id: chapter_id.into(),
        }
    }

    pub fn note(
        notebook_id: impl Into<String>,
        chapter_id: impl Into<String>,
        note_id: impl Into<String>,
    ) -> Self {
        ItemRef::Note {
            notebook_id: notebook_id.into(),
            chapter_id: chapter_id.into(),
            note_id: note_id.into(),
        }
    }

    pub fn collection(collection_id: impl Into<String>) -> Self {
        ItemRef::Collection {
            collection_id: collection_id.into(),
        }
    }
}

/// Trimmed, non-empty title or `InvalidParams`.
pub(crate) fn require_title(title: &str, kind: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(QuillError::InvalidParams(format!("{} title is required", kind)));
    }
    Ok(trimmed.to_string())
}
