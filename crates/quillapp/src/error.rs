//! # Errors
//!
//! Every fallible operation in quillapp returns [`Result`]. Low-level I/O
//! failures are classified close to where they happen (see
//! [`QuillError::classify_io`]) so the retry policy and the API facade can
//! decide what to do from the variant alone:
//!
//! - **Recoverable** errors are retried by [`crate::retry::with_retry`].
//! - **Fatal** errors skip retry and surface straight to the API boundary,
//!   where they become `OpResult { success: false, error }`.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuillError {
    // ===== Path construction =====
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Path is empty after joining segments")]
    EmptyPath,

    // ===== Classified I/O =====
    #[error("Storage temporarily unreachable: {0}")]
    NetworkLoss(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Device storage is full: {0}")]
    StorageFull(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    // ===== Hierarchy document =====
    #[error("Hierarchy document is not accessible: {0}")]
    HierarchyAccess(String),

    #[error("Hierarchy document is corrupted: {0}")]
    HierarchyCorrupted(String),

    #[error("Hierarchy document has an invalid structure: {0}")]
    HierarchyInvalidStructure(String),

    // ===== Caller errors =====
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    // ===== Wrapped =====
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, QuillError>;

impl QuillError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        QuillError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Map a raw I/O failure onto the storage taxonomy.
    ///
    /// `ErrorKind` is checked first; the message substrings catch platform
    /// errors that arrive as `Other` (mobile storage providers report most
    /// failures that way).
    pub fn classify_io(err: io::Error, context: &str) -> Self {
        let detail = format!("{}: {}", context, err);
        match err.kind() {
            io::ErrorKind::NotFound => return QuillError::FileNotFound(detail),
            io::ErrorKind::PermissionDenied => return QuillError::PermissionDenied(detail),
            io::ErrorKind::InvalidInput => return QuillError::InvalidArgument(detail),
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut => return QuillError::NetworkLoss(detail),
            _ => {}
        }

        let lower = err.to_string().to_lowercase();
        if lower.contains("network") || lower.contains("connection") {
            QuillError::NetworkLoss(detail)
        } else if lower.contains("permission") || lower.contains("access denied") {
            QuillError::PermissionDenied(detail)
        } else if lower.contains("no such file") || lower.contains("not found") {
            QuillError::FileNotFound(detail)
        } else if lower.contains("no space") || lower.contains("disk full") || lower.contains("quota")
        {
            QuillError::StorageFull(detail)
        } else if lower.contains("invalid argument") {
            QuillError::InvalidArgument(detail)
        } else if lower.contains("not empty") {
            QuillError::DirectoryNotEmpty(detail)
        } else {
            QuillError::Io(err)
        }
    }

    /// Whether retrying the same operation can plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            QuillError::PermissionDenied(_)
                | QuillError::StorageFull(_)
                | QuillError::InvalidArgument(_)
                | QuillError::HierarchyAccess(_)
                | QuillError::HierarchyCorrupted(_)
                | QuillError::HierarchyInvalidStructure(_)
                | QuillError::NoteNotFound(_)
                | QuillError::NotFound { .. }
                | QuillError::InvalidParams(_)
                | QuillError::InvalidPath(_)
                | QuillError::EmptyPath
                | QuillError::Serialization(_)
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            QuillError::InvalidPath(_) => "INVALID_PATH",
            QuillError::EmptyPath => "EMPTY_PATH",
            QuillError::NetworkLoss(_) => "NETWORK_LOSS",
            QuillError::PermissionDenied(_) => "PERMISSION_DENIED",
            QuillError::FileNotFound(_) => "FILE_NOT_FOUND",
            QuillError::StorageFull(_) => "STORAGE_FULL",
            QuillError::InvalidArgument(_) => "INVALID_ARGUMENT",
            QuillError::DirectoryNotEmpty(_) => "DIRECTORY_NOT_EMPTY",
            QuillError::HierarchyAccess(_) => "HIERARCHY_ACCESS_ERROR",
            QuillError::HierarchyCorrupted(_) => "HIERARCHY_CORRUPTED",
            QuillError::HierarchyInvalidStructure(_) => "HIERARCHY_INVALID_STRUCTURE",
            QuillError::NoteNotFound(_) => "NOTE_NOT_FOUND",
            QuillError::NotFound { .. } => "NOT_FOUND",
            QuillError::InvalidParams(_) => "INVALID_PARAMS",
            QuillError::Io(_) => "IO_ERROR",
            QuillError::Serialization(_) => "SERIALIZATION_ERROR",
            QuillError::Backup(_) => "BACKUP_ERROR",
            QuillError::Store(_) => "STORE_ERROR",
        }
    }

    /// Message suitable for an alert shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            QuillError::NetworkLoss(_) => {
                "Storage is temporarily unavailable. Please try again.".to_string()
            }
            QuillError::PermissionDenied(_) => {
                "The app does not have permission to access its storage.".to_string()
            }
            QuillError::StorageFull(_) => {
                "Your device is out of storage. Free some space and try again.".to_string()
            }
            QuillError::HierarchyAccess(_) => {
                "Your notebooks could not be loaded from storage.".to_string()
            }
            QuillError::HierarchyCorrupted(_) | QuillError::HierarchyInvalidStructure(_) => {
                "Your notebook data appears to be damaged. Restore it from a backup.".to_string()
            }
            QuillError::NoteNotFound(_) => "This note no longer exists.".to_string(),
            other => other.to_string(),
        }
    }
}
