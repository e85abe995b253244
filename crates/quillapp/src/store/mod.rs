//! # Storage Layer
//!
//! Quill keeps two representations of one truth:
//! 1. **Index**: the hierarchy document (`hierarchy.json`), the only thing
//!    queries look at.
//! 2. **Mirror**: a directory per entity holding its metadata (and, for
//!    notes, content). It exists for durability, export and inspection,
//!    and can always be regenerated from the index.
//!
//! ## Write Order
//!
//! - **Create**: write the mirrored files first, then insert into the
//!   document and persist. A crash in between leaves an orphan directory,
//!   never an index entry pointing at nothing.
//! - **Update**: change the document, rewrite the mirrored files
//!   atomically, then persist.
//! - **Soft delete / restore**: document only; mirrored files stay.
//! - **Purge**: remove the mirrored directory, then the document entry.
//!
//! All of the above run inside [`hierarchy::HierarchyStore::mutate`], one
//! writer at a time.
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: real filesystem, default or custom root.
//! - [`mem_backend::MemBackend`]: in-memory, with failure injection for
//!   tests.
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! ├── hierarchy.json
//! ├── backups/hierarchy-safety-<timestamp>.json
//! ├── notebooks/<id>/...
//! └── notebook-collections/<id>/metadata.json
//! ```

pub mod backend;
pub mod entity_files;
pub mod fs_backend;
pub mod hierarchy;
pub mod mem_backend;

pub use backend::StorageBackend;
pub use entity_files::EntityFiles;
pub use fs_backend::FsBackend;
pub use hierarchy::{HierarchyStore, StoreOptions};
pub use mem_backend::MemBackend;
