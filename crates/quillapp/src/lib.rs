//! # Quill Architecture
//!
//! Quill is the **data layer of a local-first notebook app**: notebooks hold
//! chapters, chapters hold notes, and collections group notebooks. Screens
//! talk to it through one facade and never see a file.
//!
//! ## The Three-Layer Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (api.rs)                                         │
//! │  - Thin facade over commands                                │
//! │  - Applies settings (sort order, story interval)            │
//! │  - Returns OpResult / empty values, never Err               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Command Layer (commands/*.rs)                              │
//! │  - Business logic over the hierarchy document               │
//! │  - Operates on Rust types, returns Result                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Layer (store/)                                     │
//! │  - HierarchyStore: document lifecycle, single writer        │
//! │  - EntityFiles: the mirrored tree, atomic note updates      │
//! │  - StorageBackend: FsBackend (production), MemBackend (test)│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Beside the layers: [`story`] samples notes on a timer, [`settings`]
//! persists user preferences, [`init`] finds the directories.
//!
//! ## Key Principle: The Document Is the Truth
//!
//! `hierarchy.json` answers every query. The mirrored directory tree is a
//! projection that can be rebuilt from it at any time (restore and the
//! doctor both do exactly that), so a damaged tree is never fatal. A damaged
//! document is.
//!
//! ## Testing Strategy
//!
//! 1. **Commands**: thorough unit tests on `MemBackend`. Most tests live
//!    here.
//! 2. **Storage**: backend behavior, retries, atomic writes on `TempDir`.
//! 3. **API**: dispatch and error-to-value conversion.
//! 4. **Integration** (`tests/`): whole flows on a real directory.
//!
//! ## Module Overview
//!
//! - [`api`]: The API facade, entry point for all operations
//! - [`commands`]: Business logic for each concern
//! - [`store`]: Storage abstraction and implementations
//! - [`model`]: The hierarchy document and its entities
//! - [`error`]: Error taxonomy and classification
//! - [`retry`]: Linear backoff for recoverable errors
//! - [`paths`]: Path normalization and validation
//! - [`platform`]: What the running OS allows
//! - [`tags`]: Priority tags
//! - [`sorting`]: List orders
//! - [`settings`]: `app_settings.json`
//! - [`story`]: The story sampler
//! - [`init`]: Directory resolution and startup
//! - [`logging`]: Subscriber setup

pub mod api;
pub mod commands;
pub mod error;
pub mod init;
pub mod logging;
pub mod model;
pub mod paths;
pub mod platform;
pub mod retry;
pub mod settings;
pub mod sorting;
pub mod story;
pub mod store;
pub mod tags;

pub use api::QuillApi;
pub use commands::OpResult;
pub use error::{QuillError, Result};
