//! # Entity File Manager
//!
//! Every notebook, chapter, note and collection has a directory in the
//! mirrored tree holding `metadata.json`, and notes also hold `content.txt`:
//!
//! ```text
//! <root>/
//! ├── hierarchy.json
//! ├── notebooks/<id>/metadata.json
//! │   └── chapters/<id>/metadata.json
//! │       └── notes/<id>/{metadata.json, content.txt}
//! └── notebook-collections/<id>/metadata.json
//! ```
//!
//! The tree is a projection of the hierarchy document and is never read to
//! answer a query. Metadata files carry the entity's own fields; child maps
//! are left out since children have directories of their own.
//!
//! Updates go through [`EntityFiles::write_atomic`]: every file is staged as
//! a `*.tmp` sibling first, then each one is renamed over its target. If any
//! step fails the staged files are removed and the error is returned, so a
//! retry starts from a clean directory.

use super::backend::StorageBackend;
use crate::error::{QuillError, Result};
use crate::model::{Chapter, Collection, Document, Note, Notebook};
use crate::paths::generate_safe_path;
use serde::Serialize;

pub const METADATA_FILE: &str = "metadata.json";
pub const CONTENT_FILE: &str = "content.txt";
pub const NOTEBOOKS_DIR: &str = "notebooks";
pub const COLLECTIONS_DIR: &str = "notebook-collections";
pub const TMP_SUFFIX: &str = ".tmp";

pub fn notebook_path(id: &str) -> Result<String> {
    generate_safe_path(NOTEBOOKS_DIR, &[id])
}

pub fn chapter_path(notebook_path: &str, id: &str) -> Result<String> {
    generate_safe_path(notebook_path, &["chapters", id])
}

pub fn note_path(chapter_path: &str, id: &str) -> Result<String> {
    generate_safe_path(chapter_path, &["notes", id])
}

pub fn collection_path(id: &str) -> Result<String> {
    generate_safe_path(COLLECTIONS_DIR, &[id])
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// An entity with a directory in the mirrored tree.
pub trait Mirrored: Serialize {
    fn mirror_path(&self) -> &str;

    /// Key of the child map left out of `metadata.json`.
    fn nested_key(&self) -> Option<&'static str> {
        None
    }

    /// Files written next to `metadata.json`.
    fn extra_files(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

impl Mirrored for Notebook {
    fn mirror_path(&self) -> &str {
        &self.path
    }

    fn nested_key(&self) -> Option<&'static str> {
        Some("chapters")
    }
}

impl Mirrored for Chapter {
    fn mirror_path(&self) -> &str {
        &self.path
    }

    fn nested_key(&self) -> Option<&'static str> {
        Some("notes")
    }
}

impl Mirrored for Note {
    fn mirror_path(&self) -> &str {
        &self.path
    }

    fn extra_files(&self) -> Vec<(&'static str, String)> {
        vec![(CONTENT_FILE, self.content.clone())]
    }
}

impl Mirrored for Collection {
    fn mirror_path(&self) -> &str {
        &self.path
    }
}

/// Fill in `path` for any entity loaded without one. Returns how many were
/// assigned. Existing paths are never changed.
pub fn assign_missing_paths(doc: &mut Document) -> Result<usize> {
    let mut assigned = 0;
    for nb in doc.structure.notebooks.values_mut() {
        if nb.path.is_empty() {
            nb.path = notebook_path(&nb.id)?;
            assigned += 1;
        }
        for ch in nb.chapters.values_mut() {
            if ch.path.is_empty() {
                ch.path = chapter_path(&nb.path, &ch.id)?;
                assigned += 1;
            }
            for note in ch.notes.values_mut() {
                if note.path.is_empty() {
                    note.path = note_path(&ch.path, &note.id)?;
                    assigned += 1;
                }
            }
        }
    }
    for col in doc.structure.notebook_collections.values_mut() {
        if col.path.is_empty() {
            col.path = collection_path(&col.id)?;
            assigned += 1;
        }
    }
    Ok(assigned)
}

pub struct EntityFiles<'a, B: StorageBackend> {
    backend: &'a B,
}

impl<'a, B: StorageBackend> EntityFiles<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// The files an entity's directory should contain, by name.
    pub fn render<E: Mirrored>(entity: &E) -> Result<Vec<(&'static str, String)>> {
        let mut value = serde_json::to_value(entity)?;
        if let (Some(key), Some(obj)) = (entity.nested_key(), value.as_object_mut()) {
            obj.remove(key);
        }
        let mut files = vec![(METADATA_FILE, serde_json::to_string_pretty(&value)?)];
        files.extend(entity.extra_files());
        Ok(files)
    }

    fn dir_of<E: Mirrored>(entity: &E) -> Result<&str> {
        let dir = entity.mirror_path();
        if dir.trim().is_empty() {
            return Err(QuillError::EmptyPath);
        }
        Ok(dir)
    }

    /// Create the entity's directory and write its files. Tolerates an
    /// existing directory. Returns the number of files written.
    pub fn create<E: Mirrored>(&self, entity: &E) -> Result<usize> {
        let dir = Self::dir_of(entity)?;
        self.backend.create_dir_all(dir)?;
        let files = Self::render(entity)?;
        for (name, content) in &files {
            self.backend.write_file(&join(dir, name), content)?;
        }
        tracing::debug!(path = dir, files = files.len(), "mirrored entity written");
        Ok(files.len())
    }

    /// Rewrite the entity's files atomically, recreating its directory if
    /// it has gone missing.
    pub fn update<E: Mirrored>(&self, entity: &E) -> Result<()> {
        let dir = Self::dir_of(entity)?;
        self.write_atomic(dir, &Self::render(entity)?)
    }

    pub fn write_atomic(&self, dir: &str, files: &[(&str, String)]) -> Result<()> {
        if !self.backend.exists(dir)? {
            tracing::warn!(path = dir, "entity directory missing, recreating");
            self.backend.create_dir_all(dir)?;
        }

        let mut staged = Vec::with_capacity(files.len());
        if let Err(err) = self.stage_and_commit(dir, files, &mut staged) {
            for tmp in &staged {
                if let Err(cleanup) = self.backend.remove_file(tmp) {
                    tracing::warn!(path = %tmp, "could not remove temp file: {}", cleanup);
                }
            }
            return Err(err);
        }
        Ok(())
    }

    fn stage_and_commit(
        &self,
        dir: &str,
        files: &[(&str, String)],
        staged: &mut Vec<String>,
    ) -> Result<()> {
        for (name, content) in files {
            let tmp = join(dir, &format!("{}{}", name, TMP_SUFFIX));
            staged.push(tmp.clone());
            self.backend.write_file(&tmp, content)?;
        }
        for ((name, _), tmp) in files.iter().zip(staged.iter()) {
            self.backend.rename(tmp, &join(dir, name))?;
        }
        Ok(())
    }

    /// Remove the entity's directory and everything below it. Idempotent.
    pub fn purge(&self, dir: &str) -> Result<()> {
        if dir.trim().is_empty() {
            return Err(QuillError::EmptyPath);
        }
        self.backend.remove_dir_all(dir)?;
        tracing::debug!(path = dir, "mirrored directory purged");
        Ok(())
    }

    /// Names of the entity's files that are not on disk.
    pub fn missing_files<E: Mirrored>(&self, entity: &E) -> Result<Vec<&'static str>> {
        let dir = Self::dir_of(entity)?;
        let mut missing = Vec::new();
        for (name, _) in Self::render(entity)? {
            if !self.backend.exists(&join(dir, name))? {
                missing.push(name);
            }
        }
        Ok(missing)
    }

    /// Staged files left behind below `dir` by an interrupted update.
    pub fn stale_temp_files(&self, dir: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .list_files(dir)?
            .into_iter()
            .filter(|f| f.ends_with(TMP_SUFFIX))
            .collect())
    }
}
