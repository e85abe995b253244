//! Soft delete, restore and purge.
//!
//! Notebooks, chapters and notes move `Active → SoftDeleted`, then either
//! back to `Active` or on to `Purged`. Soft delete and restore only flip
//! flags in the document; the mirrored files stay where they are until the
//! entity is purged. Purging removes the mirrored directory first, then the
//! document entry.
//!
//! [`delete_item`] is the low-level hard delete: it purges whatever it is
//! given without checking the recycle bin, which is how collections are
//! removed.

use chrono::Utc;
use serde::Serialize;

use super::ItemRef;
use crate::error::{QuillError, Result};
use crate::model::{Chapter, Document, Note, Notebook, Trashable};
use crate::sorting::sort_by_deleted_at;
use crate::store::{EntityFiles, HierarchyStore, StorageBackend};

fn trashable_mut<'d>(doc: &'d mut Document, item: &ItemRef) -> Result<&'d mut dyn Trashable> {
    match item {
        ItemRef::Notebook { notebook_id } => {
            let entity: &mut dyn Trashable = doc.notebook_mut(notebook_id)?;
            Ok(entity)
        }
        ItemRef::Chapter {
            notebook_id,
            chapter_id,
        } => {
            let entity: &mut dyn Trashable = doc.chapter_mut(notebook_id, chapter_id)?;
            Ok(entity)
        }
        ItemRef::Note {
            notebook_id,
            chapter_id,
            note_id,
        } => {
            let entity: &mut dyn Trashable = doc.note_mut(notebook_id, chapter_id, note_id)?;
            Ok(entity)
        }
        ItemRef::Collection { collection_id } => Err(QuillError::InvalidParams(format!(
            "collection {} has no recycle bin",
            collection_id
        ))),
    }
}

pub fn soft_delete<B: StorageBackend>(store: &HierarchyStore<B>, item: &ItemRef) -> Result<()> {
    store.mutate("soft delete", |doc, _| {
        let entity = trashable_mut(doc, item)?;
        if !entity.is_deleted() {
            entity.mark_deleted(Utc::now());
        }
        Ok(())
    })
}

pub fn restore<B: StorageBackend>(store: &HierarchyStore<B>, item: &ItemRef) -> Result<()> {
    store.mutate("restore", |doc, _| {
        trashable_mut(doc, item)?.mark_restored();
        Ok(())
    })
}

/// Purge an entity that is already in the recycle bin.
pub fn permanently_delete<B: StorageBackend>(
    store: &HierarchyStore<B>,
    item: &ItemRef,
) -> Result<()> {
    store.mutate("permanent delete", |doc, files| {
        if !trashable_mut(doc, item)?.is_deleted() {
            return Err(QuillError::InvalidParams(
                "only items in the recycle bin can be permanently deleted".to_string(),
            ));
        }
        purge(doc, files, item)
    })
}

/// Purge immediately, whatever the entity's state.
pub fn delete_item<B: StorageBackend>(store: &HierarchyStore<B>, item: &ItemRef) -> Result<()> {
    store.mutate("delete item", |doc, files| purge(doc, files, item))
}

fn purge_dir<B: StorageBackend>(files: &EntityFiles<'_, B>, path: &str) -> Result<()> {
    if path.is_empty() {
        tracing::debug!("entity has no mirrored directory, nothing to remove");
        return Ok(());
    }
    files.purge(path)
}

fn purge<B: StorageBackend>(
    doc: &mut Document,
    files: &EntityFiles<'_, B>,
    item: &ItemRef,
) -> Result<()> {
    match item {
        ItemRef::Notebook { notebook_id } => {
            purge_dir(files, &doc.notebook(notebook_id)?.path)?;
            doc.structure.notebooks.remove(notebook_id);

            let now = Utc::now();
            for collection in doc.structure.notebook_collections.values_mut() {
                if collection.notebooks.remove(notebook_id).is_some() {
                    collection.last_modified = now;
                    files.update(&*collection)?;
                }
            }
        }
        ItemRef::Chapter {
            notebook_id,
            chapter_id,
        } => {
            purge_dir(files, &doc.chapter(notebook_id, chapter_id)?.path)?;
            doc.notebook_mut(notebook_id)?.chapters.remove(chapter_id);
        }
        ItemRef::Note {
            notebook_id,
            chapter_id,
            note_id,
        } => {
            purge_dir(files, &doc.note(notebook_id, chapter_id, note_id)?.path)?;
            doc.chapter_mut(notebook_id, chapter_id)?.notes.remove(note_id);
        }
        ItemRef::Collection { collection_id } => {
            purge_dir(files, &doc.collection(collection_id)?.path)?;
            doc.structure.notebook_collections.remove(collection_id);
        }
    }
    tracing::info!(item = ?item, "purged");
    Ok(())
}

pub fn soft_delete_notebook<B: StorageBackend>(store: &HierarchyStore<B>, id: &str) -> Result<()> {
    soft_delete(store, &ItemRef::notebook(id))
}

pub fn soft_delete_chapter<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
) -> Result<()> {
    soft_delete(store, &ItemRef::chapter(notebook_id, chapter_id))
}

pub fn soft_delete_note<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    note_id: &str,
) -> Result<()> {
    soft_delete(store, &ItemRef::note(notebook_id, chapter_id, note_id))
}

pub fn restore_notebook<B: StorageBackend>(store: &HierarchyStore<B>, id: &str) -> Result<()> {
    restore(store, &ItemRef::notebook(id))
}

pub fn restore_chapter<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
) -> Result<()> {
    restore(store, &ItemRef::chapter(notebook_id, chapter_id))
}

pub fn restore_note<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    note_id: &str,
) -> Result<()> {
    restore(store, &ItemRef::note(notebook_id, chapter_id, note_id))
}

pub fn permanently_delete_notebook<B: StorageBackend>(
    store: &HierarchyStore<B>,
    id: &str,
) -> Result<()> {
    permanently_delete(store, &ItemRef::notebook(id))
}

pub fn permanently_delete_chapter<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
) -> Result<()> {
    permanently_delete(store, &ItemRef::chapter(notebook_id, chapter_id))
}

pub fn permanently_delete_note<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    note_id: &str,
) -> Result<()> {
    permanently_delete(store, &ItemRef::note(notebook_id, chapter_id, note_id))
}

fn deleted_notebooks(doc: &Document) -> Vec<Notebook> {
    let mut items: Vec<Notebook> = doc
        .structure
        .notebooks
        .values()
        .filter(|nb| nb.deleted)
        .cloned()
        .collect();
    sort_by_deleted_at(&mut items, |nb| nb.deleted_at);
    items
}

fn deleted_chapters(doc: &Document) -> Vec<Chapter> {
    let mut items: Vec<Chapter> = doc
        .structure
        .notebooks
        .values()
        .flat_map(|nb| nb.chapters.values())
        .filter(|ch| ch.deleted)
        .cloned()
        .collect();
    sort_by_deleted_at(&mut items, |ch| ch.deleted_at);
    items
}

fn deleted_notes(doc: &Document) -> Vec<Note> {
    let mut items: Vec<Note> = doc
        .structure
        .notebooks
        .values()
        .flat_map(|nb| nb.chapters.values())
        .flat_map(|ch| ch.notes.values())
        .filter(|n| n.deleted)
        .cloned()
        .collect();
    sort_by_deleted_at(&mut items, |n| n.deleted_at);
    items
}

/// Soft-deleted notebooks, most recently deleted first.
pub fn get_deleted_notebooks<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<Vec<Notebook>> {
    Ok(deleted_notebooks(&store.load()?))
}

pub fn get_deleted_chapters<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<Vec<Chapter>> {
    Ok(deleted_chapters(&store.load()?))
}

pub fn get_deleted_notes<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<Vec<Note>> {
    Ok(deleted_notes(&store.load()?))
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleBin {
    pub notebooks: Vec<Notebook>,
    pub chapters: Vec<Chapter>,
    pub notes: Vec<Note>,
}

impl RecycleBin {
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty() && self.chapters.is_empty() && self.notes.is_empty()
    }
}

pub fn recycle_bin<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<RecycleBin> {
    let doc = store.load()?;
    Ok(RecycleBin {
        notebooks: deleted_notebooks(&doc),
        chapters: deleted_chapters(&doc),
        notes: deleted_notes(&doc),
    })
}

/// Purge everything in the recycle bin. Entities inside an already-deleted
/// parent go with the parent. Returns how many items were purged.
pub fn empty_recycle_bin<B: StorageBackend>(store: &HierarchyStore<B>) -> Result<usize> {
    store.mutate("empty recycle bin", |doc, files| {
        let mut targets = Vec::new();
        for nb in doc.structure.notebooks.values() {
            if nb.deleted {
                targets.push(ItemRef::notebook(&nb.id));
                continue;
            }
            for ch in nb.chapters.values() {
                if ch.deleted {
                    targets.push(ItemRef::chapter(&nb.id, &ch.id));
                    continue;
                }
                targets.extend(
                    ch.notes
                        .values()
                        .filter(|n| n.deleted)
                        .map(|n| ItemRef::note(&nb.id, &ch.id, &n.id)),
                );
            }
        }
        for item in &targets {
            purge(doc, files, item)?;
        }
        tracing::info!(purged = targets.len(), "recycle bin emptied");
        Ok(targets.len())
    })
}
