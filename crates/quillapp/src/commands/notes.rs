use chrono::Utc;
use serde::Deserialize;

use super::require_title;
use crate::error::{QuillError, Result};
use crate::model::{derive_paragraphs, new_id, Note};
use crate::retry::with_retry;
use crate::sorting::{sort_items, SortOrder};
use crate::store::entity_files::note_path;
use crate::store::{HierarchyStore, StorageBackend};
use crate::tags::{self, Priority};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Overrides any `priority:` tag in `tags`.
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<Priority>,
}

fn build_tags(raw: Vec<String>, priority: Option<Priority>) -> Vec<String> {
    let tags = tags::normalize_tags(raw);
    match priority {
        Some(p) => tags::with_priority(&tags, p),
        None => tags,
    }
}

pub fn create<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    draft: NoteDraft,
) -> Result<String> {
    let title = require_title(&draft.title, "Note")?;
    let tags = build_tags(draft.tags, draft.priority);
    store.mutate("create note", |doc, files| {
        let notebook = doc.notebook_mut(notebook_id)?;
        let notebook_deleted = notebook.deleted;
        let chapter = notebook
            .chapters
            .get_mut(chapter_id)
            .ok_or_else(|| QuillError::not_found("Chapter", chapter_id))?;
        if notebook_deleted || chapter.deleted {
            return Err(QuillError::InvalidParams(format!(
                "chapter {} is in the recycle bin",
                chapter_id
            )));
        }

        let id = new_id();
        let now = Utc::now();
        let note = Note {
            path: note_path(&chapter.path, &id)?,
            id: id.clone(),
            notebook_id: notebook_id.to_string(),
            chapter_id: chapter_id.to_string(),
            title,
            paragraphs: derive_paragraphs(&draft.content, now),
            content: draft.content,
            tags,
            created: now,
            last_modified: now,
            deleted: false,
            deleted_at: None,
        };
        files.create(&note)?;
        chapter.notes.insert(id.clone(), note);
        chapter.last_modified = now;
        tracing::info!(chapter = chapter_id, id = %id, "note created");
        Ok(id)
    })
}

/// Rewrites the note's mirrored files atomically. Transient storage
/// failures retry the whole read-modify-write.
pub fn update<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    note_id: &str,
    patch: NotePatch,
) -> Result<()> {
    let title = patch
        .title
        .as_deref()
        .map(|t| require_title(t, "Note"))
        .transpose()?;
    with_retry(store.options().note_retry, "update note", || {
        store.mutate("update note", |doc, files| {
            let note = doc.note_mut(notebook_id, chapter_id, note_id)?;
            let now = Utc::now();
            if let Some(title) = &title {
                note.title = title.clone();
            }
            if let Some(content) = &patch.content {
                note.content = content.clone();
                note.paragraphs = derive_paragraphs(content, now);
            }
            match (&patch.tags, patch.priority) {
                (Some(tags), priority) => note.tags = build_tags(tags.clone(), priority),
                (None, Some(priority)) => note.tags = tags::with_priority(&note.tags, priority),
                (None, None) => {}
            }
            note.last_modified = now;
            files.update(&*note)
        })
    })
}

/// Live notes of a chapter in `order`.
pub fn list<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    order: SortOrder,
) -> Result<Vec<Note>> {
    let doc = store.load()?;
    let mut notes: Vec<Note> = doc
        .chapter(notebook_id, chapter_id)?
        .notes
        .values()
        .filter(|n| !n.deleted)
        .cloned()
        .collect();
    sort_items(&mut notes, order);
    Ok(notes)
}

pub fn get<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    note_id: &str,
) -> Result<Note> {
    Ok(store.load()?.note(notebook_id, chapter_id, note_id)?.clone())
}
