use chrono::Utc;
use serde::Deserialize;

use super::require_title;
use crate::error::{QuillError, Result};
use crate::model::{new_id, Chapter, EntityMap, DEFAULT_CHAPTER_COLOR};
use crate::sorting::{sort_items, SortOrder};
use crate::store::entity_files::chapter_path;
use crate::store::{HierarchyStore, StorageBackend};

pub const MAX_CHAPTER_NUMBER: u16 = 999;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterDraft {
    pub title: String,
    pub description: String,
    pub color: Option<String>,
    pub chapter_number: Option<u16>,
}

impl ChapterDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub chapter_number: Option<u16>,
}

/// Chapter numbers are ordering hints; duplicates and gaps are fine.
fn check_chapter_number(n: u16) -> Result<u16> {
    if (1..=MAX_CHAPTER_NUMBER).contains(&n) {
        Ok(n)
    } else {
        Err(QuillError::InvalidParams(format!(
            "chapter number must be between 1 and {}, got {}",
            MAX_CHAPTER_NUMBER, n
        )))
    }
}

pub fn create<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    draft: ChapterDraft,
) -> Result<String> {
    let title = require_title(&draft.title, "Chapter")?;
    let chapter_number = check_chapter_number(draft.chapter_number.unwrap_or(1))?;
    store.mutate("create chapter", |doc, files| {
        let notebook = doc.notebook_mut(notebook_id)?;
        if notebook.deleted {
            return Err(QuillError::InvalidParams(format!(
                "notebook {} is in the recycle bin",
                notebook_id
            )));
        }

        let id = new_id();
        let now = Utc::now();
        let chapter = Chapter {
            path: chapter_path(&notebook.path, &id)?,
            id: id.clone(),
            notebook_id: notebook_id.to_string(),
            title,
            description: draft.description,
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_CHAPTER_COLOR.to_string()),
            chapter_number,
            created: now,
            last_modified: now,
            notes_count: 0,
            deleted: false,
            deleted_at: None,
            notes: EntityMap::new(),
        };
        files.create(&chapter)?;
        notebook.chapters.insert(id.clone(), chapter);
        notebook.last_modified = now;
        tracing::info!(notebook = notebook_id, id = %id, "chapter created");
        Ok(id)
    })
}

pub fn update<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
    patch: ChapterPatch,
) -> Result<()> {
    let title = patch
        .title
        .as_deref()
        .map(|t| require_title(t, "Chapter"))
        .transpose()?;
    let chapter_number = patch.chapter_number.map(check_chapter_number).transpose()?;
    store.mutate("update chapter", |doc, files| {
        let chapter = doc.chapter_mut(notebook_id, chapter_id)?;
        if let Some(title) = title {
            chapter.title = title;
        }
        if let Some(description) = patch.description {
            chapter.description = description;
        }
        if let Some(color) = patch.color {
            chapter.color = color;
        }
        if let Some(n) = chapter_number {
            chapter.chapter_number = n;
        }
        chapter.last_modified = Utc::now();
        files.update(&*chapter)
    })
}

/// Live chapters of a notebook in `order`.
pub fn list<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    order: SortOrder,
) -> Result<Vec<Chapter>> {
    let doc = store.load()?;
    let mut chapters: Vec<Chapter> = doc
        .notebook(notebook_id)?
        .chapters
        .values()
        .filter(|ch| !ch.deleted)
        .cloned()
        .collect();
    sort_items(&mut chapters, order);
    Ok(chapters)
}

pub fn get<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    chapter_id: &str,
) -> Result<Chapter> {
    Ok(store.load()?.chapter(notebook_id, chapter_id)?.clone())
}
