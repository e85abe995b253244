use chrono::Utc;
use serde::Deserialize;

use super::require_title;
use crate::error::Result;
use crate::model::{new_id, EntityMap, Notebook, DEFAULT_NOTEBOOK_COLOR};
use crate::sorting::{sort_items, SortOrder};
use crate::store::entity_files::notebook_path;
use crate::store::{HierarchyStore, StorageBackend};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotebookDraft {
    pub title: String,
    pub description: String,
    pub color: Option<String>,
    pub icon: String,
}

impl NotebookDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Fields left `None` are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotebookPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

pub fn create<B: StorageBackend>(store: &HierarchyStore<B>, draft: NotebookDraft) -> Result<String> {
    let title = require_title(&draft.title, "Notebook")?;
    store.mutate("create notebook", |doc, files| {
        let id = new_id();
        let now = Utc::now();
        let notebook = Notebook {
            path: notebook_path(&id)?,
            id: id.clone(),
            title,
            description: draft.description,
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_NOTEBOOK_COLOR.to_string()),
            icon: draft.icon,
            created: now,
            last_modified: now,
            chapters_count: 0,
            notes_count: 0,
            deleted: false,
            deleted_at: None,
            chapters: EntityMap::new(),
        };
        files.create(&notebook)?;
        doc.structure.notebooks.insert(id.clone(), notebook);
        tracing::info!(id = %id, "notebook created");
        Ok(id)
    })
}

pub fn update<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    patch: NotebookPatch,
) -> Result<()> {
    let title = patch
        .title
        .as_deref()
        .map(|t| require_title(t, "Notebook"))
        .transpose()?;
    store.mutate("update notebook", |doc, files| {
        let notebook = doc.notebook_mut(notebook_id)?;
        if let Some(title) = title {
            notebook.title = title;
        }
        if let Some(description) = patch.description {
            notebook.description = description;
        }
        if let Some(color) = patch.color {
            notebook.color = color;
        }
        if let Some(icon) = patch.icon {
            notebook.icon = icon;
        }
        notebook.last_modified = Utc::now();
        files.update(&*notebook)
    })
}

/// Live notebooks in `order`.
pub fn list<B: StorageBackend>(store: &HierarchyStore<B>, order: SortOrder) -> Result<Vec<Notebook>> {
    let doc = store.load()?;
    let mut notebooks: Vec<Notebook> = doc
        .structure
        .notebooks
        .into_values()
        .filter(|nb| !nb.deleted)
        .collect();
    sort_items(&mut notebooks, order);
    Ok(notebooks)
}

pub fn get<B: StorageBackend>(store: &HierarchyStore<B>, notebook_id: &str) -> Result<Notebook> {
    Ok(store.load()?.notebook(notebook_id)?.clone())
}
