//! Collections group notebooks across the hierarchy.
//!
//! A collection stores, per member notebook, when it joined and a snapshot
//! of its display fields. The snapshot goes stale as soon as the notebook is
//! edited, so every query here resolves member ids against
//! `structure.notebooks` and ignores the snapshot. Collections have no
//! recycle bin: [`delete`] purges immediately.

use chrono::Utc;
use serde::Deserialize;

use super::{require_title, trash, ItemRef};
use crate::error::{QuillError, Result};
use crate::model::{
    new_id, Collection, CollectionEntry, EntityMap, Notebook, NotebookSnapshot,
    DEFAULT_COLLECTION_COLOR,
};
use crate::sorting::{sort_items, SortOrder};
use crate::store::entity_files::collection_path;
use crate::store::{HierarchyStore, StorageBackend};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionDraft {
    pub name: String,
    pub description: String,
    pub color: Option<String>,
    pub icon: String,
}

impl CollectionDraft {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

pub fn create<B: StorageBackend>(
    store: &HierarchyStore<B>,
    draft: CollectionDraft,
) -> Result<String> {
    let name = require_title(&draft.name, "Collection")?;
    store.mutate("create collection", |doc, files| {
        let id = new_id();
        let now = Utc::now();
        let collection = Collection {
            path: collection_path(&id)?,
            id: id.clone(),
            name,
            description: draft.description,
            color: draft
                .color
                .unwrap_or_else(|| DEFAULT_COLLECTION_COLOR.to_string()),
            icon: draft.icon,
            created: now,
            last_modified: now,
            notebooks_count: 0,
            notebooks: EntityMap::new(),
        };
        files.create(&collection)?;
        doc.structure
            .notebook_collections
            .insert(id.clone(), collection);
        tracing::info!(id = %id, "collection created");
        Ok(id)
    })
}

pub fn update<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
    patch: CollectionPatch,
) -> Result<()> {
    let name = patch
        .name
        .as_deref()
        .map(|n| require_title(n, "Collection"))
        .transpose()?;
    store.mutate("update collection", |doc, files| {
        let collection = doc.collection_mut(collection_id)?;
        if let Some(name) = name {
            collection.name = name;
        }
        if let Some(description) = patch.description {
            collection.description = description;
        }
        if let Some(color) = patch.color {
            collection.color = color;
        }
        if let Some(icon) = patch.icon {
            collection.icon = icon;
        }
        collection.last_modified = Utc::now();
        files.update(&*collection)
    })
}

/// Purge the collection and its directory. Member notebooks are untouched.
pub fn delete<B: StorageBackend>(store: &HierarchyStore<B>, collection_id: &str) -> Result<()> {
    trash::delete_item(store, &ItemRef::collection(collection_id))
}

/// Returns `false` if the notebook was already a member.
pub fn add_notebook<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
    notebook_id: &str,
) -> Result<bool> {
    store.mutate("add notebook to collection", |doc, files| {
        let notebook = doc.notebook(notebook_id)?;
        if notebook.deleted {
            return Err(QuillError::InvalidParams(format!(
                "notebook {} is in the recycle bin",
                notebook_id
            )));
        }
        let snapshot = NotebookSnapshot::from(notebook);

        let collection = doc.collection_mut(collection_id)?;
        if collection.notebooks.contains_key(notebook_id) {
            return Ok(false);
        }
        let now = Utc::now();
        collection.notebooks.insert(
            notebook_id.to_string(),
            CollectionEntry {
                added_at: now,
                notebook_data: snapshot,
            },
        );
        collection.notebooks_count = collection.notebooks.len();
        collection.last_modified = now;
        files.update(&*collection)?;
        Ok(true)
    })
}

/// Returns `false` if the notebook was not a member.
pub fn remove_notebook<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
    notebook_id: &str,
) -> Result<bool> {
    store.mutate("remove notebook from collection", |doc, files| {
        let collection = doc.collection_mut(collection_id)?;
        if collection.notebooks.remove(notebook_id).is_none() {
            return Ok(false);
        }
        collection.notebooks_count = collection.notebooks.len();
        collection.last_modified = Utc::now();
        files.update(&*collection)?;
        Ok(true)
    })
}

pub fn list<B: StorageBackend>(
    store: &HierarchyStore<B>,
    order: SortOrder,
) -> Result<Vec<Collection>> {
    let doc = store.load()?;
    let mut collections: Vec<Collection> =
        doc.structure.notebook_collections.into_values().collect();
    sort_items(&mut collections, order);
    Ok(collections)
}

pub fn get<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
) -> Result<Collection> {
    Ok(store.load()?.collection(collection_id)?.clone())
}

/// Current versions of the collection's live member notebooks.
pub fn notebooks_in<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
    order: SortOrder,
) -> Result<Vec<Notebook>> {
    let doc = store.load()?;
    let collection = doc.collection(collection_id)?;
    let mut notebooks: Vec<Notebook> = collection
        .notebooks
        .keys()
        .filter_map(|id| doc.structure.notebooks.get(id))
        .filter(|nb| !nb.deleted)
        .cloned()
        .collect();
    sort_items(&mut notebooks, order);
    Ok(notebooks)
}

/// Live notebooks that could still be added to the collection.
pub fn available_notebooks<B: StorageBackend>(
    store: &HierarchyStore<B>,
    collection_id: &str,
    order: SortOrder,
) -> Result<Vec<Notebook>> {
    let doc = store.load()?;
    let collection = doc.collection(collection_id)?;
    let mut notebooks: Vec<Notebook> = doc
        .structure
        .notebooks
        .values()
        .filter(|nb| !nb.deleted && !collection.notebooks.contains_key(&nb.id))
        .cloned()
        .collect();
    sort_items(&mut notebooks, order);
    Ok(notebooks)
}

pub fn collections_for_notebook<B: StorageBackend>(
    store: &HierarchyStore<B>,
    notebook_id: &str,
    order: SortOrder,
) -> Result<Vec<Collection>> {
    let doc = store.load()?;
    let mut collections: Vec<Collection> = doc
        .structure
        .notebook_collections
        .into_values()
        .filter(|col| col.notebooks.contains_key(notebook_id))
        .collect();
    sort_items(&mut collections, order);
    Ok(collections)
}
