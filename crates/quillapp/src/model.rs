//! # Domain Model: the Hierarchy Document
//!
//! One JSON document indexes everything the user owns:
//!
//! ```text
//! Document
//! ├── structure.notebooks            id → Notebook
//! │   └── chapters                   id → Chapter
//! │       └── notes                  id → Note
//! ├── structure.notebookCollections  id → Collection (notebook ids + snapshots)
//! ├── structure.revisions            opaque, passed through untouched
//! └── metadata                       display counters, recomputed on write
//! ```
//!
//! The document is the only thing queries look at. The mirrored file tree
//! (see [`crate::store::entity_files`]) is a projection of it.
//!
//! ## Legacy Naming
//!
//! Older documents store collections under `structure.collections`. Loading
//! goes through [`StructureRepr`], which prefers `notebookCollections` and
//! falls back to `collections`; the document is always written back under
//! the canonical name, so the migration happens once.
//!
//! ## Denormalized Data
//!
//! - `chaptersCount`, `notesCount`, `notebooksCount` and the `metadata`
//!   counters are display hints. [`Document::recount`] rebuilds them from the
//!   maps; nothing reads them to make decisions.
//! - A collection entry's `notebookData` is a snapshot taken when the
//!   notebook was added. Resolve the id against `structure.notebooks` for
//!   anything current.
//!
//! ## Ids
//!
//! Ids are wall-clock milliseconds rendered as strings. [`new_id`] bumps past
//! the last issued value so two entities created in the same millisecond do
//! not collide within one process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::{QuillError, Result};
use crate::tags::{self, Priority};

pub const DOCUMENT_VERSION: &str = "1.0";
pub const DEFAULT_NOTEBOOK_COLOR: &str = "#4A90E2";
pub const DEFAULT_CHAPTER_COLOR: &str = "#7ED321";
pub const DEFAULT_COLLECTION_COLOR: &str = "#9013FE";

pub type EntityMap<T> = BTreeMap<String, T>;

static LAST_ID: AtomicI64 = AtomicI64::new(0);

pub fn new_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST_ID.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

fn default_notebook_color() -> String {
    DEFAULT_NOTEBOOK_COLOR.to_string()
}

fn default_chapter_color() -> String {
    DEFAULT_CHAPTER_COLOR.to_string()
}

fn default_collection_color() -> String {
    DEFAULT_COLLECTION_COLOR.to_string()
}

fn default_chapter_number() -> u16 {
    1
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "now")]
    pub created: DateTime<Utc>,
    #[serde(default = "now")]
    pub last_modified: DateTime<Utc>,
    pub structure: Structure,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "is_false")]
    pub restored: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_export_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_platform: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StructureRepr")]
pub struct Structure {
    pub notebooks: EntityMap<Notebook>,
    pub notebook_collections: EntityMap<Collection>,
    pub revisions: BTreeMap<String, Value>,
}

/// On-disk shape accepted when loading; see the module docs.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StructureRepr {
    #[serde(default)]
    notebooks: EntityMap<Notebook>,
    #[serde(default)]
    notebook_collections: Option<EntityMap<Collection>>,
    #[serde(default)]
    collections: Option<EntityMap<Collection>>,
    #[serde(default)]
    revisions: BTreeMap<String, Value>,
}

impl From<StructureRepr> for Structure {
    fn from(repr: StructureRepr) -> Self {
        Self {
            notebooks: repr.notebooks,
            notebook_collections: repr
                .notebook_collections
                .or(repr.collections)
                .unwrap_or_default(),
            revisions: repr.revisions,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(default)]
    pub total_notes: usize,
    #[serde(default)]
    pub total_notebook_collections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_notebook_color")]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "now")]
    pub created: DateTime<Utc>,
    #[serde(default = "now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub chapters_count: usize,
    #[serde(default)]
    pub notes_count: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub chapters: EntityMap<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub notebook_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_chapter_color")]
    pub color: String,
    #[serde(default = "default_chapter_number")]
    pub chapter_number: u16,
    #[serde(default = "now")]
    pub created: DateTime<Utc>,
    #[serde(default = "now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub notes_count: usize,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: EntityMap<Note>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub notebook_id: String,
    pub chapter_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    #[serde(default = "now")]
    pub created: DateTime<Utc>,
    #[serde(default = "now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_collection_color")]
    pub color: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default = "now")]
    pub created: DateTime<Utc>,
    #[serde(default = "now")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub notebooks_count: usize,
    #[serde(default)]
    pub notebooks: EntityMap<CollectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub added_at: DateTime<Utc>,
    pub notebook_data: NotebookSnapshot,
}

/// Copy of a notebook's display fields at the time it joined a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSnapshot {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

impl From<&Notebook> for NotebookSnapshot {
    fn from(nb: &Notebook) -> Self {
        Self {
            id: nb.id.clone(),
            title: nb.title.clone(),
            description: nb.description.clone(),
            color: nb.color.clone(),
            icon: nb.icon.clone(),
        }
    }
}

/// Soft-delete lifecycle shared by notebooks, chapters and notes.
pub trait Trashable {
    fn is_deleted(&self) -> bool;
    fn deleted_at(&self) -> Option<DateTime<Utc>>;
    fn mark_deleted(&mut self, at: DateTime<Utc>);
    fn mark_restored(&mut self);
}

macro_rules! impl_trashable {
    ($($ty:ty),*) => {
        $(
            impl Trashable for $ty {
                fn is_deleted(&self) -> bool {
                    self.deleted
                }

                fn deleted_at(&self) -> Option<DateTime<Utc>> {
                    self.deleted_at
                }

                fn mark_deleted(&mut self, at: DateTime<Utc>) {
                    self.deleted = true;
                    self.deleted_at = Some(at);
                }

                fn mark_restored(&mut self) {
                    self.deleted = false;
                    self.deleted_at = None;
                }
            }
        )*
    };
}

impl_trashable!(Notebook, Chapter, Note);

impl Document {
    /// The skeleton written when no document exists yet.
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            version: default_version(),
            created: now,
            last_modified: now,
            structure: Structure::default(),
            metadata: DocumentMetadata::default(),
            restored: false,
            restored_at: None,
            original_export_date: None,
            original_platform: None,
        }
    }

    /// Rebuild every denormalized counter from the maps.
    pub fn recount(&mut self) {
        let mut total_notes = 0;
        for nb in self.structure.notebooks.values_mut() {
            let mut nb_notes = 0;
            for ch in nb.chapters.values_mut() {
                ch.notes_count = ch.notes.values().filter(|n| !n.deleted).count();
                if !ch.deleted {
                    nb_notes += ch.notes_count;
                }
            }
            nb.chapters_count = nb.chapters.values().filter(|c| !c.deleted).count();
            nb.notes_count = nb_notes;
            if !nb.deleted {
                total_notes += nb_notes;
            }
        }
        for col in self.structure.notebook_collections.values_mut() {
            col.notebooks_count = col.notebooks.len();
        }
        self.metadata.total_notes = total_notes;
        self.metadata.total_notebook_collections = self.structure.notebook_collections.len();
    }

    pub fn notebook(&self, id: &str) -> Result<&Notebook> {
        self.structure
            .notebooks
            .get(id)
            .ok_or_else(|| QuillError::not_found("Notebook", id))
    }

    pub fn notebook_mut(&mut self, id: &str) -> Result<&mut Notebook> {
        self.structure
            .notebooks
            .get_mut(id)
            .ok_or_else(|| QuillError::not_found("Notebook", id))
    }

    pub fn chapter(&self, notebook_id: &str, chapter_id: &str) -> Result<&Chapter> {
        self.notebook(notebook_id)?
            .chapters
            .get(chapter_id)
            .ok_or_else(|| QuillError::not_found("Chapter", chapter_id))
    }

    pub fn chapter_mut(&mut self, notebook_id: &str, chapter_id: &str) -> Result<&mut Chapter> {
        self.notebook_mut(notebook_id)?
            .chapters
            .get_mut(chapter_id)
            .ok_or_else(|| QuillError::not_found("Chapter", chapter_id))
    }

    pub fn note(&self, notebook_id: &str, chapter_id: &str, note_id: &str) -> Result<&Note> {
        self.chapter(notebook_id, chapter_id)?
            .notes
            .get(note_id)
            .ok_or_else(|| QuillError::NoteNotFound(note_id.to_string()))
    }

    pub fn note_mut(
        &mut self,
        notebook_id: &str,
        chapter_id: &str,
        note_id: &str,
    ) -> Result<&mut Note> {
        self.chapter_mut(notebook_id, chapter_id)?
            .notes
            .get_mut(note_id)
            .ok_or_else(|| QuillError::NoteNotFound(note_id.to_string()))
    }

    pub fn collection(&self, id: &str) -> Result<&Collection> {
        self.structure
            .notebook_collections
            .get(id)
            .ok_or_else(|| QuillError::not_found("Collection", id))
    }

    pub fn collection_mut(&mut self, id: &str) -> Result<&mut Collection> {
        self.structure
            .notebook_collections
            .get_mut(id)
            .ok_or_else(|| QuillError::not_found("Collection", id))
    }

    /// Every note whose notebook, chapter and self are all live.
    pub fn active_notes(&self) -> impl Iterator<Item = (&Notebook, &Chapter, &Note)> {
        self.structure
            .notebooks
            .values()
            .filter(|nb| !nb.deleted)
            .flat_map(|nb| {
                nb.chapters
                    .values()
                    .filter(|ch| !ch.deleted)
                    .flat_map(move |ch| {
                        ch.notes
                            .values()
                            .filter(|n| !n.deleted)
                            .map(move |n| (nb, ch, n))
                    })
            })
    }
}

impl Note {
    pub fn priority(&self) -> Priority {
        tags::extract_priority(&self.tags)
    }

    pub fn plain_tags(&self) -> Vec<String> {
        tags::non_priority_tags(&self.tags)
    }
}

/// Split content into non-empty lines, one paragraph each.
pub fn derive_paragraphs(content: &str, at: DateTime<Utc>) -> Vec<Paragraph> {
    let stamp = at.timestamp_millis();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| Paragraph {
            id: format!("{}-{}", stamp, i),
            text: line.to_string(),
            timestamp: at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, deleted: bool) -> Note {
        Note {
            id: id.to_string(),
            notebook_id: "nb".to_string(),
            chapter_id: "ch".to_string(),
            title: id.to_string(),
            content: String::new(),
            tags: Vec::new(),
            paragraphs: Vec::new(),
            created: Utc::now(),
            last_modified: Utc::now(),
            path: String::new(),
            deleted,
            deleted_at: None,
        }
    }

    fn doc_with_notes() -> Document {
        let mut doc = Document::empty();
        let mut chapter = Chapter {
            id: "ch".into(),
            notebook_id: "nb".into(),
            title: "Ch".into(),
            description: String::new(),
            color: default_chapter_color(),
            chapter_number: 1,
            created: Utc::now(),
            last_modified: Utc::now(),
            path: String::new(),
            notes_count: 99,
            deleted: false,
            deleted_at: None,
            notes: EntityMap::new(),
        };
        chapter.notes.insert("a".into(), note("a", false));
        chapter.notes.insert("b".into(), note("b", true));
        let mut nb = Notebook {
            id: "nb".into(),
            title: "Nb".into(),
            description: String::new(),
            color: default_notebook_color(),
            icon: String::new(),
            created: Utc::now(),
            last_modified: Utc::now(),
            path: String::new(),
            chapters_count: 0,
            notes_count: 0,
            deleted: false,
            deleted_at: None,
            chapters: EntityMap::new(),
        };
        nb.chapters.insert("ch".into(), chapter);
        doc.structure.notebooks.insert("nb".into(), nb);
        doc
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a: i64 = new_id().parse().unwrap();
        let b: i64 = new_id().parse().unwrap();
        let c: i64 = new_id().parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn recount_ignores_deleted() {
        let mut doc = doc_with_notes();
        doc.recount();
        let nb = doc.notebook("nb").unwrap();
        assert_eq!(nb.chapters_count, 1);
        assert_eq!(nb.notes_count, 1);
        assert_eq!(nb.chapters["ch"].notes_count, 1);
        assert_eq!(doc.metadata.total_notes, 1);
    }

    #[test]
    fn active_notes_skips_deleted_ancestors() {
        let mut doc = doc_with_notes();
        assert_eq!(doc.active_notes().count(), 1);
        doc.chapter_mut("nb", "ch").unwrap().mark_deleted(Utc::now());
        assert_eq!(doc.active_notes().count(), 0);
    }

    #[test]
    fn missing_note_is_note_not_found() {
        let doc = doc_with_notes();
        assert!(matches!(
            doc.note("nb", "ch", "zzz"),
            Err(QuillError::NoteNotFound(_))
        ));
        assert!(matches!(
            doc.chapter("nb", "nope"),
            Err(QuillError::NotFound { kind: "Chapter", .. })
        ));
    }

    #[test]
    fn loads_legacy_collections_key() {
        let raw = r#"{
            "structure": {
                "notebooks": {},
                "collections": {
                    "c1": { "id": "c1", "name": "Science", "notebooks": {} }
                }
            }
        }"#;
        let doc: Document = serde_json::from_str(raw).unwrap();
        assert!(doc.structure.notebook_collections.contains_key("c1"));

        let written = serde_json::to_value(&doc).unwrap();
        assert!(written["structure"]["notebookCollections"]["c1"].is_object());
        assert!(written["structure"].get("collections").is_none());
    }

    #[test]
    fn canonical_collections_key_wins() {
        let raw = r#"{
            "structure": {
                "notebooks": {},
                "notebookCollections": { "new": { "id": "new", "name": "N" } },
                "collections": { "old": { "id": "old", "name": "O" } }
            }
        }"#;
        let doc: Document = serde_json::from_str(raw).unwrap();
        assert_eq!(
            doc.structure.notebook_collections.keys().collect::<Vec<_>>(),
            vec!["new"]
        );
    }

    #[test]
    fn paragraphs_skip_blank_lines() {
        let at = Utc::now();
        let paras = derive_paragraphs("First **bold**\n\n  second  \n", at);
        assert_eq!(paras.len(), 2);
        assert_eq!(paras[0].text, "First **bold**");
        assert_eq!(paras[1].text, "second");
        assert_ne!(paras[0].id, paras[1].id);
    }

    #[test]
    fn trashable_round_trip() {
        let mut n = note("x", false);
        n.mark_deleted(Utc::now());
        assert!(n.is_deleted() && n.deleted_at().is_some());
        n.mark_restored();
        assert!(!n.is_deleted() && n.deleted_at().is_none());
    }
}
