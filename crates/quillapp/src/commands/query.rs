use serde::Serialize;

use crate::error::Result;
use crate::model::{Document, Note};
use crate::store::{HierarchyStore, StorageBackend};

/// A search match with the titles needed to show where it lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteHit {
    #[serde(flatten)]
    pub note: Note,
    pub notebook_title: String,
    pub chapter_title: String,
}

fn matches(note: &Note, needle: &str) -> bool {
    note.title.to_lowercase().contains(needle)
        || note.content.to_lowercase().contains(needle)
        || note.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Linear, case-insensitive scan of live notes' titles, content and tags.
/// Most recently modified first.
pub fn search_notes<B: StorageBackend>(store: &HierarchyStore<B>, query: &str) -> Result<Vec<NoteHit>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }
    let doc = store.load()?;
    let mut hits: Vec<NoteHit> = doc
        .active_notes()
        .filter(|(_, _, note)| matches(note, &needle))
        .map(|(nb, ch, note)| NoteHit {
            note: note.clone(),
            notebook_title: nb.title.clone(),
            chapter_title: ch.title.clone(),
        })
        .collect();
    hits.sort_by(|a, b| b.note.last_modified.cmp(&a.note.last_modified));
    Ok(hits)
}

/// The document as list screens see it: soft-deleted entities and
/// everything under them removed.
pub fn visible_hierarchy(mut doc: Document) -> Document {
    doc.structure.notebooks.retain(|_, nb| !nb.deleted);
    for nb in doc.structure.notebooks.values_mut() {
        nb.chapters.retain(|_, ch| !ch.deleted);
        for ch in nb.chapters.values_mut() {
            ch.notes.retain(|_, n| !n.deleted);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{notes, test_support, trash};

    #[test]
    fn search_matches_title_content_and_tags() {
        let (store, nb, ch, id) = test_support::seeded();
        notes::create(
            &store,
            &nb,
            &ch,
            notes::NoteDraft {
                title: "Osmosis".into(),
                content: "water moves".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let hits = search_notes(&store, "MITO").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note.id, id);
        assert_eq!(hits[0].notebook_title, "Biology");
        assert_eq!(hits[0].chapter_title, "Cells");

        assert_eq!(search_notes(&store, "metaphase").unwrap().len(), 1);
        assert_eq!(search_notes(&store, "exam").unwrap().len(), 1);
        assert!(search_notes(&store, "  ").unwrap().is_empty());
    }

    #[test]
    fn search_skips_deleted() {
        let (store, nb, ch, _) = test_support::seeded();
        trash::soft_delete_chapter(&store, &nb, &ch).unwrap();
        assert!(search_notes(&store, "mitosis").unwrap().is_empty());
    }

    #[test]
    fn visible_hierarchy_prunes_deleted() {
        let (store, nb, ch, note) = test_support::seeded();
        trash::soft_delete_note(&store, &nb, &ch, &note).unwrap();
        let doc = visible_hierarchy(store.load().unwrap());
        assert!(doc.chapter(&nb, &ch).unwrap().notes.is_empty());

        trash::soft_delete_notebook(&store, &nb).unwrap();
        let doc = visible_hierarchy(store.load().unwrap());
        assert!(doc.structure.notebooks.is_empty());
    }
}
