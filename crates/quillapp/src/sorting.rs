use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::model::{Chapter, Collection, Note, Notebook};

/// User-selectable list order, persisted as `defaultSorting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    /// Most recently modified first.
    #[default]
    #[serde(rename = "lastModified")]
    LastModified,
    /// A to Z, ignoring case.
    #[serde(rename = "name")]
    Name,
    /// Z to A, ignoring case.
    #[serde(rename = "nameDesc")]
    NameDesc,
    /// Oldest first.
    #[serde(rename = "created")]
    Created,
    /// Newest first.
    #[serde(rename = "createdDesc")]
    CreatedDesc,
}

pub trait Sortable {
    fn sort_name(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn modified_at(&self) -> DateTime<Utc>;
}

impl Sortable for Notebook {
    fn sort_name(&self) -> &str {
        &self.title
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl Sortable for Chapter {
    fn sort_name(&self) -> &str {
        &self.title
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl Sortable for Note {
    fn sort_name(&self) -> &str {
        &self.title
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

impl Sortable for Collection {
    fn sort_name(&self) -> &str {
        &self.name
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created
    }
    fn modified_at(&self) -> DateTime<Utc> {
        self.last_modified
    }
}

fn by_name<T: Sortable>(a: &T, b: &T) -> Ordering {
    a.sort_name()
        .to_lowercase()
        .cmp(&b.sort_name().to_lowercase())
        .then_with(|| a.sort_name().cmp(b.sort_name()))
}

/// Stable sort in place.
pub fn sort_items<T: Sortable>(items: &mut [T], order: SortOrder) {
    match order {
        SortOrder::LastModified => items.sort_by(|a, b| b.modified_at().cmp(&a.modified_at())),
        SortOrder::Name => items.sort_by(by_name),
        SortOrder::NameDesc => items.sort_by(|a, b| by_name(b, a)),
        SortOrder::Created => items.sort_by_key(|i| i.created_at()),
        SortOrder::CreatedDesc => items.sort_by(|a, b| b.created_at().cmp(&a.created_at())),
    }
}

/// Recycle-bin order: most recently deleted first.
pub fn sort_by_deleted_at<T>(items: &mut [T], deleted_at: impl Fn(&T) -> Option<DateTime<Utc>>) {
    items.sort_by(|a, b| deleted_at(b).cmp(&deleted_at(a)));
}
