//! # Tags and Priority
//!
//! Note tags are free-form strings with one reserved prefix: `priority:<Level>`
//! encodes the note's priority. A note carries at most one priority tag; when
//! it is absent or names an unknown level, the priority is [`Priority::Low`].
//!
//! The priority tag keeps its position among the other tags when it is
//! replaced, so the UI's tag chips do not jump around.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const PRIORITY_PREFIX: &str = "priority:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    #[default]
    Low,
    Mid,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Mid,
        Priority::High,
        Priority::VeryHigh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Mid => "Mid",
            Priority::High => "High",
            Priority::VeryHigh => "Very High",
        }
    }

    pub fn to_tag(&self) -> String {
        format!("{}{}", PRIORITY_PREFIX, self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

pub fn is_priority_tag(tag: &str) -> bool {
    tag.starts_with(PRIORITY_PREFIX)
}

/// First priority tag wins; malformed levels fall back to `Low`.
pub fn extract_priority(tags: &[String]) -> Priority {
    tags.iter()
        .find_map(|t| t.strip_prefix(PRIORITY_PREFIX))
        .and_then(|level| level.parse().ok())
        .unwrap_or_default()
}

pub fn non_priority_tags(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter(|t| !is_priority_tag(t))
        .cloned()
        .collect()
}

/// Returns `tags` with exactly one priority tag set to `priority`.
pub fn with_priority(tags: &[String], priority: Priority) -> Vec<String> {
    let mut out = Vec::with_capacity(tags.len() + 1);
    let mut placed = false;
    for tag in tags {
        if is_priority_tag(tag) {
            if !placed {
                out.push(priority.to_tag());
                placed = true;
            }
        } else {
            out.push(tag.clone());
        }
    }
    if !placed {
        out.push(priority.to_tag());
    }
    out
}

/// Trims, drops empties and duplicates, preserving first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
