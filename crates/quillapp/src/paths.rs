//! # Path Utilities
//!
//! Paths inside the mirrored tree are kept as relative, forward-slash strings
//! (`notebooks/<id>/chapters/<id>`). They are stored in the hierarchy
//! document, so they must look the same on every platform; only the
//! [`crate::store::fs_backend::FsBackend`] turns them into real `PathBuf`s.
//!
//! - [`normalize_path`]: collapse separators, backslashes to slashes.
//! - [`validate_path`]: reject control and dangerous characters.
//! - [`sanitize_file_name`]: make a single segment safe to use on disk.
//! - [`generate_safe_path`]: join sanitized segments onto an untouched base.

use crate::error::{QuillError, Result};
use crate::platform::Platform;

const MAX_FILE_NAME_LEN: usize = 100;

/// Characters rejected everywhere.
const DANGEROUS_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

/// Windows reserved device names, checked on desktop only.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub fn normalize_path(path: &str) -> Result<String> {
    if path.trim().is_empty() {
        return Err(QuillError::InvalidPath("path is empty".to_string()));
    }

    let mut out = String::with_capacity(path.len());
    let mut last_was_sep = false;
    for c in path.chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if last_was_sep {
                continue;
            }
            last_was_sep = true;
        } else {
            last_was_sep = false;
        }
        out.push(c);
    }
    Ok(out)
}

pub fn validate_path(path: &str, platform: Platform) -> bool {
    if path.is_empty() {
        return false;
    }
    if path
        .chars()
        .any(|c| c.is_control() || DANGEROUS_CHARS.contains(&c))
    {
        return false;
    }
    if platform.is_mobile() {
        return true;
    }

    // Desktop: colons only as a drive prefix, no reserved segment names.
    let without_drive = match path.char_indices().nth(1) {
        Some((idx, ':')) => &path[idx + 1..],
        _ => path,
    };
    if without_drive.contains(':') {
        return false;
    }
    !path.split(['/', '\\']).any(|segment| {
        let stem = segment.split('.').next().unwrap_or("").to_uppercase();
        RESERVED_NAMES.contains(&stem.as_str())
    })
}

pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !DANGEROUS_CHARS.contains(c) && *c != ':')
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .take(MAX_FILE_NAME_LEN)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Join `segments` onto `base`, sanitizing only the appended segments.
pub fn generate_safe_path(base: &str, segments: &[&str]) -> Result<String> {
    let mut parts: Vec<String> = Vec::with_capacity(segments.len() + 1);
    if !base.is_empty() {
        parts.push(base.trim_end_matches(['/', '\\']).to_string());
    }
    parts.extend(segments.iter().map(|s| sanitize_file_name(s)));

    let joined = parts.join("/");
    if joined.trim().is_empty() {
        return Err(QuillError::EmptyPath);
    }
    normalize_path(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_separators() {
        assert_eq!(normalize_path("a//b\\\\c/").unwrap(), "a/b/c/");
        assert_eq!(normalize_path("notebooks\\1\\chapters").unwrap(), "notebooks/1/chapters");
    }

    #[test]
    fn normalize_rejects_empty() {
        assert!(matches!(normalize_path(""), Err(QuillError::InvalidPath(_))));
        assert!(matches!(normalize_path("   "), Err(QuillError::InvalidPath(_))));
    }

    #[test]
    fn validate_is_permissive_on_mobile() {
        assert!(validate_path("content://com.android/tree/primary:Notes", Platform::Android));
        assert!(!validate_path("bad\u{0007}name", Platform::Android));
        assert!(!validate_path("what?", Platform::Ios));
    }

    #[test]
    fn validate_is_strict_on_desktop() {
        assert!(validate_path("C:/Users/me/notes", Platform::Desktop));
        assert!(!validate_path("notes/a:b", Platform::Desktop));
        assert!(!validate_path("notes/CON/metadata.json", Platform::Desktop));
        assert!(!validate_path("notes/aux.txt", Platform::Desktop));
        assert!(validate_path("notebooks/123/metadata.json", Platform::Desktop));
    }

    #[test]
    fn sanitize_replaces_separators_and_truncates() {
        assert_eq!(sanitize_file_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_file_name("what?*<>"), "what");
        assert_eq!(sanitize_file_name("???"), "untitled");
        assert_eq!(sanitize_file_name(&"x".repeat(300)).len(), 100);
    }

    #[test]
    fn safe_path_leaves_base_alone() {
        let path = generate_safe_path("/data/user:0/files", &["notebooks", "a/b"]).unwrap();
        assert_eq!(path, "/data/user:0/files/notebooks/a_b");
    }

    #[test]
    fn safe_path_without_base() {
        assert_eq!(
            generate_safe_path("", &["notebooks", "17"]).unwrap(),
            "notebooks/17"
        );
    }
}
