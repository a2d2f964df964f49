//! Shared utility functions for the conveyor crate.

use sha2::{Digest, Sha256};

/// Convert a title or identifier to a filesystem- and ref-safe slug, limited to
/// `max_len` characters.
pub fn slugify(title: &str, max_len: usize) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.len() > max_len {
        slug[..max_len].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Unique path- and ref-safe name for an issue id, at most `max_len` characters.
///
/// Ids made of lowercase ASCII letters, digits, `-`, `_` and `.` are kept as they
/// are. Anything else (uppercase, other punctuation, over-long ids) is slugified
/// and suffixed with a short hash of the raw id, so two ids never share a name.
pub fn issue_slug(issue_id: &str, max_len: usize) -> String {
    let verbatim = !issue_id.is_empty()
        && issue_id.len() <= max_len
        && issue_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
        && !issue_id.starts_with(['.', '-'])
        && !issue_id.ends_with('.')
        && !issue_id.ends_with(".lock")
        && !issue_id.contains("..");
    if verbatim {
        return issue_id.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(issue_id.as_bytes());
    let hash = format!("{:x}", hasher.finalize())[..10].to_string();
    let base = slugify(issue_id, max_len.saturating_sub(hash.len() + 1));
    if base.is_empty() {
        hash
    } else {
        format!("{base}-{hash}")
    }
}

/// Truncate `text` to at most `max_chars` characters, appending a marker when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("\n[... truncated]");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_simple() {
        assert_eq!(slugify("Add Login Page", 40), "add-login-page");
    }

    #[test]
    fn test_slugify_collapses_separators() {
        assert_eq!(slugify("bd--12 / fix: thing", 40), "bd-12-fix-thing");
    }

    #[test]
    fn test_slugify_truncates_without_trailing_dash() {
        assert_eq!(slugify("abcd efgh", 5), "abcd");
    }

    #[test]
    fn test_slugify_keeps_issue_ids_stable() {
        assert_eq!(slugify("bd-a1b2", 60), "bd-a1b2");
    }

    #[test]
    fn test_issue_slug_keeps_plain_ids() {
        assert_eq!(issue_slug("bd-a1b2", 60), "bd-a1b2");
        assert_eq!(issue_slug("bd-x.1", 60), "bd-x.1");
    }

    #[test]
    fn test_issue_slug_never_collides() {
        let ids = [
            "bd-A1",
            "bd-a1",
            "bd-x.1",
            "bd-x-1",
            "bd x 1",
            "bd/x/1",
            "bd-x..1",
        ];
        let slugs: std::collections::HashSet<String> =
            ids.iter().map(|id| issue_slug(id, 60)).collect();
        assert_eq!(slugs.len(), ids.len(), "{slugs:?}");
    }

    #[test]
    fn test_issue_slug_long_ids_sharing_a_prefix() {
        let prefix = "x".repeat(70);
        let a = issue_slug(&format!("{prefix}-a"), 60);
        let b = issue_slug(&format!("{prefix}-b"), 60);
        assert_ne!(a, b);
        assert!(a.len() <= 60);
        assert!(b.len() <= 60);
    }

    #[test]
    fn test_issue_slug_is_stable_and_ref_safe() {
        assert_eq!(issue_slug("BD-7", 60), issue_slug("BD-7", 60));
        let slug = issue_slug("../Weird Id.lock", 60);
        assert!(!slug.contains(".."));
        assert!(!slug.ends_with(".lock"));
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
        assert_eq!(issue_slug("", 60).len(), 10);
    }

    #[test]
    fn test_truncate_chars_short_text_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_chars_long_text_marked() {
        let out = truncate_chars("abcdefghij", 4);
        assert!(out.starts_with("abcd"));
        assert!(out.ends_with("[... truncated]"));
    }
}
