//! Redline generation.
//!
//! A redline is a unified diff of the original serialized text against the
//! final serialized text, the reviewer-facing counterpart to the structured
//! changelog.

use similar::TextDiff;

/// Unified diff with file headers.
pub fn unified(original: &str, edited: &str, label: &str) -> String {
    TextDiff::from_lines(original, edited)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

/// Counts of changed lines (inserted, deleted) for run summaries.
pub fn change_counts(original: &str, edited: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(original, edited);
    let mut inserted = 0;
    let mut deleted = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Insert => inserted += 1,
            similar::ChangeTag::Delete => deleted += 1,
            similar::ChangeTag::Equal => {}
        }
    }
    (inserted, deleted)
}
