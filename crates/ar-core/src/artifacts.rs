//! Artifact extraction from free-form model output.
//!
//! - [`extract_code_block`] pulls the first fenced code block out of text.
//! - [`unified_diff`], [`change_summary`], [`side_by_side`] and
//!   [`highlight_changes`] compare two versions of a text using an LCS line
//!   alignment.
//!
//! Everything here is pure and deterministic.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, DiffTag, TextDiff};

/// Fenced block with an optional language tag from a fixed set. The tag
/// line must end right after the tag; the body ends at the first
/// `\n```` that follows.
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)```(?:python|javascript|typescript|java|cpp|csharp|c|go|rust|ruby|php|swift|kotlin|py|js|ts|rs)?\n(.*?)\n```",
    )
    .expect("code block pattern is valid")
});

/// Return the interior of the first fenced code block in `text`, if any.
pub fn extract_code_block(text: &str) -> Option<String> {
    CODE_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ---------------------------------------------------------------------------
// Diffs
// ---------------------------------------------------------------------------

/// Unified diff between two texts with `a/<filename>` / `b/<filename>`
/// headers. Empty when the texts are identical.
pub fn unified_diff(original: &str, modified: &str, filename: &str) -> String {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(original, modified);
    diff.unified_diff()
        .context_radius(3)
        .header(&format!("a/{filename}"), &format!("b/{filename}"))
        .to_string()
}

/// Line-level change counts between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added_line_count: usize,
    pub removed_line_count: usize,
    pub total_changed: usize,
    pub original_line_count: usize,
    pub modified_line_count: usize,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "additions: {}, deletions: {}, total changes: {}, original lines: {}, modified lines: {}",
            self.added_line_count,
            self.removed_line_count,
            self.total_changed,
            self.original_line_count,
            self.modified_line_count
        )
    }
}

pub fn change_summary(original: &str, modified: &str) -> ChangeSummary {
    let old_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = modified.lines().collect();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_slices(&old_lines, &new_lines);

    let (mut added, mut removed) = (0, 0);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }

    ChangeSummary {
        added_line_count: added,
        removed_line_count: removed,
        total_changed: added + removed,
        original_line_count: old_lines.len(),
        modified_line_count: new_lines.len(),
    }
}

/// Two-column comparison, one row per line index. Cells longer than
/// `width - 3` characters are cut and suffixed with `...`.
pub fn side_by_side(original: &str, modified: &str, width: usize) -> String {
    let old_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = modified.lines().collect();
    let rule = "=".repeat(width * 2 + 3);

    let fit = |line: &str| -> String {
        if line.chars().count() > width.saturating_sub(3) {
            let kept: String = line.chars().take(width.saturating_sub(6)).collect();
            format!("{kept}...")
        } else {
            line.to_string()
        }
    };

    let mut out = Vec::with_capacity(old_lines.len().max(new_lines.len()) + 4);
    out.push(rule.clone());
    out.push(format!("{:<width$} | {:<width$}", "ORIGINAL", "MODIFIED"));
    out.push(rule.clone());
    for i in 0..old_lines.len().max(new_lines.len()) {
        let left = fit(old_lines.get(i).copied().unwrap_or(""));
        let right = fit(new_lines.get(i).copied().unwrap_or(""));
        out.push(format!("{left:<width$} | {right:<width$}"));
    }
    out.push(rule);
    out.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    Modified,
    Deleted,
    Added,
}

/// One non-equal hunk of an LCS alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub kind: LineChangeKind,
    pub original: String,
    pub modified: String,
}

pub fn highlight_changes(original: &str, modified: &str) -> Vec<LineChange> {
    let old_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = modified.lines().collect();
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_slices(&old_lines, &new_lines);

    diff.ops()
        .iter()
        .filter_map(|op| {
            let (tag, old_range, new_range) = op.as_tag_tuple();
            let old_text = old_lines[old_range].join("\n");
            let new_text = new_lines[new_range].join("\n");
            match tag {
                DiffTag::Equal => None,
                DiffTag::Replace => Some(LineChange {
                    kind: LineChangeKind::Modified,
                    original: old_text,
                    modified: new_text,
                }),
                DiffTag::Delete => Some(LineChange {
                    kind: LineChangeKind::Deleted,
                    original: old_text,
                    modified: String::new(),
                }),
                DiffTag::Insert => Some(LineChange {
                    kind: LineChangeKind::Added,
                    original: String::new(),
                    modified: new_text,
                }),
            }
        })
        .collect()
}
