use std::path::Path;

use anyhow::Context;
use ar_core::artifacts::{
    change_summary, highlight_changes, side_by_side, unified_diff, LineChangeKind,
};
use ar_core::file_ops;

/// How `diff` lays out the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffView {
    Unified,
    SideBySide { width: usize },
    Changes,
}

/// Run the `diff` subcommand: compare two files and print the result
/// followed by a change summary. No LLM is involved.
pub fn run(original: &Path, modified: &Path, view: DiffView) -> anyhow::Result<()> {
    let before = file_ops::read_file(original).context("failed to read original")?;
    let after = file_ops::read_file(modified).context("failed to read modified")?;
    let label = original.display().to_string();
    println!("{}", render(&before, &after, &label, view));
    Ok(())
}

pub fn render(original: &str, modified: &str, label: &str, view: DiffView) -> String {
    if original == modified {
        return "No differences.".to_string();
    }
    let body = match view {
        DiffView::Unified => unified_diff(original, modified, label),
        DiffView::SideBySide { width } => side_by_side(original, modified, width),
        DiffView::Changes => highlight_changes(original, modified)
            .iter()
            .map(|change| match change.kind {
                LineChangeKind::Modified => {
                    format!("~ modified\n- {}\n+ {}", change.original, change.modified)
                }
                LineChangeKind::Deleted => format!("- deleted\n- {}", change.original),
                LineChangeKind::Added => format!("+ added\n+ {}", change.modified),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    };
    format!("{body}\n\n{}", change_summary(original, modified))
}
