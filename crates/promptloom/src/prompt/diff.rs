//! Line-level text deltas and the bounded-display diff element.
//!
//! History steps show *what changed* between two observation snapshots
//! instead of repeating both blobs. [`diff`] computes an added/removed-line
//! summary; [`DiffSection`] renders it under a shrinkable display ceiling so
//! long diffs can be squeezed without losing the change counts.

use super::element::{PromptElement, Shrinkable, Visibility};
use crate::Fragment;

/// Default ceiling on displayed diff lines.
const DEFAULT_MAX_LINES: usize = 20;

/// Default decrement applied to the ceiling per shrink call.
const DEFAULT_SHRINK_STEP: usize = 2;

/// DP cells past which the quadratic LCS table is not built; the changed
/// region is reported as fully rewritten instead. 2^20 cells keeps the
/// table allocation at 4 MiB.
const MAX_LCS_CELLS: usize = 1 << 20;

/// An added/removed-line summary between two text blobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    /// One-line description: change counts, or an `Identical` /
    /// `previous is empty` marker.
    pub header: String,
    /// The changed lines, `-` removals and `+` additions, in document order.
    pub lines: Vec<String>,
}

/// Compute a line-level difference between `previous` and `new`.
///
/// Only additions and removals are reported; unchanged lines are dropped.
/// Identical inputs and an empty `previous` short-circuit to marker headers
/// with no lines.
pub fn diff(previous: &str, new: &str) -> DiffSummary {
    if previous == new {
        return DiffSummary {
            header: "Identical".to_string(),
            lines: Vec::new(),
        };
    }

    if previous.is_empty() {
        return DiffSummary {
            header: "previous is empty".to_string(),
            lines: Vec::new(),
        };
    }

    let old: Vec<&str> = previous.lines().collect();
    let fresh: Vec<&str> = new.lines().collect();

    let mut lines = Vec::new();
    let mut removed = 0usize;
    let mut added = 0usize;
    for op in lcs_ops(&old, &fresh) {
        match op {
            DiffOp::Removed(line) => {
                lines.push(format!("- {line}"));
                removed += 1;
            }
            DiffOp::Added(line) => {
                lines.push(format!("+ {line}"));
                added += 1;
            }
        }
    }

    DiffSummary {
        header: format!("{added} lines added and {removed} lines removed:"),
        lines,
    }
}

enum DiffOp {
    Removed(String),
    Added(String),
}

/// Longest-common-subsequence walk emitting removals and additions in
/// document order.
fn lcs_ops(old: &[&str], fresh: &[&str]) -> Vec<DiffOp> {
    // Trim the common prefix and suffix first; observation blobs usually
    // differ in a small region, and this keeps the DP table small.
    let mut start = 0;
    while start < old.len() && start < fresh.len() && old[start] == fresh[start] {
        start += 1;
    }
    let mut old_end = old.len();
    let mut fresh_end = fresh.len();
    while old_end > start && fresh_end > start && old[old_end - 1] == fresh[fresh_end - 1] {
        old_end -= 1;
        fresh_end -= 1;
    }
    let old = &old[start..old_end];
    let fresh = &fresh[start..fresh_end];

    let rows = old.len() + 1;
    let cols = fresh.len() + 1;
    if rows.saturating_mul(cols) > MAX_LCS_CELLS {
        // Whole observation blobs can be tens of thousands of lines; with
        // that much rewritten the interleaved walk adds nothing over a
        // removed-block-then-added-block report.
        let mut ops: Vec<DiffOp> = old.iter().map(|l| DiffOp::Removed(l.to_string())).collect();
        ops.extend(fresh.iter().map(|l| DiffOp::Added(l.to_string())));
        return ops;
    }
    let mut table = vec![0u32; rows * cols];
    for i in (0..old.len()).rev() {
        for j in (0..fresh.len()).rev() {
            table[i * cols + j] = if old[i] == fresh[j] {
                table[(i + 1) * cols + j + 1] + 1
            } else {
                table[(i + 1) * cols + j].max(table[i * cols + j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < fresh.len() {
        if old[i] == fresh[j] {
            i += 1;
            j += 1;
        } else if table[(i + 1) * cols + j] >= table[i * cols + j + 1] {
            ops.push(DiffOp::Removed(old[i].to_string()));
            i += 1;
        } else {
            ops.push(DiffOp::Added(fresh[j].to_string()));
            j += 1;
        }
    }
    ops.extend(old[i..].iter().map(|l| DiffOp::Removed(l.to_string())));
    ops.extend(fresh[j..].iter().map(|l| DiffOp::Added(l.to_string())));
    ops
}

/// A shrinkable element rendering a bounded view of a [`DiffSummary`].
///
/// Each shrink call lowers the display ceiling by a fixed step, never below
/// one line. When the full diff exceeds the ceiling, a truncation notice
/// with the hidden-change count is appended.
#[derive(Debug)]
pub struct DiffSection {
    visibility: Visibility,
    prefix: String,
    summary: DiffSummary,
    max_lines: usize,
    shrink_step: usize,
}

impl DiffSection {
    pub fn new(previous: &str, new: &str, visibility: impl Into<Visibility>) -> Self {
        Self {
            visibility: visibility.into(),
            prefix: String::new(),
            summary: diff(previous, new),
            max_lines: DEFAULT_MAX_LINES,
            shrink_step: DEFAULT_SHRINK_STEP,
        }
    }

    /// Literal text emitted before the diff header (e.g. a section heading).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Override the initial display ceiling.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    /// Override the per-shrink ceiling decrement.
    pub fn with_shrink_step(mut self, step: usize) -> Self {
        self.shrink_step = step;
        self
    }

    /// The current display ceiling.
    pub fn max_lines(&self) -> usize {
        self.max_lines
    }
}

impl PromptElement for DiffSection {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        if !self.is_visible() {
            return Fragment::default();
        }
        let shown = self.summary.lines.len().min(self.max_lines);
        let mut body = self.summary.lines[..shown].join("\n");
        if self.summary.lines.len() > self.max_lines {
            let hidden = self.summary.lines.len() - self.max_lines;
            body.push_str(&format!("\nDiff truncated, {hidden} changes not shown."));
        }
        Fragment::Text(format!("{}{}\n{body}\n", self.prefix, self.summary.header))
    }
}

impl Shrinkable for DiffSection {
    fn shrink(&mut self) {
        self.max_lines = self.max_lines.saturating_sub(self.shrink_step).max(1);
    }
}
