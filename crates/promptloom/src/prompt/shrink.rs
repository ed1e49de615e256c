//! Tail truncation: the cheapest way to lose bulk content.
//!
//! [`TailTruncator`] wraps a text blob and, once a grace period of shrink
//! calls has elapsed, drops a fixed fraction of the remaining lines from the
//! end on every call. The grace period lets cheaper strategies elsewhere in
//! the tree (diff ceilings, hidden sections) act first, so short prompts are
//! never truncated at all.

use super::element::{PromptElement, Shrinkable, Visibility};
use crate::Fragment;

/// Fraction of remaining lines removed per shrink call.
const DEFAULT_SHRINK_SPEED: f64 = 0.3;

/// Shrink calls to absorb before truncation starts.
const DEFAULT_START_ITERATION: u32 = 10;

/// A shrinkable text leaf that truncates from the bottom.
///
/// Size-control state is explicit: the original lines are kept intact and
/// only a `remaining` counter and a cumulative `deleted_lines` tally are
/// mutated, so `render()` stays a pure function of current state. The
/// remaining-line count saturates at 1; calling `shrink()` past that point
/// is a no-op.
#[derive(Debug)]
pub struct TailTruncator {
    visibility: Visibility,
    lines: Vec<String>,
    remaining: usize,
    shrink_speed: f64,
    start_iteration: u32,
    shrink_calls: u32,
    deleted_lines: usize,
}

impl TailTruncator {
    pub fn new(text: &str, visibility: impl Into<Visibility>) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let remaining = lines.len();
        Self {
            visibility: visibility.into(),
            lines,
            remaining,
            shrink_speed: DEFAULT_SHRINK_SPEED,
            start_iteration: DEFAULT_START_ITERATION,
            shrink_calls: 0,
            deleted_lines: 0,
        }
    }

    /// Override the fraction of remaining lines removed per call.
    pub fn with_shrink_speed(mut self, speed: f64) -> Self {
        self.shrink_speed = speed;
        self
    }

    /// Override the grace period (number of shrink calls absorbed before
    /// truncation starts).
    pub fn with_start_iteration(mut self, iteration: u32) -> Self {
        self.start_iteration = iteration;
        self
    }

    /// Cumulative number of lines deleted so far. Monotonically
    /// non-decreasing.
    pub fn deleted_lines(&self) -> usize {
        self.deleted_lines
    }
}

impl PromptElement for TailTruncator {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        if !self.is_visible() {
            return Fragment::default();
        }
        if self.deleted_lines == 0 {
            return Fragment::Text(self.lines.join("\n"));
        }
        let mut text = self
            .lines
            .get(..self.remaining)
            .unwrap_or(&self.lines)
            .join("\n");
        text.push_str(&format!(
            "\n... Deleted {} lines to reduce prompt size.",
            self.deleted_lines
        ));
        Fragment::Text(text)
    }
}

impl Shrinkable for TailTruncator {
    fn shrink(&mut self) {
        if self.is_visible() && self.shrink_calls >= self.start_iteration && self.remaining > 1 {
            let keep = (((self.remaining as f64) * (1.0 - self.shrink_speed)) as usize).max(1);
            self.deleted_lines += self.remaining - keep;
            self.remaining = keep;
        }
        self.shrink_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn no_truncation_during_grace_period() {
        let text = numbered_lines(20);
        let mut truncator = TailTruncator::new(&text, true).with_start_iteration(3);
        truncator.shrink();
        truncator.shrink();
        assert_eq!(truncator.render().text_content(), text);
    }

    #[test]
    fn truncation_starts_after_grace_period() {
        let text = numbered_lines(20);
        let mut truncator = TailTruncator::new(&text, true)
            .with_start_iteration(2)
            .with_shrink_speed(0.3);
        truncator.shrink();
        truncator.shrink();
        truncator.shrink(); // third call is past the grace period

        let rendered = truncator.render().text_content();
        let kept: Vec<&str> = rendered.lines().collect();
        // 20 * 0.7 = 14 content lines plus the deletion marker.
        assert_eq!(kept.len(), 15);
        assert_eq!(kept[13], "line 13");
        assert_eq!(kept[14], "... Deleted 6 lines to reduce prompt size.");
        assert_eq!(truncator.deleted_lines(), 6);
    }

    #[test]
    fn repeated_shrink_never_grows_and_never_panics() {
        let text = numbered_lines(20);
        let mut truncator = TailTruncator::new(&text, true).with_start_iteration(0);
        let mut previous = truncator.render().text_content().len();
        let mut deleted = 0;
        for _ in 0..100 {
            truncator.shrink();
            let current = truncator.render().text_content().len();
            assert!(current <= previous);
            assert!(truncator.deleted_lines() >= deleted);
            deleted = truncator.deleted_lines();
            previous = current;
        }
    }

    #[test]
    fn saturates_at_one_line() {
        let text = numbered_lines(20);
        let mut truncator = TailTruncator::new(&text, true).with_start_iteration(0);
        for _ in 0..100 {
            truncator.shrink();
        }
        let rendered = truncator.render().text_content();
        assert!(rendered.starts_with("line 0"));
        assert!(rendered.contains("Deleted 19 lines"));
    }

    #[test]
    fn hidden_truncator_is_never_truncated() {
        let text = numbered_lines(20);
        let mut truncator = TailTruncator::new(&text, false).with_start_iteration(0);
        for _ in 0..10 {
            truncator.shrink();
        }
        assert_eq!(truncator.deleted_lines(), 0);
        assert!(truncator.render().is_empty());
    }

    #[test]
    fn empty_text_shrinks_safely() {
        let mut truncator = TailTruncator::new("", true).with_start_iteration(0);
        for _ in 0..10 {
            truncator.shrink();
        }
        assert!(truncator.render().text_content().is_empty());
    }
}
