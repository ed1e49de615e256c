//! The prompt-element capability traits and the generic composite.
//!
//! Every renderable unit implements [`PromptElement`]: a [`Visibility`]
//! predicate re-evaluated on each render, plus `render()`. Elements that can
//! give up content under token pressure also implement [`Shrinkable`].
//! Rendering is a pure function of current state; only `shrink()` mutates.

use crate::Fragment;

/// Whether an element renders, normalized at construction time.
///
/// A plain `bool` covers elements whose visibility is fixed for the step;
/// `When` holds a zero-argument predicate for visibility that depends on
/// external flags, re-evaluated on every render (so a flag flipped between
/// renders, even mid-fitting-loop, takes effect immediately).
pub enum Visibility {
    Always,
    Never,
    When(Box<dyn Fn() -> bool + Send + Sync>),
}

impl Visibility {
    /// Build a predicate-backed visibility.
    pub fn when(predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Visibility::When(Box::new(predicate))
    }

    /// Evaluate the predicate.
    pub fn evaluate(&self) -> bool {
        match self {
            Visibility::Always => true,
            Visibility::Never => false,
            Visibility::When(predicate) => predicate(),
        }
    }
}

impl From<bool> for Visibility {
    fn from(visible: bool) -> Self {
        if visible {
            Visibility::Always
        } else {
            Visibility::Never
        }
    }
}

impl std::fmt::Debug for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Always => write!(f, "Always"),
            Visibility::Never => write!(f, "Never"),
            Visibility::When(_) => write!(f, "When(..)"),
        }
    }
}

/// One renderable unit of a prompt.
///
/// Invariant: a non-visible element renders the empty fragment, regardless
/// of internal state.
pub trait PromptElement {
    /// Re-evaluated on every render.
    fn is_visible(&self) -> bool;

    /// Produce the element's fragment. Must be a pure function of current
    /// state so shrink decisions stay deterministic.
    fn render(&self) -> Fragment;
}

/// A prompt element that can give up content under token pressure.
///
/// `shrink()` must be safe to call an unbounded number of times: it
/// monotonically reduces rendered size, never grows it, and saturates at a
/// minimal non-empty representation. Composite shrinkables propagate the
/// call to every shrinkable child, not just their own state.
pub trait Shrinkable: PromptElement {
    fn shrink(&mut self);
}

/// A visibility-gated static text leaf.
#[derive(Debug)]
pub struct TextSection {
    visibility: Visibility,
    body: String,
}

impl TextSection {
    pub fn new(body: impl Into<String>, visibility: impl Into<Visibility>) -> Self {
        Self {
            visibility: visibility.into(),
            body: body.into(),
        }
    }
}

impl PromptElement for TextSection {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        if !self.is_visible() {
            return Fragment::default();
        }
        Fragment::Text(self.body.clone())
    }
}

/// Adapter giving a fixed element a no-op `shrink`, so shrinkable and
/// non-shrinkable children can live in the same [`Group`].
#[derive(Debug)]
pub struct Fixed<E>(pub E);

impl<E: PromptElement> PromptElement for Fixed<E> {
    fn is_visible(&self) -> bool {
        self.0.is_visible()
    }

    fn render(&self) -> Fragment {
        self.0.render()
    }
}

impl<E: PromptElement> Shrinkable for Fixed<E> {
    fn shrink(&mut self) {}
}

/// A composite that concatenates its children's fragments in push order.
///
/// Concatenation order is part of the contract: downstream parsers depend on
/// headers and separators appearing where the tree declared them. Children
/// own no back-reference to the group.
pub struct Group {
    visibility: Visibility,
    children: Vec<Box<dyn Shrinkable + Send>>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            visibility: Visibility::Always,
            children: Vec::new(),
        }
    }

    pub fn with_visibility(mut self, visibility: impl Into<Visibility>) -> Self {
        self.visibility = visibility.into();
        self
    }

    /// Append a shrinkable child.
    pub fn with(mut self, child: impl Shrinkable + Send + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    /// Append a fixed (non-shrinkable) child.
    pub fn with_fixed(self, child: impl PromptElement + Send + 'static) -> Self {
        self.with(Fixed(child))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptElement for Group {
    fn is_visible(&self) -> bool {
        self.visibility.evaluate()
    }

    fn render(&self) -> Fragment {
        if !self.is_visible() {
            return Fragment::default();
        }
        let mut fragment = Fragment::default();
        for child in &self.children {
            fragment.append(child.render());
        }
        fragment
    }
}

impl Shrinkable for Group {
    fn shrink(&mut self) {
        for child in &mut self.children {
            child.shrink();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::shrink::TailTruncator;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn hidden_section_renders_empty() {
        let section = TextSection::new("secret", false);
        assert!(section.render().is_empty());
    }

    #[test]
    fn visible_section_renders_body() {
        let section = TextSection::new("body", true);
        assert_eq!(section.render().text_content(), "body");
    }

    #[test]
    fn predicate_visibility_reevaluated_each_render() {
        let flag = Arc::new(AtomicBool::new(true));
        let watched = Arc::clone(&flag);
        let section = TextSection::new(
            "conditional",
            Visibility::when(move || watched.load(Ordering::Relaxed)),
        );

        assert_eq!(section.render().text_content(), "conditional");
        flag.store(false, Ordering::Relaxed);
        assert!(section.render().is_empty());
    }

    #[test]
    fn group_concatenates_in_push_order() {
        let group = Group::new()
            .with_fixed(TextSection::new("first\n", true))
            .with_fixed(TextSection::new("second", true));
        assert_eq!(group.render().text_content(), "first\nsecond");
    }

    #[test]
    fn hidden_group_renders_empty_despite_children() {
        let group = Group::new()
            .with_fixed(TextSection::new("child", true))
            .with_visibility(false);
        assert!(group.render().is_empty());
    }

    #[test]
    fn group_shrink_propagates_to_every_child() {
        let lines = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let mut group = Group::new()
            .with(TailTruncator::new(&lines, true).with_start_iteration(0))
            .with(TailTruncator::new(&lines, true).with_start_iteration(0))
            .with_fixed(TextSection::new("fixed", true));

        let before = group.render().text_content().len();
        group.shrink();
        let after = group.render().text_content().len();
        assert!(after < before);
        assert!(group.render().text_content().contains("fixed"));
    }

    #[test]
    fn fixed_adapter_shrink_is_noop() {
        let mut fixed = Fixed(TextSection::new("stable", true));
        let before = fixed.render();
        for _ in 0..50 {
            fixed.shrink();
        }
        assert_eq!(fixed.render(), before);
    }
}
