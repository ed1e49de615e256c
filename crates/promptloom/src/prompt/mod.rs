//! Adaptive prompt composition: visibility-gated elements, shrink strategies,
//! and the token-budget fitter.
//!
//! A step prompt is a tree of [`PromptElement`]s rendered in declaration
//! order. Elements that implement [`Shrinkable`] additionally expose one
//! monotonic size-reduction step, so the whole tree can be squeezed into a
//! token budget without losing its structure:
//!
//! 1. **[`element`]** — the [`PromptElement`] / [`Shrinkable`] capability
//!    traits, normalized [`Visibility`] predicates, and the generic
//!    [`Group`] composite.
//! 2. **[`shrink`]** — [`TailTruncator`], fractional tail truncation with a
//!    grace period and a cumulative deleted-lines marker.
//! 3. **[`diff`]** — line-level added/removed summaries and the
//!    [`DiffSection`] bounded-display element.
//! 4. **[`sections`]** — the concrete section vocabulary for a web-agent
//!    step: observation, history, instructions, action space.
//! 5. **[`tokenizer`]** + **[`budget`]** — model-keyed token counting and
//!    [`fit_tokens`], the render → measure → shrink loop.

pub mod budget;
pub mod diff;
pub mod element;
pub mod sections;
pub mod shrink;
pub mod tokenizer;

// Re-export commonly used items at the module level.
pub use budget::{FitOptions, fit_tokens};
pub use diff::{DiffSection, DiffSummary, diff};
pub use element::{Fixed, Group, PromptElement, Shrinkable, TextSection, Visibility};
pub use sections::{
    ActionSpace, ActionSpaceSection, ChatInstructions, ChatMessage, CoordMode, GoalInstructions,
    History, HistoryStep, HtmlSource, ObsFlags, ObsSnapshot, Observation, ThinkSection,
    be_cautious, hints, system_instructions,
};
pub use shrink::TailTruncator;
pub use tokenizer::{DEFAULT_COUNT_MODEL, count_tokens};
