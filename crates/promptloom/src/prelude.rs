//! Convenience re-exports for common `promptloom` types.
//!
//! Meant to be glob-imported when assembling prompts and querying models:
//!
//! ```ignore
//! use promptloom::prelude::*;
//! ```
//!
//! This pulls in the types needed for the vast majority of programs: the
//! [`Message`] constructors, the element traits with the standard sections,
//! the token-budget fitter, and the retry driver with its [`ChatClient`].
//! Specialized pieces (raw diffing, tag extraction internals) are
//! intentionally excluded — import those from their modules directly when
//! needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{Fragment, Message, MessageRole, Part};

// ── Errors ──────────────────────────────────────────────────────────
pub use crate::error::{ConfigError, EndpointError, ParseError, QueryError};

// ── Prompt composition ──────────────────────────────────────────────
pub use crate::prompt::{
    ActionSpace, ActionSpaceSection, ChatInstructions, ChatMessage, CoordMode, DiffSection,
    FitOptions, Fixed, GoalInstructions, Group, History, HistoryStep, HtmlSource, ObsFlags,
    ObsSnapshot,
    Observation, PromptElement, Shrinkable, TailTruncator, TextSection, ThinkSection, Visibility,
    be_cautious, fit_tokens, hints, system_instructions,
};

// ── Model API ───────────────────────────────────────────────────────
pub use crate::api::{ChatClient, ChatEndpoint, RetryPolicy, retry_parse};
