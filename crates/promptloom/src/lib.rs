//! Token-budgeted prompt composition and a validated LLM query-retry protocol.
//!
//! `promptloom` covers the two mechanisms every budget-constrained LLM agent
//! needs and most re-implement badly:
//!
//! 1. **Adaptive prompt composition** — a tree of visibility-gated,
//!    independently shrinkable text fragments ([`prompt::PromptElement`] /
//!    [`prompt::Shrinkable`]). [`prompt::fit_tokens`] drives repeated
//!    render → measure → shrink cycles until the rendered prompt fits a token
//!    budget, without breaking the headers and tags downstream parsers rely on.
//!
//! 2. **Validated query-retry** — [`api::retry_parse`] sends a conversation to
//!    a [`api::ChatEndpoint`], parses the reply against a required `<tag>`
//!    structure ([`api::parse_tags`]), and on failure appends the reply plus a
//!    corrective instruction and retries. Rate-limit backpressure sleeps
//!    against its own wait budget and never consumes a parse retry.
//!
//! Observation capture, the action vocabulary, and experiment bookkeeping are
//! collaborators supplied by the caller ([`prompt::ObsSnapshot`],
//! [`prompt::ActionSpace`]); this crate only reads them.
//!
//! # Getting started
//!
//! ```ignore
//! use promptloom::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), promptloom::error::QueryError> {
//!     let flags = Arc::new(ObsFlags::default());
//!     let obs = Observation::new(&snapshot, Arc::clone(&flags));
//!     let think = ThinkSection::default();
//!
//!     // Compose the step prompt and shrink it into the budget.
//!     let mut root = Group::new()
//!         .with_fixed(GoalInstructions::new("Book the flight", None, true))
//!         .with(obs);
//!     let fragment = fit_tokens(&mut root, &FitOptions::default().tokens(12_000));
//!
//!     // Query with corrective retries until the reply parses.
//!     let endpoint = ChatClient::new(api_key, "gpt-4o")?;
//!     let mut messages = vec![Message::system("You are a web agent."), Message::user(fragment)];
//!     let fields = retry_parse(&endpoint, &mut messages, &RetryPolicy::default(), |text| {
//!         think.parse_answer(text)
//!     })
//!     .await?;
//!     println!("{:?}", fields.get("think"));
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};

pub mod api;
pub mod error;
pub mod prelude;
pub mod prompt;

// ── Fragment types ─────────────────────────────────────────────────

/// The rendered output of a prompt element: plain text, or an ordered list
/// of text / image-reference parts (the OpenAI content-parts shape).
///
/// Fragments start life as `Text` and are promoted to `Parts` the first time
/// an image is attached. Token counting ([`prompt::count_tokens`]) only ever
/// sees the textual parts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Fragment {
    Text(String),
    Parts(Vec<Part>),
}

impl Default for Fragment {
    fn default() -> Self {
        Fragment::Text(String::new())
    }
}

impl Fragment {
    /// The concatenated textual content, image parts excluded.
    ///
    /// Multiple text parts are joined with a newline.
    pub fn text_content(&self) -> String {
        match self {
            Fragment::Text(text) => text.clone(),
            Fragment::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text.as_str()),
                    Part::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Whether the fragment carries no content at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Fragment::Text(text) => text.is_empty(),
            Fragment::Parts(parts) => parts.is_empty(),
        }
    }

    /// Append another fragment, preserving part order.
    ///
    /// Two plain-text fragments concatenate in place; anything involving
    /// parts promotes the result to the `Parts` form.
    pub fn append(&mut self, other: Fragment) {
        match other {
            Fragment::Text(incoming) => match self {
                Fragment::Text(text) => text.push_str(&incoming),
                Fragment::Parts(parts) => {
                    if !incoming.is_empty() {
                        parts.push(Part::text(incoming));
                    }
                }
            },
            Fragment::Parts(incoming) => {
                let mut parts = std::mem::take(self).into_parts();
                parts.extend(incoming);
                *self = Fragment::Parts(parts);
            }
        }
    }

    /// Attach an image reference, promoting the fragment to the `Parts` form.
    pub fn push_image(&mut self, url: impl Into<String>) {
        let mut parts = std::mem::take(self).into_parts();
        parts.push(Part::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        });
        *self = Fragment::Parts(parts);
    }

    fn into_parts(self) -> Vec<Part> {
        match self {
            Fragment::Text(text) if text.is_empty() => Vec::new(),
            Fragment::Text(text) => vec![Part::text(text)],
            Fragment::Parts(parts) => parts,
        }
    }
}

impl From<String> for Fragment {
    fn from(text: String) -> Self {
        Fragment::Text(text)
    }
}

impl From<&str> for Fragment {
    fn from(text: &str) -> Self {
        Fragment::Text(text.to_string())
    }
}

/// One typed part of a multi-part fragment.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

/// An image reference, typically a `data:image/jpeg;base64,…` URL.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUrl {
    pub url: String,
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A role-tagged turn in the conversation.
///
/// The retry driver appends to a `Vec<Message>` in place; turn order is
/// append-only during a retry session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: Fragment,
}

impl Message {
    pub fn system(content: impl Into<Fragment>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<Fragment>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<Fragment>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    /// The textual content of the turn, image parts excluded.
    pub fn text(&self) -> String {
        self.content.text_content()
    }
}
