//! Talking to the model: transport, reply parsing, and validated retries.
//!
//! - [`client`] — async HTTP client for OpenAI-compatible chat endpoints.
//! - [`parse`] — tagged-field extraction from replies, with correction
//!   messages for malformed answers.
//! - [`retry`] — the validated-retry driver: query, parse, feed corrections
//!   back, sleep through rate limits.

use crate::Message;
use crate::error::EndpointError;
use async_trait::async_trait;

pub mod client;
pub mod parse;
pub mod retry;

pub use client::ChatClient;
pub use parse::{ParseOutcome, extract_tags, parse_tags, parse_tags_strict};
pub use retry::{RetryPolicy, retry_parse};

/// Anything that can answer a conversation with one assistant message.
///
/// The retry driver is generic over this seam; tests substitute scripted
/// endpoints for the HTTP client.
#[async_trait]
pub trait ChatEndpoint: Send + Sync {
    async fn chat(&self, messages: &[Message]) -> Result<Message, EndpointError>;
}
