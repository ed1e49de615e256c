//! Typed error taxonomy.
//!
//! Four failure modes cross or approach the crate boundary:
//!
//! - [`ParseError`] — a reply failed structural validation. Recoverable: the
//!   retry driver turns its message into a corrective instruction turn.
//! - [`EndpointError`] — the chat endpoint collaborator failed. The
//!   `RateLimited` variant is absorbed by sleeping inside the driver; other
//!   failures surface immediately.
//! - [`QueryError`] — terminal outcome of a retry session: the semantic retry
//!   budget or the rate-limit wait budget was exhausted, or the endpoint
//!   failed outright.
//! - [`ConfigError`] — an invalid configuration value, raised at construction
//!   and never retried.

use std::time::Duration;
use thiserror::Error;

/// A reply did not match the required structure.
///
/// Carries the human-readable correction message that is sent back to the
/// model verbatim on retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ParseError(pub String);

/// Failure signal from a [`ChatEndpoint`](crate::api::ChatEndpoint).
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    /// The endpoint is throttling. The payload is the provider's error text,
    /// which may embed a wait hint such as "try again in 12.3s".
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Any other endpoint failure (transport, auth, malformed response).
    #[error("{0}")]
    Other(String),
}

/// Terminal failure of a validated retry session.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The parser rejected every reply within the retry budget. The last
    /// reply and correction message are preserved for diagnosis.
    #[error("could not parse a valid reply after {tries} retries")]
    RetryExhausted {
        tries: u32,
        last_reply: Option<String>,
        last_correction: Option<String>,
    },
    /// Cumulative rate-limit backoff exceeded the wait budget.
    #[error("rate-limit wait budget exceeded after {}s: {message}", waited.as_secs())]
    RateLimitExceeded { waited: Duration, message: String },
    /// The endpoint failed with a non-rate-limit error.
    #[error("endpoint error: {0}")]
    Endpoint(String),
}

/// An invalid configuration value. Fails fast at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);
