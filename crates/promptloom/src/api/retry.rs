//! The validated-retry driver.
//!
//! One call keeps querying the endpoint until the reply parses, the parse
//! budget runs out, or cumulative rate-limit sleeping exceeds its own budget.
//! Parse failures consume retries; rate-limit sleeps never do. Every reply
//! and every correction is appended to the conversation, so the model sees
//! its own mistakes.

use super::ChatEndpoint;
use crate::Message;
use crate::error::{EndpointError, ParseError, QueryError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{info, warn};

/// Budgets governing one validated query.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Parse failures tolerated before giving up.
    pub max_retries: u32,
    /// Floor on each rate-limit sleep, hint or no hint.
    pub min_retry_wait: Duration,
    /// Cumulative rate-limit sleep budget for the whole call.
    pub rate_limit_max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            min_retry_wait: Duration::from_secs(60),
            rate_limit_max_wait: Duration::from_secs(30 * 60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_min_retry_wait(mut self, wait: Duration) -> Self {
        self.min_retry_wait = wait;
        self
    }

    pub fn with_rate_limit_max_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_max_wait = wait;
        self
    }
}

static WAIT_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"try again in (\d+(\.\d+)?)s").expect("wait-hint pattern is valid")
});

/// Pick the sleep for a rate-limit message: the provider's hint when present
/// and above the floor, the floor otherwise.
fn extract_wait_time(message: &str, min_retry_wait: Duration) -> Duration {
    let hinted = WAIT_HINT
        .captures(message)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(Duration::from_secs_f64);
    match hinted {
        Some(hint) if hint > min_retry_wait => hint,
        _ => min_retry_wait,
    }
}

/// Query `endpoint` until `parser` accepts a reply.
///
/// `messages` is the live conversation: each assistant reply is appended as
/// received, and each parse failure appends the parser's correction as a user
/// turn before retrying. On success the conversation ends with the accepted
/// reply. Rate-limit responses sleep (hint-aware, floored at
/// `min_retry_wait`) and accrue against `rate_limit_max_wait` without
/// consuming parse retries; any other endpoint failure aborts immediately.
pub async fn retry_parse<T, P>(
    endpoint: &dyn ChatEndpoint,
    messages: &mut Vec<Message>,
    policy: &RetryPolicy,
    parser: P,
) -> Result<T, QueryError>
where
    P: Fn(&str) -> Result<T, ParseError>,
{
    let mut tries: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        let reply = match endpoint.chat(messages).await {
            Ok(reply) => reply,
            Err(EndpointError::RateLimited(message)) => {
                let wait = extract_wait_time(&message, policy.min_retry_wait);
                warn!(
                    "rate limited, sleeping {}s: {message}",
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                waited += wait;
                if waited >= policy.rate_limit_max_wait {
                    return Err(QueryError::RateLimitExceeded { waited, message });
                }
                continue;
            }
            Err(EndpointError::Other(message)) => {
                return Err(QueryError::Endpoint(message));
            }
        };

        let reply_text = reply.text();
        messages.push(reply);

        match parser(&reply_text) {
            Ok(value) => return Ok(value),
            Err(ParseError(correction)) => {
                tries += 1;
                if tries >= policy.max_retries {
                    return Err(QueryError::RetryExhausted {
                        tries,
                        last_reply: Some(reply_text),
                        last_correction: Some(correction),
                    });
                }
                info!("reply failed validation (attempt {tries}): {correction}");
                messages.push(Message::user(correction));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Endpoint returning a scripted sequence of outcomes.
    struct ScriptedEndpoint {
        script: Mutex<Vec<Result<Message, EndpointError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedEndpoint {
        fn new(script: Vec<Result<Message, EndpointError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ChatEndpoint for ScriptedEndpoint {
        async fn chat(&self, _messages: &[Message]) -> Result<Message, EndpointError> {
            *self.calls.lock().unwrap() += 1;
            self.script.lock().unwrap().remove(0)
        }
    }

    fn parse_action(text: &str) -> Result<String, ParseError> {
        crate::api::parse::parse_tags_strict(text, &["action"], &[], false)
            .map(|mut fields| fields.remove("action").unwrap_or_default())
    }

    #[tokio::test]
    async fn returns_parsed_value_on_first_good_reply() {
        let endpoint = ScriptedEndpoint::new(vec![Ok(Message::assistant(
            "<action>click('a1')</action>",
        ))]);
        let mut messages = vec![Message::system("sys"), Message::user("go")];

        let action = retry_parse(&endpoint, &mut messages, &RetryPolicy::default(), parse_action)
            .await
            .unwrap();
        assert_eq!(action, "click('a1')");
        assert_eq!(messages.len(), 3); // reply appended
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn corrections_are_fed_back_until_reply_parses() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(Message::assistant("no tags")),
            Ok(Message::assistant("still no tags")),
            Ok(Message::assistant("<action>noop()</action>")),
        ]);
        let mut messages = vec![Message::system("sys"), Message::user("go")];

        let action = retry_parse(&endpoint, &mut messages, &RetryPolicy::default(), parse_action)
            .await
            .unwrap();
        assert_eq!(action, "noop()");
        assert_eq!(endpoint.calls(), 3);
        // initial 2 + reply, correction, reply, correction, reply
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[3].role, crate::MessageRole::User);
        assert!(
            messages[3]
                .content
                .text_content()
                .contains("Missing the key <action>")
        );
    }

    #[tokio::test]
    async fn exhausting_retries_reports_last_reply_and_correction() {
        let endpoint = ScriptedEndpoint::new(vec![
            Ok(Message::assistant("bad one")),
            Ok(Message::assistant("bad two")),
            Ok(Message::assistant("bad three")),
        ]);
        let mut messages = vec![Message::user("go")];
        let policy = RetryPolicy::default().with_max_retries(3);

        let err = retry_parse(&endpoint, &mut messages, &policy, parse_action)
            .await
            .unwrap_err();
        match err {
            QueryError::RetryExhausted {
                tries,
                last_reply,
                last_correction,
            } => {
                assert_eq!(tries, 3);
                assert_eq!(last_reply.as_deref(), Some("bad three"));
                assert!(last_correction.unwrap().contains("Missing the key"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(endpoint.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sleeps_at_least_the_floor() {
        let endpoint = ScriptedEndpoint::new(vec![
            Err(EndpointError::RateLimited(
                "Rate limit reached, try again in 5s".into(),
            )),
            Ok(Message::assistant("<action>noop()</action>")),
        ]);
        let mut messages = vec![Message::user("go")];
        let policy = RetryPolicy::default().with_min_retry_wait(Duration::from_secs(60));

        let start = tokio::time::Instant::now();
        let action = retry_parse(&endpoint, &mut messages, &policy, parse_action)
            .await
            .unwrap();
        assert_eq!(action, "noop()");
        // The 5s hint is below the 60s floor.
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_honors_hint_above_the_floor() {
        let endpoint = ScriptedEndpoint::new(vec![
            Err(EndpointError::RateLimited(
                "Rate limit reached, try again in 90.5s".into(),
            )),
            Ok(Message::assistant("<action>noop()</action>")),
        ]);
        let mut messages = vec![Message::user("go")];
        let policy = RetryPolicy::default().with_min_retry_wait(Duration::from_secs(60));

        let start = tokio::time::Instant::now();
        retry_parse(&endpoint, &mut messages, &policy, parse_action)
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs_f64(90.5));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_sleeps_do_not_consume_parse_retries() {
        let endpoint = ScriptedEndpoint::new(vec![
            Err(EndpointError::RateLimited("try again in 1s".into())),
            Err(EndpointError::RateLimited("try again in 1s".into())),
            Err(EndpointError::RateLimited("try again in 1s".into())),
            Ok(Message::assistant("<action>noop()</action>")),
        ]);
        let mut messages = vec![Message::user("go")];
        let policy = RetryPolicy::default()
            .with_max_retries(1)
            .with_min_retry_wait(Duration::from_secs(1))
            .with_rate_limit_max_wait(Duration::from_secs(100));

        let action = retry_parse(&endpoint, &mut messages, &policy, parse_action)
            .await
            .unwrap();
        assert_eq!(action, "noop()");
        assert_eq!(endpoint.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_wait_budget_aborts_the_call() {
        let endpoint = ScriptedEndpoint::new(vec![
            Err(EndpointError::RateLimited("busy".into())),
            Err(EndpointError::RateLimited("busy".into())),
            Err(EndpointError::RateLimited("busy".into())),
        ]);
        let mut messages = vec![Message::user("go")];
        let policy = RetryPolicy::default()
            .with_min_retry_wait(Duration::from_secs(10))
            .with_rate_limit_max_wait(Duration::from_secs(25));

        let err = retry_parse(&endpoint, &mut messages, &policy, parse_action)
            .await
            .unwrap_err();
        match err {
            QueryError::RateLimitExceeded { waited, .. } => {
                assert_eq!(waited, Duration::from_secs(30));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(endpoint.calls(), 3);
    }

    #[tokio::test]
    async fn other_endpoint_errors_abort_immediately() {
        let endpoint = ScriptedEndpoint::new(vec![Err(EndpointError::Other(
            "connection reset".into(),
        ))]);
        let mut messages = vec![Message::user("go")];

        let err = retry_parse(&endpoint, &mut messages, &RetryPolicy::default(), parse_action)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Endpoint(m) if m.contains("connection reset")));
        assert_eq!(messages.len(), 1); // nothing appended
    }

    #[test]
    fn wait_hint_parsing() {
        let floor = Duration::from_secs(60);
        assert_eq!(
            extract_wait_time("Please try again in 120s.", floor),
            Duration::from_secs(120),
        );
        assert_eq!(
            extract_wait_time("Please try again in 2.5s.", floor),
            floor,
        );
        assert_eq!(extract_wait_time("no hint at all", floor), floor);
    }
}
