//! Rate-limit handling for the source platform.
//!
//! A throttled request comes back as HTTP 429 with a JSON body such as
//! `{"message": "Rate limit exceeded quota.", "details": "... 12 second(s)."}`.
//! The client waits the reported time plus a safety margin and resends.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Message the source platform uses for quota throttling.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded quota.";

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// How a 429 body was understood.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitReply {
    /// Recognized throttle reporting the remaining wait.
    Wait(Duration),
    /// Recognized throttle message with details in an unexpected form.
    UnexpectedDetails,
    /// Not a throttle message this client knows.
    Unknown,
}

pub fn parse_rate_limit(body: &str) -> RateLimitReply {
    let Ok(parsed) = serde_json::from_str::<RateLimitBody>(body) else {
        return RateLimitReply::Unknown;
    };
    if parsed.message.as_deref() != Some(RATE_LIMIT_MESSAGE) {
        return RateLimitReply::Unknown;
    }

    let details = parsed.details.unwrap_or_default();
    let words: Vec<&str> = details.split_whitespace().collect();
    match words.as_slice() {
        [.., count, "second(s)."] => match count.parse::<u64>() {
            Ok(seconds) => RateLimitReply::Wait(Duration::from_secs(seconds)),
            Err(_) => RateLimitReply::UnexpectedDetails,
        },
        _ => RateLimitReply::UnexpectedDetails,
    }
}

/// Blocking wait between a throttled response and its retry.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
