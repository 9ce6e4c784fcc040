use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{GenParams, GenerationResult};

pub mod anthropic;
pub mod fake;
pub mod openai;
pub mod retry;

/// Standardized failure classification across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    Auth,
    RateLimited,
    Timeout,
    ContentRejected,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Auth => "AUTH",
            FailureKind::RateLimited => "RATE_LIMITED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::ContentRejected => "CONTENT_REJECTED",
            FailureKind::Unknown => "UNKNOWN",
        }
    }
}

/// A classified provider failure.
///
/// `retryable` defaults from the kind (rate limits, timeouts, and 5xx-class
/// unknowns are transient) but can be pinned per error: a malformed-request
/// 400 is `Unknown` and not retryable.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}: {}", .kind.as_str(), .message)]
pub struct ProviderError {
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            FailureKind::RateLimited | FailureKind::Timeout | FailureKind::Unknown
        );
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn permanent(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            ..Self::new(kind, message)
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }
}

/// Uniform interface over model backends.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system: &str,
        params: &GenParams,
    ) -> Result<GenerationResult, ProviderError>;

    /// Stable identifier, `provider:model_name`.
    fn model_id(&self) -> String {
        format!("{}:{}", self.provider(), self.model_name())
    }

    fn model_name(&self) -> &str;

    fn provider(&self) -> &'static str;
}

/// Maps an HTTP status from a provider API to a classified failure.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let code = status.as_u16();
    let message = format!("HTTP {}: {}", code, truncate(body, 300));
    match code {
        401 | 403 => ProviderError::permanent(FailureKind::Auth, message),
        429 => ProviderError::new(FailureKind::RateLimited, message),
        400 => {
            let lower = body.to_ascii_lowercase();
            if ["credit", "balance", "billing", "quota"]
                .iter()
                .any(|kw| lower.contains(kw))
            {
                ProviderError::permanent(FailureKind::Auth, message)
            } else if ["safety", "content policy", "refus", "harm"]
                .iter()
                .any(|kw| lower.contains(kw))
            {
                ProviderError::permanent(FailureKind::ContentRejected, message)
            } else {
                ProviderError::permanent(FailureKind::Unknown, message)
            }
        }
        500..=599 => ProviderError::new(FailureKind::Unknown, message),
        _ => ProviderError::permanent(FailureKind::Unknown, message),
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(err.to_string())
    } else {
        ProviderError::new(FailureKind::Unknown, err.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_default_retryable() {
        assert!(ProviderError::new(FailureKind::RateLimited, "429").retryable);
        assert!(ProviderError::new(FailureKind::Timeout, "deadline").retryable);
        assert!(!ProviderError::new(FailureKind::Auth, "bad key").retryable);
        assert!(!ProviderError::new(FailureKind::ContentRejected, "blocked").retryable);
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "").kind,
            FailureKind::Auth
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "").kind,
            FailureKind::RateLimited
        );
        let e = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "oops");
        assert_eq!(e.kind, FailureKind::Unknown);
        assert!(e.retryable);
        let e = classify_status(StatusCode::BAD_REQUEST, "invalid max_tokens");
        assert!(!e.retryable);
        let e = classify_status(StatusCode::BAD_REQUEST, "credit balance is too low");
        assert_eq!(e.kind, FailureKind::Auth);
        let e = classify_status(StatusCode::BAD_REQUEST, "blocked by safety filters");
        assert_eq!(e.kind, FailureKind::ContentRejected);
    }
}
