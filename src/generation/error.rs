use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a [`TextGenerator`](super::TextGenerator).
///
/// Every variant renders as the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("API key not found. Set GEMINI_API_KEY (or API_KEY) or `api_key` in the config file.")]
    MissingCredential,
    #[error("Generation Failed: Gemini returned an empty response. This might be due to safety filters.")]
    EmptyResponse,
    #[error(
        "Generation Failed: QUOTA EXHAUSTED: the provider's rate limit was reached. \
         Please wait 60 seconds and try again, or check your Gemini API dashboard for limits."
    )]
    QuotaExhausted,
    #[error("Generation Failed: {0}")]
    Service(String),
    #[error("Generation Failed: no response within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Generation cancelled before a response arrived")]
    Cancelled,
}

impl GenerationError {
    /// Wraps a transport or service message, rewriting quota exhaustion into
    /// a wait-and-retry hint.
    pub fn service(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_quota_exhausted(&message) {
            Self::QuotaExhausted
        } else if message.trim().is_empty() {
            Self::Service("Unknown API error".to_string())
        } else {
            Self::Service(message)
        }
    }

    /// Errors that leave configuration untouched and can simply be retried.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MissingCredential)
    }
}

fn is_quota_exhausted(message: &str) -> bool {
    message.contains("RESOURCE_EXHAUSTED") || message.contains("429")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_become_retry_guidance() {
        let err = GenerationError::service(
            "429 Too Many Requests: {\"error\":{\"status\":\"RESOURCE_EXHAUSTED\"}}",
        );
        assert_eq!(err, GenerationError::QuotaExhausted);
        let rendered = err.to_string();
        assert!(rendered.starts_with("Generation Failed: QUOTA EXHAUSTED"));
        assert!(rendered.contains("wait 60 seconds and try again"));
    }

    #[test]
    fn other_messages_pass_through_with_prefix() {
        let err = GenerationError::service("model not found");
        assert_eq!(err.to_string(), "Generation Failed: model not found");
        assert_eq!(
            GenerationError::service("  ").to_string(),
            "Generation Failed: Unknown API error"
        );
    }

    #[test]
    fn timeout_reports_seconds() {
        let err = GenerationError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Generation Failed: no response within 90s");
        assert!(err.is_recoverable());
        assert!(!GenerationError::MissingCredential.is_recoverable());
    }
}
