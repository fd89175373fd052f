mod error;
mod gemini;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use error::GenerationError;
pub use gemini::GeminiClient;

const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "API_KEY"];

/// A single non-streaming round trip to a text generation service.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError>;

    fn label(&self) -> &str;
}

/// Resolves the credential: configured value first, then the environment.
/// Blank values count as missing.
pub fn resolve_api_key(configured: Option<&str>) -> Option<String> {
    configured
        .map(str::to_string)
        .into_iter()
        .chain(API_KEY_VARS.iter().filter_map(|var| std::env::var(var).ok()))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_key_wins_and_is_trimmed() {
        assert_eq!(
            resolve_api_key(Some("  secret \n")),
            Some("secret".to_string())
        );
    }
}
