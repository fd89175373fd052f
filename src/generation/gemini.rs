use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{GenerationError, TextGenerator};
use crate::config::GenerationConfig;

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, config: &GenerationConfig) -> Result<Self> {
        let trimmed_endpoint = config.endpoint.trim_end_matches('/');
        let endpoint = Url::parse(&format!(
            "{}/{}:generateContent",
            trimmed_endpoint, config.model
        ))
        .with_context(|| format!("Invalid Gemini endpoint: {}", config.endpoint))?;

        let client = Client::builder()
            .user_agent(concat!("pattern-sense/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            request_timeout: Duration::from_secs(config.request_timeout_secs.max(1)),
        })
    }

    /// Fails fast when no credential is configured.
    pub fn initialize(&self) -> Result<(), GenerationError> {
        if self.api_key.is_none() {
            return Err(GenerationError::MissingCredential);
        }

        info!(
            "✅ Gemini generation ready (model: {}, timeout: {:?})",
            self.model, self.request_timeout
        );
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_once(
        &self,
        api_key: &str,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<String, GenerationError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", api_key);

        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: prompt }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: system_instruction,
                }],
            },
            generation_config: GenerationSettings {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                GenerationError::service(format!("failed to reach Gemini: {}", err.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let raw = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            let message = describe_error(status, &raw);
            warn!("Gemini returned {}: {}", status, message);
            return Err(GenerationError::service(message));
        }

        let payload: GeminiResponse = response.json().await.map_err(|err| {
            GenerationError::service(format!("failed to parse Gemini response: {err}"))
        })?;

        if let Some(reason) = payload
            .prompt_feedback
            .as_ref()
            .and_then(|feedback| feedback.block_reason.as_deref())
        {
            warn!("Gemini blocked the prompt: {}", reason);
        }

        extract_text(payload).ok_or_else(|| {
            warn!("Gemini response carried no text");
            GenerationError::EmptyResponse
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<String, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential)?;

        info!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "🧠 Requesting generation from Gemini"
        );
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = tokio::time::timeout(
                self.request_timeout,
                self.send_once(api_key, prompt, system_instruction),
            ) => result.unwrap_or(Err(GenerationError::Timeout(self.request_timeout))),
        };

        match &outcome {
            Ok(text) => info!(
                "✅ Gemini responded with {} characters in {:.1}s",
                text.chars().count(),
                started.elapsed().as_secs_f32()
            ),
            Err(err) => debug!(
                "Gemini request ended after {:.1}s: {}",
                started.elapsed().as_secs_f32(),
                err
            ),
        }

        outcome
    }

    fn label(&self) -> &str {
        "Gemini"
    }
}

/// The convenience `text` field wins; otherwise the first part of the first
/// candidate. Blank values count as missing.
fn extract_text(response: GeminiResponse) -> Option<String> {
    let non_blank = |text: String| (!text.trim().is_empty()).then_some(text);

    response.text.and_then(non_blank).or_else(|| {
        response
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
            .and_then(non_blank)
    })
}

fn describe_error(status: reqwest::StatusCode, raw: &str) -> String {
    match serde_json::from_str::<GeminiErrorResponse>(raw)
        .ok()
        .and_then(|body| body.error)
    {
        Some(error) => {
            let label = error.status.unwrap_or_else(|| status.to_string());
            let code = error.code.unwrap_or_else(|| status.as_u16());
            match error.message {
                Some(message) => format!("{label} ({code}): {message}"),
                None => format!("{label} ({code})"),
            }
        }
        None => format!("{status}: {}", truncate(raw)),
    }
}

fn truncate(input: &str) -> String {
    const MAX_CHARS: usize = 512;
    if input.chars().count() <= MAX_CHARS {
        input.to_string()
    } else {
        let head: String = input.chars().take(MAX_CHARS).collect();
        format!("{head}…")
    }
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiContent<'a>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationSettings {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "promptFeedback", default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiErrorResponse {
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(payload: &str) -> GeminiResponse {
        serde_json::from_str(payload).expect("parse response")
    }

    #[test]
    fn prefers_convenience_text() {
        let response = parse(
            r#"{"text":"direct","candidates":[{"content":{"parts":[{"text":"nested"}]}}]}"#,
        );
        assert_eq!(extract_text(response), Some("direct".to_string()));
    }

    #[test]
    fn falls_back_to_first_candidate_part() {
        let response = parse(
            r#"{"text":"  ","candidates":[{"content":{"role":"model","parts":[{"text":"nested"},{"text":"second"}]}}]}"#,
        );
        assert_eq!(extract_text(response), Some("nested".to_string()));
    }

    #[test]
    fn blocked_response_has_no_text() {
        let response = parse(
            r#"{"candidates":[{"finishReason":"SAFETY"}],"promptFeedback":{"blockReason":"SAFETY"}}"#,
        );
        assert_eq!(extract_text(response), None);
        assert_eq!(extract_text(parse("{}")), None);
    }

    #[test]
    fn describes_structured_error_bodies() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        let message = describe_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(message, "RESOURCE_EXHAUSTED (429): Quota exceeded");
        assert_eq!(
            GenerationError::service(message),
            GenerationError::QuotaExhausted
        );
    }

    #[test]
    fn describes_unstructured_error_bodies() {
        let message = describe_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(message, "502 Bad Gateway: upstream down");
    }

    #[test]
    fn request_body_matches_generate_content_shape() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart { text: "hello" }],
            }],
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "be terse" }],
            },
            generation_config: GenerationSettings {
                temperature: 0.7,
                max_output_tokens: 8192,
            },
        };
        let value = serde_json::to_value(&body).expect("serialize");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "be terse");
        assert!(value["systemInstruction"].get("role").is_none());
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let config = GenerationConfig {
            endpoint: "http://127.0.0.1:9/v1beta/models".into(),
            ..GenerationConfig::default()
        };
        let client = GeminiClient::new(Some("   ".into()), &config).expect("client");
        assert_eq!(client.initialize(), Err(GenerationError::MissingCredential));

        let err = client
            .generate("prompt", "system", &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::MissingCredential);
    }
}
