//! Gemini provider client.
//!
//! Calls `POST {base_url}/models/{model}:generateContent` with the key in the
//! `x-goog-api-key` header. Metadata requests enable the Google Search tool,
//! which rules out `responseMimeType: application/json`; those replies are
//! parsed as free text downstream.

use cinepost_core::types::{CascadeRequest, Citation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MetadataError;
use crate::prompt::build_prompt;
use crate::provider::{GeneratedReply, MetadataProvider, ProviderKind, RawPayload};

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    thinking_budget: Option<u32>,
    grounding: bool,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            thinking_budget: None,
            grounding: true,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_thinking_budget(mut self, budget: Option<u32>) -> Self {
        self.thinking_budget = budget;
        self
    }

    pub fn with_grounding(mut self, grounding: bool) -> Self {
        self.grounding = grounding;
        self
    }

    fn build_request(&self, request: &CascadeRequest) -> GeminiRequest {
        let wants_json = request.operation.wants_metadata();
        // search grounding only helps factual lookups
        let grounded = self.grounding && wants_json;

        let response_mime_type = (wants_json && !grounded).then(|| "application/json".to_string());
        let thinking_config = self.thinking_budget.map(|thinking_budget| ThinkingConfig {
            thinking_budget,
        });
        let generation_config = (response_mime_type.is_some() || thinking_config.is_some())
            .then_some(GenerationConfig {
                response_mime_type,
                thinking_config,
            });

        GeminiRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(build_prompt(request)),
                }],
            }],
            tools: grounded.then(|| vec![serde_json::json!({ "google_search": {} })]),
            generation_config,
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Generative
    }

    fn supports_grounding(&self) -> bool {
        self.grounding
    }

    async fn fetch(&self, request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.build_request(request);
        debug!(url = %url, grounded = body.tools.is_some(), "Gemini request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &text));
        }

        let parsed: GeminiResponse = resp.json().await?;
        parsed.into_reply().map(|reply| Some(RawPayload::Generated(reply)))
    }
}

/// Gemini reports a bad key as 400 `INVALID_ARGUMENT` with an
/// `API_KEY_INVALID` reason, not as 401.
fn classify_error(status: u16, body: &str) -> MetadataError {
    let detail = crate::extract_error_message(body);
    let key_rejected = body.contains("API_KEY_INVALID")
        || detail
            .as_deref()
            .is_some_and(|d| d.contains("API key not valid"));

    if status == 401 || status == 403 || key_rejected {
        MetadataError::InvalidKey
    } else {
        MetadataError::Status { status, detail }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GroundingMetadata {
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WebSource {
    uri: Option<String>,
    title: Option<String>,
}

impl GeminiResponse {
    fn into_reply(self) -> Result<GeneratedReply, MetadataError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(MetadataError::Provider(format!("prompt blocked: {reason}")));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(MetadataError::Empty);
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return match candidate.finish_reason.as_deref() {
                Some(reason) if reason != "STOP" => Err(MetadataError::Provider(format!(
                    "generation stopped: {reason}"
                ))),
                _ => Err(MetadataError::Empty),
            };
        }

        let mut citations: Vec<Citation> = Vec::new();
        let chunks = candidate
            .grounding_metadata
            .map(|g| g.grounding_chunks)
            .unwrap_or_default();
        for web in chunks.into_iter().filter_map(|c| c.web) {
            let Some(uri) = web.uri.filter(|u| !u.is_empty()) else {
                continue;
            };
            if citations.iter().any(|c| c.uri == uri) {
                continue;
            }
            citations.push(Citation {
                title: web.title.unwrap_or_else(|| uri.clone()),
                uri,
            });
        }

        Ok(GeneratedReply { text, citations })
    }
}
