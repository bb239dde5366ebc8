//! OpenAI-compatible chat-completion provider.
//!
//! Serves every fallback that speaks OpenAI's `/chat/completions` format with
//! bearer auth (Groq, OpenRouter, ...). Metadata requests set
//! `response_format: {"type": "json_object"}`.

use cinepost_core::types::CascadeRequest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::MetadataError;
use crate::prompt::{SYSTEM_INSTRUCTION, build_prompt};
use crate::provider::{GeneratedReply, MetadataProvider, ProviderKind, RawPayload};

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GROQ_DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

pub struct OpenAiCompatClient {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        name: impl Into<String>,
        api_key: String,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn groq(api_key: String) -> Self {
        Self::new("Groq", api_key, GROQ_BASE_URL, GROQ_DEFAULT_MODEL)
    }

    pub fn openrouter(api_key: String) -> Self {
        Self::new("OpenRouter", api_key, OPENROUTER_BASE_URL, OPENROUTER_DEFAULT_MODEL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_request(&self, request: &CascadeRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_INSTRUCTION.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(build_prompt(request)),
                },
            ],
            response_format: request
                .operation
                .wants_metadata()
                .then(|| ResponseFormat {
                    kind: "json_object".to_string(),
                }),
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Generative
    }

    async fn fetch(&self, request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(provider = %self.name, url = %url, model = %self.model, "chat completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(request))
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MetadataError::InvalidKey);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                status: status.as_u16(),
                detail: crate::extract_error_message(&body),
            });
        }

        let parsed: ChatResponse = resp.json().await?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(MetadataError::Empty);
        }

        Ok(Some(RawPayload::Generated(GeneratedReply {
            text,
            citations: Vec::new(),
        })))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatChoice {
    message: ChatMessage,
}
