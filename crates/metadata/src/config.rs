use std::time::Duration;

use serde::Deserialize;

use crate::{gemini, omdb, openai_compat, tmdb};

/// Credentials and endpoints for every provider the cascade can use.
///
/// Owned by the caller and handed to `Cascade::from_settings`; the cascade
/// never reads the environment itself. A `None` key means the provider is not
/// configured and will be skipped.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub tmdb_api_key: Option<String>,
    pub omdb_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,

    pub tmdb_base_url: String,
    pub omdb_base_url: String,
    pub gemini_base_url: String,
    pub groq_base_url: String,
    pub openrouter_base_url: String,

    pub gemini_model: String,
    pub gemini_thinking_budget: Option<u32>,
    /// Attach Google Search grounding to Gemini metadata lookups.
    pub gemini_grounding: bool,
    pub groq_model: String,
    pub openrouter_model: String,

    pub attempt_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            omdb_api_key: None,
            gemini_api_key: None,
            groq_api_key: None,
            openrouter_api_key: None,
            tmdb_base_url: tmdb::BASE_URL.to_string(),
            omdb_base_url: omdb::BASE_URL.to_string(),
            gemini_base_url: gemini::BASE_URL.to_string(),
            groq_base_url: openai_compat::GROQ_BASE_URL.to_string(),
            openrouter_base_url: openai_compat::OPENROUTER_BASE_URL.to_string(),
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
            gemini_thinking_budget: Some(2000),
            gemini_grounding: true,
            groq_model: openai_compat::GROQ_DEFAULT_MODEL.to_string(),
            openrouter_model: openai_compat::OPENROUTER_DEFAULT_MODEL.to_string(),
            attempt_timeout_secs: 15,
        }
    }
}

impl ProviderSettings {
    /// Load settings from process environment variables.
    ///
    /// Only the binary should call this; library code takes settings as a value.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut settings = Self {
            tmdb_api_key: get("TMDB_API_KEY"),
            omdb_api_key: get("OMDB_API_KEY"),
            gemini_api_key: get("GEMINI_API_KEY"),
            groq_api_key: get("GROQ_API_KEY"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            ..Self::default()
        };

        if let Some(model) = get("CINEPOST_GEMINI_MODEL") {
            settings.gemini_model = model;
        }
        if let Some(model) = get("CINEPOST_GROQ_MODEL") {
            settings.groq_model = model;
        }
        if let Some(model) = get("CINEPOST_OPENROUTER_MODEL") {
            settings.openrouter_model = model;
        }
        if let Some(budget) = get("CINEPOST_GEMINI_THINKING_BUDGET") {
            // 0 disables the thinking config entirely
            settings.gemini_thinking_budget = budget.parse().ok().filter(|b| *b > 0);
        }
        if let Some(flag) = get("CINEPOST_GEMINI_GROUNDING") {
            settings.gemini_grounding = !matches!(
                flag.to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        if let Some(secs) = get("CINEPOST_ATTEMPT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            settings.attempt_timeout_secs = secs;
        }

        settings
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs.max(1))
    }
}

/// Treat blank strings as missing credentials.
pub(crate) fn credential(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
