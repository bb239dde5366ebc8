//! Ordered provider fallback.
//!
//! Resolution rules:
//! 1. Providers are tried one at a time in registration order.
//! 2. Movie databases are skipped for text operations.
//! 3. The first success ends the cascade; later providers are never called.
//! 4. Misses and errors are recorded per provider and only surface together,
//!    as one `AggregatedFailure`, once every applicable provider is exhausted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cinepost_core::types::{CascadeRequest, Citation, MovieMetadata, Operation};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::MetadataError;
use crate::config::{ProviderSettings, credential};
use crate::gemini::GeminiClient;
use crate::normalize::normalize;
use crate::omdb::OmdbClient;
use crate::openai_compat::OpenAiCompatClient;
use crate::provider::{MetadataProvider, ProviderDescriptor, ProviderKind, RawPayload};
use crate::tmdb::TmdbClient;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// What a successful resolution produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Suggestion {
    Metadata(MovieMetadata),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    /// Name of the provider that answered.
    pub provider: String,
    pub suggestion: Suggestion,
    /// Web sources when the answer was grounded; empty otherwise.
    pub citations: Vec<Citation>,
    /// "not configured" notes for providers that were skipped.
    pub advisories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The provider answered but had no match.
    NotFound,
    Error(String),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::Error(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttempt {
    pub provider: String,
    pub failure: AttemptFailure,
}

/// Every attempt of an exhausted cascade, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedFailure {
    pub operation: Operation,
    pub attempts: Vec<FailedAttempt>,
    pub advisories: Vec<String>,
}

impl fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not complete {}: all {} configured providers failed.",
            self.operation,
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "\n- {}: {}", attempt.provider, attempt.failure)?;
        }
        for advisory in &self.advisories {
            write!(f, "\nNote: {advisory}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CascadeError {
    /// No provider able to serve the operation has a credential.
    #[error("{}", not_configured_message(.operation, .advisories))]
    NotConfigured {
        operation: Operation,
        advisories: Vec<String>,
    },
    #[error("{0}")]
    Exhausted(AggregatedFailure),
}

fn not_configured_message(operation: &Operation, advisories: &[String]) -> String {
    let mut message =
        format!("No provider is configured for {operation}. Add an API key in settings.");
    for advisory in advisories {
        message.push_str("\nNote: ");
        message.push_str(advisory);
    }
    message
}

/// A provider that was left out because it has no credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unconfigured {
    pub name: String,
    pub kind: ProviderKind,
    /// Environment variable that would enable it.
    pub setting: String,
}

impl Unconfigured {
    pub fn new(name: &str, kind: ProviderKind, setting: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            setting: setting.to_string(),
        }
    }

    pub fn advisory(&self) -> String {
        format!("{} is not configured (set {}); skipped", self.name, self.setting)
    }
}

pub struct Cascade {
    providers: Vec<Arc<dyn MetadataProvider>>,
    unconfigured: Vec<Unconfigured>,
    attempt_timeout: Duration,
}

impl Cascade {
    /// Build a cascade over an explicit, already ordered provider list.
    pub fn new(providers: Vec<Arc<dyn MetadataProvider>>) -> Self {
        Self {
            providers,
            unconfigured: Vec::new(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_unconfigured(mut self, unconfigured: Vec<Unconfigured>) -> Self {
        self.unconfigured = unconfigured;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Build the standard cascade: TMDB, OMDb, Gemini, Groq, OpenRouter.
    ///
    /// Providers without a credential are left out and reported as advisories.
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let mut providers: Vec<Arc<dyn MetadataProvider>> = Vec::new();
        let mut unconfigured = Vec::new();
        let structured = ProviderKind::StructuredLookup;
        let generative = ProviderKind::Generative;

        match credential(&settings.tmdb_api_key) {
            Some(key) => providers.push(Arc::new(
                TmdbClient::new(key).with_base_url(&settings.tmdb_base_url),
            )),
            None => unconfigured.push(Unconfigured::new("TMDB", structured, "TMDB_API_KEY")),
        }

        match credential(&settings.omdb_api_key) {
            Some(key) => providers.push(Arc::new(
                OmdbClient::new(key).with_base_url(&settings.omdb_base_url),
            )),
            None => unconfigured.push(Unconfigured::new("OMDb", structured, "OMDB_API_KEY")),
        }

        match credential(&settings.gemini_api_key) {
            Some(key) => providers.push(Arc::new(
                GeminiClient::new(key)
                    .with_base_url(&settings.gemini_base_url)
                    .with_model(&settings.gemini_model)
                    .with_thinking_budget(settings.gemini_thinking_budget)
                    .with_grounding(settings.gemini_grounding),
            )),
            None => unconfigured.push(Unconfigured::new("Gemini", generative, "GEMINI_API_KEY")),
        }

        match credential(&settings.groq_api_key) {
            Some(key) => providers.push(Arc::new(
                OpenAiCompatClient::groq(key)
                    .with_base_url(&settings.groq_base_url)
                    .with_model(&settings.groq_model),
            )),
            None => unconfigured.push(Unconfigured::new("Groq", generative, "GROQ_API_KEY")),
        }

        match credential(&settings.openrouter_api_key) {
            Some(key) => providers.push(Arc::new(
                OpenAiCompatClient::openrouter(key)
                    .with_base_url(&settings.openrouter_base_url)
                    .with_model(&settings.openrouter_model),
            )),
            None => unconfigured.push(Unconfigured::new(
                "OpenRouter",
                generative,
                "OPENROUTER_API_KEY",
            )),
        }

        Self::new(providers)
            .with_unconfigured(unconfigured)
            .with_attempt_timeout(settings.attempt_timeout())
    }

    /// Configured providers in attempt order.
    pub fn providers(&self) -> Vec<ProviderDescriptor> {
        self.providers.iter().map(|p| p.descriptor()).collect()
    }

    pub fn unconfigured(&self) -> &[Unconfigured] {
        &self.unconfigured
    }

    /// Resolve one request by walking the applicable providers in order.
    pub async fn resolve(&self, request: &CascadeRequest) -> Result<Resolution, CascadeError> {
        let advisories: Vec<String> = self
            .unconfigured
            .iter()
            .filter(|u| u.kind.serves(request))
            .map(Unconfigured::advisory)
            .collect();

        let candidates: Vec<&Arc<dyn MetadataProvider>> = self
            .providers
            .iter()
            .filter(|p| p.kind().serves(request))
            .collect();

        if candidates.is_empty() {
            warn!(operation = %request.operation, "no provider configured");
            return Err(CascadeError::NotConfigured {
                operation: request.operation,
                advisories,
            });
        }

        let mut attempts = Vec::with_capacity(candidates.len());
        for provider in candidates {
            debug!(provider = provider.name(), operation = %request.operation, "attempting provider");
            match self.attempt(&**provider, request).await {
                Ok((suggestion, citations)) => {
                    info!(
                        provider = provider.name(),
                        operation = %request.operation,
                        failed_before = attempts.len(),
                        "resolved"
                    );
                    return Ok(Resolution {
                        provider: provider.name().to_string(),
                        suggestion,
                        citations,
                        advisories,
                    });
                }
                Err(failure) => {
                    warn!(provider = provider.name(), reason = %failure, "provider attempt failed");
                    attempts.push(FailedAttempt {
                        provider: provider.name().to_string(),
                        failure,
                    });
                }
            }
        }

        Err(CascadeError::Exhausted(AggregatedFailure {
            operation: request.operation,
            attempts,
            advisories,
        }))
    }

    async fn attempt(
        &self,
        provider: &dyn MetadataProvider,
        request: &CascadeRequest,
    ) -> Result<(Suggestion, Vec<Citation>), AttemptFailure> {
        let outcome = match tokio::time::timeout(self.attempt_timeout, provider.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(MetadataError::Timeout(self.attempt_timeout)),
        };

        match outcome {
            Ok(Some(payload)) => into_suggestion(request.operation, payload)
                .map_err(|e| AttemptFailure::Error(e.to_string())),
            Ok(None) | Err(MetadataError::NotFound) => Err(AttemptFailure::NotFound),
            Err(e) => Err(AttemptFailure::Error(e.to_string())),
        }
    }
}

fn into_suggestion(
    operation: Operation,
    payload: RawPayload,
) -> Result<(Suggestion, Vec<Citation>), MetadataError> {
    if operation.wants_metadata() {
        let citations = match &payload {
            RawPayload::Generated(reply) => reply.citations.clone(),
            _ => Vec::new(),
        };
        return Ok((Suggestion::Metadata(normalize(payload)?), citations));
    }

    match payload {
        RawPayload::Generated(reply) => {
            let text = reply.text.trim();
            if text.is_empty() {
                return Err(MetadataError::Empty);
            }
            Ok((Suggestion::Text(text.to_string()), reply.citations))
        }
        RawPayload::Tmdb(_) | RawPayload::Omdb(_) => Err(MetadataError::Malformed(
            "movie database record returned for a text operation".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::omdb::OmdbTitle;
    use crate::provider::GeneratedReply;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Behavior {
        Reply(&'static str),
        Record,
        NotFound,
        InvalidKey,
        Status(u16),
        Hang,
    }

    struct FakeProvider {
        name: &'static str,
        kind: ProviderKind,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl FakeProvider {
        fn new(
            name: &'static str,
            kind: ProviderKind,
            behavior: Behavior,
        ) -> (Arc<dyn MetadataProvider>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let provider: Arc<dyn MetadataProvider> = Arc::new(Self {
                name,
                kind,
                behavior,
                calls: calls.clone(),
            });
            (provider, calls)
        }
    }

    #[async_trait::async_trait]
    impl MetadataProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn fetch(&self, _request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior.clone() {
                Behavior::Reply(text) => Ok(Some(RawPayload::Generated(GeneratedReply {
                    text: text.to_string(),
                    citations: vec![Citation {
                        title: "source".into(),
                        uri: "https://example.com/source".into(),
                    }],
                }))),
                Behavior::Record => Ok(Some(RawPayload::Omdb(OmdbTitle {
                    genre: Some("Crime, Drama".into()),
                    director: Some("Michael Mann".into()),
                    response: Some("True".into()),
                    ..Default::default()
                }))),
                Behavior::NotFound => Ok(None),
                Behavior::InvalidKey => Err(MetadataError::InvalidKey),
                Behavior::Status(status) => Err(MetadataError::Status {
                    status,
                    detail: None,
                }),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(None)
                }
            }
        }
    }

    const STRUCTURED: ProviderKind = ProviderKind::StructuredLookup;
    const GENERATIVE: ProviderKind = ProviderKind::Generative;
    const GOOD_JSON: &str = r#"{"genre": "Crime", "director": "Michael Mann", "posterUrl": ""}"#;

    #[tokio::test]
    async fn first_success_stops_the_cascade() {
        let (a, a_calls) = FakeProvider::new("alpha", STRUCTURED, Behavior::Status(500));
        let (b, b_calls) = FakeProvider::new("beta", STRUCTURED, Behavior::Record);
        let (c, c_calls) = FakeProvider::new("gamma", GENERATIVE, Behavior::Reply(GOOD_JSON));
        let cascade = Cascade::new(vec![a, b, c]);

        let resolution = cascade
            .resolve(&CascadeRequest::fetch_metadata("Heat (1995)"))
            .await
            .unwrap();

        assert_eq!(resolution.provider, "beta");
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
        let Suggestion::Metadata(meta) = resolution.suggestion else {
            panic!("expected metadata");
        };
        assert_eq!(meta.director, "Michael Mann");
        assert_eq!(meta.budget, "N/A");
        assert!(resolution.citations.is_empty());
    }

    #[tokio::test]
    async fn exhaustion_lists_every_provider_once_in_order() {
        let (a, _) = FakeProvider::new("alpha", STRUCTURED, Behavior::NotFound);
        let (b, _) = FakeProvider::new("beta", STRUCTURED, Behavior::InvalidKey);
        let (c, _) = FakeProvider::new("gamma", GENERATIVE, Behavior::Reply("I am not sure."));
        let (d, _) = FakeProvider::new("delta", GENERATIVE, Behavior::Status(429));
        let cascade = Cascade::new(vec![a, b, c, d]);

        let err = cascade
            .resolve(&CascadeRequest::fetch_metadata("Heat"))
            .await
            .unwrap_err();

        let CascadeError::Exhausted(ref failure) = err else {
            panic!("expected exhausted cascade");
        };
        assert_eq!(failure.attempts.len(), 4);
        assert_eq!(failure.attempts[0].failure, AttemptFailure::NotFound);
        assert!(matches!(failure.attempts[1].failure, AttemptFailure::Error(_)));

        let message = err.to_string();
        let lines: Vec<&str> = message.lines().collect();
        assert!(lines[0].contains("all 4 configured providers failed"));
        assert_eq!(lines[1], "- alpha: not found");
        assert_eq!(lines[2], "- beta: invalid API key");
        assert!(lines[3].starts_with("- gamma: malformed response"));
        assert_eq!(lines[4], "- delta: provider returned status 429");
        for name in ["alpha", "beta", "gamma", "delta"] {
            assert_eq!(message.matches(name).count(), 1, "{name} should appear once");
        }
    }

    #[tokio::test]
    async fn text_operations_skip_movie_databases() {
        let (a, a_calls) = FakeProvider::new("alpha", STRUCTURED, Behavior::Record);
        let (b, b_calls) = FakeProvider::new("beta", GENERATIVE, Behavior::Reply("  Better prose.  "));
        let cascade = Cascade::new(vec![a, b]);

        let resolution = cascade
            .resolve(&CascadeRequest::new(Operation::FixGrammar, "", "worse prose"))
            .await
            .unwrap();

        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolution.suggestion, Suggestion::Text("Better prose.".into()));
        assert_eq!(resolution.citations.len(), 1);
    }

    #[tokio::test]
    async fn hung_provider_times_out_and_cascade_continues() {
        let (a, _) = FakeProvider::new("alpha", GENERATIVE, Behavior::Hang);
        let (b, b_calls) = FakeProvider::new("beta", GENERATIVE, Behavior::Reply("Five titles"));
        let cascade = Cascade::new(vec![a, b]).with_attempt_timeout(Duration::from_millis(50));

        let resolution = cascade
            .resolve(&CascadeRequest::new(Operation::OptimizeTitle, "", "post"))
            .await
            .unwrap();
        assert_eq!(resolution.provider, "beta");
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nothing_configured_reads_differently_from_all_failed() {
        let cascade = Cascade::from_settings(&ProviderSettings::default());
        assert!(cascade.providers().is_empty());

        let err = cascade
            .resolve(&CascadeRequest::fetch_metadata("Heat"))
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::NotConfigured { .. }));
        let message = err.to_string();
        assert!(message.starts_with("No provider is configured for fetch_metadata"));
        assert!(!message.contains("failed"));
        assert!(message.contains("GEMINI_API_KEY"));

        let (a, _) = FakeProvider::new("alpha", GENERATIVE, Behavior::NotFound);
        let exhausted = Cascade::new(vec![a])
            .resolve(&CascadeRequest::fetch_metadata("Heat"))
            .await
            .unwrap_err()
            .to_string();
        assert_ne!(message.lines().next(), exhausted.lines().next());
    }

    #[tokio::test]
    async fn text_operation_with_only_databases_is_not_configured() {
        let settings = ProviderSettings {
            tmdb_api_key: Some("tmdb".into()),
            ..ProviderSettings::default()
        };
        let err = Cascade::from_settings(&settings)
            .resolve(&CascadeRequest::new(Operation::Summarize, "Heat", "post"))
            .await
            .unwrap_err();

        let CascadeError::NotConfigured { advisories, .. } = err else {
            panic!("expected not configured");
        };
        // movie databases are irrelevant to text operations
        assert_eq!(advisories.len(), 3);
        assert!(advisories.iter().all(|a| !a.contains("TMDB") && !a.contains("OMDb")));
    }

    #[test]
    fn settings_register_providers_in_priority_order() {
        let settings = ProviderSettings {
            tmdb_api_key: Some("a".into()),
            omdb_api_key: Some("b".into()),
            gemini_api_key: Some("c".into()),
            groq_api_key: Some("d".into()),
            openrouter_api_key: Some("e".into()),
            ..ProviderSettings::default()
        };
        let names: Vec<String> = Cascade::from_settings(&settings)
            .providers()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["TMDB", "OMDb", "Gemini", "Groq", "OpenRouter"]);
    }

    #[test]
    fn grounding_setting_reaches_gemini() {
        let settings = ProviderSettings {
            gemini_api_key: Some("key".into()),
            gemini_grounding: false,
            ..ProviderSettings::default()
        };
        let providers = Cascade::from_settings(&settings).providers();
        assert_eq!(providers[0].name, "Gemini");
        assert!(!providers[0].supports_grounding);

        let grounded = ProviderSettings {
            gemini_grounding: true,
            ..settings
        };
        assert!(Cascade::from_settings(&grounded).providers()[0].supports_grounding);
    }

    #[tokio::test]
    async fn undecodable_bodies_name_each_provider_once() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/omdb/");
                then.status(200).body("not json");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/groq/chat/completions");
                then.status(200)
                    .header("content-type", "text/html")
                    .body("<html>oops</html>");
            })
            .await;

        let settings = ProviderSettings {
            omdb_api_key: Some("omdb".into()),
            groq_api_key: Some("groq".into()),
            omdb_base_url: server.url("/omdb"),
            groq_base_url: server.url("/groq"),
            ..ProviderSettings::default()
        };
        let err = Cascade::from_settings(&settings)
            .resolve(&CascadeRequest::fetch_metadata("Heat"))
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("- OMDb: malformed response"), "{message}");
        assert!(message.contains("- Groq: malformed response"), "{message}");
        for name in ["OMDb", "Groq"] {
            assert_eq!(message.matches(name).count(), 1, "{message}");
        }
        assert!(!message.contains("omdb"), "key or url leaked: {message}");
    }

    #[tokio::test]
    async fn tmdb_miss_then_grounded_gemini_success() {
        let server = MockServer::start_async().await;
        let search = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/tmdb/search/multi")
                    .query_param("query", "Inception");
                then.status(200)
                    .json_body(json!({ "page": 1, "results": [], "total_results": 0 }));
            })
            .await;
        let generate = server
            .mock_async(|when, then| {
                when.method(POST).path("/gemini/models/gemini-test:generateContent");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "```json\n{\"genre\": \"Action, Sci-Fi\", \"ratingScore\": \"8.8\", \"plotSummary\": \"Dream heists.\", \"director\": \"Christopher Nolan\", \"castList\": \"Leonardo DiCaprio, Elliot Page\", \"budget\": \"$160 Million\", \"releaseDate\": \"2010-07-16\", \"language\": \"English\", \"posterUrl\": \"\"}\n```" }] },
                        "finishReason": "STOP",
                        "groundingMetadata": {
                            "groundingChunks": [{ "web": { "uri": "https://www.imdb.com/title/tt1375666/", "title": "imdb.com" } }]
                        }
                    }]
                }));
            })
            .await;
        let groq = server
            .mock_async(|when, then| {
                when.method(POST).path("/groq/chat/completions");
                then.status(500);
            })
            .await;

        let settings = ProviderSettings {
            tmdb_api_key: Some("tmdb".into()),
            gemini_api_key: Some("gemini".into()),
            groq_api_key: Some("groq".into()),
            tmdb_base_url: server.url("/tmdb"),
            gemini_base_url: server.url("/gemini"),
            groq_base_url: server.url("/groq"),
            gemini_model: "gemini-test".into(),
            ..ProviderSettings::default()
        };
        let resolution = Cascade::from_settings(&settings)
            .resolve(&CascadeRequest::fetch_metadata("Inception (2010)"))
            .await
            .unwrap();

        search.assert_async().await;
        generate.assert_async().await;
        assert_eq!(groq.hits_async().await, 0);

        assert_eq!(resolution.provider, "Gemini");
        assert_eq!(
            resolution.suggestion,
            Suggestion::Metadata(MovieMetadata {
                genre: "Action, Sci-Fi".into(),
                rating_score: "8.8".into(),
                plot_summary: "Dream heists.".into(),
                director: "Christopher Nolan".into(),
                cast_list: "Leonardo DiCaprio, Elliot Page".into(),
                budget: "$160 Million".into(),
                release_date: "2010-07-16".into(),
                language: "English".into(),
                poster_url: String::new(),
            })
        );
        assert_eq!(resolution.citations[0].uri, "https://www.imdb.com/title/tt1375666/");
        assert!(resolution.advisories.iter().any(|a| a.contains("OMDb")));
    }
}
