pub mod cascade;
pub mod config;
pub mod gemini;
pub mod normalize;
pub mod omdb;
pub mod openai_compat;
pub mod prompt;
pub mod provider;
pub mod tmdb;

use std::time::Duration;

use thiserror::Error;

pub use cascade::{AggregatedFailure, Cascade, CascadeError, Resolution, Suggestion};
pub use config::ProviderSettings;
pub use provider::{MetadataProvider, ProviderDescriptor, ProviderKind, RawPayload};

/// Failure of a single provider attempt. Never surfaced individually to the
/// caller; the cascade folds these into an `AggregatedFailure`.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("invalid API key")]
    InvalidKey,
    #[error("provider returned status {status}{}", detail_suffix(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Provider(String),
    #[error("empty response")]
    Empty,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("not found")]
    NotFound,
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(" ({d})"))
        .unwrap_or_default()
}

impl From<reqwest::Error> for MetadataError {
    fn from(e: reqwest::Error) -> Self {
        // request URLs can carry the API key in the query string
        let e = e.without_url();
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Pull a human-readable message out of a provider error body.
///
/// Understands the shapes the supported providers use: `{"error": {"message"}}`,
/// `{"error": "..."}`, TMDB's `status_message` and OMDb's `Error`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let message = value["error"]["message"]
        .as_str()
        .or_else(|| value["error"].as_str())
        .or_else(|| value["status_message"].as_str())
        .or_else(|| value["Error"].as_str())
        .or_else(|| value["message"].as_str())?;
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_includes_detail_when_present() {
        let err = MetadataError::Status {
            status: 500,
            detail: Some("upstream exploded".into()),
        };
        assert_eq!(err.to_string(), "provider returned status 500 (upstream exploded)");

        let err = MetadataError::Status {
            status: 502,
            detail: None,
        };
        assert_eq!(err.to_string(), "provider returned status 502");
    }

    #[test]
    fn extracts_messages_from_known_error_shapes() {
        assert_eq!(
            extract_error_message(r#"{"error":{"message":"quota exceeded","code":429}}"#).as_deref(),
            Some("quota exceeded")
        );
        assert_eq!(
            extract_error_message(r#"{"status_code":34,"status_message":"The resource could not be found."}"#)
                .as_deref(),
            Some("The resource could not be found.")
        );
        assert_eq!(
            extract_error_message(r#"{"Response":"False","Error":"Too many results."}"#).as_deref(),
            Some("Too many results.")
        );
        assert_eq!(extract_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn timeout_message_names_the_limit() {
        let err = MetadataError::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "timed out after 15s");
    }
}
