use serde::{Deserialize, Serialize};

/// Sentinel used for any metadata field a provider cannot supply.
pub const NOT_AVAILABLE: &str = "N/A";

/// Assist operation requested by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    FetchMetadata,
    OptimizeTitle,
    Summarize,
    Expand,
    FixGrammar,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchMetadata => "fetch_metadata",
            Self::OptimizeTitle => "optimize_title",
            Self::Summarize => "summarize",
            Self::Expand => "expand",
            Self::FixGrammar => "fix_grammar",
        }
    }

    /// Whether this operation produces a `MovieMetadata` record rather than free text.
    ///
    /// Only these operations can be answered by the structured movie databases.
    pub fn wants_metadata(self) -> bool {
        matches!(self, Self::FetchMetadata)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resolution request, built fresh per editor action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeRequest {
    pub operation: Operation,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl CascadeRequest {
    pub fn new(operation: Operation, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            operation,
            title: title.into(),
            content: content.into(),
        }
    }

    pub fn fetch_metadata(title: impl Into<String>) -> Self {
        Self::new(Operation::FetchMetadata, title, String::new())
    }
}

/// Canonical movie/series metadata handed to the post editor.
///
/// Every field is always populated: `"N/A"` when unknown, except `poster_url`
/// which is empty when there is no image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieMetadata {
    pub genre: String,
    pub rating_score: String,
    pub plot_summary: String,
    pub director: String,
    pub cast_list: String,
    pub budget: String,
    pub release_date: String,
    pub language: String,
    pub poster_url: String,
}

impl Default for MovieMetadata {
    fn default() -> Self {
        Self {
            genre: NOT_AVAILABLE.to_string(),
            rating_score: NOT_AVAILABLE.to_string(),
            plot_summary: NOT_AVAILABLE.to_string(),
            director: NOT_AVAILABLE.to_string(),
            cast_list: NOT_AVAILABLE.to_string(),
            budget: NOT_AVAILABLE.to_string(),
            release_date: NOT_AVAILABLE.to_string(),
            language: NOT_AVAILABLE.to_string(),
            poster_url: String::new(),
        }
    }
}

/// A web source backing a grounded answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}
