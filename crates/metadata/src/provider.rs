use std::sync::LazyLock;

use cinepost_core::types::{CascadeRequest, Citation};
use regex::Regex;
use serde::Serialize;

use crate::MetadataError;
use crate::omdb::OmdbTitle;
use crate::tmdb::TmdbDetails;

/// How a provider is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Movie database queried by title; can only answer metadata requests.
    StructuredLookup,
    /// Generative model driven by a prompt; can answer any operation.
    Generative,
}

impl ProviderKind {
    /// Whether providers of this kind can serve the given request.
    pub fn serves(self, request: &CascadeRequest) -> bool {
        match self {
            Self::StructuredLookup => request.operation.wants_metadata(),
            Self::Generative => true,
        }
    }
}

/// Public description of a configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub supports_grounding: bool,
}

/// Provider-shaped result of one successful call, before normalization.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Tmdb(TmdbDetails),
    Omdb(OmdbTitle),
    Generated(GeneratedReply),
}

/// Text produced by a generative provider plus any grounding sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// An external data source the cascade can query.
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn supports_grounding(&self) -> bool {
        false
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            name: self.name().to_string(),
            kind: self.kind(),
            supports_grounding: self.supports_grounding(),
        }
    }

    /// Run one request against the provider.
    ///
    /// `Ok(None)` means the provider answered but had no match.
    async fn fetch(&self, request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError>;
}

// "Title (2010)" with optional surrounding whitespace
static RE_YEAR_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\((\d{4})\)\s*$").expect("valid year regex"));

/// Split a trailing parenthesized year off a title.
///
/// `"Inception (2010)"` becomes `("Inception", Some(2010))`; titles without a
/// suffix are only trimmed.
pub fn split_title_year(title: &str) -> (String, Option<u16>) {
    let trimmed = title.trim();
    match RE_YEAR_SUFFIX.captures(trimmed) {
        Some(caps) if !caps[1].trim().is_empty() => {
            (caps[1].trim().to_string(), caps[2].parse().ok())
        }
        _ => (trimmed.to_string(), None),
    }
}
