//! OMDb (Open Movie Database) provider client.
//!
//! A single title endpoint returns everything: `GET /?apikey=…&t=…&plot=full`.
//! Misses are reported in-band with `"Response": "False"`.

use cinepost_core::types::{CascadeRequest, MovieMetadata, NOT_AVAILABLE};
use serde::Deserialize;
use tracing::debug;

use crate::MetadataError;
use crate::normalize::{CAST_LIMIT, RawMovieResponse, join_names, or_na, poster_or_empty};
use crate::provider::{MetadataProvider, ProviderKind, RawPayload, split_title_year};

pub const BASE_URL: &str = "https://www.omdbapi.com";

pub struct OmdbClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait::async_trait]
impl MetadataProvider for OmdbClient {
    fn name(&self) -> &str {
        "OMDb"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::StructuredLookup
    }

    async fn fetch(&self, request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError> {
        let (title, year) = split_title_year(&request.title);
        let year = year.map(|y| y.to_string());

        let mut params = vec![
            ("apikey", self.api_key.as_str()),
            ("t", title.as_str()),
            ("plot", "full"),
        ];
        if let Some(ref y) = year {
            params.push(("y", y.as_str()));
        }

        let url = format!("{}/", self.base_url);
        debug!(url = %url, title = %title, "OMDb request");

        let resp = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await?;

        let status = resp.status();
        let body = resp
            .text()
            .await?;

        // OMDb answers a bad key with 401 and an in-band error body
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MetadataError::InvalidKey);
        }
        if !status.is_success() {
            return Err(MetadataError::Status {
                status: status.as_u16(),
                detail: crate::extract_error_message(&body),
            });
        }

        let record: OmdbTitle = serde_json::from_str(&body)
            .map_err(|e| MetadataError::Malformed(format!("response body: {e}")))?;
        if record.found() {
            return Ok(Some(RawPayload::Omdb(record)));
        }

        let error = record.error.unwrap_or_default();
        let lowered = error.to_lowercase();
        if lowered.contains("not found") {
            Ok(None)
        } else if lowered.contains("invalid api key") {
            Err(MetadataError::InvalidKey)
        } else if error.is_empty() {
            Err(MetadataError::Malformed("failure reported without a reason".into()))
        } else {
            Err(MetadataError::Provider(error))
        }
    }
}

/// Body of the OMDb title endpoint. Every value is a string, with `"N/A"`
/// for gaps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct OmdbTitle {
    pub title: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub plot: Option<String>,
    pub language: Option<String>,
    pub released: Option<String>,
    pub poster: Option<String>,
    #[serde(rename = "imdbRating")]
    pub imdb_rating: Option<String>,
    pub response: Option<String>,
    pub error: Option<String>,
}

impl OmdbTitle {
    pub fn found(&self) -> bool {
        self.response
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("true"))
    }
}

impl RawMovieResponse for OmdbTitle {
    fn into_metadata(self) -> MovieMetadata {
        MovieMetadata {
            genre: or_na(self.genre.as_deref()),
            // already on IMDb's 0–10 string scale
            rating_score: or_na(self.imdb_rating.as_deref()),
            plot_summary: or_na(self.plot.as_deref()),
            director: or_na(self.director.as_deref()),
            cast_list: join_names(
                self.actors.as_deref().unwrap_or_default().split(','),
                Some(CAST_LIMIT),
            ),
            // OMDb exposes box office takings but no production budget
            budget: NOT_AVAILABLE.to_string(),
            release_date: or_na(self.released.as_deref()),
            language: or_na(self.language.as_deref()),
            poster_url: poster_or_empty(self.poster.as_deref()),
        }
    }
}
