//! TMDB (The Movie Database) provider client.
//!
//! Uses TMDB API v3: https://developer.themoviedb.org/docs

use cinepost_core::types::{CascadeRequest, MovieMetadata};
use serde::Deserialize;
use tracing::debug;

use crate::MetadataError;
use crate::normalize::{
    CAST_LIMIT, RawMovieResponse, format_amount, join_names, or_na, poster_or_empty,
};
use crate::provider::{MetadataProvider, ProviderKind, RawPayload, split_title_year};

pub const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

pub struct TmdbClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TmdbClient {
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

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, MetadataError> {
        let mut all_params = vec![("api_key", self.api_key.as_str())];
        all_params.extend_from_slice(params);

        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "TMDB request");

        let resp = self
            .client
            .get(&url)
            .query(&all_params)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MetadataError::InvalidKey);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MetadataError::Status {
                status: status.as_u16(),
                detail: crate::extract_error_message(&body),
            });
        }

        Ok(resp.json().await?)
    }

    /// Run a multi-type search and pick the candidate to fetch details for.
    async fn search(&self, query: &str) -> Result<Option<Candidate>, MetadataError> {
        let data = self
            .get_json("/search/multi", &[("query", query), ("include_adult", "false")])
            .await?;
        let results = data["results"].as_array().cloned().unwrap_or_default();
        Ok(pick_candidate(&results))
    }

    async fn details(&self, candidate: &Candidate) -> Result<TmdbDetails, MetadataError> {
        let path = format!("/{}/{}", candidate.media_type.as_str(), candidate.id);
        let data = self
            .get_json(&path, &[("append_to_response", "credits")])
            .await?;

        let mut details: TmdbDetails = serde_json::from_value(data)
            .map_err(|e| MetadataError::Malformed(format!("details: {e}")))?;
        details.media_type = candidate.media_type;
        Ok(details)
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbClient {
    fn name(&self) -> &str {
        "TMDB"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::StructuredLookup
    }

    async fn fetch(&self, request: &CascadeRequest) -> Result<Option<RawPayload>, MetadataError> {
        let (query, _year) = split_title_year(&request.title);
        let Some(candidate) = self.search(&query).await? else {
            debug!(query = %query, "TMDB search returned no title candidates");
            return Ok(None);
        };

        let details = self.details(&candidate).await?;
        Ok(Some(RawPayload::Tmdb(details)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    id: u64,
    media_type: MediaType,
}

/// First `movie` result wins; otherwise the first `tv` result.
///
/// `person` results are never candidates. Results from typed searches carry no
/// `media_type` and are treated as movies.
fn pick_candidate(results: &[serde_json::Value]) -> Option<Candidate> {
    let candidates: Vec<Candidate> = results
        .iter()
        .filter_map(|r| {
            let id = r["id"].as_u64()?;
            let media_type = match r["media_type"].as_str() {
                None | Some("movie") => MediaType::Movie,
                Some("tv") => MediaType::Tv,
                Some(_) => return None,
            };
            Some(Candidate { id, media_type })
        })
        .collect();

    candidates
        .iter()
        .find(|c| c.media_type == MediaType::Movie)
        .or_else(|| candidates.first())
        .cloned()
}

/// Movie or TV details with `append_to_response=credits`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TmdbDetails {
    #[serde(skip)]
    pub media_type: MediaType,
    pub genres: Vec<Named>,
    pub vote_average: Option<f64>,
    pub overview: Option<String>,
    pub budget: Option<u64>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub spoken_languages: Vec<SpokenLanguage>,
    pub original_language: Option<String>,
    pub poster_path: Option<String>,
    pub created_by: Vec<Named>,
    pub credits: Credits,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpokenLanguage {
    pub english_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credits {
    pub cast: Vec<CreditEntry>,
    pub crew: Vec<CreditEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreditEntry {
    pub name: String,
    pub job: Option<String>,
}

impl RawMovieResponse for TmdbDetails {
    fn into_metadata(self) -> MovieMetadata {
        let directors: Vec<&str> = match self.media_type {
            MediaType::Movie => self
                .credits
                .crew
                .iter()
                .filter(|c| c.job.as_deref() == Some("Director"))
                .map(|c| c.name.as_str())
                .collect(),
            MediaType::Tv => self.created_by.iter().map(|c| c.name.as_str()).collect(),
        };

        let languages = join_names(
            self.spoken_languages.iter().filter_map(|l| {
                l.english_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .or(l.name.as_deref())
            }),
            None,
        );
        let language = if languages == cinepost_core::types::NOT_AVAILABLE {
            or_na(self.original_language.as_deref())
        } else {
            languages
        };

        let release_date = match self.media_type {
            MediaType::Movie => self.release_date.as_deref(),
            MediaType::Tv => self.first_air_date.as_deref(),
        };

        MovieMetadata {
            genre: join_names(self.genres.iter().map(|g| g.name.as_str()), None),
            rating_score: crate::normalize::format_rating(&self.vote_average.into()),
            plot_summary: or_na(self.overview.as_deref()),
            director: join_names(directors, None),
            cast_list: join_names(
                self.credits.cast.iter().map(|c| c.name.as_str()),
                Some(CAST_LIMIT),
            ),
            budget: self
                .budget
                .map(|b| format_amount(b as f64))
                .unwrap_or_else(|| cinepost_core::types::NOT_AVAILABLE.to_string()),
            release_date: or_na(release_date),
            language,
            poster_url: poster_or_empty(
                self.poster_path
                    .as_deref()
                    .map(|p| format!("{IMAGE_BASE}/w500{p}"))
                    .as_deref(),
            ),
        }
    }
}
