//! Mapping of provider payloads into the canonical `MovieMetadata` record.
//!
//! Field rules shared by every provider:
//! 1. Missing or blank values become `"N/A"`; a missing poster becomes `""`.
//! 2. Cast lists from movie databases keep the top five names.
//! 3. Numeric ratings get one decimal place; string ratings pass through.
//!    Scales are never converted between providers.
//! 4. Numeric budgets become `"$160 Million"` style strings; strings pass through.

use cinepost_core::types::{MovieMetadata, NOT_AVAILABLE};
use serde_json::Value;

use crate::MetadataError;
use crate::provider::RawPayload;

/// Number of top-billed cast members kept for movie-database sources.
pub const CAST_LIMIT: usize = 5;

/// A provider-specific response that can be mapped into `MovieMetadata`.
pub trait RawMovieResponse {
    fn into_metadata(self) -> MovieMetadata;
}

impl RawMovieResponse for MovieMetadata {
    fn into_metadata(self) -> MovieMetadata {
        MovieMetadata {
            genre: or_na(Some(&self.genre)),
            rating_score: or_na(Some(&self.rating_score)),
            plot_summary: or_na(Some(&self.plot_summary)),
            director: or_na(Some(&self.director)),
            cast_list: or_na(Some(&self.cast_list)),
            budget: or_na(Some(&self.budget)),
            release_date: or_na(Some(&self.release_date)),
            language: or_na(Some(&self.language)),
            poster_url: poster_or_empty(Some(&self.poster_url)),
        }
    }
}

/// The JSON object a generative provider returns for a metadata request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedMetadata(pub serde_json::Map<String, Value>);

impl GeneratedMetadata {
    /// Parse a model reply into a metadata object.
    ///
    /// Grounded replies are free text, so the first `{` that opens a complete
    /// JSON object wins. Prose, markdown fences and stray braces around it are
    /// ignored.
    pub fn parse(text: &str) -> Result<Self, MetadataError> {
        let mut first_error = None;
        for (start, _) in text.match_indices('{') {
            let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
            match values.next() {
                Some(Ok(Value::Object(map))) => return Ok(Self(map)),
                Some(Err(e)) if first_error.is_none() => first_error = Some(e),
                _ => {}
            }
        }

        Err(MetadataError::Malformed(match first_error {
            Some(e) => format!("invalid JSON: {e}"),
            None => "reply did not contain a JSON object".into(),
        }))
    }

    fn field(&self, key: &str) -> &Value {
        self.0.get(key).unwrap_or(&Value::Null)
    }
}

impl RawMovieResponse for GeneratedMetadata {
    fn into_metadata(self) -> MovieMetadata {
        MovieMetadata {
            genre: value_text(self.field("genre")),
            rating_score: format_rating(self.field("ratingScore")),
            plot_summary: value_text(self.field("plotSummary")),
            director: value_text(self.field("director")),
            cast_list: value_text(self.field("castList")),
            budget: format_budget(self.field("budget")),
            release_date: value_text(self.field("releaseDate")),
            language: value_text(self.field("language")),
            poster_url: poster_or_empty(self.field("posterUrl").as_str()),
        }
    }
}

/// Normalize any provider payload.
///
/// Only generated payloads can fail here: a reply that is not a JSON object
/// is malformed for a metadata request.
pub fn normalize(payload: RawPayload) -> Result<MovieMetadata, MetadataError> {
    match payload {
        RawPayload::Tmdb(details) => Ok(details.into_metadata()),
        RawPayload::Omdb(title) => Ok(title.into_metadata()),
        RawPayload::Generated(reply) => {
            Ok(GeneratedMetadata::parse(&reply.text)?.into_metadata())
        }
    }
}

/// Trimmed text, or `"N/A"` when missing or blank.
pub fn or_na(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// Absolute poster URL, or `""` when there is no image.
pub fn poster_or_empty(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if v.starts_with("http://") || v.starts_with("https://") => v.to_string(),
        _ => String::new(),
    }
}

/// Comma-join non-blank names, keeping at most `limit` of them.
pub fn join_names<'a>(names: impl IntoIterator<Item = &'a str>, limit: Option<usize>) -> String {
    let names: Vec<&str> = names
        .into_iter()
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != NOT_AVAILABLE)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    if names.is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        names.join(", ")
    }
}

/// Render an arbitrary JSON value as field text.
///
/// Arrays are comma-joined even though prompts ask for plain strings.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => or_na(Some(s)),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .map(value_text)
                .filter(|s| s != NOT_AVAILABLE)
                .collect();
            join_names(parts.iter().map(String::as_str), None)
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) => NOT_AVAILABLE.to_string(),
    }
}

/// Numeric ratings get one decimal; strings pass through untouched.
pub fn format_rating(value: &Value) -> String {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(r) if r > 0.0 => format!("{r:.1}"),
            _ => NOT_AVAILABLE.to_string(),
        },
        other => value_text(other),
    }
}

/// Numeric budgets in whole currency units become `"$160 Million"` style
/// strings; strings pass through untouched.
pub fn format_budget(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(format_amount)
            .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        other => value_text(other),
    }
}

pub(crate) fn format_amount(amount: f64) -> String {
    if !amount.is_finite() || amount <= 0.0 {
        return NOT_AVAILABLE.to_string();
    }
    if amount >= 1_000_000.0 {
        let millions = amount / 1_000_000.0;
        let text = format!("{millions:.1}");
        let text = text.strip_suffix(".0").unwrap_or(&text);
        return format!("${text} Million");
    }

    let whole = amount.round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}")
}
