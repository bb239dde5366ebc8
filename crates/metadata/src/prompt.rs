//! Instruction text for generative providers.

use cinepost_core::types::{CascadeRequest, Operation};

/// Keys the metadata prompt requires, in the order the model is asked for them.
pub const METADATA_KEYS: [&str; 9] = [
    "genre",
    "ratingScore",
    "plotSummary",
    "director",
    "castList",
    "budget",
    "releaseDate",
    "language",
    "posterUrl",
];

const TITLE_CONTEXT_CHARS: usize = 2000;
const SUMMARY_CONTEXT_CHARS: usize = 3000;

/// System message sent alongside the prompt by chat-completion providers.
pub const SYSTEM_INSTRUCTION: &str =
    "You are an assistant for a movie and series review blog. Answer precisely and follow the requested output format.";

/// Build the provider-agnostic instruction for a request.
pub fn build_prompt(request: &CascadeRequest) -> String {
    match request.operation {
        Operation::FetchMetadata => metadata_prompt(request.title.trim()),
        Operation::OptimizeTitle => format!(
            "Based on this blog post content, suggest 5 catchy and SEO-friendly titles.\n\
             Content: {}\n\
             Return only the titles as a bulleted list.",
            truncate_chars(&request.content, TITLE_CONTEXT_CHARS)
        ),
        Operation::Summarize => format!(
            "Summarize this blog post in 2-3 sentences for a social media preview.\n\
             Title: {}\n\
             Content: {}",
            request.title.trim(),
            truncate_chars(&request.content, SUMMARY_CONTEXT_CHARS)
        ),
        Operation::Expand => format!(
            "Expand the following points into a detailed, professional blog paragraph.\n\
             Points: {}",
            request.content
        ),
        Operation::FixGrammar => format!(
            "Fix the grammar and improve the flow of this text while maintaining its meaning.\n\
             Return only the corrected text.\n\
             Text: {}",
            request.content
        ),
    }
}

fn metadata_prompt(title: &str) -> String {
    let keys = METADATA_KEYS
        .iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Find accurate details about the movie or TV series \"{title}\".\n\
         Respond with ONLY a strict JSON object, no markdown and no commentary, \
         containing exactly these keys: {keys}.\n\
         Every value must be a string. castList must be a comma-separated list of the \
         top-billed actors. ratingScore is the IMDb rating out of 10. budget is the \
         production budget in US dollars, for example \"$160 Million\".\n\
         Use \"N/A\" for any value you cannot determine, except posterUrl, which must be \
         an absolute image URL or \"\" when unknown."
    )
}

/// Truncate on a character boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_prompt_demands_strict_json_with_all_keys() {
        let prompt = build_prompt(&CascadeRequest::fetch_metadata("Inception (2010)"));
        assert!(prompt.contains("Inception (2010)"));
        assert!(prompt.contains("strict JSON"));
        assert!(prompt.contains("\"N/A\""));
        for key in METADATA_KEYS {
            assert!(prompt.contains(&format!("\"{key}\"")), "missing key {key}");
        }
    }

    #[test]
    fn title_prompt_truncates_content() {
        let content = "x".repeat(5000);
        let prompt = build_prompt(&CascadeRequest::new(
            Operation::OptimizeTitle,
            "",
            content.as_str(),
        ));
        assert!(prompt.contains("5 catchy"));
        assert!(prompt.contains(&"x".repeat(2000)));
        assert!(!prompt.contains(&"x".repeat(2001)));
    }

    #[test]
    fn summary_prompt_includes_title() {
        let prompt = build_prompt(&CascadeRequest::new(
            Operation::Summarize,
            "Heat review",
            "A long post.",
        ));
        assert!(prompt.contains("Title: Heat review"));
        assert!(prompt.contains("2-3 sentences"));
    }

    #[test]
    fn expand_and_grammar_carry_full_text() {
        let expand = build_prompt(&CascadeRequest::new(Operation::Expand, "", "great score"));
        assert!(expand.contains("Points: great score"));

        let grammar = build_prompt(&CascadeRequest::new(Operation::FixGrammar, "", "it were good"));
        assert!(grammar.contains("Text: it were good"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
