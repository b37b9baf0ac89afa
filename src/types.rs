use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// One chapter row scraped from a series listing page.
///
/// Immutable once constructed; the selector only ranks candidates, it never
/// rewrites them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterCandidate {
    /// Chapter label text as scraped, e.g. "Vol.1 Ch.2: Subtitle".
    pub raw_title: String,
    /// Language tags attached to the row. Empty means the row declared none.
    pub language_tags: BTreeSet<String>,
    /// Raw fuzzy-or-absolute upload time string, e.g. "3 days ago".
    pub timestamp_text: String,
    /// Link to the actual chapter page.
    pub target_url: String,
}

/// Extracts a normalized chapter identifier from a cleaned title, or `None`
/// when the title carries no recognizable identifier.
pub type IdentifierFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Identifier-equality requirement for candidate rows.
#[derive(Clone)]
pub struct IdentifierMatch {
    /// Series title prepended to each cleaned row title before extraction.
    /// The engine fills this in from the scraped series page; standalone
    /// selector callers supply their own context (or leave it empty).
    pub series_name: String,
    /// Identifier a candidate must produce to remain eligible.
    pub target: String,
    pub extract: IdentifierFn,
}

impl fmt::Debug for IdentifierMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierMatch")
            .field("series_name", &self.series_name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// How to pick one chapter out of a series listing.
///
/// A fresh policy value is threaded through every call; nothing here is
/// ambient state.
#[derive(Debug, Clone, Default)]
pub struct SelectionPolicy {
    /// Title-cased language names, highest priority first. Empty means any
    /// language is acceptable.
    pub preferred_languages: Vec<String>,
    /// When set, only rows producing `matcher.target` stay eligible.
    pub matcher: Option<IdentifierMatch>,
}

impl SelectionPolicy {
    /// No language filtering, no identifier requirement: most recent upload
    /// wins.
    pub fn any_language() -> Self {
        Self::default()
    }

    /// Builds a policy from a space-separated language string, the shape the
    /// plugin config used ("german english"). Names are normalized to title
    /// case; "any" or "none" anywhere in the list disables filtering.
    pub fn from_language_config(config: Option<&str>) -> Self {
        let mut preferred_languages: Vec<String> = config
            .map(|s| s.split_whitespace().map(title_case).collect())
            .unwrap_or_default();
        if preferred_languages.iter().any(|l| l == "Any" || l == "None") {
            preferred_languages.clear();
        }
        Self {
            preferred_languages,
            matcher: None,
        }
    }

    pub fn with_matcher(mut self, matcher: IdentifierMatch) -> Self {
        self.matcher = Some(matcher);
        self
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Why a selection produced no chapter. These are expected steady-state
/// outcomes, not errors: a series simply may have nothing in the requested
/// language right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoMatch {
    /// The listing had no rows, or none was usable.
    Empty,
    /// The language filter eliminated every row.
    NoLanguageMatch,
    /// Rows survived the language filter but none produced the target
    /// identifier.
    NoIdentifierMatch,
}

impl fmt::Display for NoMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoMatch::Empty => write!(f, "series listing has no usable chapters"),
            NoMatch::NoLanguageMatch => write!(f, "no chapter in a requested language"),
            NoMatch::NoIdentifierMatch => write!(f, "no chapter matched the series identifier"),
        }
    }
}

/// Outcome of a selection pass over one listing.
#[derive(Debug, PartialEq)]
pub enum SelectionResult<'a> {
    Found(&'a ChapterCandidate),
    NotFound(NoMatch),
}

/// Metadata extracted from a chapter page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Series name as set on the site, ':' flattened for path safety.
    pub series: String,
    /// Combined id and title, e.g. "Vol.1 Ch.2 - Subtitle".
    pub chapter_name: String,
    /// Combined volume and chapter, e.g. "Vol.1 Ch.2".
    pub chapter_id: String,
    /// Subtitle after the id, empty when the chapter has none.
    pub chapter_title: String,
    pub volume_number: String,
    pub chapter_number: String,
    pub language: String,
    /// Release group credited for the upload.
    pub group: String,
    /// Number of pages in the chapter.
    pub pages: usize,
}

/// One downloadable page image of a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImage {
    pub url: String,
    /// Zero-padded page number taken from the image file name.
    pub number: String,
    /// File extension including the dot, e.g. ".jpg".
    pub extension: String,
}

/// Knobs for the HTTP collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
    /// Sent as the site's `lang_option` cookie so series listings come back
    /// pre-filtered server-side. Usually mirrors the policy's language list.
    pub cookie_languages: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36".into(),
            timeout_ms: 20_000,
            cookie_languages: vec![],
        }
    }
}

impl FetchConfig {
    pub fn for_languages(languages: &[String]) -> Self {
        Self {
            cookie_languages: languages.to_vec(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}
impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_config_title_cases_and_orders() {
        let policy = SelectionPolicy::from_language_config(Some("german english"));
        assert_eq!(policy.preferred_languages, vec!["German", "English"]);
    }

    #[test]
    fn language_config_any_disables_filtering() {
        let policy = SelectionPolicy::from_language_config(Some("english french any"));
        assert!(policy.preferred_languages.is_empty());

        let policy = SelectionPolicy::from_language_config(Some("None"));
        assert!(policy.preferred_languages.is_empty());
    }

    #[test]
    fn language_config_absent_means_any() {
        let policy = SelectionPolicy::from_language_config(None);
        assert!(policy.preferred_languages.is_empty());
        assert!(policy.matcher.is_none());
    }

    #[test]
    fn fetch_config_mirrors_policy_languages() {
        let policy = SelectionPolicy::from_language_config(Some("spanish"));
        let cfg = FetchConfig::for_languages(&policy.preferred_languages);
        assert_eq!(cfg.cookie_languages, vec!["Spanish"]);
    }
}
