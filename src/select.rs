//! Best-chapter selection over a scraped series listing.
//!
//! A single forward pass over the rows, keeping one running best. Priority
//! order: identifier match against the caller's series matcher, then
//! language preference rank, then most-recent upload. Rows whose timestamp
//! cannot be parsed are dropped individually and logged; they never fail the
//! whole selection.

use std::sync::{Arc, LazyLock};

use chrono::{Local, NaiveDateTime};
use log::{debug, warn};
use regex::Regex;

use crate::timeparse::parse_fuzzy_time;
use crate::types::{ChapterCandidate, IdentifierFn, NoMatch, SelectionPolicy, SelectionResult};

// Punctuation the site mixes into chapter labels.
static TITLE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_.,\[\]():]").expect("valid regex"));

// Chapter sequence marker, tolerant of "Ch.12" and "Ch 12".
static SEQUENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Ch[.\s](\d+)").expect("valid regex"));

/// Entity-decodes a scraped row title, flattens label punctuation to spaces,
/// and prepends the series context, yielding the text identifier extractors
/// run on.
pub fn clean_title(series_name: &str, raw_title: &str) -> String {
    let joined = format!("{series_name} {raw_title}");
    let decoded = html_escape::decode_html_entities(&joined);
    let flattened = TITLE_PUNCT.replace_all(&decoded, " ");
    flattened.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The default identifier extractor: the chapter sequence number, with
/// leading zeros stripped so "Ch.06" and "Ch.6" compare equal.
pub fn sequence_identifier() -> IdentifierFn {
    Arc::new(|text| {
        SEQUENCE
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map(|n| n.to_string())
    })
}

/// Picks the single best row of `candidates` under `policy`, ranked against
/// the current wall clock.
pub fn select_best_chapter<'a>(
    candidates: &'a [ChapterCandidate],
    policy: &SelectionPolicy,
) -> SelectionResult<'a> {
    select_best_chapter_at(candidates, policy, Local::now().naive_local())
}

/// Same as [`select_best_chapter`] with an explicit reference instant.
///
/// The instant is captured once per selection so every row's fuzzy timestamp
/// resolves against the same clock reading; results are deterministic for
/// identical inputs.
pub fn select_best_chapter_at<'a>(
    candidates: &'a [ChapterCandidate],
    policy: &SelectionPolicy,
    now: NaiveDateTime,
) -> SelectionResult<'a> {
    if candidates.is_empty() {
        return SelectionResult::NotFound(NoMatch::Empty);
    }

    let mut any_language_match = false;
    let mut any_identifier_match = false;
    let mut best: Option<Best<'a>> = None;

    for candidate in candidates {
        let rank = match language_rank(candidate, &policy.preferred_languages) {
            Some(rank) => rank,
            None => continue,
        };
        any_language_match = true;

        if let Some(matcher) = &policy.matcher {
            let cleaned = clean_title(&matcher.series_name, &candidate.raw_title);
            if (matcher.extract)(&cleaned).as_deref() != Some(matcher.target.as_str()) {
                continue;
            }
            debug!("chapter match: {cleaned}");
        }
        any_identifier_match = true;

        let uploaded = match parse_fuzzy_time(&candidate.timestamp_text, now) {
            Ok(t) => t,
            Err(e) => {
                warn!("dropping row {:?}: {e}", candidate.raw_title);
                continue;
            }
        };

        best = Some(match best {
            None => Best {
                rank,
                uploaded,
                candidate,
            },
            Some(current) => {
                let replaces = match (rank, current.rank) {
                    // Language priority dominates recency outright.
                    (Some(r), Some(b)) if r < b => true,
                    (Some(r), Some(b)) if r > b => false,
                    // Equal rank (or no language filter): strictly later
                    // upload wins, exact ties keep the earlier-listed row.
                    _ => uploaded > current.uploaded,
                };
                if replaces {
                    Best {
                        rank,
                        uploaded,
                        candidate,
                    }
                } else {
                    current
                }
            }
        });
    }

    match best {
        Some(best) => SelectionResult::Found(best.candidate),
        None if !any_language_match => SelectionResult::NotFound(NoMatch::NoLanguageMatch),
        None if !any_identifier_match => SelectionResult::NotFound(NoMatch::NoIdentifierMatch),
        // Rows passed both filters but every timestamp was unusable.
        None => SelectionResult::NotFound(NoMatch::Empty),
    }
}

struct Best<'a> {
    rank: Option<usize>,
    uploaded: NaiveDateTime,
    candidate: &'a ChapterCandidate,
}

/// `Some(None)` when no language filter is in effect, `Some(Some(rank))` for
/// an eligible row (lower is better), `None` for a row to discard.
fn language_rank(candidate: &ChapterCandidate, preferred: &[String]) -> Option<Option<usize>> {
    if preferred.is_empty() {
        return Some(None);
    }
    preferred
        .iter()
        .position(|lang| {
            candidate
                .language_tags
                .iter()
                .any(|tag| tag.eq_ignore_ascii_case(lang))
        })
        .map(Some)
}
