//! Per-page full-text search over a bundle.
//!
//! The index is a list of [`IndexedPage`]s written when the bundle is
//! created, so search works before (and regardless of) chunk processing.
//!
//! # Matching
//!
//! 1. The trimmed query must be at least [`MIN_QUERY_CHARS`] characters.
//! 2. Query and page text are case-folded; matching is plain substring.
//! 3. Each page scores its non-overlapping occurrence count.
//! 4. Results sort by count (desc), then page (asc), and are truncated to
//!    [`SearchParams::limit`].
//! 5. The snippet is a window of `snippet_radius` characters either side of
//!    the first match, whitespace-collapsed, with `…` where text was cut.

use serde::Serialize;

use crate::error::{BundleError, BundleResult};
use crate::models::{IndexedPage, PageText};

pub const MIN_QUERY_CHARS: usize = 2;

/// Form feed, the conventional page break in extracted text.
pub const PAGE_BREAK: char = '\u{c}';

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub limit: usize,
    pub snippet_radius: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: 25,
            snippet_radius: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub page: u32,
    pub occurrences: usize,
    pub snippet: String,
}

/// Reject queries shorter than [`MIN_QUERY_CHARS`]; returns the trimmed query.
pub fn validate_query(query: &str) -> BundleResult<&str> {
    let trimmed = query.trim();
    if trimmed.chars().count() < MIN_QUERY_CHARS {
        return Err(BundleError::validation(format!(
            "search query must be at least {} characters",
            MIN_QUERY_CHARS
        )));
    }
    Ok(trimmed)
}

/// Index rows for a full bundle's page text.
pub fn index_page_text(pages: &PageText) -> Vec<IndexedPage> {
    pages
        .iter()
        .map(|(page, text)| IndexedPage {
            page,
            text: text.to_string(),
        })
        .collect()
}

/// Index rows for phase-A text: split on form feeds, one page each.
///
/// Text without page breaks indexes as a single page 1.
pub fn index_phase_a_text(text: &str) -> Vec<IndexedPage> {
    text.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, t)| IndexedPage {
            page: i as u32 + 1,
            text: t.to_string(),
        })
        .collect()
}

/// Run a query against a bundle's indexed pages.
pub fn search_pages(
    pages: &[IndexedPage],
    query: &str,
    params: &SearchParams,
) -> BundleResult<Vec<SearchHit>> {
    let query = validate_query(query)?;
    let (needle, _) = fold_case(query);

    let mut hits: Vec<SearchHit> = pages
        .iter()
        .filter_map(|p| {
            let (folded, origin) = fold_case(&p.text);
            let first = folded.find(&needle)?;
            let occurrences = folded.matches(needle.as_str()).count();
            let start = origin[first];
            let last = origin[first + needle.len() - 1];
            let end = last + p.text[last..].chars().next().map_or(0, char::len_utf8);
            Some(SearchHit {
                page: p.page,
                occurrences,
                snippet: snippet(&p.text, start, end, params.snippet_radius),
            })
        })
        .collect();

    hits.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then(a.page.cmp(&b.page)));
    hits.truncate(params.limit);
    Ok(hits)
}

/// Lowercase `text`, recording for every folded byte the byte offset of the
/// original character it came from.
fn fold_case(text: &str) -> (String, Vec<usize>) {
    let mut folded = String::with_capacity(text.len());
    let mut origin = Vec::with_capacity(text.len());
    for (idx, ch) in text.char_indices() {
        for lower in ch.to_lowercase() {
            let before = folded.len();
            folded.push(lower);
            origin.extend(std::iter::repeat(idx).take(folded.len() - before));
        }
    }
    (folded, origin)
}

fn snippet(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map_or(start, |(i, _)| i);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);

    let body = text[from..to].split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(body.len() + 6);
    if from > 0 {
        out.push('…');
    }
    out.push_str(&body);
    if to < text.len() {
        out.push('…');
    }
    out
}
