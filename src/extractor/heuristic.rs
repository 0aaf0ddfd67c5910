//! Deterministic, offline extractor.
//!
//! Rules, applied per page of the composed chunk text:
//!
//! - A line is a heading if it is short, does not end in a full stop, and
//!   is either upper case or starts with a bundle section word (`Part`,
//!   `Section`, `Schedule`, `Exhibit`, `Appendix`, `Tab`).
//! - A sentence containing a recognisable date with a four-digit year
//!   becomes a timeline event.
//! - A sentence containing a keyword from [`ISSUE_KEYWORDS`] raises an issue
//!   in that keyword's category.
//! - Two sentences in the chunk that share most of their vocabulary but
//!   disagree in negation become a candidate contradiction.
//! - Every sentence of at least [`MIN_CLAIM_TOKENS`] words is kept as a
//!   claim, so statements in different chunks can be paired later.

use std::collections::HashSet;

use async_trait::async_trait;

use bundle_harness_core::chunk::parse_page_marker;
use bundle_harness_core::error::ExtractionError;
use bundle_harness_core::extract::ChunkExtractor;
use bundle_harness_core::models::{
    CandidateContradiction, Claim, ExtractionPayload, Heading, Issue, TimelineEvent,
};
use bundle_harness_core::search::PAGE_BREAK;
use bundle_harness_core::views::{has_negation, normalize_date, similarity};

const MAX_HEADING_CHARS: usize = 80;
const MAX_DESCRIPTION_CHARS: usize = 200;
const SUMMARY_SENTENCES: usize = 3;
const MAX_SUMMARY_CHARS: usize = 600;
const CONTRADICTION_OVERLAP: f64 = 0.5;
pub const MIN_CLAIM_TOKENS: usize = 4;

const SECTION_WORDS: &[&str] = &["part", "section", "schedule", "exhibit", "appendix", "tab"];

/// `(category, keywords)`; a keyword matches a whole lowercase token.
pub const ISSUE_KEYWORDS: &[(&str, &[&str])] = &[
    ("Liability", &["negligence", "breach", "liable", "liability", "disrepair"]),
    ("Procedure", &["disclosure", "deadline", "adjournment", "directions", "service"]),
    ("Costs", &["costs", "fees", "interest"]),
    ("Evidence", &["witness", "expert", "hearsay"]),
    ("Remedy", &["damages", "injunction", "possession", "compensation"]),
];

#[derive(Debug, Default, Clone)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChunkExtractor for HeuristicExtractor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn extract(&self, text: &str) -> Result<ExtractionPayload, ExtractionError> {
        Ok(extract_payload(text))
    }

    async fn summarize(&self, text: &str) -> Result<String, ExtractionError> {
        summarize_text(text)
    }
}

struct Sentence {
    text: String,
    page: u32,
}

/// Split composed chunk text into `(page, text)` blocks using page markers.
/// Text before the first marker is attributed to page 1.
fn split_pages(text: &str) -> Vec<(u32, String)> {
    let mut pages: Vec<(u32, String)> = Vec::new();
    let mut current = 1;
    let mut buf = String::new();
    for line in text.lines() {
        if let Some(page) = parse_page_marker(line) {
            if !buf.trim().is_empty() {
                pages.push((current, std::mem::take(&mut buf)));
            }
            buf.clear();
            current = page;
            continue;
        }
        buf.push_str(line);
        buf.push('\n');
    }
    if !buf.trim().is_empty() {
        pages.push((current, buf));
    }
    pages
}

fn is_heading(line: &str) -> bool {
    let chars = line.chars().count();
    if !(3..=MAX_HEADING_CHARS).contains(&chars) || line.ends_with('.') {
        return false;
    }
    let has_alpha = line.chars().any(char::is_alphabetic);
    let upper = has_alpha && !line.chars().any(char::is_lowercase);
    let first = line
        .split_whitespace()
        .next()
        .map(|w| w.trim_end_matches(':').to_lowercase())
        .unwrap_or_default();
    upper || (SECTION_WORDS.contains(&first.as_str()) && line.split_whitespace().count() <= 8)
}

/// Split prose into sentences at `.`, `?`, or `!` followed by whitespace.
fn sentences(prose: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = prose.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = matches!(c, '.' | '?' | '!') && chars.peek().map_or(true, |n| n.is_whitespace());
        if boundary {
            let s = current.split_whitespace().collect::<Vec<_>>().join(" ");
            if !s.is_empty() {
                out.push(s);
            }
            current.clear();
        }
    }
    let rest = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn has_year(window: &[&str]) -> bool {
    window.iter().any(|w| {
        let digits: String = w.chars().filter(char::is_ascii_digit).collect();
        let year = if w.contains('/') || w.contains('.') || w.contains('-') {
            // DD/MM/YYYY, DD.MM.YYYY, YYYY-MM-DD: any four-digit run counts.
            w.split(['/', '.', '-'])
                .find(|part| part.len() == 4 && part.chars().all(|c| c.is_ascii_digit()))
                .and_then(|p| p.parse::<u32>().ok())
        } else if digits.len() == 4 && w.trim_matches(|c: char| !c.is_ascii_digit()).len() == 4 {
            digits.parse::<u32>().ok()
        } else {
            None
        };
        year.is_some_and(|y| (1900..=2099).contains(&y))
    })
}

/// The first date-like phrase in `sentence`, as written.
fn find_date(sentence: &str) -> Option<String> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    for start in 0..words.len() {
        for len in (1..=3).rev() {
            let Some(window) = words.get(start..start + len) else {
                continue;
            };
            if !has_year(window) {
                continue;
            }
            let phrase = window
                .join(" ")
                .trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '.'))
                .to_string();
            if normalize_date(&phrase).is_some() {
                return Some(phrase);
            }
        }
    }
    None
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

fn sentence_tokens(sentence: &str) -> HashSet<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn extract_payload(text: &str) -> ExtractionPayload {
    let mut payload = ExtractionPayload::default();
    let mut all_sentences: Vec<Sentence> = Vec::new();
    let mut seen_issues: HashSet<(String, u32)> = HashSet::new();

    for (page, body) in split_pages(text) {
        let mut prose = String::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                prose.push('\n');
                continue;
            }
            if is_heading(line) {
                payload.headings.push(Heading {
                    title: line.trim_end_matches(':').to_string(),
                    page,
                });
            } else {
                prose.push_str(line);
                prose.push('\n');
            }
        }

        for sentence in sentences(&prose) {
            if let Some(date) = find_date(&sentence) {
                payload.timeline_events.push(TimelineEvent {
                    date: Some(date),
                    description: truncate(&sentence, MAX_DESCRIPTION_CHARS),
                    page,
                });
            }

            let tokens = sentence_tokens(&sentence);
            for (category, keywords) in ISSUE_KEYWORDS {
                for keyword in keywords.iter().filter(|k| tokens.contains(**k)) {
                    let label = capitalize(keyword);
                    if seen_issues.insert((label.clone(), page)) {
                        payload.issues.push(Issue {
                            label,
                            category: category.to_string(),
                            page,
                        });
                    }
                }
            }

            if tokens.len() >= MIN_CLAIM_TOKENS {
                payload.claims.push(Claim {
                    statement: truncate(&sentence, MAX_DESCRIPTION_CHARS),
                    page,
                });
            }

            all_sentences.push(Sentence {
                text: sentence,
                page,
            });
        }
    }

    for (i, a) in all_sentences.iter().enumerate() {
        for b in &all_sentences[i + 1..] {
            if has_negation(&a.text) != has_negation(&b.text)
                && similarity(&a.text, &b.text) >= CONTRADICTION_OVERLAP
            {
                payload.candidate_contradictions.push(CandidateContradiction {
                    statement_a: truncate(&a.text, MAX_DESCRIPTION_CHARS),
                    page_a: a.page,
                    statement_b: truncate(&b.text, MAX_DESCRIPTION_CHARS),
                    page_b: b.page,
                    reason: "statements share their subject but differ in negation".to_string(),
                    confidence: None,
                });
            }
        }
    }

    payload
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Leading sentences of the text, bounded, prefixed with a page count.
pub fn summarize_text(text: &str) -> Result<String, ExtractionError> {
    let page_count = text.split(PAGE_BREAK).filter(|p| !p.trim().is_empty()).count();
    let prose = text.replace(PAGE_BREAK, "\n");
    let joined = prose
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_heading(l))
        .collect::<Vec<_>>()
        .join(" ");
    let lead: Vec<String> = sentences(&joined).into_iter().take(SUMMARY_SENTENCES).collect();
    if lead.is_empty() {
        return Err(ExtractionError::Permanent("no text to summarize".to_string()));
    }
    let pages = if page_count == 1 { "page" } else { "pages" };
    Ok(truncate(
        &format!("{} {} of text. {}", page_count, pages, lead.join(" ")),
        MAX_SUMMARY_CHARS,
    ))
}
