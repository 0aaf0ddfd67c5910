//! Derived views over a bundle's completed chunk extractions.
//!
//! Every builder is a pure function of the extraction set (plus, for the
//! overview, the bundle record and an optional phase-A summary). Nothing
//! here is persisted; views are recomputed on each request.
//!
//! | Builder | Module |
//! |---------|--------|
//! | Table of contents | [`toc`] |
//! | Timeline | [`timeline`] |
//! | Issues map | [`issues`] |
//! | Contradiction report | [`contradictions`] |
//! | Overview | [`overview`] |

pub mod contradictions;
pub mod issues;
pub mod overview;
pub mod timeline;
pub mod toc;

use std::collections::BTreeSet;

pub use contradictions::{find_contradictions, Contradiction, ContradictionReport};
pub use issues::{build_issues_map, IssueCategory, IssueGroup, IssuesMap};
pub use overview::{build_overview, Coverage, Overview};
pub use timeline::{build_timeline, normalize_date, Timeline, TimelineEntry};
pub use toc::{build_toc, TableOfContents, TocEntry};

/// Aggregation tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    /// Serve TOC/timeline/issues before the bundle completes.
    pub allow_partial: bool,
    /// Token Jaccard similarity at which adjacent timeline events merge.
    pub timeline_similarity: f64,
    /// Contradictions below this confidence are dropped.
    pub contradiction_min_confidence: f64,
    /// Upper bound on the synthesized overview narrative.
    pub overview_max_chars: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            allow_partial: false,
            timeline_similarity: 0.8,
            contradiction_min_confidence: 0.5,
            overview_max_chars: 1500,
        }
    }
}

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "denies", "denied", "deny", "didn't", "doesn't", "wasn't",
    "isn't", "cannot", "refused", "without",
];

/// Lowercased alphanumeric tokens of `text`.
pub fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|t| t.trim_matches('\'').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Jaccard similarity of the token sets of `a` and `b`, in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let inter = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    inter as f64 / union as f64
}

/// True if `text` contains a negation cue.
pub fn has_negation(text: &str) -> bool {
    tokens(text).iter().any(|t| NEGATIONS.contains(&t.as_str()))
}

/// Lowercase with runs of whitespace collapsed to one space.
pub fn normalize_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
