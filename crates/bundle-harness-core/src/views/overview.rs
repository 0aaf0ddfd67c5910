//! Overview builder.
//!
//! Phase-A bundles return their single-pass summary. Full bundles get a
//! short narrative synthesized from whatever has been analysed so far,
//! with a coverage indicator so a partial or failed bundle still says
//! something useful and says how much it has seen.

use serde::Serialize;

use super::issues::build_issues_map;
use super::timeline::{build_timeline, display_date};
use super::toc::build_toc;
use super::ViewSettings;
use crate::models::{AnalysisLevel, Bundle, BundleStatus, ChunkExtraction};

const TOP_CATEGORIES: usize = 4;
const LEADING_EVENTS: usize = 3;

/// How much of a full bundle has been analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub analysed: u32,
    pub total: u32,
    /// `"k/n chunks analysed"`.
    pub label: String,
}

impl Coverage {
    pub fn of(bundle: &Bundle) -> Self {
        Self {
            analysed: bundle.processed_chunks,
            total: bundle.total_chunks,
            label: format!(
                "{}/{} chunks analysed",
                bundle.processed_chunks, bundle.total_chunks
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub bundle_id: String,
    pub analysis_level: AnalysisLevel,
    pub status: BundleStatus,
    pub narrative: String,
    /// Present for full bundles only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    pub is_partial: bool,
}

/// Build the overview for `bundle`.
///
/// `phase_a_summary` is an earlier single-pass summary of the same case;
/// for full bundles it leads the narrative.
pub fn build_overview(
    bundle: &Bundle,
    extractions: &[ChunkExtraction],
    phase_a_summary: Option<&str>,
    settings: &ViewSettings,
) -> Overview {
    match bundle.analysis_level {
        AnalysisLevel::PhaseA => {
            let narrative = match (&bundle.summary, bundle.status) {
                (Some(s), _) => s.clone(),
                (None, BundleStatus::Failed) => format!(
                    "Summary unavailable: {}",
                    bundle.last_error.as_deref().unwrap_or("analysis failed")
                ),
                (None, _) => "Summary not yet available.".to_string(),
            };
            Overview {
                bundle_id: bundle.id.clone(),
                analysis_level: bundle.analysis_level,
                status: bundle.status,
                narrative: truncate_chars(&narrative, settings.overview_max_chars),
                coverage: None,
                is_partial: bundle.status != BundleStatus::Completed,
            }
        }
        AnalysisLevel::Full => {
            let narrative = full_narrative(bundle, extractions, phase_a_summary, settings);
            Overview {
                bundle_id: bundle.id.clone(),
                analysis_level: bundle.analysis_level,
                status: bundle.status,
                narrative: truncate_chars(&narrative, settings.overview_max_chars),
                coverage: Some(Coverage::of(bundle)),
                is_partial: !bundle.is_complete(),
            }
        }
    }
}

fn full_narrative(
    bundle: &Bundle,
    extractions: &[ChunkExtraction],
    phase_a_summary: Option<&str>,
    settings: &ViewSettings,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(summary) = phase_a_summary.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(summary.to_string());
    }

    let coverage = Coverage::of(bundle);
    let last_page = extractions.iter().map(|x| x.end_page).max().unwrap_or(0);
    if extractions.is_empty() {
        parts.push(format!(
            "{} of {} pages: no chunks analysed yet ({}).",
            bundle.name, bundle.page_count, coverage.label
        ));
    } else {
        parts.push(format!(
            "{}: pages 1-{} of {} reviewed ({}).",
            bundle.name, last_page, bundle.page_count, coverage.label
        ));
    }

    if bundle.status == BundleStatus::Failed {
        parts.push(format!(
            "Analysis stopped at chunk {}: {}.",
            bundle.processed_chunks + 1,
            bundle
                .last_error
                .as_deref()
                .unwrap_or("extraction failed")
                .trim_end_matches('.')
        ));
    }

    let toc = build_toc(extractions);
    if !toc.entries.is_empty() {
        parts.push(format!("{} sections identified.", toc.entries.len()));
    }

    let issues = build_issues_map(extractions);
    if !issues.categories.is_empty() {
        let top: Vec<String> = issues
            .categories
            .iter()
            .take(TOP_CATEGORIES)
            .map(|c| format!("{} ({})", c.category, c.count))
            .collect();
        parts.push(format!("Key issue areas: {}.", top.join(", ")));
    }

    let timeline = build_timeline(extractions, settings.timeline_similarity);
    if let (Some(first), Some(last)) = (timeline.first_date(), timeline.last_date()) {
        parts.push(format!(
            "The timeline runs from {} to {} across {} dated events.",
            display_date(first),
            display_date(last),
            timeline.dated_count
        ));
        let leading: Vec<String> = timeline
            .events
            .iter()
            .filter_map(|e| e.date.map(|d| format!("{}: {}", display_date(d), e.description)))
            .take(LEADING_EVENTS)
            .collect();
        parts.push(format!("Early events: {}.", leading.join("; ").trim_end_matches('.')));
    }

    parts.join(" ")
}

/// Cut `text` to at most `max` characters, preferring a word boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let cut = text
        .char_indices()
        .nth(max.saturating_sub(1))
        .map_or(text.len(), |(i, _)| i);
    let head = &text[..cut];
    let head = match head.rfind(' ') {
        Some(space) if space > cut / 2 => &head[..space],
        _ => head,
    };
    format!("{}…", head.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPlanner;
    use crate::models::{ExtractionPayload, Issue, Scope, TimelineEvent};

    fn full_bundle(processed: u32) -> Bundle {
        let mut b = Bundle::new_full(&Scope::new("c1", "o1"), "Hearing bundle", 10, 3);
        b.processed_chunks = processed;
        b.status = BundleStatus::Processing;
        b
    }

    fn extraction(index: u32) -> ChunkExtraction {
        let range = ChunkPlanner::new(3).range(10, index).unwrap();
        let payload = ExtractionPayload {
            timeline_events: vec![TimelineEvent {
                date: Some(format!("{}-01-01", 2019 + index)),
                description: format!("Event in chunk {}", index),
                page: range.start_page,
            }],
            issues: vec![Issue {
                label: "Disrepair".into(),
                category: "Liability".into(),
                page: range.start_page,
            }],
            ..Default::default()
        };
        ChunkExtraction::new("b1", &range, payload, "")
    }

    #[test]
    fn failed_full_bundle_reports_partial_coverage() {
        let mut b = full_bundle(2);
        b.status = BundleStatus::Failed;
        b.last_error = Some("rate limited".into());
        let xs = vec![extraction(0), extraction(1)];
        let o = build_overview(&b, &xs, None, &ViewSettings::default());
        let cov = o.coverage.unwrap();
        assert_eq!(cov.label, "2/4 chunks analysed");
        assert_eq!((cov.analysed, cov.total), (2, 4));
        assert!(o.is_partial);
        assert!(o.narrative.contains("2/4 chunks analysed"));
        assert!(o.narrative.contains("Analysis stopped at chunk 3: rate limited."));
        assert!(o.narrative.contains("Liability (2)"));
        assert!(o.narrative.contains("1 January 2019 to 1 January 2020"));
    }

    #[test]
    fn phase_a_returns_stored_summary_without_coverage() {
        let mut b = Bundle::new_phase_a(&Scope::new("c1", "o1"), "Quick look", 4);
        b.status = BundleStatus::Completed;
        b.summary = Some("A possession claim over rent arrears.".into());
        let o = build_overview(&b, &[], None, &ViewSettings::default());
        assert_eq!(o.narrative, "A possession claim over rent arrears.");
        assert!(o.coverage.is_none());
        assert!(!o.is_partial);
    }

    #[test]
    fn full_bundle_leads_with_phase_a_summary() {
        let b = full_bundle(0);
        let o = build_overview(&b, &[], Some("Earlier summary."), &ViewSettings::default());
        assert!(o.narrative.starts_with("Earlier summary."));
        assert!(o.narrative.contains("0/4 chunks analysed"));
    }

    #[test]
    fn narrative_is_bounded() {
        let b = full_bundle(0);
        let settings = ViewSettings {
            overview_max_chars: 40,
            ..Default::default()
        };
        let long = "word ".repeat(100);
        let o = build_overview(&b, &[], Some(&long), &settings);
        assert!(o.narrative.chars().count() <= 40);
        assert!(o.narrative.ends_with('…'));
    }

    #[test]
    fn truncation_never_exceeds_the_limit() {
        assert_eq!(truncate_chars("anything", 0), "");
        assert_eq!(truncate_chars("abc", 1), "…");
        assert_eq!(truncate_chars("", 0), "");
        for max in 0..12 {
            assert!(truncate_chars("the defendant denies liability", max).chars().count() <= max);
        }
    }
}
