//! Timeline builder: merge, date-normalize, order, and de-duplicate events.
//!
//! Dated events come first in chronological order (ties broken by page),
//! followed by undated events in page order. An event is folded into an
//! earlier one when both carry the same normalized date, come from chunks
//! at most one index apart, and their descriptions reach the similarity
//! threshold. Overlapping page ranges make the same event show up at the
//! tail of one chunk and the head of the next.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::similarity;
use crate::models::ChunkExtraction;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    /// Normalized `YYYY-MM-DD` date, if the raw date could be parsed.
    pub date: Option<NaiveDate>,
    /// The date string as the extractor reported it.
    pub raw_date: Option<String>,
    pub description: String,
    pub page: u32,
    /// Every page this event was reported on, after de-duplication.
    pub pages: Vec<u32>,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub events: Vec<TimelineEntry>,
    pub dated_count: usize,
    pub undated_count: usize,
    pub duplicates_merged: usize,
}

impl Timeline {
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.events.iter().find_map(|e| e.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.events.iter().rev().find_map(|e| e.date)
    }
}

const DAY_FIRST: &[&str] = &[
    "%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y", "%d %B %Y", "%d %B, %Y", "%B %d, %Y",
    "%B %d %Y", "%Y/%m/%d",
];

/// Parse a loosely formatted date into a calendar date.
///
/// Accepts ISO dates, `DD/MM/YYYY` (day first, as in UK court bundles),
/// `DD.MM.YYYY`, `12 March 2021`, `March 12, 2021`, ordinal days
/// (`3rd June 2020`), `March 2021` (first of the month), `2021-03`, and a
/// bare year (1 January). Returns `None` for anything else.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = strip_ordinals(raw.trim().trim_end_matches('.'));
    let s = cleaned.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DAY_FIRST {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    if let Ok(d) = NaiveDate::parse_from_str(&format!("1 {}", s), "%d %B %Y") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Some(d);
    }
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = s.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1);
    }
    None
}

fn strip_ordinals(s: &str) -> String {
    s.split(' ')
        .map(|tok| {
            let (core, trail) = match tok.strip_suffix(',') {
                Some(c) => (c, ","),
                None => (tok, ""),
            };
            let lower = core.to_ascii_lowercase();
            for suffix in ["st", "nd", "rd", "th"] {
                if let Some(num) = lower.strip_suffix(suffix) {
                    if !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()) {
                        return format!("{}{}", num, trail);
                    }
                }
            }
            tok.to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge every extraction's events into one ordered, de-duplicated timeline.
pub fn build_timeline(extractions: &[ChunkExtraction], similarity_threshold: f64) -> Timeline {
    let mut candidates: Vec<(usize, TimelineEntry)> = Vec::new();
    for x in extractions {
        for e in &x.timeline_events {
            let description = e.description.trim();
            if description.is_empty() {
                continue;
            }
            let raw_date = e
                .date
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            candidates.push((
                candidates.len(),
                TimelineEntry {
                    date: raw_date.as_deref().and_then(normalize_date),
                    raw_date,
                    description: description.to_string(),
                    page: e.page,
                    pages: vec![e.page],
                    chunk_index: x.chunk_index,
                },
            ));
        }
    }

    // Dated before undated; `None` sorts first for Option, so key on is_none.
    candidates.sort_by(|(ia, a), (ib, b)| {
        a.date
            .is_none()
            .cmp(&b.date.is_none())
            .then(a.date.cmp(&b.date))
            .then(a.page.cmp(&b.page))
            .then(a.chunk_index.cmp(&b.chunk_index))
            .then(ia.cmp(ib))
    });

    let mut timeline = Timeline::default();
    for (_, entry) in candidates {
        let duplicate = timeline
            .events
            .iter_mut()
            .rev()
            .take_while(|kept| kept.date == entry.date)
            .find(|kept| {
                kept.chunk_index.abs_diff(entry.chunk_index) <= 1
                    && (entry.date.is_some() || kept.raw_date == entry.raw_date)
                    && similarity(&kept.description, &entry.description) >= similarity_threshold
            });
        match duplicate {
            Some(kept) => {
                if !kept.pages.contains(&entry.page) {
                    kept.pages.push(entry.page);
                }
                timeline.duplicates_merged += 1;
            }
            None => timeline.events.push(entry),
        }
    }

    timeline.dated_count = timeline.events.iter().filter(|e| e.date.is_some()).count();
    timeline.undated_count = timeline.events.len() - timeline.dated_count;
    timeline
}

/// Render a date the way the overview narrative prints it.
pub fn display_date(d: NaiveDate) -> String {
    format!("{} {} {}", d.day(), d.format("%B"), d.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPlanner;
    use crate::models::{ExtractionPayload, TimelineEvent};

    fn extraction(index: u32, events: &[(Option<&str>, &str, u32)]) -> ChunkExtraction {
        let range = ChunkPlanner::new(3).range(30, index).unwrap();
        let payload = ExtractionPayload {
            timeline_events: events
                .iter()
                .map(|(d, desc, p)| TimelineEvent {
                    date: d.map(str::to_string),
                    description: desc.to_string(),
                    page: *p,
                })
                .collect(),
            ..Default::default()
        };
        ChunkExtraction::new("b1", &range, payload, "")
    }

    fn ymd(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn normalizes_common_date_forms() {
        assert_eq!(normalize_date("2021-03-12"), ymd(2021, 3, 12));
        assert_eq!(normalize_date("12/03/2021"), ymd(2021, 3, 12));
        assert_eq!(normalize_date("12.03.2021"), ymd(2021, 3, 12));
        assert_eq!(normalize_date("12 March 2021"), ymd(2021, 3, 12));
        assert_eq!(normalize_date("March 12, 2021"), ymd(2021, 3, 12));
        assert_eq!(normalize_date("3rd June 2020"), ymd(2020, 6, 3));
        assert_eq!(normalize_date("June 3rd, 2020"), ymd(2020, 6, 3));
        assert_eq!(normalize_date("March 2021"), ymd(2021, 3, 1));
        assert_eq!(normalize_date("2021-03"), ymd(2021, 3, 1));
        assert_eq!(normalize_date("2019"), ymd(2019, 1, 1));
        assert_eq!(normalize_date("sometime last spring"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn sorts_chronologically_and_appends_undated_in_page_order() {
        let xs = vec![
            extraction(
                0,
                &[
                    (None, "Undated note on page three", 3),
                    (Some("2021-05-01"), "Claim issued", 2),
                ],
            ),
            extraction(
                1,
                &[
                    (Some("1 January 2020"), "Tenancy began", 4),
                    (None, "Undated note on page four", 4),
                    (Some("not a date"), "Hearing listed", 5),
                ],
            ),
        ];
        let t = build_timeline(&xs, 0.8);
        let descs: Vec<&str> = t.events.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(
            descs,
            vec![
                "Tenancy began",
                "Claim issued",
                "Undated note on page three",
                "Undated note on page four",
                "Hearing listed",
            ]
        );
        assert_eq!(t.dated_count, 2);
        assert_eq!(t.undated_count, 3);
        assert_eq!(t.events[4].raw_date.as_deref(), Some("not a date"));
        assert_eq!(t.first_date(), ymd(2020, 1, 1));
        assert_eq!(t.last_date(), ymd(2021, 5, 1));
    }

    #[test]
    fn merges_near_duplicates_from_adjacent_chunks() {
        let xs = vec![
            extraction(0, &[(Some("2021-03-12"), "The landlord served a section 21 notice", 3)]),
            extraction(1, &[(Some("12/03/2021"), "The landlord served a section 21 notice.", 4)]),
        ];
        let t = build_timeline(&xs, 0.8);
        assert_eq!(t.events.len(), 1);
        assert_eq!(t.events[0].pages, vec![3, 4]);
        assert_eq!(t.duplicates_merged, 1);
    }

    #[test]
    fn keeps_duplicates_from_distant_chunks() {
        let xs = vec![
            extraction(0, &[(Some("2021-03-12"), "Notice served", 1)]),
            extraction(5, &[(Some("2021-03-12"), "Notice served", 16)]),
        ];
        assert_eq!(build_timeline(&xs, 0.8).events.len(), 2);
    }

    #[test]
    fn keeps_dissimilar_events_on_the_same_date() {
        let xs = vec![
            extraction(0, &[(Some("2021-03-12"), "Notice served on tenant", 1)]),
            extraction(1, &[(Some("2021-03-12"), "Rent arrears statement produced", 4)]),
        ];
        assert_eq!(build_timeline(&xs, 0.8).events.len(), 2);
    }

    #[test]
    fn display_date_is_long_form() {
        assert_eq!(display_date(NaiveDate::from_ymd_opt(2021, 3, 2).unwrap()), "2 March 2021");
    }
}
