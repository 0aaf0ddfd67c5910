//! Issues map builder: group issues by category with page traceability.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::normalize_key;
use crate::models::ChunkExtraction;

pub const UNCATEGORISED: &str = "uncategorised";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueGroup {
    pub label: String,
    pub count: usize,
    pub pages: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueCategory {
    pub category: String,
    pub count: usize,
    pub issues: Vec<IssueGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuesMap {
    pub categories: Vec<IssueCategory>,
    pub total_issues: usize,
}

#[derive(Default)]
struct LabelAcc {
    display: String,
    count: usize,
    pages: BTreeSet<u32>,
}

#[derive(Default)]
struct CategoryAcc {
    display: String,
    count: usize,
    labels: BTreeMap<String, LabelAcc>,
}

/// Group every extracted issue by category, then by label.
///
/// Categories and labels match case- and whitespace-insensitively; the
/// first spelling seen is the one displayed. Categories are ordered by
/// issue count (desc) then name; labels likewise within a category.
pub fn build_issues_map(extractions: &[ChunkExtraction]) -> IssuesMap {
    let mut categories: BTreeMap<String, CategoryAcc> = BTreeMap::new();
    let mut total = 0;

    for issue in extractions.iter().flat_map(|x| x.issues.iter()) {
        let label = issue.label.trim();
        if label.is_empty() {
            continue;
        }
        let category = match issue.category.trim() {
            "" => UNCATEGORISED,
            c => c,
        };

        let cat = categories.entry(normalize_key(category)).or_default();
        if cat.display.is_empty() {
            cat.display = category.to_string();
        }
        cat.count += 1;

        let acc = cat.labels.entry(normalize_key(label)).or_default();
        if acc.display.is_empty() {
            acc.display = label.to_string();
        }
        acc.count += 1;
        acc.pages.insert(issue.page);
        total += 1;
    }

    let mut out: Vec<IssueCategory> = categories
        .into_values()
        .map(|cat| {
            let mut issues: Vec<IssueGroup> = cat
                .labels
                .into_values()
                .map(|l| IssueGroup {
                    label: l.display,
                    count: l.count,
                    pages: l.pages.into_iter().collect(),
                })
                .collect();
            issues.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
            IssueCategory {
                category: cat.display,
                count: cat.count,
                issues,
            }
        })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));

    IssuesMap {
        categories: out,
        total_issues: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPlanner;
    use crate::models::{ExtractionPayload, Issue};

    fn extraction(index: u32, issues: &[(&str, &str, u32)]) -> ChunkExtraction {
        let range = ChunkPlanner::new(3).range(30, index).unwrap();
        let payload = ExtractionPayload {
            issues: issues
                .iter()
                .map(|(label, category, page)| Issue {
                    label: label.to_string(),
                    category: category.to_string(),
                    page: *page,
                })
                .collect(),
            ..Default::default()
        };
        ChunkExtraction::new("b1", &range, payload, "")
    }

    #[test]
    fn groups_counts_and_traces_pages() {
        let xs = vec![
            extraction(0, &[("Disrepair", "Liability", 2), ("Late disclosure", "Procedure", 3)]),
            extraction(1, &[("disrepair", "liability", 5), ("Disrepair", "Liability", 5)]),
        ];
        let map = build_issues_map(&xs);
        assert_eq!(map.total_issues, 4);
        assert_eq!(map.categories.len(), 2);

        let liability = &map.categories[0];
        assert_eq!(liability.category, "Liability");
        assert_eq!(liability.count, 3);
        assert_eq!(liability.issues.len(), 1);
        assert_eq!(liability.issues[0].label, "Disrepair");
        assert_eq!(liability.issues[0].count, 3);
        assert_eq!(liability.issues[0].pages, vec![2, 5]);

        assert_eq!(map.categories[1].category, "Procedure");
    }

    #[test]
    fn missing_category_is_uncategorised() {
        let map = build_issues_map(&[extraction(0, &[("Costs budget", " ", 1)])]);
        assert_eq!(map.categories[0].category, UNCATEGORISED);
    }

    #[test]
    fn ties_break_alphabetically() {
        let map = build_issues_map(&[extraction(0, &[("x", "Zeta", 1), ("y", "Alpha", 1)])]);
        let names: Vec<&str> = map.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn empty_labels_are_ignored() {
        let map = build_issues_map(&[extraction(0, &[("", "Liability", 1)])]);
        assert_eq!(map.total_issues, 0);
        assert!(map.categories.is_empty());
    }
}
