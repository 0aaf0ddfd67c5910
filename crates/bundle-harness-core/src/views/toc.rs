//! Table of contents builder.

use serde::Serialize;

use super::normalize_key;
use crate::models::ChunkExtraction;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub title: String,
    pub page: u32,
    pub chunk_index: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOfContents {
    pub entries: Vec<TocEntry>,
    pub chunks_analysed: usize,
}

/// Headings from every extraction, ordered by page, then chunk, then the
/// order the extractor reported them. A heading that repeats the title
/// directly above it (running headers, split pages) is dropped.
pub fn build_toc(extractions: &[ChunkExtraction]) -> TableOfContents {
    let mut ordered: Vec<(u32, u32, usize, &str)> = extractions
        .iter()
        .flat_map(|x| {
            x.headings
                .iter()
                .enumerate()
                .map(move |(pos, h)| (h.page, x.chunk_index, pos, h.title.trim()))
        })
        .filter(|(_, _, _, title)| !title.is_empty())
        .collect();
    ordered.sort_by_key(|&(page, chunk, pos, _)| (page, chunk, pos));

    let mut entries: Vec<TocEntry> = Vec::with_capacity(ordered.len());
    for (page, chunk_index, _, title) in ordered {
        if let Some(prev) = entries.last() {
            if normalize_key(&prev.title) == normalize_key(title) {
                continue;
            }
        }
        entries.push(TocEntry {
            title: title.to_string(),
            page,
            chunk_index,
        });
    }

    TableOfContents {
        entries,
        chunks_analysed: extractions.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPlanner;
    use crate::models::{ExtractionPayload, Heading};

    fn extraction(index: u32, headings: &[(&str, u32)]) -> ChunkExtraction {
        let range = ChunkPlanner::new(3).range(30, index).unwrap();
        let payload = ExtractionPayload {
            headings: headings
                .iter()
                .map(|(t, p)| Heading {
                    title: t.to_string(),
                    page: *p,
                })
                .collect(),
            ..Default::default()
        };
        ChunkExtraction::new("b1", &range, payload, "")
    }

    #[test]
    fn sorts_by_page_across_chunks() {
        let xs = vec![
            extraction(1, &[("Witness Statements", 5)]),
            extraction(0, &[("Pleadings", 1), ("Defence", 3), ("Particulars", 2)]),
        ];
        let toc = build_toc(&xs);
        let titles: Vec<&str> = toc.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Pleadings", "Particulars", "Defence", "Witness Statements"]
        );
        assert_eq!(toc.chunks_analysed, 2);
    }

    #[test]
    fn keeps_intra_page_order() {
        let xs = vec![extraction(0, &[("B heading", 2), ("A heading", 2)])];
        let toc = build_toc(&xs);
        assert_eq!(toc.entries[0].title, "B heading");
        assert_eq!(toc.entries[1].title, "A heading");
    }

    #[test]
    fn collapses_immediate_repeats_only() {
        let xs = vec![
            extraction(0, &[("Exhibits", 3)]),
            extraction(1, &[("EXHIBITS ", 4), ("Correspondence", 5)]),
            extraction(2, &[("Exhibits", 7)]),
        ];
        let toc = build_toc(&xs);
        let pages: Vec<u32> = toc.entries.iter().map(|e| e.page).collect();
        assert_eq!(pages, vec![3, 5, 7]);
    }

    #[test]
    fn empty_titles_are_skipped() {
        let xs = vec![extraction(0, &[("   ", 1), ("Index", 1)])];
        assert_eq!(build_toc(&xs).entries.len(), 1);
    }
}
