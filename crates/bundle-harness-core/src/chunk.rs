//! Fixed-size page-range chunk planner.
//!
//! A full bundle's pages `1..=page_count` are partitioned into contiguous
//! chunks of `chunk_size` pages. The last chunk may be short. Planning is
//! deterministic: the same `(page_count, chunk_size)` always yields the same
//! ranges, so a chunk index identifies the same pages across invocations.
//!
//! # Example
//!
//! ```rust
//! use bundle_harness_core::chunk::ChunkPlanner;
//!
//! let planner = ChunkPlanner::new(3);
//! let chunks = planner.plan(10);
//! assert_eq!(chunks.len(), 4);
//! assert_eq!((chunks[3].start_page, chunks[3].end_page), (10, 10));
//! ```

use serde::Serialize;

/// Pages per chunk when the configuration does not say otherwise.
pub const DEFAULT_CHUNK_SIZE: u32 = 3;

/// One planned chunk: its index and inclusive 1-based page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRange {
    pub index: u32,
    pub start_page: u32,
    pub end_page: u32,
}

impl ChunkRange {
    pub fn page_count(&self) -> u32 {
        self.end_page + 1 - self.start_page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlanner {
    chunk_size: u32,
}

impl ChunkPlanner {
    /// A planner with `chunk_size` pages per chunk (0 is treated as 1).
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// `ceil(page_count / chunk_size)`.
    pub fn total_chunks(&self, page_count: u32) -> u32 {
        page_count.div_ceil(self.chunk_size)
    }

    /// The range for chunk `index`, or `None` past the last chunk.
    pub fn range(&self, page_count: u32, index: u32) -> Option<ChunkRange> {
        if index >= self.total_chunks(page_count) {
            return None;
        }
        let start_page = index * self.chunk_size + 1;
        let end_page = (start_page + self.chunk_size - 1).min(page_count);
        Some(ChunkRange {
            index,
            start_page,
            end_page,
        })
    }

    /// Every chunk range in ascending index order.
    pub fn plan(&self, page_count: u32) -> Vec<ChunkRange> {
        (0..self.total_chunks(page_count))
            .filter_map(|i| self.range(page_count, i))
            .collect()
    }
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

/// Concatenate a chunk's pages with page markers the extractor can cite.
pub fn compose_chunk_text<'a, I>(pages: I) -> String
where
    I: IntoIterator<Item = (u32, &'a str)>,
{
    let mut out = String::new();
    for (page, text) in pages {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&page_marker(page));
        out.push('\n');
        out.push_str(text.trim_end());
    }
    out
}

/// The marker line that precedes each page in composed chunk text.
pub fn page_marker(page: u32) -> String {
    format!("--- Page {} ---", page)
}

/// Parse a marker line produced by [`page_marker`].
pub fn parse_page_marker(line: &str) -> Option<u32> {
    line.trim()
        .strip_prefix("--- Page ")?
        .strip_suffix(" ---")?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_pages_in_threes_makes_four_chunks() {
        let planner = ChunkPlanner::new(3);
        assert_eq!(planner.total_chunks(10), 4);
        let plan = planner.plan(10);
        let ranges: Vec<(u32, u32)> = plan.iter().map(|c| (c.start_page, c.end_page)).collect();
        assert_eq!(ranges, vec![(1, 3), (4, 6), (7, 9), (10, 10)]);
        assert_eq!(plan[3].page_count(), 1);
    }

    #[test]
    fn exact_multiple_has_no_short_chunk() {
        let planner = ChunkPlanner::new(3);
        assert_eq!(planner.total_chunks(9), 3);
        assert_eq!(planner.range(9, 2).unwrap().end_page, 9);
        assert!(planner.range(9, 3).is_none());
    }

    #[test]
    fn indices_are_contiguous() {
        let plan = ChunkPlanner::new(4).plan(37);
        for (i, c) in plan.iter().enumerate() {
            assert_eq!(c.index, i as u32);
        }
        assert_eq!(plan.last().unwrap().end_page, 37);
    }

    #[test]
    fn zero_chunk_size_is_treated_as_one() {
        assert_eq!(ChunkPlanner::new(0).total_chunks(5), 5);
    }

    #[test]
    fn composed_text_carries_parseable_markers() {
        let text = compose_chunk_text(vec![(4, "alpha\n"), (5, "beta")]);
        let markers: Vec<u32> = text.lines().filter_map(parse_page_marker).collect();
        assert_eq!(markers, vec![4, 5]);
        assert!(text.contains("alpha\n\n--- Page 5 ---\nbeta"));
    }
}
