//! Contradiction finder.
//!
//! Cross-references every completed chunk. Candidates come from two
//! places: pairs an extractor reported within one chunk, and claims from
//! different chunks that share most of their vocabulary but disagree in
//! negation. A candidate's confidence is the extractor's own figure when it gave
//! one, otherwise a lexical estimate: statements about the same fact share
//! vocabulary, and opposing claims usually differ in negation.
//!
//! Symmetric pairs collapse: `(A, B)` and `(B, A)` are one contradiction.
//! When several chunks report the same pair, the highest confidence wins
//! and the extra reports are counted as corroborations.

use std::collections::HashMap;

use serde::Serialize;

use super::{has_negation, normalize_key, similarity};
use crate::models::{CandidateContradiction, ChunkExtraction, Claim};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub statement_a: String,
    pub page_a: u32,
    pub statement_b: String,
    pub page_b: u32,
    pub reason: String,
    pub confidence: f64,
    /// Number of additional chunks that reported the same pair.
    pub corroborations: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContradictionReport {
    pub contradictions: Vec<Contradiction>,
    pub candidates_considered: usize,
    pub below_threshold: usize,
    pub chunks_analysed: usize,
}

/// Confidence for a candidate without an explicit figure.
pub fn estimate_confidence(c: &CandidateContradiction) -> f64 {
    let overlap = similarity(&c.statement_a, &c.statement_b);
    let opposed = has_negation(&c.statement_a) != has_negation(&c.statement_b);
    let score = 0.3 + 0.4 * overlap + if opposed { 0.3 } else { 0.0 };
    score.clamp(0.0, 1.0)
}

type PairKey = ((String, u32), (String, u32));

fn pair_key(c: &CandidateContradiction) -> PairKey {
    let a = (normalize_key(&c.statement_a), c.page_a);
    let b = (normalize_key(&c.statement_b), c.page_b);
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Minimum token overlap for two claims to count as the same fact.
pub const CLAIM_OVERLAP: f64 = 0.5;

/// Pair claims from different chunks that share their subject but
/// disagree in negation. Each pair is ordered by page and tagged with the
/// later chunk's index.
fn cross_chunk_candidates(extractions: &[ChunkExtraction]) -> Vec<(u32, CandidateContradiction)> {
    let mut negated: Vec<(u32, &Claim)> = Vec::new();
    let mut affirmed: Vec<(u32, &Claim)> = Vec::new();
    for x in extractions {
        for claim in x.claims.iter().filter(|c| !c.statement.trim().is_empty()) {
            if has_negation(&claim.statement) {
                negated.push((x.chunk_index, claim));
            } else {
                affirmed.push((x.chunk_index, claim));
            }
        }
    }

    let mut out = Vec::new();
    for &(chunk_n, n) in &negated {
        for &(chunk_a, a) in &affirmed {
            if chunk_n == chunk_a || similarity(&n.statement, &a.statement) < CLAIM_OVERLAP {
                continue;
            }
            let (first, second) = if (a.page, chunk_a) <= (n.page, chunk_n) { (a, n) } else { (n, a) };
            out.push((
                chunk_n.max(chunk_a),
                CandidateContradiction {
                    statement_a: first.statement.clone(),
                    page_a: first.page,
                    statement_b: second.statement.clone(),
                    page_b: second.page,
                    reason: format!(
                        "pages {} and {} make opposing statements about the same fact",
                        first.page, second.page
                    ),
                    confidence: None,
                },
            ));
        }
    }
    out
}

pub fn find_contradictions(extractions: &[ChunkExtraction], min_confidence: f64) -> ContradictionReport {
    let mut report = ContradictionReport {
        chunks_analysed: extractions.len(),
        ..Default::default()
    };
    let mut by_pair: HashMap<PairKey, (usize, u32)> = HashMap::new();
    let mut kept: Vec<Contradiction> = Vec::new();

    let reported = extractions
        .iter()
        .flat_map(|x| x.candidate_contradictions.iter().map(move |c| (x.chunk_index, c.clone())));
    let paired = cross_chunk_candidates(extractions);

    for (chunk_index, c) in reported.chain(paired) {
        if c.statement_a.trim().is_empty() || c.statement_b.trim().is_empty() {
            continue;
        }
        report.candidates_considered += 1;

        let confidence = c
            .confidence
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or_else(|| estimate_confidence(&c));
        if confidence < min_confidence {
            report.below_threshold += 1;
            continue;
        }

        let key = pair_key(&c);
        match by_pair.get(&key).copied() {
            Some((slot, first_chunk)) => {
                let existing = &mut kept[slot];
                if first_chunk != chunk_index {
                    existing.corroborations += 1;
                }
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                    if !c.reason.trim().is_empty() {
                        existing.reason = c.reason.trim().to_string();
                    }
                }
            }
            None => {
                by_pair.insert(key, (kept.len(), chunk_index));
                kept.push(Contradiction {
                    statement_a: c.statement_a.trim().to_string(),
                    page_a: c.page_a,
                    statement_b: c.statement_b.trim().to_string(),
                    page_b: c.page_b,
                    reason: c.reason.trim().to_string(),
                    confidence,
                    corroborations: 0,
                });
            }
        }
    }

    kept.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.page_a.cmp(&b.page_a))
    });
    report.contradictions = kept;
    report
}
