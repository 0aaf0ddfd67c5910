//! Core data models for bundle analysis.
//!
//! A [`Bundle`] is one analysis run over a document set, scoped to a
//! `(case_id, org_id)` pair. Full bundles carry immutable [`PageText`] and
//! accumulate one [`ChunkExtraction`] per processed chunk.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::{ChunkPlanner, ChunkRange};

/// Tenant scope carried by every store and service call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub case_id: String,
    pub org_id: String,
}

impl Scope {
    pub fn new(case_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            org_id: org_id.into(),
        }
    }

    /// True if a record owned by `case_id`/`org_id` is visible in this scope.
    pub fn owns(&self, case_id: &str, org_id: &str) -> bool {
        self.case_id == case_id && self.org_id == org_id
    }
}

/// Depth of analysis requested for a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisLevel {
    PhaseA,
    Full,
}

impl AnalysisLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisLevel::PhaseA => "phase_a",
            AnalysisLevel::Full => "full",
        }
    }
}

impl fmt::Display for AnalysisLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "phase_a" => Ok(AnalysisLevel::PhaseA),
            "full" => Ok(AnalysisLevel::Full),
            other => bail!("Unknown analysis level: '{}'", other),
        }
    }
}

/// Lifecycle state of a bundle.
///
/// `pending → processing → completed`, with `processing → failed` as the
/// only other transition. A failed full bundle may re-enter `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BundleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Processing => "processing",
            BundleStatus::Completed => "completed",
            BundleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BundleStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(BundleStatus::Pending),
            "processing" => Ok(BundleStatus::Processing),
            "completed" => Ok(BundleStatus::Completed),
            "failed" => Ok(BundleStatus::Failed),
            other => bail!("Unknown bundle status: '{}'", other),
        }
    }
}

/// One analysis run over a document set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub id: String,
    pub case_id: String,
    pub org_id: String,
    pub name: String,
    pub analysis_level: AnalysisLevel,
    pub status: BundleStatus,
    pub page_count: u32,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub processed_chunks: u32,
    pub last_error: Option<String>,
    /// Phase-A summary; `None` for full bundles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bundle {
    /// A new full bundle in `pending`, with chunk totals derived from the planner.
    pub fn new_full(scope: &Scope, name: &str, page_count: u32, chunk_size: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: scope.case_id.clone(),
            org_id: scope.org_id.clone(),
            name: name.to_string(),
            analysis_level: AnalysisLevel::Full,
            status: BundleStatus::Pending,
            page_count,
            chunk_size,
            total_chunks: ChunkPlanner::new(chunk_size).total_chunks(page_count),
            processed_chunks: 0,
            last_error: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new phase-A bundle. Phase A is single-pass, so it has no chunks.
    pub fn new_phase_a(scope: &Scope, name: &str, page_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            case_id: scope.case_id.clone(),
            org_id: scope.org_id.clone(),
            name: name.to_string(),
            analysis_level: AnalysisLevel::PhaseA,
            status: BundleStatus::Processing,
            page_count,
            chunk_size: 0,
            total_chunks: 0,
            processed_chunks: 0,
            last_error: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.case_id.clone(), self.org_id.clone())
    }

    pub fn remaining(&self) -> u32 {
        self.total_chunks.saturating_sub(self.processed_chunks)
    }

    pub fn is_complete(&self) -> bool {
        match self.analysis_level {
            AnalysisLevel::Full => self.processed_chunks >= self.total_chunks,
            AnalysisLevel::PhaseA => self.status == BundleStatus::Completed,
        }
    }
}

/// Immutable page text supplied once at full-bundle creation.
///
/// Pages are 1-based. Pages missing from the caller's input are stored as
/// empty strings so every page in `1..=page_count` has an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pages: BTreeMap<u32, String>,
}

impl PageText {
    pub fn new(page_count: u32, mut supplied: BTreeMap<u32, String>) -> Self {
        let pages = (1..=page_count)
            .map(|n| (n, supplied.remove(&n).unwrap_or_default()))
            .collect();
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, page: u32) -> Option<&str> {
        self.pages.get(&page).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.pages.iter().map(|(n, t)| (*n, t.as_str()))
    }
}

/// A heading found in a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub title: String,
    pub page: u32,
}

/// A dated (or undated) event found in a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub date: Option<String>,
    pub description: String,
    pub page: u32,
}

/// An issue raised on a page, labelled and categorised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub label: String,
    #[serde(default)]
    pub category: String,
    pub page: u32,
}

/// A pair of statements the extractor believes may conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateContradiction {
    pub statement_a: String,
    pub page_a: u32,
    pub statement_b: String,
    pub page_b: u32,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A single factual statement, kept so the contradiction finder can pair
/// it with statements from other chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub statement: String,
    pub page: u32,
}

/// Structured output of one extractor call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPayload {
    #[serde(default)]
    pub headings: Vec<Heading>,
    #[serde(default)]
    pub timeline_events: Vec<TimelineEvent>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, alias = "contradictions")]
    pub candidate_contradictions: Vec<CandidateContradiction>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl ExtractionPayload {
    /// Pin heading, event, issue, and claim pages into the chunk's page range.
    ///
    /// Contradiction pages are left as reported: a candidate may pair a
    /// statement in this chunk with one the extractor was told about earlier.
    pub fn clamp_pages(mut self, range: &ChunkRange) -> Self {
        let clamp = |p: u32| p.clamp(range.start_page, range.end_page);
        for h in &mut self.headings {
            h.page = clamp(h.page);
        }
        for e in &mut self.timeline_events {
            e.page = clamp(e.page);
        }
        for i in &mut self.issues {
            i.page = clamp(i.page);
        }
        for c in &mut self.claims {
            c.page = clamp(c.page);
        }
        self
    }
}

/// The persisted result of processing one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkExtraction {
    pub id: String,
    pub bundle_id: String,
    pub chunk_index: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub headings: Vec<Heading>,
    pub timeline_events: Vec<TimelineEvent>,
    pub issues: Vec<Issue>,
    pub candidate_contradictions: Vec<CandidateContradiction>,
    pub claims: Vec<Claim>,
    /// SHA-256 of the chunk text the extraction was computed from.
    pub text_hash: String,
    pub created_at: DateTime<Utc>,
}

impl ChunkExtraction {
    pub fn new(bundle_id: &str, range: &ChunkRange, payload: ExtractionPayload, text: &str) -> Self {
        let payload = payload.clamp_pages(range);
        Self {
            id: Uuid::new_v4().to_string(),
            bundle_id: bundle_id.to_string(),
            chunk_index: range.index,
            start_page: range.start_page,
            end_page: range.end_page,
            headings: payload.headings,
            timeline_events: payload.timeline_events,
            issues: payload.issues,
            candidate_contradictions: payload.candidate_contradictions,
            claims: payload.claims,
            text_hash: text_hash(text),
            created_at: Utc::now(),
        }
    }

    pub fn payload(&self) -> ExtractionPayload {
        ExtractionPayload {
            headings: self.headings.clone(),
            timeline_events: self.timeline_events.clone(),
            issues: self.issues.clone(),
            candidate_contradictions: self.candidate_contradictions.clone(),
            claims: self.claims.clone(),
        }
    }
}

/// One row of a bundle's search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPage {
    pub page: u32,
    pub text: String,
}

/// Hex SHA-256 of a chunk's text.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
