//! Analysis gate: decides whether a view may be served for a bundle's
//! current `(analysis_level, status)`.
//!
//! | View | phase_a | full, not completed | full, completed |
//! |------|---------|---------------------|-----------------|
//! | overview, search | ok | ok | ok |
//! | toc, timeline, issues | `REQUIRES_FULL_ANALYSIS` | `REQUIRES_COMPLETION`¹ | ok |
//! | contradictions | `REQUIRES_FULL_ANALYSIS` | `REQUIRES_COMPLETION` | ok |
//!
//! ¹ Served from partial coverage when [`GatePolicy::allow_partial`] is set.
//! Contradictions never are: a pair whose second half sits in an unprocessed
//! chunk would be reported as absent.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::error::GateRejection;
use crate::models::{AnalysisLevel, BundleStatus};

/// A derived view a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Toc,
    Timeline,
    Issues,
    Contradictions,
    Overview,
    Search,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Toc => "toc",
            View::Timeline => "timeline",
            View::Issues => "issues",
            View::Contradictions => "contradictions",
            View::Overview => "overview",
            View::Search => "search",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "toc" => Ok(View::Toc),
            "timeline" => Ok(View::Timeline),
            "issues" => Ok(View::Issues),
            "contradictions" => Ok(View::Contradictions),
            "overview" => Ok(View::Overview),
            "search" => Ok(View::Search),
            other => bail!(
                "Unknown view: '{}'. Use toc, timeline, issues, contradictions, overview, or search.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatePolicy {
    /// Serve TOC, timeline, and issues before every chunk is analysed.
    pub allow_partial: bool,
}

/// Gate with the default (strict) policy.
pub fn gate(level: AnalysisLevel, status: BundleStatus, view: View) -> Result<(), GateRejection> {
    gate_with_policy(level, status, view, GatePolicy::default())
}

pub fn gate_with_policy(
    level: AnalysisLevel,
    status: BundleStatus,
    view: View,
    policy: GatePolicy,
) -> Result<(), GateRejection> {
    match view {
        View::Overview | View::Search => Ok(()),
        _ if level != AnalysisLevel::Full => Err(GateRejection::RequiresFullAnalysis),
        _ if status == BundleStatus::Completed => Ok(()),
        View::Contradictions => Err(GateRejection::RequiresCompletion),
        _ if policy.allow_partial => Ok(()),
        _ => Err(GateRejection::RequiresCompletion),
    }
}
