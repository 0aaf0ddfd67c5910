//! Chunk extraction capability.
//!
//! The processing pipeline never talks to a model directly. It calls a
//! [`ChunkExtractor`], injected at construction, so tests substitute a
//! deterministic stub and production plugs in a hosted provider.

use async_trait::async_trait;

use crate::error::ExtractionError;
use crate::models::ExtractionPayload;

/// External, fallible, possibly rate-limited text analysis.
///
/// Implementations classify their failures: [`ExtractionError::Transient`]
/// is retried by the processor with backoff, [`ExtractionError::Permanent`]
/// fails the chunk immediately.
#[async_trait]
pub trait ChunkExtractor: Send + Sync {
    /// Provider identifier (e.g. `"heuristic"`, `"openai"`).
    fn name(&self) -> &str;

    /// Extract headings, timeline events, issues, and candidate
    /// contradictions from one chunk's text.
    ///
    /// The text is a sequence of pages, each preceded by a
    /// [`page_marker`](crate::chunk::page_marker) line.
    async fn extract(&self, text: &str) -> Result<ExtractionPayload, ExtractionError>;

    /// Single-pass summary of a whole bundle's text (phase A).
    async fn summarize(&self, text: &str) -> Result<String, ExtractionError>;
}
