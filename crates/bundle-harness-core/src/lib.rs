//! # Bundle Harness Core
//!
//! Shared, runtime-agnostic logic for Bundle Harness: bundle and extraction
//! models, chunk planning, the store abstraction, the chunk extractor trait,
//! derived view aggregators, per-page search, and the analysis gate.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! The processing loop, persistence backends, and outer surfaces live in
//! the `bundle-harness` application crate.

pub mod chunk;
pub mod error;
pub mod extract;
pub mod gate;
pub mod models;
pub mod search;
pub mod store;
pub mod views;

pub use error::{BundleError, BundleResult, ExtractionError, GateRejection};
pub use models::{AnalysisLevel, Bundle, BundleStatus, ChunkExtraction, Scope};
