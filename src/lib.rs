//! # Bundle Harness
//!
//! Resumable, chunked analysis of multi-page legal court bundles.
//!
//! A bundle is analysed one of two ways: a fast single-pass **phase A**
//! summary, or a **full** analysis that walks the bundle in fixed page-range
//! chunks, a bounded batch per call, surviving restarts and extractor
//! failures. Derived views (table of contents, timeline, issues map,
//! overview, contradictions) are recomputed on demand from the committed
//! chunk extractions; page search is available as soon as a bundle exists.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌───────────────┐
//! │ CLI (bh)  │──▶│ BundleService │──▶│ ChunkProcessor │──▶ ChunkExtractor
//! │ HTTP      │   │ gate + views  │   │ lease + retry  │
//! └───────────┘   └──────┬───────┘   └───────┬───────┘
//!                        ▼                   ▼
//!                   ┌─────────────────────────────┐
//!                   │ Store (SQLite / in-memory)  │
//!                   └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`Store`](bundle_harness_core::store::Store) |
//! | [`extractor`] | Chunk extractor providers |
//! | [`processor`] | Retry, lease, and batch processing |
//! | [`progress`] | Progress reporting on stderr |
//! | [`service`] | Validated, tenant-scoped operations |
//! | [`server`] | HTTP API |
//!
//! Domain types, the analysis gate, the chunk planner, the view builders,
//! and the in-memory store live in [`bundle_harness_core`].

pub mod config;
pub mod db;
pub mod extractor;
pub mod migrate;
pub mod processor;
pub mod progress;
pub mod server;
pub mod service;
pub mod sqlite_store;

pub use bundle_harness_core;
