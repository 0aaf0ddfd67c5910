//! Storage abstraction for Bundle Harness.
//!
//! The [`Store`] trait defines every persistence operation the processing
//! loop and the bundle service need, enabling pluggable backends (SQLite in
//! the application crate, [`memory::InMemoryStore`] here).
//!
//! Every method takes a [`Scope`]. Records owned by another case or org
//! are invisible: reads return `None` or empty collections and writes
//! fail as if the bundle did not exist.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::models::{Bundle, BundleStatus, ChunkExtraction, IndexedPage, PageText, Scope};

/// Result of [`Store::commit_chunk`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The extraction was written; the advanced bundle.
    Committed(Bundle),
    /// The lease was lost or the chunk was not next; the bundle as stored.
    Superseded(Bundle),
}

impl CommitOutcome {
    pub fn bundle(&self) -> &Bundle {
        match self {
            CommitOutcome::Committed(b) | CommitOutcome::Superseded(b) => b,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, CommitOutcome::Committed(_))
    }
}

/// Abstract storage backend for bundles and their derived rows.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_bundle`](Store::insert_bundle) | Persist a new bundle record |
/// | [`get_bundle`](Store::get_bundle) | Fetch one bundle in scope |
/// | [`list_bundles`](Store::list_bundles) | All bundles of a case, newest first |
/// | [`set_status`](Store::set_status) | Move a bundle to a new status |
/// | [`record_summary`](Store::record_summary) | Complete a phase-A bundle |
/// | [`put_page_text`](Store::put_page_text) | Write immutable page text |
/// | [`page_range`](Store::page_range) | Read an inclusive page range |
/// | [`put_search_pages`](Store::put_search_pages) | Write the search index |
/// | [`search_pages`](Store::search_pages) | Read the search index |
/// | [`try_acquire_lease`](Store::try_acquire_lease) | Claim the processing lease |
/// | [`release_lease`](Store::release_lease) | Give the lease back |
/// | [`commit_chunk`](Store::commit_chunk) | Upsert an extraction, advance progress, renew the lease |
/// | [`list_extractions`](Store::list_extractions) | Completed extractions in chunk order |
/// | [`delete_case`](Store::delete_case) | Cascade-delete a case |
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_bundle(&self, bundle: &Bundle) -> Result<()>;

    async fn get_bundle(&self, scope: &Scope, bundle_id: &str) -> Result<Option<Bundle>>;

    /// Every bundle of the case, most recently created first.
    async fn list_bundles(&self, scope: &Scope) -> Result<Vec<Bundle>>;

    /// Set `status` and `last_error` and return the updated record.
    async fn set_status(
        &self,
        scope: &Scope,
        bundle_id: &str,
        status: BundleStatus,
        last_error: Option<&str>,
    ) -> Result<Bundle>;

    /// Store a phase-A summary and mark the bundle completed.
    async fn record_summary(&self, scope: &Scope, bundle_id: &str, summary: &str) -> Result<Bundle>;

    async fn put_page_text(&self, scope: &Scope, bundle_id: &str, pages: &PageText) -> Result<()>;

    /// Pages `start..=end` in page order.
    async fn page_range(
        &self,
        scope: &Scope,
        bundle_id: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<(u32, String)>>;

    async fn put_search_pages(&self, scope: &Scope, bundle_id: &str, pages: &[IndexedPage]) -> Result<()>;

    async fn search_pages(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<IndexedPage>>;

    /// Claim the bundle's processing lease.
    ///
    /// Succeeds only if no lease is held or the held lease expired before
    /// `now`. The check and the claim are one atomic step.
    async fn try_acquire_lease(
        &self,
        scope: &Scope,
        bundle_id: &str,
        lease_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool>;

    /// Release the lease if `lease_id` still holds it. Releasing a lease
    /// that was lost to expiry is a no-op.
    async fn release_lease(&self, scope: &Scope, bundle_id: &str, lease_id: &str) -> Result<()>;

    /// Atomically upsert `extraction`, advance `processed_chunks`, and
    /// extend the lease held by `lease_id` to `renew_until`.
    ///
    /// Nothing is written, and [`CommitOutcome::Superseded`] carries the
    /// current record, when `lease_id` no longer holds the lease or
    /// `extraction.chunk_index` is not the bundle's next chunk. When the
    /// last chunk commits the bundle becomes `completed` and `last_error`
    /// clears. A bundle outside `scope` is an error.
    async fn commit_chunk(
        &self,
        scope: &Scope,
        extraction: &ChunkExtraction,
        lease_id: &str,
        renew_until: DateTime<Utc>,
    ) -> Result<CommitOutcome>;

    /// Extractions of a bundle, ascending by chunk index.
    async fn list_extractions(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<ChunkExtraction>>;

    /// Delete every bundle of the case and all rows hanging off them.
    /// Returns the number of bundles removed.
    async fn delete_case(&self, scope: &Scope) -> Result<u64>;
}
