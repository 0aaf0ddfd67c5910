//! In-memory [`Store`] implementation for tests and single-process use.
//!
//! All state sits behind one `std::sync::RwLock` so a chunk commit (upsert
//! plus counter advance) and a lease claim are each a single critical
//! section.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{CommitOutcome, Store};
use crate::models::{Bundle, BundleStatus, ChunkExtraction, IndexedPage, PageText, Scope};

struct Lease {
    id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    /// Insertion order; newest last.
    bundles: Vec<Bundle>,
    pages: HashMap<String, BTreeMap<u32, String>>,
    index: HashMap<String, Vec<IndexedPage>>,
    extractions: HashMap<String, BTreeMap<u32, ChunkExtraction>>,
    leases: HashMap<String, Lease>,
}

impl State {
    fn bundle(&self, scope: &Scope, id: &str) -> Option<&Bundle> {
        self.bundles
            .iter()
            .find(|b| b.id == id && scope.owns(&b.case_id, &b.org_id))
    }

    fn bundle_mut(&mut self, scope: &Scope, id: &str) -> Result<&mut Bundle> {
        self.bundles
            .iter_mut()
            .find(|b| b.id == id && scope.owns(&b.case_id, &b.org_id))
            .ok_or_else(|| anyhow!("Bundle not found: {}", id))
    }

    fn owns(&self, scope: &Scope, id: &str) -> bool {
        self.bundle(scope, id).is_some()
    }
}

/// In-memory store. Cheap to construct; nothing survives the process.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_bundle(&self, bundle: &Bundle) -> Result<()> {
        let mut state = self.write()?;
        if state.bundles.iter().any(|b| b.id == bundle.id) {
            bail!("Bundle already exists: {}", bundle.id);
        }
        state.bundles.push(bundle.clone());
        Ok(())
    }

    async fn get_bundle(&self, scope: &Scope, bundle_id: &str) -> Result<Option<Bundle>> {
        Ok(self.read()?.bundle(scope, bundle_id).cloned())
    }

    async fn list_bundles(&self, scope: &Scope) -> Result<Vec<Bundle>> {
        let state = self.read()?;
        let mut out: Vec<Bundle> = state
            .bundles
            .iter()
            .rev()
            .filter(|b| scope.owns(&b.case_id, &b.org_id))
            .cloned()
            .collect();
        // Stable: equal timestamps keep newest-inserted first.
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn set_status(
        &self,
        scope: &Scope,
        bundle_id: &str,
        status: BundleStatus,
        last_error: Option<&str>,
    ) -> Result<Bundle> {
        let mut state = self.write()?;
        let bundle = state.bundle_mut(scope, bundle_id)?;
        bundle.status = status;
        bundle.last_error = last_error.map(str::to_string);
        bundle.updated_at = Utc::now();
        Ok(bundle.clone())
    }

    async fn record_summary(&self, scope: &Scope, bundle_id: &str, summary: &str) -> Result<Bundle> {
        let mut state = self.write()?;
        let bundle = state.bundle_mut(scope, bundle_id)?;
        bundle.summary = Some(summary.to_string());
        bundle.status = BundleStatus::Completed;
        bundle.last_error = None;
        bundle.updated_at = Utc::now();
        Ok(bundle.clone())
    }

    async fn put_page_text(&self, scope: &Scope, bundle_id: &str, pages: &PageText) -> Result<()> {
        let mut state = self.write()?;
        if !state.owns(scope, bundle_id) {
            bail!("Bundle not found: {}", bundle_id);
        }
        if state.pages.contains_key(bundle_id) {
            bail!("Page text for bundle {} is immutable", bundle_id);
        }
        let map = pages.iter().map(|(n, t)| (n, t.to_string())).collect();
        state.pages.insert(bundle_id.to_string(), map);
        Ok(())
    }

    async fn page_range(
        &self,
        scope: &Scope,
        bundle_id: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<(u32, String)>> {
        let state = self.read()?;
        if !state.owns(scope, bundle_id) || start > end {
            return Ok(Vec::new());
        }
        Ok(state
            .pages
            .get(bundle_id)
            .map(|pages| pages.range(start..=end).map(|(n, t)| (*n, t.clone())).collect())
            .unwrap_or_default())
    }

    async fn put_search_pages(&self, scope: &Scope, bundle_id: &str, pages: &[IndexedPage]) -> Result<()> {
        let mut state = self.write()?;
        if !state.owns(scope, bundle_id) {
            bail!("Bundle not found: {}", bundle_id);
        }
        state.index.insert(bundle_id.to_string(), pages.to_vec());
        Ok(())
    }

    async fn search_pages(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<IndexedPage>> {
        let state = self.read()?;
        if !state.owns(scope, bundle_id) {
            return Ok(Vec::new());
        }
        Ok(state.index.get(bundle_id).cloned().unwrap_or_default())
    }

    async fn try_acquire_lease(
        &self,
        scope: &Scope,
        bundle_id: &str,
        lease_id: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut state = self.write()?;
        if !state.owns(scope, bundle_id) {
            return Ok(false);
        }
        if let Some(held) = state.leases.get(bundle_id) {
            if held.expires_at >= now {
                return Ok(false);
            }
        }
        state.leases.insert(
            bundle_id.to_string(),
            Lease {
                id: lease_id.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release_lease(&self, scope: &Scope, bundle_id: &str, lease_id: &str) -> Result<()> {
        let mut state = self.write()?;
        if !state.owns(scope, bundle_id) {
            return Ok(());
        }
        if state.leases.get(bundle_id).is_some_and(|l| l.id == lease_id) {
            state.leases.remove(bundle_id);
        }
        Ok(())
    }

    async fn commit_chunk(
        &self,
        scope: &Scope,
        extraction: &ChunkExtraction,
        lease_id: &str,
        renew_until: DateTime<Utc>,
    ) -> Result<CommitOutcome> {
        let mut state = self.write()?;
        let bundle_id = extraction.bundle_id.as_str();
        let current = state
            .bundle(scope, bundle_id)
            .cloned()
            .ok_or_else(|| anyhow!("Bundle not found: {}", bundle_id))?;

        let holds_lease = state.leases.get(bundle_id).is_some_and(|l| l.id == lease_id);
        if !holds_lease
            || current.processed_chunks != extraction.chunk_index
            || extraction.chunk_index >= current.total_chunks
        {
            return Ok(CommitOutcome::Superseded(current));
        }

        if let Some(lease) = state.leases.get_mut(bundle_id) {
            lease.expires_at = renew_until;
        }
        let bundle = state.bundle_mut(scope, bundle_id)?;
        bundle.processed_chunks += 1;
        if bundle.processed_chunks == bundle.total_chunks {
            bundle.status = BundleStatus::Completed;
            bundle.last_error = None;
        }
        bundle.updated_at = Utc::now();
        let updated = bundle.clone();

        state
            .extractions
            .entry(extraction.bundle_id.clone())
            .or_default()
            .insert(extraction.chunk_index, extraction.clone());
        Ok(CommitOutcome::Committed(updated))
    }

    async fn list_extractions(&self, scope: &Scope, bundle_id: &str) -> Result<Vec<ChunkExtraction>> {
        let state = self.read()?;
        if !state.owns(scope, bundle_id) {
            return Ok(Vec::new());
        }
        Ok(state
            .extractions
            .get(bundle_id)
            .map(|xs| xs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_case(&self, scope: &Scope) -> Result<u64> {
        let mut state = self.write()?;
        let doomed: Vec<String> = state
            .bundles
            .iter()
            .filter(|b| scope.owns(&b.case_id, &b.org_id))
            .map(|b| b.id.clone())
            .collect();
        state.bundles.retain(|b| !scope.owns(&b.case_id, &b.org_id));
        for id in &doomed {
            state.pages.remove(id);
            state.index.remove(id);
            state.extractions.remove(id);
            state.leases.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}
