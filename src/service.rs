//! Bundle operations.
//!
//! [`BundleService`] is the single entry point the CLI and the HTTP server
//! call. It validates input, enforces tenant scoping (every lookup is by
//! `(case_id, org_id)`; a foreign bundle is indistinguishable from a
//! missing one), and wires the store, the extractor, the chunk processor,
//! the analysis gate, and the view builders together.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`start_phase_a`](BundleService::start_phase_a) | One-pass summary of a bundle |
//! | [`start_full`](BundleService::start_full) | Create a chunked bundle and run the bootstrap batch |
//! | [`continue_processing`](BundleService::continue_processing) | Advance a full bundle |
//! | [`status`](BundleService::status) | Latest bundle of a case |
//! | [`view`](BundleService::view) | Gated derived view |
//! | [`search`](BundleService::search) | Per-page text search |
//! | [`delete_case`](BundleService::delete_case) | Cascade-delete a case |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use bundle_harness_core::error::{BundleError, BundleResult};
use bundle_harness_core::extract::ChunkExtractor;
use bundle_harness_core::gate::{gate_with_policy, GatePolicy, View};
use bundle_harness_core::models::{AnalysisLevel, Bundle, BundleStatus, PageText, Scope};
use bundle_harness_core::search::{
    index_page_text, index_phase_a_text, search_pages, validate_query, SearchHit, SearchParams, PAGE_BREAK,
};
use bundle_harness_core::store::Store;
use bundle_harness_core::views::{
    build_issues_map, build_overview, build_timeline, build_toc, find_contradictions, ContradictionReport,
    IssuesMap, Overview, TableOfContents, Timeline, ViewSettings,
};

use crate::config::Config;
use crate::db;
use crate::extractor::create_extractor;
use crate::migrate::migrate_pool;
use crate::sqlite_store::SqliteStore;
use crate::processor::{with_retry, ChunkProcessor, ContinueOutcome, Exhausted, ProcessorSettings};
use crate::progress::ProgressReporter;

/// Body of a phase-A request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPhaseA {
    #[serde(default)]
    pub bundle_name: Option<String>,
    #[serde(default)]
    pub text_content: String,
    /// Defaults to the number of form-feed separated pages in the text.
    #[serde(default)]
    pub page_count: Option<u32>,
}

/// Body of a full-analysis request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartFull {
    #[serde(default)]
    pub bundle_name: Option<String>,
    #[serde(default)]
    pub page_count: i64,
    #[serde(default)]
    pub text_content_by_page: BTreeMap<u32, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseAOutcome {
    pub summary: String,
    pub bundle: Bundle,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub bundle: Option<Bundle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
}

/// A derived view, serialized as the view itself.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ViewPayload {
    Toc(TableOfContents),
    Timeline(Timeline),
    Issues(IssuesMap),
    Contradictions(ContradictionReport),
    Overview { overview: Overview },
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub chunk_size: u32,
    pub bootstrap_batch: u32,
    pub processor: ProcessorSettings,
    pub views: ViewSettings,
    pub search: SearchParams,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            bootstrap_batch: config.processing.bootstrap_batch,
            processor: ProcessorSettings::from_config(&config.processing),
            views: config.views.settings(),
            search: config.search.params(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::with_db_path("bundles.sqlite"))
    }
}

pub struct BundleService {
    store: Arc<dyn Store>,
    extractor: Arc<dyn ChunkExtractor>,
    processor: ChunkProcessor,
    settings: ServiceSettings,
}

impl BundleService {
    pub fn new(store: Arc<dyn Store>, extractor: Arc<dyn ChunkExtractor>, settings: ServiceSettings) -> Self {
        let processor = ChunkProcessor::new(store.clone(), extractor.clone(), settings.processor.clone());
        Self {
            store,
            extractor,
            processor,
            settings,
        }
    }

    /// Open the SQLite database named by `config`, apply migrations, and
    /// build the configured extractor.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate_pool(&pool).await?;
        let extractor: Arc<dyn ChunkExtractor> = Arc::from(create_extractor(&config.extractor)?);
        info!(db = %config.db.path.display(), extractor = extractor.name(), "bundle service ready");
        Ok(Self::new(
            Arc::new(SqliteStore::new(pool)),
            extractor,
            ServiceSettings::from_config(config),
        ))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Summarize a whole bundle in one extractor call.
    ///
    /// The bundle is recorded before the call, so a failure leaves a
    /// `failed` bundle with `last_error` behind and returns the error.
    pub async fn start_phase_a(&self, scope: &Scope, req: StartPhaseA) -> BundleResult<PhaseAOutcome> {
        let name = require_name(req.bundle_name.as_deref())?;
        if req.text_content.trim().is_empty() {
            return Err(BundleError::validation("textContent must not be empty"));
        }
        let index = index_phase_a_text(&req.text_content);
        let page_count = match req.page_count {
            Some(0) => return Err(BundleError::validation("pageCount must be at least 1")),
            Some(n) => n,
            None => index.len() as u32,
        };

        let bundle = Bundle::new_phase_a(scope, name, page_count);
        self.store.insert_bundle(&bundle).await?;
        self.store.put_search_pages(scope, &bundle.id, &index).await?;
        info!(bundle_id = %bundle.id, case_id = %scope.case_id, page_count, "phase-A bundle created");

        let summarized = with_retry(
            &self.settings.processor.retry,
            || self.extractor.summarize(&req.text_content),
            |attempt, delay, error| {
                warn!(bundle_id = %bundle.id, attempt, delay_ms = delay.as_millis() as u64, error = %error, "summary failed; retrying");
            },
        )
        .await;

        match summarized {
            Ok(summary) => {
                let bundle = self.store.record_summary(scope, &bundle.id, &summary).await?;
                Ok(PhaseAOutcome { summary, bundle })
            }
            Err(Exhausted { attempts, error }) => {
                let message = format!("summary failed after {} attempt(s): {}", attempts, error);
                self.store
                    .set_status(scope, &bundle.id, BundleStatus::Failed, Some(&message))
                    .await?;
                warn!(bundle_id = %bundle.id, error = %message, "phase-A bundle failed");
                Err(BundleError::Extraction(error))
            }
        }
    }

    /// Create a full bundle, store its pages and search index, and run the
    /// bootstrap batch.
    pub async fn start_full(
        &self,
        scope: &Scope,
        req: StartFull,
        progress: &dyn ProgressReporter,
    ) -> BundleResult<ContinueOutcome> {
        let name = require_name(req.bundle_name.as_deref())?;
        if req.page_count < 1 {
            return Err(BundleError::validation("pageCount must be at least 1"));
        }
        let page_count = u32::try_from(req.page_count)
            .map_err(|_| BundleError::validation("pageCount is too large"))?;
        if let Some(bad) = req
            .text_content_by_page
            .keys()
            .find(|p| **p == 0 || **p > page_count)
        {
            return Err(BundleError::validation(format!(
                "textContentByPage has page {} outside 1..={}",
                bad, page_count
            )));
        }

        let pages = PageText::new(page_count, req.text_content_by_page);
        let bundle = Bundle::new_full(scope, name, page_count, self.settings.chunk_size);
        self.store.insert_bundle(&bundle).await?;
        self.store.put_page_text(scope, &bundle.id, &pages).await?;
        self.store
            .put_search_pages(scope, &bundle.id, &index_page_text(&pages))
            .await?;
        info!(
            bundle_id = %bundle.id,
            case_id = %scope.case_id,
            page_count,
            total_chunks = bundle.total_chunks,
            "full bundle created"
        );

        if self.settings.bootstrap_batch == 0 {
            return Ok(ContinueOutcome {
                remaining: bundle.remaining(),
                is_complete: bundle.is_complete(),
                processed: 0,
                bundle,
            });
        }
        self.processor
            .continue_processing(scope, &bundle.id, Some(self.settings.bootstrap_batch), progress)
            .await
    }

    pub async fn continue_processing(
        &self,
        scope: &Scope,
        bundle_id: &str,
        max_chunks: Option<u32>,
        progress: &dyn ProgressReporter,
    ) -> BundleResult<ContinueOutcome> {
        self.processor
            .continue_processing(scope, bundle_id, max_chunks, progress)
            .await
    }

    /// The most recently created bundle of the case, if any.
    pub async fn status(&self, scope: &Scope) -> BundleResult<StatusResponse> {
        let bundle = self.store.list_bundles(scope).await?.into_iter().next();
        Ok(StatusResponse { bundle })
    }

    async fn load(&self, scope: &Scope, bundle_id: &str) -> BundleResult<Bundle> {
        self.store
            .get_bundle(scope, bundle_id)
            .await?
            .ok_or_else(|| BundleError::bundle_not_found(bundle_id))
    }

    /// Build a derived view after checking the analysis gate.
    pub async fn view(&self, scope: &Scope, bundle_id: &str, view: View) -> BundleResult<ViewPayload> {
        let bundle = self.load(scope, bundle_id).await?;
        let policy = GatePolicy {
            allow_partial: self.settings.views.allow_partial,
        };
        gate_with_policy(bundle.analysis_level, bundle.status, view, policy).map_err(BundleError::Gate)?;

        let extractions = self.store.list_extractions(scope, bundle_id).await?;
        let views = &self.settings.views;
        let payload = match view {
            View::Toc => ViewPayload::Toc(build_toc(&extractions)),
            View::Timeline => ViewPayload::Timeline(build_timeline(&extractions, views.timeline_similarity)),
            View::Issues => ViewPayload::Issues(build_issues_map(&extractions)),
            View::Contradictions => ViewPayload::Contradictions(find_contradictions(
                &extractions,
                views.contradiction_min_confidence,
            )),
            View::Overview => {
                let phase_a = self.latest_phase_a_summary(scope, &bundle).await?;
                ViewPayload::Overview {
                    overview: build_overview(&bundle, &extractions, phase_a.as_deref(), views),
                }
            }
            View::Search => return Err(BundleError::validation("search is not a view; use the search operation")),
        };
        Ok(payload)
    }

    async fn latest_phase_a_summary(&self, scope: &Scope, bundle: &Bundle) -> BundleResult<Option<String>> {
        if bundle.analysis_level != AnalysisLevel::Full {
            return Ok(None);
        }
        Ok(self
            .store
            .list_bundles(scope)
            .await?
            .into_iter()
            .filter(|b| b.analysis_level == AnalysisLevel::PhaseA)
            .find_map(|b| b.summary))
    }

    pub async fn search(&self, scope: &Scope, bundle_id: &str, query: &str) -> BundleResult<SearchResponse> {
        self.load(scope, bundle_id).await?;
        let trimmed = validate_query(query)?.to_string();
        let pages = self.store.search_pages(scope, bundle_id).await?;
        let results = search_pages(&pages, &trimmed, &self.settings.search)?;
        Ok(SearchResponse {
            query: trimmed,
            results,
        })
    }

    pub async fn delete_case(&self, scope: &Scope) -> BundleResult<u64> {
        let deleted = self.store.delete_case(scope).await?;
        info!(case_id = %scope.case_id, deleted, "case deleted");
        Ok(deleted)
    }
}

fn require_name(name: Option<&str>) -> BundleResult<&str> {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => Ok(n),
        _ => Err(BundleError::validation("bundleName is required")),
    }
}

/// Split text on form feeds into a page map, 1-based.
pub fn pages_from_text(text: &str) -> BTreeMap<u32, String> {
    text.split(PAGE_BREAK)
        .enumerate()
        .map(|(i, t)| (i as u32 + 1, t.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_trimmed_and_required() {
        assert_eq!(require_name(Some("  Trial bundle ")).unwrap(), "Trial bundle");
        assert!(require_name(Some("   ")).is_err());
        assert!(require_name(None).is_err());
    }

    #[test]
    fn pages_from_text_splits_on_form_feed() {
        let pages = pages_from_text("one\u{c}two\u{c}three");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[&2], "two");
    }

    #[test]
    fn full_request_accepts_string_page_keys() {
        let req: StartFull = serde_json::from_str(
            r#"{"bundleName":"B","pageCount":2,"textContentByPage":{"1":"a","2":"b"}}"#,
        )
        .unwrap();
        assert_eq!(req.text_content_by_page.get(&2).map(String::as_str), Some("b"));
    }
}
