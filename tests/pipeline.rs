//! End-to-end pipeline tests against the in-memory store.
//!
//! A scripted extractor stands in for the model: it reports one heading,
//! one dated event, and one issue per page, counts calls, and can be told
//! to fail (or stall) on the chunk that starts at a given page.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use bundle_harness::processor::{ProcessorSettings, RetryPolicy};
use bundle_harness::progress::NoProgress;
use bundle_harness::service::{BundleService, ServiceSettings, StartFull, StartPhaseA, ViewPayload};
use bundle_harness_core::chunk::parse_page_marker;
use bundle_harness_core::error::{BundleError, ExtractionError, GateRejection};
use bundle_harness_core::extract::ChunkExtractor;
use bundle_harness_core::gate::View;
use bundle_harness_core::models::{
    BundleStatus, ExtractionPayload, Heading, Issue, Scope, TimelineEvent,
};
use bundle_harness_core::store::memory::InMemoryStore;
use bundle_harness_core::store::Store;
use bundle_harness_core::views::ViewSettings;
use bundle_harness_core::search::SearchParams;

#[derive(Clone, Copy)]
enum Failure {
    /// Transient failures for the first `n` attempts, then success.
    TransientTimes(u32),
    AlwaysTransient,
    Permanent,
}

#[derive(Default)]
struct ScriptedExtractor {
    calls: AtomicU32,
    /// First page of each chunk passed to `extract`, in call order.
    seen: Mutex<Vec<u32>>,
    fail_at: Option<(u32, Failure)>,
    failures_served: AtomicU32,
    delay: Option<Duration>,
    fail_summary: bool,
}

impl ScriptedExtractor {
    fn failing_at(page: u32, failure: Failure) -> Self {
        Self {
            fail_at: Some((page, failure)),
            ..Default::default()
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<u32> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChunkExtractor for ScriptedExtractor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn extract(&self, text: &str) -> Result<ExtractionPayload, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pages: Vec<u32> = text.lines().filter_map(parse_page_marker).collect();
        let first = pages.first().copied().unwrap_or(0);
        self.seen.lock().unwrap().push(first);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((page, failure)) = self.fail_at {
            if page == first {
                match failure {
                    Failure::Permanent => {
                        return Err(ExtractionError::Permanent("malformed chunk".into()))
                    }
                    Failure::AlwaysTransient => {
                        return Err(ExtractionError::Transient("rate limited".into()))
                    }
                    Failure::TransientTimes(n) => {
                        if self.failures_served.fetch_add(1, Ordering::SeqCst) < n {
                            return Err(ExtractionError::Transient("rate limited".into()));
                        }
                    }
                }
            }
        }

        Ok(ExtractionPayload {
            headings: pages
                .iter()
                .map(|p| Heading {
                    title: format!("Section {}", p),
                    page: *p,
                })
                .collect(),
            timeline_events: pages
                .iter()
                .map(|p| TimelineEvent {
                    date: Some(format!("2020-01-{:02}", p)),
                    description: format!("Event recorded on page {}", p),
                    page: *p,
                })
                .collect(),
            issues: pages
                .iter()
                .map(|p| Issue {
                    label: "Breach of contract".to_string(),
                    category: if p % 2 == 0 { "Liability" } else { "Quantum" }.to_string(),
                    page: *p,
                })
                .collect(),
            candidate_contradictions: Vec::new(),
            claims: Vec::new(),
        })
    }

    async fn summarize(&self, text: &str) -> Result<String, ExtractionError> {
        if self.fail_summary {
            return Err(ExtractionError::Permanent("summary refused".into()));
        }
        Ok(format!("A bundle of {} characters about a disputed contract.", text.len()))
    }
}

fn settings(bootstrap_batch: u32) -> ServiceSettings {
    ServiceSettings {
        chunk_size: 3,
        bootstrap_batch,
        processor: ProcessorSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            lease_ttl: chrono::Duration::seconds(60),
            default_batch: 3,
            max_batch: 25,
        },
        views: ViewSettings::default(),
        search: SearchParams::default(),
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    extractor: Arc<ScriptedExtractor>,
    service: BundleService,
}

fn harness(extractor: ScriptedExtractor, bootstrap_batch: u32) -> Harness {
    harness_with(extractor, settings(bootstrap_batch))
}

fn harness_with(extractor: ScriptedExtractor, settings: ServiceSettings) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let extractor = Arc::new(extractor);
    let service = BundleService::new(store.clone(), extractor.clone(), settings);
    Harness {
        store,
        extractor,
        service,
    }
}

fn scope() -> Scope {
    Scope::new("case-1", "org-1")
}

fn full_request(pages: u32) -> StartFull {
    let text: BTreeMap<u32, String> = (1..=pages)
        .map(|p| (p, format!("Page {} of the claimant's witness statement.", p)))
        .collect();
    StartFull {
        bundle_name: Some("Trial bundle".to_string()),
        page_count: pages as i64,
        text_content_by_page: text,
    }
}

async fn create_full(h: &Harness, pages: u32) -> String {
    h.service
        .start_full(&scope(), full_request(pages), &NoProgress)
        .await
        .unwrap()
        .bundle
        .id
}

async fn chunk_indices(h: &Harness, bundle_id: &str) -> Vec<u32> {
    h.store
        .list_extractions(&scope(), bundle_id)
        .await
        .unwrap()
        .iter()
        .map(|x| x.chunk_index)
        .collect()
}

#[tokio::test]
async fn scenario_a_two_batches_complete_four_chunks() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 10).await;

    let first = h.service.continue_processing(&scope(), &id, Some(3), &NoProgress).await.unwrap();
    assert_eq!(first.bundle.total_chunks, 4);
    assert_eq!(first.processed, 3);
    assert_eq!(first.remaining, 1);
    assert!(!first.is_complete);
    assert_eq!(first.bundle.status, BundleStatus::Processing);

    let second = h.service.continue_processing(&scope(), &id, Some(3), &NoProgress).await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.remaining, 0);
    assert!(second.is_complete);
    assert_eq!(second.bundle.status, BundleStatus::Completed);

    assert_eq!(h.extractor.seen(), vec![1, 4, 7, 10]);
}

#[tokio::test]
async fn scenario_a_with_default_settings_counts_the_bootstrap_chunk() {
    let h = harness_with(ScriptedExtractor::default(), ServiceSettings::default());

    let created = h.service.start_full(&scope(), full_request(10), &NoProgress).await.unwrap();
    assert_eq!(created.bundle.total_chunks, 4);
    assert_eq!(created.processed, 1);
    assert_eq!(created.remaining, 3);

    let id = created.bundle.id;
    let first = h.service.continue_processing(&scope(), &id, Some(3), &NoProgress).await.unwrap();
    assert_eq!(first.processed, 3);
    assert_eq!(first.remaining, 0);
    assert!(first.is_complete);

    let again = h.service.continue_processing(&scope(), &id, Some(3), &NoProgress).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(h.extractor.seen(), vec![1, 4, 7, 10]);
}

#[tokio::test]
async fn continuing_a_complete_bundle_is_idempotent() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 10).await;
    h.service.continue_processing(&scope(), &id, Some(10), &NoProgress).await.unwrap();

    for _ in 0..3 {
        let again = h.service.continue_processing(&scope(), &id, Some(3), &NoProgress).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.remaining, 0);
        assert!(again.is_complete);
        assert_eq!(again.bundle.status, BundleStatus::Completed);
    }
    assert_eq!(h.extractor.calls(), 4);
}

#[tokio::test]
async fn scenario_b_phase_a_overview_is_immediate_and_toc_is_gated() {
    let h = harness(ScriptedExtractor::default(), 0);
    let outcome = h
        .service
        .start_phase_a(
            &scope(),
            StartPhaseA {
                bundle_name: Some("Quick look".to_string()),
                text_content: "The claimant alleges breach.\u{c}The defendant denies it.".to_string(),
                page_count: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.bundle.status, BundleStatus::Completed);
    assert_eq!(outcome.bundle.page_count, 2);
    let id = outcome.bundle.id.clone();

    match h.service.view(&scope(), &id, View::Overview).await.unwrap() {
        ViewPayload::Overview { overview } => {
            assert_eq!(overview.narrative, outcome.summary);
            assert!(overview.coverage.is_none());
        }
        other => panic!("expected overview, got {:?}", other),
    }

    let err = h.service.view(&scope(), &id, View::Toc).await.unwrap_err();
    assert!(matches!(err, BundleError::Gate(GateRejection::RequiresFullAnalysis)));

    let hits = h.service.search(&scope(), &id, "denies").await.unwrap();
    assert_eq!(hits.results.len(), 1);
    assert_eq!(hits.results[0].page, 2);
}

#[tokio::test]
async fn phase_a_failure_marks_bundle_failed() {
    let h = harness(
        ScriptedExtractor {
            fail_summary: true,
            ..Default::default()
        },
        0,
    );
    let err = h
        .service
        .start_phase_a(
            &scope(),
            StartPhaseA {
                bundle_name: Some("Quick look".to_string()),
                text_content: "Some text".to_string(),
                page_count: Some(1),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::Extraction(_)));

    let status = h.service.status(&scope()).await.unwrap();
    let bundle = status.bundle.unwrap();
    assert_eq!(bundle.status, BundleStatus::Failed);
    assert!(bundle.last_error.unwrap().contains("summary refused"));
}

#[tokio::test]
async fn scenario_c_failed_chunk_keeps_partial_overview() {
    let h = harness(ScriptedExtractor::failing_at(7, Failure::AlwaysTransient), 0);
    let id = create_full(&h, 10).await;

    let outcome = h.service.continue_processing(&scope(), &id, Some(4), &NoProgress).await.unwrap();
    assert_eq!(outcome.processed, 2);
    assert_eq!(outcome.bundle.status, BundleStatus::Failed);
    assert_eq!(outcome.bundle.processed_chunks, 2);
    assert!(outcome.bundle.last_error.is_some());

    // Chunk 2 was tried three times; chunk 3 never.
    assert_eq!(h.extractor.seen(), vec![1, 4, 7, 7, 7]);
    assert_eq!(chunk_indices(&h, &id).await, vec![0, 1]);

    match h.service.view(&scope(), &id, View::Overview).await.unwrap() {
        ViewPayload::Overview { overview } => {
            let coverage = overview.coverage.unwrap();
            assert_eq!(coverage.label, "2/4 chunks analysed");
            assert!(overview.is_partial);
        }
        other => panic!("expected overview, got {:?}", other),
    }

    let err = h.service.view(&scope(), &id, View::Timeline).await.unwrap_err();
    assert!(matches!(err, BundleError::Gate(GateRejection::RequiresCompletion)));
}

#[tokio::test]
async fn permanent_failure_is_not_retried() {
    let h = harness(ScriptedExtractor::failing_at(4, Failure::Permanent), 0);
    let id = create_full(&h, 10).await;

    let outcome = h.service.continue_processing(&scope(), &id, Some(4), &NoProgress).await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.bundle.status, BundleStatus::Failed);
    assert_eq!(h.extractor.seen(), vec![1, 4]);
}

#[tokio::test]
async fn failed_bundle_resumes_from_failed_chunk() {
    // Three failures exhaust the first call; the fourth attempt succeeds.
    let h = harness(ScriptedExtractor::failing_at(7, Failure::TransientTimes(3)), 0);
    let id = create_full(&h, 10).await;

    let failed = h.service.continue_processing(&scope(), &id, Some(4), &NoProgress).await.unwrap();
    assert_eq!(failed.bundle.status, BundleStatus::Failed);

    let resumed = h.service.continue_processing(&scope(), &id, Some(4), &NoProgress).await.unwrap();
    assert_eq!(resumed.processed, 2);
    assert!(resumed.is_complete);
    assert_eq!(resumed.bundle.status, BundleStatus::Completed);
    assert_eq!(resumed.bundle.last_error, None);
    assert_eq!(chunk_indices(&h, &id).await, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn retried_chunk_leaves_one_extraction() {
    let h = harness(ScriptedExtractor::failing_at(4, Failure::TransientTimes(2)), 0);
    let id = create_full(&h, 10).await;

    let outcome = h.service.continue_processing(&scope(), &id, Some(10), &NoProgress).await.unwrap();
    assert!(outcome.is_complete);
    assert_eq!(h.extractor.calls(), 6);
    assert_eq!(chunk_indices(&h, &id).await, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn scenario_d_concurrent_continue_runs_once() {
    let h = harness(
        ScriptedExtractor {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        },
        0,
    );
    let id = create_full(&h, 10).await;
    assert_eq!(
        h.store.get_bundle(&scope(), &id).await.unwrap().unwrap().status,
        BundleStatus::Pending
    );

    let s = scope();
    let (a, b) = tokio::join!(
        h.service.continue_processing(&s, &id, Some(4), &NoProgress),
        h.service.continue_processing(&s, &id, Some(4), &NoProgress),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut processed = [a.processed, b.processed];
    processed.sort_unstable();
    assert_eq!(processed, [0, 4]);
    assert_eq!(h.extractor.calls(), 4);
    assert_eq!(h.extractor.seen(), vec![1, 4, 7, 10]);

    let bundle = h.store.get_bundle(&scope(), &id).await.unwrap().unwrap();
    assert_eq!(bundle.processed_chunks, 4);
    assert_eq!(bundle.status, BundleStatus::Completed);
}

#[tokio::test]
async fn long_batch_keeps_its_lease_past_the_ttl() {
    let mut short_lease = settings(0);
    short_lease.processor.lease_ttl = chrono::Duration::milliseconds(200);
    let h = harness_with(
        ScriptedExtractor {
            delay: Some(Duration::from_millis(60)),
            ..Default::default()
        },
        short_lease,
    );
    let id = create_full(&h, 18).await;

    let s = scope();
    let (first, second) = tokio::join!(
        h.service.continue_processing(&s, &id, Some(6), &NoProgress),
        async {
            tokio::time::sleep(Duration::from_millis(250)).await;
            h.service.continue_processing(&s, &id, Some(6), &NoProgress).await
        },
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(second.processed, 0);
    assert!(!second.is_complete);
    assert_eq!(first.processed, 6);
    assert!(first.is_complete);
    assert_eq!(h.extractor.calls(), 6);
    assert_eq!(chunk_indices(&h, &id).await, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn batch_that_lost_its_lease_commits_nothing() {
    let mut short_lease = settings(0);
    short_lease.processor.lease_ttl = chrono::Duration::milliseconds(50);
    let h = harness_with(
        ScriptedExtractor {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        },
        short_lease,
    );
    let id = create_full(&h, 6).await;

    let s = scope();
    let (stale, claimed) = tokio::join!(
        h.service.continue_processing(&s, &id, Some(2), &NoProgress),
        async {
            tokio::time::sleep(Duration::from_millis(70)).await;
            h.store
                .try_acquire_lease(&s, &id, "other-worker", chrono::Utc::now(), chrono::Duration::seconds(30))
                .await
                .unwrap()
        },
    );
    assert!(claimed);

    let stale = stale.unwrap();
    assert_eq!(stale.processed, 0);
    assert_eq!(stale.bundle.processed_chunks, 0);
    assert_eq!(h.extractor.calls(), 1);
    assert!(chunk_indices(&h, &id).await.is_empty());

    h.store.release_lease(&s, &id, "other-worker").await.unwrap();
    let resumed = h.service.continue_processing(&s, &id, Some(2), &NoProgress).await.unwrap();
    assert_eq!(resumed.processed, 2);
    assert!(resumed.is_complete);
}

#[tokio::test]
async fn progress_is_monotonic_and_a_prefix() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 20).await;

    let mut last = 0;
    for batch in [1, 2, 1, 5, 3] {
        let outcome = h.service.continue_processing(&scope(), &id, Some(batch), &NoProgress).await.unwrap();
        let processed = outcome.bundle.processed_chunks;
        assert!(processed >= last);
        assert!(processed <= outcome.bundle.total_chunks);
        assert_eq!(chunk_indices(&h, &id).await, (0..processed).collect::<Vec<_>>());
        last = processed;
    }
    assert_eq!(last, 7);
}

#[tokio::test]
async fn start_full_runs_the_bootstrap_batch() {
    let h = harness(ScriptedExtractor::default(), 1);
    let outcome = h.service.start_full(&scope(), full_request(10), &NoProgress).await.unwrap();
    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.remaining, 3);
    assert_eq!(outcome.bundle.status, BundleStatus::Processing);
}

#[tokio::test]
async fn invalid_requests_have_no_side_effects() {
    let h = harness(ScriptedExtractor::default(), 1);

    let mut zero_pages = full_request(3);
    zero_pages.page_count = 0;
    zero_pages.text_content_by_page.clear();
    let err = h.service.start_full(&scope(), zero_pages, &NoProgress).await.unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));

    let mut unnamed = full_request(3);
    unnamed.bundle_name = Some("  ".to_string());
    let err = h.service.start_full(&scope(), unnamed, &NoProgress).await.unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));

    let mut stray_page = full_request(3);
    stray_page.text_content_by_page.insert(9, "beyond the end".to_string());
    let err = h.service.start_full(&scope(), stray_page, &NoProgress).await.unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));

    let err = h
        .service
        .start_phase_a(&scope(), StartPhaseA::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));

    assert!(h.service.status(&scope()).await.unwrap().bundle.is_none());
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn zero_max_chunks_is_rejected() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 10).await;
    let err = h.service.continue_processing(&scope(), &id, Some(0), &NoProgress).await.unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));
}

#[tokio::test]
async fn gate_opens_on_completion() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 6).await;

    for view in [View::Toc, View::Timeline, View::Issues, View::Contradictions] {
        let err = h.service.view(&scope(), &id, view).await.unwrap_err();
        assert!(matches!(err, BundleError::Gate(GateRejection::RequiresCompletion)), "{}", view);
    }
    assert!(h.service.view(&scope(), &id, View::Overview).await.is_ok());
    assert!(h.service.search(&scope(), &id, "witness").await.is_ok());

    h.service.continue_processing(&scope(), &id, Some(5), &NoProgress).await.unwrap();

    match h.service.view(&scope(), &id, View::Toc).await.unwrap() {
        ViewPayload::Toc(toc) => {
            let titles: Vec<&str> = toc.entries.iter().map(|e| e.title.as_str()).collect();
            assert_eq!(titles.len(), 6);
            assert_eq!(titles[0], "Section 1");
            assert_eq!(titles[5], "Section 6");
        }
        other => panic!("expected toc, got {:?}", other),
    }
    match h.service.view(&scope(), &id, View::Timeline).await.unwrap() {
        ViewPayload::Timeline(timeline) => {
            assert_eq!(timeline.dated_count, 6);
            let pages: Vec<u32> = timeline.events.iter().map(|e| e.page).collect();
            assert_eq!(pages, vec![1, 2, 3, 4, 5, 6]);
        }
        other => panic!("expected timeline, got {:?}", other),
    }
    assert!(h.service.view(&scope(), &id, View::Issues).await.is_ok());
    assert!(h.service.view(&scope(), &id, View::Contradictions).await.is_ok());
}

#[tokio::test]
async fn search_query_length_boundary() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 4).await;

    let err = h.service.search(&scope(), &id, "a").await.unwrap_err();
    assert!(matches!(err, BundleError::Validation(_)));

    let two = h.service.search(&scope(), &id, "of").await.unwrap();
    assert_eq!(two.query, "of");
    assert_eq!(two.results.len(), 4);
}

#[tokio::test]
async fn foreign_scope_sees_nothing() {
    let h = harness(ScriptedExtractor::default(), 0);
    let id = create_full(&h, 6).await;

    for foreign in [Scope::new("case-1", "org-2"), Scope::new("case-2", "org-1")] {
        let err = h
            .service
            .continue_processing(&foreign, &id, Some(1), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));

        let err = h.service.view(&foreign, &id, View::Overview).await.unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));

        let err = h.service.search(&foreign, &id, "page").await.unwrap_err();
        assert!(matches!(err, BundleError::NotFound(_)));

        assert!(h.service.status(&foreign).await.unwrap().bundle.is_none());
    }
    assert_eq!(h.extractor.calls(), 0);
}

#[tokio::test]
async fn delete_case_cascades_within_scope() {
    let h = harness(ScriptedExtractor::default(), 1);
    let first = create_full(&h, 6).await;
    let second = create_full(&h, 3).await;
    let other_case = Scope::new("case-2", "org-1");
    h.service
        .start_full(&other_case, full_request(3), &NoProgress)
        .await
        .unwrap();

    assert_eq!(h.service.delete_case(&scope()).await.unwrap(), 2);
    assert!(h.service.status(&scope()).await.unwrap().bundle.is_none());
    assert!(h.store.list_extractions(&scope(), &first).await.unwrap().is_empty());
    assert!(h.store.search_pages(&scope(), &second).await.unwrap().is_empty());

    let err = h
        .service
        .continue_processing(&scope(), &first, Some(1), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::NotFound(_)));

    assert!(h.service.status(&other_case).await.unwrap().bundle.is_some());
}

#[tokio::test]
async fn full_overview_leads_with_phase_a_summary() {
    let h = harness(ScriptedExtractor::default(), 0);
    let phase_a = h
        .service
        .start_phase_a(
            &scope(),
            StartPhaseA {
                bundle_name: Some("Quick look".to_string()),
                text_content: "Claim for unpaid invoices.".to_string(),
                page_count: Some(1),
            },
        )
        .await
        .unwrap();
    let id = create_full(&h, 6).await;
    h.service.continue_processing(&scope(), &id, Some(2), &NoProgress).await.unwrap();

    match h.service.view(&scope(), &id, View::Overview).await.unwrap() {
        ViewPayload::Overview { overview } => {
            assert!(overview.narrative.starts_with(&phase_a.summary));
            assert_eq!(overview.coverage.unwrap().label, "2/2 chunks analysed");
            assert!(!overview.is_partial);
        }
        other => panic!("expected overview, got {:?}", other),
    }
}
