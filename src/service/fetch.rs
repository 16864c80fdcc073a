//! Retrieval orchestration
//!
//! Drives multi-page bookmark retrieval for one user: quota and
//! exhaustion checks, token validation, a sequential page loop under
//! call-count and item-count budgets with inter-call pacing, and
//! checkpoint persistence after every successful page. A run can
//! optionally emit progress events for a streaming consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

use crate::config::FetchConfig;
use crate::data::{BookmarkRecord, Store};
use crate::error::AppError;
use crate::metrics::{BOOKMARKS_FETCHED_TOTAL, FETCH_RUNS_TOTAL, PAGES_FETCHED_TOTAL};
use crate::upstream::BookmarkSource;

use super::merge::merge_page;
use super::quota::QuotaLedger;
use super::token::TokenGuard;

/// Retrieval mode, determining budget and quota checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchTier {
    #[default]
    Free,
    Paid,
}

impl FetchTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
        }
    }
}

/// Per-invocation retrieval parameters; never persisted
#[derive(Debug, Clone, Copy)]
pub struct FetchBudget {
    /// Items to aim for in this run
    pub target_count: u64,
    /// Hard cap on upstream page calls
    pub max_page_calls: u32,
    /// Requested page size before the multi-call cap is applied
    pub page_size: u32,
}

impl FetchBudget {
    pub fn for_tier(tier: FetchTier, fetch: &FetchConfig) -> Self {
        match tier {
            FetchTier::Free => Self {
                target_count: u64::from(fetch.free_page_size),
                max_page_calls: 1,
                page_size: fetch.free_page_size,
            },
            FetchTier::Paid => Self {
                target_count: fetch.paid_batch_size,
                max_page_calls: fetch.paid_max_page_calls,
                page_size: fetch.page_size_cap,
            },
        }
    }
}

/// Caller-facing retrieval request
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchRequest {
    pub tier: FetchTier,
    /// Bypass the exhaustion short-circuit and pull from the start
    pub force_refresh: bool,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub bookmarks: Vec<BookmarkRecord>,
    pub has_more: bool,
    pub total_fetched: u64,
    pub paid_batches: u32,
}

/// Progress notification emitted after each fetched page
#[derive(Debug, Clone, Serialize)]
pub struct FetchProgress {
    pub fetched_so_far: u64,
    pub target: u64,
}

/// Event sequence of a streaming run: zero or more `Progress`, then
/// exactly one `Complete` or `Error`.
#[derive(Debug, Clone)]
pub enum FetchEvent {
    Progress(FetchProgress),
    Complete(FetchOutcome),
    Error { message: String },
}

/// Per-user async locks serializing same-user runs.
///
/// Cursor advancement is only unambiguous when one run per user is in
/// flight; runs for different users proceed independently. Idle
/// entries are pruned on the next acquisition.
#[derive(Default)]
pub struct UserLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

/// The retrieval engine
#[derive(Clone)]
pub struct FetchOrchestrator {
    store: Arc<Store>,
    source: Arc<dyn BookmarkSource>,
    token_guard: Arc<TokenGuard>,
    quota: QuotaLedger,
    fetch: FetchConfig,
    locks: Arc<UserLocks>,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<Store>,
        source: Arc<dyn BookmarkSource>,
        token_guard: Arc<TokenGuard>,
        fetch: FetchConfig,
    ) -> Self {
        Self {
            store,
            source,
            token_guard,
            quota: QuotaLedger::new(&fetch),
            fetch,
            locks: Arc::new(UserLocks::default()),
        }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    /// Run a retrieval synchronously and return the outcome.
    pub async fn run(&self, user_id: &str, request: FetchRequest) -> Result<FetchOutcome, AppError> {
        self.run_with_progress(user_id, request, None).await
    }

    /// Run a retrieval in the background, emitting progress events.
    ///
    /// The returned receiver yields `Progress` events followed by one
    /// terminal `Complete` or `Error`. Dropping the receiver cancels
    /// the run at the next checkpoint; everything persisted up to that
    /// point remains valid and resumable.
    pub fn stream(&self, user_id: String, request: FetchRequest) -> mpsc::Receiver<FetchEvent> {
        let (tx, rx) = mpsc::channel(16);
        let orchestrator = self.clone();

        tokio::spawn(async move {
            let terminal = match orchestrator
                .run_with_progress(&user_id, request, Some(&tx))
                .await
            {
                Ok(outcome) => FetchEvent::Complete(outcome),
                Err(error) => FetchEvent::Error {
                    message: error.to_string(),
                },
            };
            if tx.send(terminal).await.is_err() {
                tracing::debug!(user_id = %user_id, "Stream consumer gone before terminal event");
            }
        });

        rx
    }

    async fn run_with_progress(
        &self,
        user_id: &str,
        request: FetchRequest,
        progress: Option<&mpsc::Sender<FetchEvent>>,
    ) -> Result<FetchOutcome, AppError> {
        let _guard = self.locks.acquire(user_id).await;
        let tier = request.tier.as_str();

        let Some(mut state) = self.store.get_user_state(user_id).await? else {
            FETCH_RUNS_TOTAL.with_label_values(&[tier, "no_session"]).inc();
            return Err(AppError::SessionExpired);
        };

        if !self.quota.authorize(&state, request.tier) {
            FETCH_RUNS_TOTAL
                .with_label_values(&[tier, "quota_exceeded"])
                .inc();
            return Err(AppError::QuotaExceeded);
        }

        if state.is_exhausted() && !request.force_refresh {
            // Upstream has no further pages; serve the cache without
            // spending a single call.
            let cached = self.store.cached_bookmarks(user_id).await?;
            FETCH_RUNS_TOTAL.with_label_values(&[tier, "cached"]).inc();
            return Ok(FetchOutcome {
                bookmarks: cached,
                has_more: false,
                total_fetched: state.total_fetched,
                paid_batches: state.paid_batches,
            });
        }

        state = self.token_guard.ensure_valid(user_id, state).await?;

        let budget = FetchBudget::for_tier(request.tier, &self.fetch);
        let ttl = Duration::from_secs(self.fetch.state_ttl_seconds);
        let delay = Duration::from_millis(self.fetch.page_delay_ms);

        let mut new_records: Vec<BookmarkRecord> = Vec::new();
        let mut fetched_this_run: u64 = 0;
        let mut calls_made: u32 = 0;
        let mut cursor = state.pagination_cursor.clone();
        let mut has_more = true;

        while fetched_this_run < budget.target_count
            && has_more
            && calls_made < budget.max_page_calls
        {
            let remaining = budget.target_count - fetched_this_run;
            // Large page sizes truncate upstream pagination early, so
            // multi-call loops are clamped to the safe cap.
            let cap = if budget.max_page_calls > 1 {
                budget.page_size.min(self.fetch.page_size_cap)
            } else {
                budget.page_size
            };
            let page_size = remaining.min(u64::from(cap)) as u32;

            let page = match self
                .source
                .fetch_page(&state.access_token, user_id, page_size, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    // Checkpoints for completed pages are already
                    // persisted; the failing call contributes nothing.
                    tracing::warn!(
                        user_id = %user_id,
                        calls_made,
                        fetched_this_run,
                        error = %error,
                        "Retrieval run aborted"
                    );
                    FETCH_RUNS_TOTAL.with_label_values(&[tier, "error"]).inc();
                    return Err(error);
                }
            };

            calls_made += 1;
            PAGES_FETCHED_TOTAL.inc();

            let records = merge_page(&page);
            let result_count = page.meta.result_count;
            cursor = page.meta.next_token.clone();
            has_more = cursor.is_some();
            fetched_this_run += result_count;
            BOOKMARKS_FETCHED_TOTAL.inc_by(result_count);

            // Checkpoint: records first, then the cursor that covers
            // them, so a crash in between only re-fetches one page.
            state.pagination_cursor = cursor.clone();
            state.total_fetched += result_count;
            self.store.append_bookmarks(user_id, &records, ttl).await?;
            self.store.put_user_state(user_id, &state, ttl).await?;
            new_records.extend(records);

            if let Some(tx) = progress {
                let event = FetchEvent::Progress(FetchProgress {
                    fetched_so_far: fetched_this_run,
                    target: budget.target_count,
                });
                if tx.send(event).await.is_err() {
                    tracing::debug!(
                        user_id = %user_id,
                        "Progress consumer gone; stopping run at checkpoint"
                    );
                    break;
                }
            }

            // An empty page alongside a continuation token would loop
            // forever; stop here and let the next run probe again.
            if result_count == 0 {
                tracing::warn!(
                    user_id = %user_id,
                    has_more,
                    "Upstream returned an empty page; halting run"
                );
                break;
            }

            if has_more && fetched_this_run < budget.target_count && calls_made < budget.max_page_calls
            {
                tokio::time::sleep(delay).await;
            }
        }

        tracing::info!(
            user_id = %user_id,
            tier,
            calls_made,
            fetched_this_run,
            total_fetched = state.total_fetched,
            has_more,
            "Retrieval run complete"
        );
        FETCH_RUNS_TOTAL.with_label_values(&[tier, "complete"]).inc();

        Ok(FetchOutcome {
            bookmarks: new_records,
            has_more,
            total_fetched: state.total_fetched,
            paid_batches: state.paid_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UserFetchState;
    use crate::upstream::MockBookmarkSource;
    use crate::upstream::types::{BookmarksPage, PageMeta, RawPost};
    use crate::upstream::{MockUpstreamAuth, UpstreamAuth};
    use mockall::Sequence;

    const TTL: Duration = Duration::from_secs(3600);

    fn fetch_config() -> FetchConfig {
        FetchConfig {
            free_page_size: 25,
            free_allowance: 25,
            paid_batch_size: 100,
            paid_max_page_calls: 5,
            page_size_cap: 25,
            page_delay_ms: 0,
            folder_page_size: 100,
            folder_retry_delay_ms: 0,
            token_refresh_margin_seconds: 60,
            state_ttl_seconds: 3600,
        }
    }

    fn page(start: u64, count: u64, next_token: Option<&str>) -> BookmarksPage {
        let posts = (start..start + count)
            .map(|i| RawPost {
                id: i.to_string(),
                text: format!("post {i}"),
                created_at: "2024-05-01T12:00:00.000Z".to_string(),
                author_id: "a1".to_string(),
                lang: None,
                public_metrics: Default::default(),
                entities: None,
                attachments: None,
                referenced_tweets: None,
                note_tweet: None,
            })
            .collect();
        BookmarksPage {
            data: Some(posts),
            includes: None,
            meta: PageMeta {
                result_count: count,
                next_token: next_token.map(ToString::to_string),
            },
        }
    }

    fn fresh_state() -> UserFetchState {
        UserFetchState::new(
            "access".into(),
            "refresh".into(),
            // Far future: the token guard stays out of the way
            chrono::Utc::now().timestamp_millis() + 3_600_000,
            "alice".into(),
            "Alice".into(),
            None,
        )
    }

    fn no_refresh_auth() -> Arc<dyn UpstreamAuth> {
        let mut auth = MockUpstreamAuth::new();
        auth.expect_refresh().times(0);
        Arc::new(auth)
    }

    async fn orchestrator_with(
        source: MockBookmarkSource,
        config: FetchConfig,
    ) -> (FetchOrchestrator, Arc<Store>) {
        let store = Arc::new(Store::connect_in_memory().await.unwrap());
        let token_guard = Arc::new(TokenGuard::new(no_refresh_auth(), store.clone(), &config));
        let orchestrator =
            FetchOrchestrator::new(store.clone(), Arc::new(source), token_guard, config);
        (orchestrator, store)
    }

    #[tokio::test]
    async fn missing_state_fails_with_session_expired() {
        let mut source = MockBookmarkSource::new();
        source.expect_fetch_page().times(0);
        let (orchestrator, _store) = orchestrator_with(source, fetch_config()).await;

        let error = orchestrator
            .run("unknown", FetchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn fresh_free_run_makes_one_full_page_call() {
        // Scenario: fresh user, free tier -> exactly one call at the
        // free page size, counters updated from the page metadata.
        let mut source = MockBookmarkSource::new();
        source
            .expect_fetch_page()
            .withf(|token, user, page_size, cursor| {
                token == "access" && user == "u1" && *page_size == 25 && cursor.is_none()
            })
            .times(1)
            .returning(|_, _, _, _| Ok(page(0, 25, Some("cursor-1"))));

        let (orchestrator, store) = orchestrator_with(source, fetch_config()).await;
        store.put_user_state("u1", &fresh_state(), TTL).await.unwrap();

        let outcome = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(outcome.bookmarks.len(), 25);
        assert_eq!(outcome.total_fetched, 25);
        assert!(outcome.has_more);

        let state = store.get_user_state("u1").await.unwrap().unwrap();
        assert_eq!(state.total_fetched, 25);
        assert_eq!(state.pagination_cursor.as_deref(), Some("cursor-1"));
        assert_eq!(store.cached_bookmarks("u1").await.unwrap().len(), 25);
    }

    #[tokio::test]
    async fn exhausted_state_returns_cache_without_calls() {
        // Scenario: everything already fetched -> zero upstream calls,
        // the cached set comes back unchanged.
        let mut source = MockBookmarkSource::new();
        source.expect_fetch_page().times(0);

        let (orchestrator, store) = orchestrator_with(source, fetch_config()).await;
        let mut state = fresh_state();
        state.total_fetched = 25;
        state.pagination_cursor = None;
        store.put_user_state("u1", &state, TTL).await.unwrap();
        store
            .append_bookmarks("u1", &merge_page(&page(0, 25, None)), TTL)
            .await
            .unwrap();

        let outcome = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(outcome.bookmarks.len(), 25);
        assert!(!outcome.has_more);
        assert_eq!(outcome.total_fetched, 25);
    }

    #[tokio::test]
    async fn paid_run_without_batches_fails_before_any_call() {
        let mut source = MockBookmarkSource::new();
        source.expect_fetch_page().times(0);

        let (orchestrator, store) = orchestrator_with(source, fetch_config()).await;
        let mut state = fresh_state();
        state.total_fetched = 25;
        state.pagination_cursor = Some("cursor-1".into());
        state.paid_batches = 0;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let error = orchestrator
            .run(
                "u1",
                FetchRequest {
                    tier: FetchTier::Paid,
                    force_refresh: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::QuotaExceeded));
    }

    #[tokio::test]
    async fn rate_limit_mid_run_keeps_earlier_checkpoints() {
        // Scenario: 429 on the third call of a paid run. The first
        // two pages stay persisted; the failing call contributes
        // nothing.
        let mut config = fetch_config();
        config.paid_max_page_calls = 20;
        config.paid_batch_size = 500;

        let mut source = MockBookmarkSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .withf(|_, _, _, cursor| cursor.is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(0, 25, Some("t1"))));
        source
            .expect_fetch_page()
            .withf(|_, _, _, cursor| cursor == &Some("t1"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(25, 25, Some("t2"))));
        source
            .expect_fetch_page()
            .withf(|_, _, _, cursor| cursor == &Some("t2"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Err(AppError::RateLimited));

        let (orchestrator, store) = orchestrator_with(source, config).await;
        let mut state = fresh_state();
        state.paid_batches = 1;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let error = orchestrator
            .run(
                "u1",
                FetchRequest {
                    tier: FetchTier::Paid,
                    force_refresh: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AppError::RateLimited));

        let state = store.get_user_state("u1").await.unwrap().unwrap();
        assert_eq!(state.total_fetched, 50);
        assert_eq!(state.pagination_cursor.as_deref(), Some("t2"));
        assert_eq!(store.cached_bookmarks("u1").await.unwrap().len(), 50);
    }

    #[tokio::test]
    async fn run_never_exceeds_max_page_calls() {
        let mut config = fetch_config();
        config.paid_max_page_calls = 3;
        config.paid_batch_size = 500;

        let mut source = MockBookmarkSource::new();
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let counter = calls.clone();
        source
            .expect_fetch_page()
            .times(3)
            .returning(move |_, _, _, _| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(page(n * 25, 25, Some("more")))
            });

        let (orchestrator, store) = orchestrator_with(source, config).await;
        let mut state = fresh_state();
        state.paid_batches = 1;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let outcome = orchestrator
            .run(
                "u1",
                FetchRequest {
                    tier: FetchTier::Paid,
                    force_refresh: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.bookmarks.len(), 75);
        assert!(outcome.has_more);
    }

    #[tokio::test]
    async fn empty_page_halts_loop_despite_continuation_token() {
        let mut config = fetch_config();
        config.paid_max_page_calls = 5;

        let mut source = MockBookmarkSource::new();
        source
            .expect_fetch_page()
            .times(1)
            .returning(|_, _, _, _| Ok(page(0, 0, Some("suspicious"))));

        let (orchestrator, store) = orchestrator_with(source, config).await;
        let mut state = fresh_state();
        state.paid_batches = 1;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let outcome = orchestrator
            .run(
                "u1",
                FetchRequest {
                    tier: FetchTier::Paid,
                    force_refresh: false,
                },
            )
            .await
            .unwrap();
        assert!(outcome.bookmarks.is_empty());
        assert_eq!(outcome.total_fetched, 0);
        assert!(outcome.has_more);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_before_the_first_page() {
        // Scenario: token expires in 30 seconds. The refreshed
        // credentials must be used and persisted before any page call.
        let mut auth = MockUpstreamAuth::new();
        auth.expect_refresh().times(1).returning(|_| {
            Ok(crate::upstream::types::TokenResponse {
                access_token: "rotated-access".into(),
                refresh_token: "rotated-refresh".into(),
                expires_in: 7200,
                token_type: None,
                scope: None,
            })
        });

        let mut source = MockBookmarkSource::new();
        source
            .expect_fetch_page()
            .withf(|token, _, _, _| token == "rotated-access")
            .times(1)
            .returning(|_, _, _, _| Ok(page(0, 25, None)));

        let config = fetch_config();
        let store = Arc::new(Store::connect_in_memory().await.unwrap());
        let token_guard = Arc::new(TokenGuard::new(Arc::new(auth), store.clone(), &config));
        let orchestrator =
            FetchOrchestrator::new(store.clone(), Arc::new(source), token_guard, config);

        let mut state = fresh_state();
        state.token_expires_at = chrono::Utc::now().timestamp_millis() + 30_000;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let outcome = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(outcome.total_fetched, 25);
        assert!(!outcome.has_more);

        let persisted = store.get_user_state("u1").await.unwrap().unwrap();
        assert_eq!(persisted.refresh_token, "rotated-refresh");
    }

    #[tokio::test]
    async fn total_fetched_is_monotonic_across_runs() {
        let mut source = MockBookmarkSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(0, 25, Some("t1"))));
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(25, 25, None)));

        let (orchestrator, store) = orchestrator_with(source, fetch_config()).await;
        store.put_user_state("u1", &fresh_state(), TTL).await.unwrap();

        let first = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(first.total_fetched, 25);

        let second = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(second.total_fetched, 50);
        assert!(!second.has_more);

        // Further runs serve the cache; the counter never decreases.
        let third = orchestrator.run("u1", FetchRequest::default()).await.unwrap();
        assert_eq!(third.total_fetched, 50);
    }

    #[tokio::test]
    async fn streaming_run_emits_progress_then_complete() {
        let mut config = fetch_config();
        config.paid_max_page_calls = 2;
        config.paid_batch_size = 50;

        let mut source = MockBookmarkSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(0, 25, Some("t1"))));
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(25, 25, None)));

        let (orchestrator, store) = orchestrator_with(source, config).await;
        let mut state = fresh_state();
        state.paid_batches = 1;
        store.put_user_state("u1", &state, TTL).await.unwrap();

        let mut rx = orchestrator.stream(
            "u1".to_string(),
            FetchRequest {
                tier: FetchTier::Paid,
                force_refresh: false,
            },
        );

        let mut progress = Vec::new();
        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            match event {
                FetchEvent::Progress(p) => progress.push(p),
                other => {
                    terminal = Some(other);
                    break;
                }
            }
        }

        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].fetched_so_far, 25);
        assert_eq!(progress[1].fetched_so_far, 50);
        match terminal {
            Some(FetchEvent::Complete(outcome)) => {
                assert_eq!(outcome.total_fetched, 50);
                assert!(!outcome.has_more);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_same_user_runs_are_serialized() {
        // Two racing runs must not corrupt state: the per-user lock
        // forces them into sequence, so both pages land exactly once.
        let mut source = MockBookmarkSource::new();
        let mut seq = Sequence::new();
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(0, 25, Some("t1"))));
        source
            .expect_fetch_page()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| Ok(page(25, 25, None)));

        let (orchestrator, store) = orchestrator_with(source, fetch_config()).await;
        store.put_user_state("u1", &fresh_state(), TTL).await.unwrap();

        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let (first, second) = tokio::join!(
            a.run("u1", FetchRequest::default()),
            b.run("u1", FetchRequest::default()),
        );
        first.unwrap();
        second.unwrap();

        let state = store.get_user_state("u1").await.unwrap().unwrap();
        assert_eq!(state.total_fetched, 50);
        assert_eq!(store.cached_bookmarks("u1").await.unwrap().len(), 50);
    }
}
