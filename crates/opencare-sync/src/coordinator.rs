//! # Sync Coordinator
//!
//! Drives one record type through a push or pull cycle against a
//! [`SyncRepository`] / [`SyncApi`] pair.
//!
//! ## Push Protocol (strictly in this order)
//! ```text
//! 1. read pending records
//! 2. upload their payloads in a single call
//! 3. mark exactly those ids done
//! 4. re-mark server-rejected ids invalid (overrides step 3)
//! ```
//! A network failure at step 2 leaves every row pending; nothing is marked
//! before the server has acknowledged the batch.
//!
//! ## Pull Protocol
//! ```text
//! loop:
//!   token = stored continuation token (None on first pull)
//!   page  = api.pull(page_size, token)
//!   merge page.payloads          # status-aware, one transaction
//!   store page.process_token     # only after the merge committed
//!   stop when page is shorter than page_size
//! ```
//! A crash between merge and token write replays one page on the next run;
//! the merge is idempotent so the replay converges to the same state.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use opencare_core::SyncStatus;
use opencare_db::SyncTokenRepository;

use crate::contract::{SyncApi, SyncRecord, SyncRepository};
use crate::error::SyncResult;

/// What a push cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushOutcome {
    /// Records uploaded and acknowledged.
    pub pushed: usize,
    /// Of those, records the server rejected with validation errors.
    pub rejected: usize,
}

/// What a pull cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PullOutcome {
    /// Payloads merged into the local store.
    pub pulled: usize,
    /// Pages requested, including a final short or empty page.
    pub pages: usize,
}

/// Coordinates push and pull for any syncable record type.
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    tokens: SyncTokenRepository,
    page_size: usize,
}

impl SyncCoordinator {
    pub fn new(tokens: SyncTokenRepository, page_size: usize) -> Self {
        SyncCoordinator { tokens, page_size }
    }

    /// Pushes all pending records for one record type as a single batch.
    ///
    /// The whole pending set goes up in one call. A transport failure
    /// commits no status changes at all; every row is still `pending` for
    /// the next cycle, and re-sending unacknowledged rows is always safe.
    pub async fn push<R, A>(&self, repo: &R, api: &A) -> SyncResult<PushOutcome>
    where
        R: SyncRepository,
        A: SyncApi<Payload = R::Payload>,
    {
        let record_type = repo.record_type();
        let started = Instant::now();

        let pending = repo.pending_records().await?;
        if pending.is_empty() {
            debug!(%record_type, "Nothing pending, skipping push");
            return Ok(PushOutcome::default());
        }

        let payloads: Vec<R::Payload> = pending.iter().map(R::to_payload).collect();
        let response = api.push(payloads).await?;

        // The server has the batch now; mark exactly these ids done.
        let ids: Vec<String> = pending.iter().map(|r| r.record_id().to_string()).collect();
        repo.set_sync_status_for_ids(&ids, SyncStatus::Done).await?;

        // Validation rejections override the acknowledgment, but only for
        // ids we actually sent.
        let sent: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let rejected: Vec<String> = response
            .validation_errors
            .iter()
            .filter(|e| sent.contains(e.id.as_str()))
            .map(|e| {
                warn!(
                    %record_type,
                    id = %e.id,
                    errors = ?e.messages,
                    "Server rejected record"
                );
                e.id.clone()
            })
            .collect();

        if !rejected.is_empty() {
            repo.set_sync_status_for_ids(&rejected, SyncStatus::Invalid)
                .await?;
        }

        let outcome = PushOutcome {
            pushed: pending.len(),
            rejected: rejected.len(),
        };

        info!(
            %record_type,
            pushed = outcome.pushed,
            rejected = outcome.rejected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Push complete"
        );
        Ok(outcome)
    }

    /// Pulls server changes for one record type until a short page signals
    /// the end of the stream.
    ///
    /// An exactly-full final page is not terminal; the loop issues one more
    /// request and stops on the empty page the server answers with.
    pub async fn pull<R, A>(&self, repo: &R, api: &A) -> SyncResult<PullOutcome>
    where
        R: SyncRepository,
        A: SyncApi<Payload = R::Payload>,
    {
        let record_type = repo.record_type();
        let started = Instant::now();
        let mut outcome = PullOutcome::default();

        loop {
            let token = self.tokens.get(record_type).await?;
            let page = api.pull(self.page_size, token).await?;
            let fetched = page.payloads.len();

            // Merge first, then persist the token: replaying a merged page
            // after a crash is harmless, skipping an unmerged one is not.
            repo.merge_with_local_data(page.payloads).await?;
            self.tokens.set(record_type, &page.process_token).await?;

            outcome.pulled += fetched;
            outcome.pages += 1;
            debug!(%record_type, fetched, page = outcome.pages, "Merged pull page");

            if fetched < self.page_size {
                break;
            }
        }

        info!(
            %record_type,
            pulled = outcome.pulled,
            pages = outcome.pages,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pull complete"
        );
        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use opencare_core::{
        Measurement, MeasurementPayload, PullResponse, PushResponse, RecordType, ValidationError,
    };
    use opencare_db::{Database, DbConfig};

    use chrono::{TimeZone, Utc};

    fn measurement(id: &str) -> Measurement {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        Measurement {
            id: id.into(),
            patient_id: "p1".into(),
            facility_id: "fac-1".into(),
            systolic: 142,
            diastolic: 91,
            recorded_at: t,
            created_at: t,
            updated_at: t,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
        }
    }

    /// A scripted transport: answers push/pull calls from queues and records
    /// every request it sees.
    #[derive(Default)]
    struct ScriptedApi {
        push_calls: Mutex<Vec<Vec<MeasurementPayload>>>,
        push_responses: Mutex<VecDeque<SyncResult<PushResponse>>>,
        pull_calls: Mutex<Vec<Option<String>>>,
        pull_responses: Mutex<VecDeque<SyncResult<PullResponse<MeasurementPayload>>>>,
    }

    impl ScriptedApi {
        fn queue_push(&self, response: SyncResult<PushResponse>) {
            self.push_responses.lock().unwrap().push_back(response);
        }

        fn queue_pull(&self, response: SyncResult<PullResponse<MeasurementPayload>>) {
            self.pull_responses.lock().unwrap().push_back(response);
        }

        fn queue_pull_page(&self, ids: &[&str], token: &str) {
            self.queue_pull(Ok(PullResponse {
                payloads: ids
                    .iter()
                    .map(|id| MeasurementPayload::from(&measurement(id)))
                    .collect(),
                process_token: token.to_string(),
            }));
        }
    }

    impl SyncApi for ScriptedApi {
        type Payload = MeasurementPayload;

        async fn push(&self, payloads: Vec<MeasurementPayload>) -> SyncResult<PushResponse> {
            self.push_calls.lock().unwrap().push(payloads);
            self.push_responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PushResponse::accepted()))
        }

        async fn pull(
            &self,
            _page_size: usize,
            token: Option<String>,
        ) -> SyncResult<PullResponse<MeasurementPayload>> {
            self.pull_calls.lock().unwrap().push(token);
            self.pull_responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unscripted pull call")
        }
    }

    async fn setup() -> (Database, SyncCoordinator) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let coordinator = SyncCoordinator::new(db.sync_tokens(), 2);
        (db, coordinator)
    }

    #[tokio::test]
    async fn push_marks_acknowledged_batch_done() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();
        repo.save(&measurement("m1")).await.unwrap();
        repo.save(&measurement("m2")).await.unwrap();

        let api = ScriptedApi::default();
        let outcome = coordinator.push(&repo, &api).await.unwrap();

        assert_eq!(outcome, PushOutcome { pushed: 2, rejected: 0 });
        assert!(repo
            .records_with_sync_status(SyncStatus::Pending)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            repo.records_with_sync_status(SyncStatus::Done)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(api.push_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_sends_the_whole_pending_set_in_one_call() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();
        // More pending rows than the pull page size; push does not paginate.
        for i in 0..5 {
            repo.save(&measurement(&format!("m{i}"))).await.unwrap();
        }

        let api = ScriptedApi::default();
        let outcome = coordinator.push(&repo, &api).await.unwrap();

        assert_eq!(outcome.pushed, 5);
        let sizes: Vec<usize> = api.push_calls.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5]);
    }

    #[tokio::test]
    async fn validation_errors_end_invalid_while_the_rest_end_done() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();
        repo.save(&measurement("m1")).await.unwrap();
        repo.save(&measurement("m2")).await.unwrap();

        let api = ScriptedApi::default();
        api.queue_push(Ok(PushResponse {
            validation_errors: vec![ValidationError {
                id: "m2".into(),
                messages: vec!["systolic out of range".into()],
            }],
        }));

        let outcome = coordinator.push(&repo, &api).await.unwrap();
        assert_eq!(outcome, PushOutcome { pushed: 2, rejected: 1 });

        let invalid = repo.records_with_sync_status(SyncStatus::Invalid).await.unwrap();
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].id, "m2");
        let done = repo.records_with_sync_status(SyncStatus::Done).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, "m1");
    }

    #[tokio::test]
    async fn network_failure_leaves_everything_pending() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();
        // A pending set larger than the pull page size still fails as one
        // unit: no row may end up done after a transport error.
        for i in 0..5 {
            repo.save(&measurement(&format!("m{i}"))).await.unwrap();
        }

        let api = ScriptedApi::default();
        api.queue_push(Err(crate::error::SyncError::ConnectionFailed(
            "airplane mode".into(),
        )));

        let result = coordinator.push(&repo, &api).await;
        assert!(result.is_err());
        assert_eq!(
            repo.records_with_sync_status(SyncStatus::Pending)
                .await
                .unwrap()
                .len(),
            5
        );
        assert!(repo
            .records_with_sync_status(SyncStatus::Done)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn push_with_nothing_pending_never_touches_the_network() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();
        let api = ScriptedApi::default();

        let outcome = coordinator.push(&repo, &api).await.unwrap();
        assert_eq!(outcome, PushOutcome::default());
        assert!(api.push_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pull_pages_until_a_short_page() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();

        let api = ScriptedApi::default();
        api.queue_pull_page(&["m1", "m2"], "tok-1");
        api.queue_pull_page(&["m3", "m4"], "tok-2");
        api.queue_pull_page(&["m5"], "tok-3");

        let outcome = coordinator.pull(&repo, &api).await.unwrap();
        assert_eq!(outcome, PullOutcome { pulled: 5, pages: 3 });

        // Tokens flowed through: first request bare, then each page's token.
        assert_eq!(
            *api.pull_calls.lock().unwrap(),
            vec![None, Some("tok-1".into()), Some("tok-2".into())]
        );
        assert_eq!(
            db.sync_tokens()
                .get(RecordType::Measurement)
                .await
                .unwrap()
                .as_deref(),
            Some("tok-3")
        );
        assert_eq!(
            repo.records_with_sync_status(SyncStatus::Done).await.unwrap().len(),
            5
        );
    }

    #[tokio::test]
    async fn exactly_full_final_page_costs_one_empty_request() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();

        let api = ScriptedApi::default();
        api.queue_pull_page(&["m1", "m2"], "tok-1");
        api.queue_pull_page(&[], "tok-1");

        let outcome = coordinator.pull(&repo, &api).await.unwrap();
        assert_eq!(outcome, PullOutcome { pulled: 2, pages: 2 });
        assert_eq!(api.pull_calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_page_preserves_the_token_for_resume() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();

        let api = ScriptedApi::default();
        api.queue_pull_page(&["m1", "m2"], "tok-1");
        api.queue_pull(Err(crate::error::SyncError::Timeout(30)));

        assert!(coordinator.pull(&repo, &api).await.is_err());
        // The first page's token survived the failure.
        assert_eq!(
            db.sync_tokens()
                .get(RecordType::Measurement)
                .await
                .unwrap()
                .as_deref(),
            Some("tok-1")
        );

        // Next cycle resumes from that token instead of restarting.
        api.queue_pull_page(&["m3"], "tok-2");
        let outcome = coordinator.pull(&repo, &api).await.unwrap();
        assert_eq!(outcome.pulled, 1);
        assert_eq!(
            *api.pull_calls.lock().unwrap(),
            vec![None, Some("tok-1".into()), Some("tok-1".into())]
        );
    }

    #[tokio::test]
    async fn replaying_a_page_is_idempotent() {
        let (db, coordinator) = setup().await;
        let repo = db.measurements();

        let api = ScriptedApi::default();
        api.queue_pull_page(&["m1"], "tok-1");
        coordinator.pull(&repo, &api).await.unwrap();

        // Same page again, as after a crash between merge and token write.
        api.queue_pull_page(&["m1"], "tok-1");
        coordinator.pull(&repo, &api).await.unwrap();

        assert_eq!(
            repo.records_with_sync_status(SyncStatus::Done).await.unwrap().len(),
            1
        );
    }
}
