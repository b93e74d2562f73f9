//! # Sync Worker
//!
//! One long-lived task per record type. Each worker owns its repository and
//! transport and runs cycles independently: a measurement pull failing never
//! stalls patient sync.
//!
//! ## Worker Loop
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  select! {                                             │
//! │     interval tick   ──► push then pull                 │
//! │     manual trigger  ──► push then pull (app startup,   │
//! │                         connectivity regained, edits)  │
//! │     shutdown signal ──► drain and exit                 │
//! │  }                                                     │
//! └────────────────────────────────────────────────────────┘
//! ```
//! Triggers are coalesced: a trigger arriving while a cycle runs results in
//! at most one extra cycle, not one per trigger.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::contract::{SyncApi, SyncRepository};
use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;

/// Handle for controlling a running [`SyncWorker`].
#[derive(Debug, Clone)]
pub struct SyncWorkerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncWorkerHandle {
    /// Requests an immediate sync cycle. Cheap to call repeatedly; pending
    /// triggers coalesce.
    pub fn trigger(&self) {
        // A full channel already holds a pending trigger.
        let _ = self.trigger_tx.try_send(());
    }

    /// Asks the worker to stop after the current cycle.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Periodic push/pull driver for one record type.
pub struct SyncWorker<R, A> {
    coordinator: SyncCoordinator,
    repo: R,
    api: A,
    interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<R, A> SyncWorker<R, A>
where
    R: SyncRepository,
    A: SyncApi<Payload = R::Payload>,
{
    /// Creates a worker and its control handle. The caller spawns
    /// [`SyncWorker::run`] on its runtime.
    pub fn new(
        coordinator: SyncCoordinator,
        repo: R,
        api: A,
        interval: Duration,
    ) -> (Self, SyncWorkerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = SyncWorker {
            coordinator,
            repo,
            api,
            interval,
            trigger_rx,
            shutdown_rx,
        };
        let handle = SyncWorkerHandle {
            trigger_tx,
            shutdown_tx,
        };
        (worker, handle)
    }

    /// Runs the worker until shutdown. A cycle runs immediately on start so
    /// a reopened app converges without waiting a full interval.
    pub async fn run(mut self) {
        let record_type = self.repo.record_type();
        info!(%record_type, interval_secs = self.interval.as_secs(), "Sync worker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                Some(()) = self.trigger_rx.recv() => {
                    debug!(%record_type, "Manual sync trigger");
                    self.run_cycle().await;
                }
                _ = self.shutdown_rx.recv() => {
                    info!(%record_type, "Sync worker shutting down");
                    break;
                }
            }
        }
    }

    /// One push-then-pull cycle. Failures are logged, never fatal to the
    /// loop: pending rows and the stored token make the next cycle resume
    /// where this one stopped.
    async fn run_cycle(&self) {
        let record_type = self.repo.record_type();

        if let Err(e) = self.coordinator.push(&self.repo, &self.api).await {
            log_cycle_error(&e, "push", record_type);
            if e.is_retryable() {
                // Offline: the pull would fail the same way.
                return;
            }
        }

        if let Err(e) = self.coordinator.pull(&self.repo, &self.api).await {
            log_cycle_error(&e, "pull", record_type);
        }
    }
}

fn log_cycle_error(e: &SyncError, phase: &str, record_type: opencare_core::RecordType) {
    if e.is_retryable() {
        debug!(%record_type, phase, error = %e, "Sync cycle skipped, will retry");
    } else {
        warn!(%record_type, phase, error = %e, "Sync cycle failed");
        if e.is_config_error() {
            error!(%record_type, "Sync misconfigured; manual intervention required");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use opencare_core::{
        MeasurementPayload, PullResponse, PushResponse, RecordType, SyncStatus,
    };
    use opencare_db::{Database, DbConfig};

    use crate::error::SyncResult;

    /// Always-empty server: accepts pushes, answers pulls with empty pages.
    #[derive(Default)]
    struct IdleServer {
        push_calls: Mutex<usize>,
        pull_calls: Mutex<usize>,
    }

    impl SyncApi for IdleServer {
        type Payload = MeasurementPayload;

        async fn push(&self, _payloads: Vec<MeasurementPayload>) -> SyncResult<PushResponse> {
            *self.push_calls.lock().unwrap() += 1;
            Ok(PushResponse::accepted())
        }

        async fn pull(
            &self,
            _page_size: usize,
            token: Option<String>,
        ) -> SyncResult<PullResponse<MeasurementPayload>> {
            *self.pull_calls.lock().unwrap() += 1;
            Ok(PullResponse {
                payloads: vec![],
                process_token: token.unwrap_or_else(|| "tok-0".into()),
            })
        }
    }

    #[tokio::test]
    async fn trigger_runs_a_cycle_and_shutdown_stops_the_worker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.measurements();
        let coordinator = SyncCoordinator::new(db.sync_tokens(), 100);

        let (worker, handle) = SyncWorker::new(
            coordinator,
            repo.clone(),
            IdleServer::default(),
            // Long enough that only the startup tick and our trigger fire.
            Duration::from_secs(3600),
        );
        let task = tokio::spawn(worker.run());

        // Startup tick pulls once (nothing pending, so no push call).
        tokio::time::sleep(Duration::from_millis(10)).await;

        let t = chrono::Utc::now();
        repo.save(&opencare_core::Measurement {
            id: "m1".into(),
            patient_id: "p1".into(),
            facility_id: "fac-1".into(),
            systolic: 120,
            diastolic: 80,
            recorded_at: t,
            created_at: t,
            updated_at: t,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
        })
        .await
        .unwrap();

        handle.trigger();
        tokio::time::sleep(Duration::from_millis(10)).await;

        handle.shutdown().await;
        task.await.unwrap();

        assert_eq!(repo.record_type(), RecordType::Measurement);
        assert!(repo
            .records_with_sync_status(SyncStatus::Pending)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            db.sync_tokens()
                .get(RecordType::Measurement)
                .await
                .unwrap()
                .as_deref(),
            Some("tok-0")
        );
    }
}
