use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::api::{map_record_to_operation, ApiError, RemoteStore};
use crate::db::{sync_history, Database, MutationQueue};
use crate::models::{MutationRecord, SyncHistoryEntry};
use crate::projection::ReadModelProjector;

use super::connectivity::{ConnectivityMonitor, ConnectivityState};
use super::events::{DrainOutcome, SkipReason, SyncNotification};

/// Clears the in-flight flag when a drain pass ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Leaves the `Syncing` state on drop, including when the pass is
/// cancelled mid-replay
struct SyncingGuard<'a>(&'a ConnectivityMonitor);

impl<'a> SyncingGuard<'a> {
    fn begin(monitor: &'a ConnectivityMonitor) -> Option<Self> {
        monitor.begin_sync().then_some(SyncingGuard(monitor))
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.finish_sync();
    }
}

fn not_online_reason(state: ConnectivityState) -> SkipReason {
    match state {
        ConnectivityState::Offline => SkipReason::Offline,
        ConnectivityState::Online | ConnectivityState::Syncing => SkipReason::AlreadyRunning,
    }
}

/// Replays the mutation queue against the remote store.
///
/// A pass snapshots the queue, replays records strictly in order, and
/// stops at the first failure without removing anything. Only a pass in
/// which every record succeeded clears the queue, and then only up to the
/// last record of its snapshot, so records appended while it ran stay
/// queued for the next pass. Replays are idempotent on the remote side,
/// which is what makes re-sending the already-applied prefix after a
/// failure safe.
pub struct SyncEngine {
    db: Arc<Database>,
    queue: MutationQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: Arc<ConnectivityMonitor>,
    projector: Arc<ReadModelProjector>,
    notifications: broadcast::Sender<SyncNotification>,
    user_id: String,
    request_timeout: Duration,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        db: Arc<Database>,
        remote: Arc<dyn RemoteStore>,
        monitor: Arc<ConnectivityMonitor>,
        projector: Arc<ReadModelProjector>,
        notifications: broadcast::Sender<SyncNotification>,
        user_id: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            queue: MutationQueue::new(db.clone()),
            db,
            remote,
            monitor,
            projector,
            notifications,
            user_id: user_id.into(),
            request_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &MutationQueue {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one drain pass. Safe to call from any trigger at any time: a
    /// pass that finds the engine offline, already running or the queue
    /// empty does nothing.
    pub async fn drain_and_sync(&self) -> DrainOutcome {
        match self.monitor.current() {
            ConnectivityState::Online => {}
            ConnectivityState::Offline => {
                log::debug!("Offline, leaving mutation queue for later");
                return DrainOutcome::Skipped(SkipReason::Offline);
            }
            ConnectivityState::Syncing => {
                log::debug!("Drain already in progress");
                return DrainOutcome::Skipped(SkipReason::AlreadyRunning);
            }
        }

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            log::debug!("Drain already in progress");
            return DrainOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let snapshot = match self.queue.drain() {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to read mutation queue: {}", e);
                let outcome = DrainOutcome::Failed {
                    applied: 0,
                    pending: 0,
                    error: e.to_string(),
                };
                self.notify(&outcome);
                return outcome;
            }
        };

        if snapshot.is_empty() {
            return DrainOutcome::Skipped(SkipReason::EmptyQueue);
        }

        let Some(syncing) = SyncingGuard::begin(&self.monitor) else {
            return DrainOutcome::Skipped(not_online_reason(self.monitor.current()));
        };

        let started_at = chrono::Utc::now().timestamp_millis();
        log::info!(
            "Syncing {} queued mutations to {}",
            snapshot.len(),
            self.remote.store_name()
        );

        let mut applied = 0;
        let mut failure: Option<ApiError> = None;

        for record in &snapshot {
            if !self.monitor.is_platform_online() {
                failure = Some(ApiError::Offline);
                break;
            }

            if let Err(e) = self.replay(record).await {
                log::warn!(
                    "Sync stopped at {} {} {}: {}",
                    record.operation,
                    record.entity_type,
                    record.entity_id,
                    e
                );
                failure = Some(e);
                break;
            }
            applied += 1;
        }

        let outcome = match failure {
            None => self.commit_pass(&snapshot),
            Some(e) => DrainOutcome::Failed {
                applied,
                pending: self.queue.len().unwrap_or(snapshot.len()),
                error: e.to_string(),
            },
        };

        drop(syncing);
        self.record_history(started_at, snapshot.len(), applied, &outcome);
        self.notify(&outcome);

        match &outcome {
            DrainOutcome::Synced { records } => log::info!("✅ Synced {} mutations", records),
            DrainOutcome::Failed { pending, .. } => {
                log::warn!("Sync failed, {} mutations stay queued", pending)
            }
            DrainOutcome::Skipped(_) => {}
        }

        outcome
    }

    async fn replay(&self, record: &MutationRecord) -> Result<(), ApiError> {
        let operation = map_record_to_operation(record, &self.user_id)?;

        match tokio::time::timeout(self.request_timeout, self.remote.execute(&operation)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::TimeoutError(format!(
                "{} {}/{} took longer than {}ms",
                record.operation,
                operation.table(),
                operation.id(),
                self.request_timeout.as_millis()
            ))),
        }
    }

    /// Every record in the snapshot reached the remote store
    fn commit_pass(&self, snapshot: &[MutationRecord]) -> DrainOutcome {
        let last_seq = snapshot.last().map(|r| r.seq).unwrap_or_default();

        if let Err(e) = self.queue.clear_through(last_seq) {
            // Records stay queued and get replayed again next pass
            log::error!("Failed to clear synced mutations: {}", e);
            return DrainOutcome::Failed {
                applied: snapshot.len(),
                pending: snapshot.len(),
                error: e.to_string(),
            };
        }

        if let Err(e) = self.projector.refresh_pending(&self.db) {
            log::warn!("Failed to refresh pending markers: {}", e);
        }

        DrainOutcome::Synced {
            records: snapshot.len(),
        }
    }

    fn record_history(&self, started_at: i64, attempted: usize, applied: usize, outcome: &DrainOutcome) {
        let (status, error_message) = match outcome {
            DrainOutcome::Failed { error, .. } => ("failed", Some(error.clone())),
            _ => ("success", None),
        };

        let entry = SyncHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: chrono::Utc::now().timestamp_millis(),
            status: status.to_string(),
            records_attempted: attempted as i64,
            records_applied: applied as i64,
            error_message,
        };

        let result = self
            .db
            .conn
            .lock()
            .map_err(crate::error::JournalError::from)
            .and_then(|conn| sync_history::insert_sync_history(&conn, &entry));

        if let Err(e) = result {
            log::warn!("Failed to record sync history: {}", e);
        }
    }

    fn notify(&self, outcome: &DrainOutcome) {
        if let Some(notification) = outcome.notification() {
            // No subscribers is fine
            let _ = self.notifications.send(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RemoteCall;
    use crate::models::EntityType;
    use crate::test_helpers::{account_input, harness, harness_with_timeout, note_input, trade_input};

    #[tokio::test]
    async fn test_failure_keeps_queue_and_retry_clears_it() {
        let h = harness(true);
        let mut notifications = h.notifications.subscribe();

        let account = h.mutations.create_entity(EntityType::Account, account_input("Main", 10_000.0)).unwrap();
        h.mutations
            .create_entity(EntityType::Trade, trade_input(account.id(), "WIN", 1.0, 2.5, Some(5.0)))
            .unwrap();
        h.mutations.create_entity(EntityType::Note, note_input("Plan")).unwrap();
        h.remote.fail_call(2);

        let outcome = h.engine.drain_and_sync().await;
        assert!(matches!(
            outcome,
            DrainOutcome::Failed { applied: 1, pending: 3, .. }
        ));
        assert_eq!(h.engine.queue().len().unwrap(), 3);
        assert_eq!(h.remote.rows("accounts").len(), 1);
        assert!(h.remote.rows("trades").is_empty());
        assert_eq!(h.monitor.current(), ConnectivityState::Online);
        assert!(matches!(
            notifications.recv().await.unwrap(),
            SyncNotification::Failed { applied: 1, pending: 3, .. }
        ));

        let outcome = h.engine.drain_and_sync().await;
        assert_eq!(outcome, DrainOutcome::Synced { records: 3 });
        assert!(h.engine.queue().is_empty().unwrap());
        assert_eq!(h.remote.rows("accounts").len(), 1);
        assert_eq!(h.remote.rows("trades").len(), 1);
        assert_eq!(h.remote.rows("notes").len(), 1);
        assert!(h.projector.snapshot().unwrap().pending.is_empty());
        assert_eq!(
            notifications.recv().await.unwrap(),
            SyncNotification::Synced { records: 3 }
        );

        let conn = h.db.conn.lock().unwrap();
        let history = sync_history::load_sync_history(&conn, 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, "success");
        assert_eq!(history[1].status, "failed");
        assert_eq!(history[1].records_applied, 1);
    }

    #[tokio::test]
    async fn test_replaying_queue_twice_gives_same_remote_state() {
        let h = harness(true);
        let account = h.mutations.create_entity(EntityType::Account, account_input("Main", 5_000.0)).unwrap();
        h.mutations
            .create_entity(EntityType::Trade, trade_input(account.id(), "LOSS", 2.0, 1.0, None))
            .unwrap();

        let records = h.engine.queue().drain().unwrap();
        h.engine.drain_and_sync().await;
        let first = h.remote.dump();

        for record in &records {
            h.engine.queue().append(record).unwrap();
        }
        assert_eq!(
            h.engine.drain_and_sync().await,
            DrainOutcome::Synced { records: 2 }
        );
        assert_eq!(h.remote.dump(), first);
    }

    #[tokio::test]
    async fn test_records_replay_in_commit_order() {
        let h = harness(true);
        let note = h.mutations.create_entity(EntityType::Note, note_input("Draft")).unwrap();
        h.mutations
            .update_entity(EntityType::Note, note.id(), serde_json::json!({ "title": "Final" }))
            .unwrap();
        h.mutations.delete_entity(EntityType::Note, note.id()).unwrap();

        h.engine.drain_and_sync().await;

        let id = note.id().to_string();
        assert_eq!(
            h.remote.calls(),
            vec![
                RemoteCall::Upsert { table: "notes".into(), id: id.clone() },
                RemoteCall::Upsert { table: "notes".into(), id: id.clone() },
                RemoteCall::Delete { table: "notes".into(), id: id.clone() },
            ]
        );
        assert!(h.remote.get("notes", &id).is_none());
    }

    #[tokio::test]
    async fn test_delete_of_unknown_row_succeeds() {
        let h = harness(true);
        h.mutations.delete_entity(EntityType::Note, "never-synced").unwrap();

        assert_eq!(
            h.engine.drain_and_sync().await,
            DrainOutcome::Synced { records: 1 }
        );
        assert!(h.engine.queue().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_offline_makes_no_remote_calls() {
        let h = harness(false);
        h.mutations.create_entity(EntityType::Account, account_input("Main", 1_000.0)).unwrap();

        assert_eq!(
            h.engine.drain_and_sync().await,
            DrainOutcome::Skipped(SkipReason::Offline)
        );
        assert_eq!(h.remote.call_count(), 0);
        assert_eq!(h.engine.queue().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_is_skipped() {
        let h = harness(true);
        assert_eq!(
            h.engine.drain_and_sync().await,
            DrainOutcome::Skipped(SkipReason::EmptyQueue)
        );
        assert_eq!(h.monitor.current(), ConnectivityState::Online);
    }

    #[tokio::test]
    async fn test_overlapping_drain_is_a_noop() {
        let h = harness(true);
        h.mutations.create_entity(EntityType::Note, note_input("One")).unwrap();
        h.remote.set_latency(Duration::from_millis(50));

        let (first, second) = futures::join!(h.engine.drain_and_sync(), h.engine.drain_and_sync());

        assert_eq!(first, DrainOutcome::Synced { records: 1 });
        assert_eq!(second, DrainOutcome::Skipped(SkipReason::AlreadyRunning));
        assert_eq!(h.remote.call_count(), 1);
        assert!(!h.engine.is_running());
    }

    #[tokio::test]
    async fn test_record_appended_mid_drain_survives() {
        let h = harness(true);
        h.mutations.create_entity(EntityType::Note, note_input("Before")).unwrap();
        h.remote.set_latency(Duration::from_millis(100));

        let (outcome, late) = tokio::join!(h.engine.drain_and_sync(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.mutations.create_entity(EntityType::Note, note_input("During")).unwrap()
        });

        assert_eq!(outcome, DrainOutcome::Synced { records: 1 });
        let remaining = h.engine.queue().drain().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_id, late.id());
        assert!(h.projector.snapshot().unwrap().is_pending(EntityType::Note, late.id()));

        assert_eq!(
            h.engine.drain_and_sync().await,
            DrainOutcome::Synced { records: 1 }
        );
        assert_eq!(h.remote.rows("notes").len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_drain_returns_to_online() {
        let h = harness(true);
        h.mutations.create_entity(EntityType::Note, note_input("Cancelled")).unwrap();
        h.remote.set_latency(Duration::from_millis(200));

        let (cancelled, during) = tokio::join!(
            tokio::time::timeout(Duration::from_millis(50), h.engine.drain_and_sync()),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                h.engine.drain_and_sync().await
            }
        );
        assert!(cancelled.is_err());
        assert_eq!(during, DrainOutcome::Skipped(SkipReason::AlreadyRunning));

        assert_eq!(h.monitor.current(), ConnectivityState::Online);
        assert!(!h.engine.is_running());
        assert_eq!(h.engine.queue().len().unwrap(), 1);

        h.remote.set_latency(Duration::ZERO);
        assert_eq!(h.engine.drain_and_sync().await, DrainOutcome::Synced { records: 1 });
    }

    #[tokio::test]
    async fn test_slow_remote_times_out() {
        let h = harness_with_timeout(true, Duration::from_millis(20));
        h.mutations.create_entity(EntityType::Note, note_input("Slow")).unwrap();
        h.remote.set_latency(Duration::from_millis(500));

        match h.engine.drain_and_sync().await {
            DrainOutcome::Failed { applied, pending, error } => {
                assert_eq!(applied, 0);
                assert_eq!(pending, 1);
                assert!(error.contains("Timeout"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(h.engine.queue().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connectivity_lost_mid_drain_aborts() {
        let h = harness(true);
        for title in ["a", "b", "c"] {
            h.mutations.create_entity(EntityType::Note, note_input(title)).unwrap();
        }
        h.remote.set_latency(Duration::from_millis(100));

        let (outcome, _) = tokio::join!(h.engine.drain_and_sync(), async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            h.monitor.set_platform_online(false);
        });

        match outcome {
            DrainOutcome::Failed { applied, pending, .. } => {
                assert!(applied < 3);
                assert_eq!(pending, 3);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(h.monitor.current(), ConnectivityState::Offline);
        assert_eq!(h.engine.queue().len().unwrap(), 3);
    }
}
