use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

use crate::api::{HttpRemoteStore, RemoteStore};
use crate::commands::{self, MutationApi};
use crate::config::EngineConfig;
use crate::db::{Database, MutationQueue};
use crate::error::JournalResult;
use crate::models::{Entity, EntityType, MutationRecord, SyncHistoryEntry};
use crate::projection::{ReadModel, ReadModelProjector};
use crate::sync::{
    ConnectivityMonitor, ConnectivityState, DrainOutcome, SyncEngine, SyncNotification, SyncScheduler,
};

/// The assembled engine: local store, queue, read model, connectivity
/// and the background sync loop, for one user.
pub struct TradingJournal {
    db: Arc<Database>,
    queue: MutationQueue,
    projector: Arc<ReadModelProjector>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
    scheduler: SyncScheduler,
    mutations: MutationApi,
    notifications: broadcast::Sender<SyncNotification>,
}

impl TradingJournal {
    /// Open (creating and migrating if needed) the database at
    /// `config.database_path` and start syncing to `remote`.
    pub async fn open(config: &EngineConfig, remote: Arc<dyn RemoteStore>) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let db_path = config
            .database_path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8: {:?}", config.database_path))?;

        log::info!("Database path: {}", db_path);
        let db = Database::new(db_path).with_context(|| {
            format!(
                "Database initialization failed; backups of earlier versions are in {:?}",
                config.database_path.with_file_name("backups")
            )
        })?;

        Self::with_database(Arc::new(db), config, remote).await
    }

    /// `open` against the HTTP remote described by `config.remote`
    pub async fn open_with_http(config: &EngineConfig) -> Result<Self> {
        let remote_config = config
            .remote
            .as_ref()
            .ok_or_else(|| anyhow!("No remote configured"))?;
        let remote = HttpRemoteStore::new(remote_config, &config.user_id, config.request_timeout())
            .context("Failed to build HTTP remote store")?;

        Self::open(config, Arc::new(remote)).await
    }

    /// Wire everything around an already-open database. The read model is
    /// hydrated before the scheduler exists, so nothing waits on the
    /// network to show local data.
    pub async fn with_database(
        db: Arc<Database>,
        config: &EngineConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        let projector = Arc::new(ReadModelProjector::new());
        projector.hydrate(&db).context("Failed to load local data")?;

        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(ConnectivityMonitor::new(config.start_online).with_trigger(trigger_tx.clone()));
        let (notifications, _) = broadcast::channel(config.notification_capacity.max(1));

        let engine = Arc::new(SyncEngine::new(
            db.clone(),
            remote,
            monitor.clone(),
            projector.clone(),
            notifications.clone(),
            config.user_id.clone(),
            config.request_timeout(),
        ));

        let mutations = MutationApi::new(db.clone(), projector.clone(), trigger_tx.clone(), config.user_id.clone());
        let scheduler = SyncScheduler::new(engine.clone(), trigger_tx, trigger_rx);
        scheduler.start().await;

        Ok(Self {
            queue: MutationQueue::new(db.clone()),
            db,
            projector,
            monitor,
            engine,
            scheduler,
            mutations,
            notifications,
        })
    }

    pub fn create_entity(&self, entity_type: EntityType, data: Value) -> JournalResult<Entity> {
        self.mutations.create_entity(entity_type, data)
    }

    pub fn update_entity(&self, entity_type: EntityType, id: &str, data: Value) -> JournalResult<Entity> {
        self.mutations.update_entity(entity_type, id, data)
    }

    pub fn delete_entity(&self, entity_type: EntityType, id: &str) -> JournalResult<()> {
        self.mutations.delete_entity(entity_type, id)
    }

    pub fn read_model(&self) -> JournalResult<ReadModel> {
        self.projector.snapshot()
    }

    pub fn status(&self) -> ConnectivityState {
        self.monitor.current()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectivityState> {
        self.monitor.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifications.subscribe()
    }

    /// Platform connectivity signal
    pub fn set_online(&self, online: bool) {
        self.monitor.set_platform_online(online);
    }

    /// Queue a drain on the background loop
    pub fn request_sync(&self) {
        self.scheduler.request_sync();
    }

    /// Drain now and wait for the outcome
    pub async fn sync_now(&self) -> DrainOutcome {
        self.engine.drain_and_sync().await
    }

    pub fn pending_mutations(&self) -> JournalResult<Vec<MutationRecord>> {
        commands::get_pending_mutations(&self.db)
    }

    pub fn pending_count(&self) -> JournalResult<usize> {
        self.queue.len()
    }

    pub fn sync_history(&self, limit: u32) -> JournalResult<Vec<SyncHistoryEntry>> {
        commands::get_sync_history(&self.db, limit)
    }

    /// Stop background syncing. Unsynced mutations stay queued on disk.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryRemoteStore;
    use crate::sync::SkipReason;
    use crate::test_helpers::{account_input, note_input, trade_input};
    use std::time::Duration;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    async fn next_notification(rx: &mut broadcast::Receiver<SyncNotification>) -> SyncNotification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no sync notification")
            .unwrap()
    }

    #[tokio::test]
    async fn test_offline_edits_survive_restart_and_sync_on_reconnect() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::new(dir.path().join("data").join("journal.db"), "user-1");
        config.start_online = false;
        let remote = Arc::new(InMemoryRemoteStore::new());

        let account_id;
        {
            let journal = TradingJournal::open(&config, remote.clone()).await.unwrap();
            assert_eq!(journal.status(), ConnectivityState::Offline);

            let account = journal
                .create_entity(EntityType::Account, account_input("Main", 10_000.0))
                .unwrap();
            account_id = account.id().to_string();
            journal
                .create_entity(EntityType::Trade, trade_input(&account_id, "WIN", 1.0, 2.5, Some(5.0)))
                .unwrap();
            journal.create_entity(EntityType::Note, note_input("Journal")).unwrap();

            assert_eq!(journal.sync_now().await, DrainOutcome::Skipped(SkipReason::Offline));
            assert_eq!(journal.pending_count().unwrap(), 3);
            journal.shutdown().await;
        }
        assert_eq!(remote.call_count(), 0);

        config.start_online = true;
        let journal = TradingJournal::open(&config, remote.clone()).await.unwrap();
        let mut notifications = journal.subscribe_notifications();

        let model = journal.read_model().unwrap();
        assert_eq!(model.trades.len(), 1);
        assert_eq!(model.account(&account_id).unwrap().current_balance, 10_245.0);
        assert_eq!(model.pending.len(), 3);

        assert_eq!(
            next_notification(&mut notifications).await,
            SyncNotification::Synced { records: 3 }
        );
        assert_eq!(journal.pending_count().unwrap(), 0);
        assert!(journal.read_model().unwrap().pending.is_empty());

        let remote_trade = &remote.rows("trades")[0];
        assert_eq!(remote_trade["pnl"], serde_json::json!(245.0));
        assert_eq!(remote_trade["user_id"], "user-1");
        assert_eq!(journal.sync_history(10).unwrap().len(), 1);

        journal.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_follows_platform_signal() {
        init_logger();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let config = EngineConfig::new(":memory:", "user-1");
        let remote = Arc::new(InMemoryRemoteStore::new());
        let journal = TradingJournal::with_database(db, &config, remote.clone()).await.unwrap();

        let mut status = journal.subscribe_status();
        let mut notifications = journal.subscribe_notifications();
        assert_eq!(journal.status(), ConnectivityState::Online);

        journal.set_online(false);
        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), ConnectivityState::Offline);

        journal.create_entity(EntityType::Note, note_input("Queued")).unwrap();
        journal.set_online(true);
        assert_eq!(
            next_notification(&mut notifications).await,
            SyncNotification::Synced { records: 1 }
        );
        assert_eq!(journal.status(), ConnectivityState::Online);

        journal.request_sync();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(remote.call_count(), 1);

        journal.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_with_http_requires_remote_section() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(dir.path().join("journal.db"), "user-1");
        assert!(TradingJournal::open_with_http(&config).await.is_err());
    }
}
