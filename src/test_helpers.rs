//! Shared fixtures for unit tests: an in-memory database wired to an
//! in-memory remote store, plus payload builders.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

use crate::api::{InMemoryRemoteStore, RemoteStore};
use crate::commands::MutationApi;
use crate::db::Database;
use crate::projection::ReadModelProjector;
use crate::sync::{ConnectivityMonitor, SyncEngine, SyncNotification, SyncTrigger};

pub(crate) const USER_ID: &str = "user-1";

pub(crate) struct Harness {
    pub db: Arc<Database>,
    pub projector: Arc<ReadModelProjector>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub remote: Arc<InMemoryRemoteStore>,
    pub engine: Arc<SyncEngine>,
    pub mutations: MutationApi,
    pub notifications: broadcast::Sender<SyncNotification>,
    pub trigger_tx: mpsc::UnboundedSender<SyncTrigger>,
    pub triggers: mpsc::UnboundedReceiver<SyncTrigger>,
}

pub(crate) fn harness(online: bool) -> Harness {
    harness_with_timeout(online, Duration::from_secs(5))
}

pub(crate) fn harness_with_timeout(online: bool, request_timeout: Duration) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();

    let db = Arc::new(Database::open_in_memory().unwrap());
    let projector = Arc::new(ReadModelProjector::new());
    let (trigger_tx, triggers) = mpsc::unbounded_channel();
    let monitor = Arc::new(ConnectivityMonitor::new(online).with_trigger(trigger_tx.clone()));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let (notifications, _) = broadcast::channel(16);

    let dyn_remote: Arc<dyn RemoteStore> = remote.clone();
    let engine = Arc::new(SyncEngine::new(
        db.clone(),
        dyn_remote,
        monitor.clone(),
        projector.clone(),
        notifications.clone(),
        USER_ID,
        request_timeout,
    ));
    let mutations = MutationApi::new(db.clone(), projector.clone(), trigger_tx.clone(), USER_ID);

    Harness {
        db,
        projector,
        monitor,
        remote,
        engine,
        mutations,
        notifications,
        trigger_tx,
        triggers,
    }
}

pub(crate) fn account_input(name: &str, initial_balance: f64) -> Value {
    json!({ "name": name, "initial_balance": initial_balance })
}

pub(crate) fn trade_input(
    account_id: &str,
    result: &str,
    risk_percent: f64,
    reward_risk_ratio: f64,
    commission: Option<f64>,
) -> Value {
    json!({
        "account_id": account_id,
        "symbol": "BTCUSDT",
        "direction": "LONG",
        "result": result,
        "trade_date": 1_700_000_000,
        "risk_percent": risk_percent,
        "reward_risk_ratio": reward_risk_ratio,
        "commission": commission,
    })
}

pub(crate) fn note_input(title: &str) -> Value {
    json!({ "title": title, "content": "" })
}
