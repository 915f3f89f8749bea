use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use super::engine::SyncEngine;
use super::events::SyncTrigger;

/// Background sync scheduler.
///
/// Owns the single task that consumes the trigger channel. Triggers that
/// pile up while a drain runs are coalesced into one follow-up drain, so
/// nothing is lost and nothing polls.
#[derive(Clone)]
pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    trigger_tx: mpsc::UnboundedSender<SyncTrigger>,
    trigger_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<SyncTrigger>>>>,
    tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        trigger_tx: mpsc::UnboundedSender<SyncTrigger>,
        trigger_rx: mpsc::UnboundedReceiver<SyncTrigger>,
    ) -> Self {
        Self {
            engine,
            trigger_tx,
            trigger_rx: Arc::new(Mutex::new(Some(trigger_rx))),
            tasks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start the trigger loop, with a startup drain if anything is queued
    pub async fn start(&self) {
        let Some(trigger_rx) = self.trigger_rx.lock().await.take() else {
            log::warn!("Sync scheduler already started");
            return;
        };

        log::info!("Starting background sync scheduler...");

        match self.engine.queue().len() {
            Ok(0) => log::debug!("Mutation queue empty at startup"),
            Ok(pending) => {
                log::info!("{} mutations pending from a previous session", pending);
                self.trigger(SyncTrigger::Startup);
            }
            Err(e) => log::warn!("Failed to inspect mutation queue at startup: {}", e),
        }

        let handle = tokio::spawn(Self::run(self.engine.clone(), trigger_rx));

        let mut tasks = self.tasks.write().await;
        tasks.push(handle);
    }

    async fn run(engine: Arc<SyncEngine>, mut trigger_rx: mpsc::UnboundedReceiver<SyncTrigger>) {
        while let Some(trigger) = trigger_rx.recv().await {
            let mut coalesced = 0;
            while trigger_rx.try_recv().is_ok() {
                coalesced += 1;
            }

            log::debug!("Drain triggered by {:?} ({} coalesced)", trigger, coalesced);
            let outcome = engine.drain_and_sync().await;
            log::debug!("Drain outcome: {:?}", outcome);
        }

        log::debug!("Trigger channel closed, sync loop exiting");
    }

    /// Ask for a drain ("sync now")
    pub fn request_sync(&self) {
        self.trigger(SyncTrigger::Requested);
    }

    fn trigger(&self, trigger: SyncTrigger) {
        if self.trigger_tx.send(trigger).is_err() {
            log::debug!("Sync loop not running, {:?} trigger dropped", trigger);
        }
    }

    /// Stop the trigger loop, cancelling any drain in progress. Queued
    /// mutations stay on disk for the next session.
    pub async fn stop(&self) {
        log::info!("Stopping sync scheduler...");
        let mut tasks = self.tasks.write().await;

        for task in tasks.drain(..) {
            task.abort();
            // Wait for the cancelled drain to release its guards
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    log::warn!("Sync loop ended abnormally: {}", e);
                }
            }
        }
    }
}
