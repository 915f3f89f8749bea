use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::api::client::{RemoteRow, RemoteStore};
use crate::api::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Upsert { table: String, id: String },
    Delete { table: String, id: String },
}

/// Remote store held in process memory.
///
/// Used for local development without a backend and by the tests, which
/// can make specific calls fail (by 1-based call number) or slow every
/// call down.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    rows: Mutex<BTreeMap<(String, String), serde_json::Value>>,
    calls: Mutex<Vec<RemoteCall>>,
    failing_calls: Mutex<HashSet<usize>>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the n-th call (counting every call ever made, from 1) fail
    pub fn fail_call(&self, call_number: usize) {
        if let Ok(mut failing) = self.failing_calls.lock() {
            failing.insert(call_number);
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut current) = self.latency.lock() {
            *current = Some(latency);
        }
    }

    pub fn get(&self, table: &str, id: &str) -> Option<serde_json::Value> {
        self.rows
            .lock()
            .ok()?
            .get(&(table.to_string(), id.to_string()))
            .cloned()
    }

    /// Every row of one table, ordered by id
    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.rows
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|((t, _), _)| t == table)
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of the whole store, for comparing states
    pub fn dump(&self) -> BTreeMap<(String, String), serde_json::Value> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }

    /// Record the call and decide whether it should fail
    async fn begin_call(&self, call: RemoteCall) -> Result<(), ApiError> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let call_number = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|e| ApiError::NetworkError(e.to_string()))?;
            calls.push(call);
            calls.len()
        };

        let should_fail = self
            .failing_calls
            .lock()
            .map(|failing| failing.contains(&call_number))
            .unwrap_or(false);

        if should_fail {
            return Err(ApiError::NetworkError(format!(
                "Injected failure on call {}",
                call_number
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    fn store_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, row: &RemoteRow) -> Result<(), ApiError> {
        self.begin_call(RemoteCall::Upsert {
            table: row.table.clone(),
            id: row.id.clone(),
        })
        .await?;

        let mut rows = self
            .rows
            .lock()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        rows.insert((row.table.clone(), row.id.clone()), row.row.clone());
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), ApiError> {
        self.begin_call(RemoteCall::Delete {
            table: table.to_string(),
            id: id.to_string(),
        })
        .await?;

        let mut rows = self
            .rows
            .lock()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;
        rows.remove(&(table.to_string(), id.to_string()));
        Ok(())
    }
}
