use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::ApiError;

/// Configuration for rate limiting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 10,
        }
    }
}

/// A record in the remote store's schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub table: String,
    pub id: String,
    pub row: serde_json::Value,
}

/// What one queued mutation turns into on the remote side
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOperation {
    Upsert(RemoteRow),
    Delete { table: String, id: String },
}

impl RemoteOperation {
    pub fn table(&self) -> &str {
        match self {
            RemoteOperation::Upsert(row) => &row.table,
            RemoteOperation::Delete { table, .. } => table,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RemoteOperation::Upsert(row) => &row.id,
            RemoteOperation::Delete { id, .. } => id,
        }
    }
}

/// Remote system of record. Both operations must be idempotent:
/// upserting the same row twice leaves one row, and deleting a missing
/// id succeeds.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Name used in logs (e.g., "http", "memory")
    fn store_name(&self) -> &str;

    /// Insert or overwrite a row by id
    async fn upsert(&self, row: &RemoteRow) -> Result<(), ApiError>;

    /// Delete a row by id; absence of the row is success
    async fn delete(&self, table: &str, id: &str) -> Result<(), ApiError>;

    async fn execute(&self, operation: &RemoteOperation) -> Result<(), ApiError> {
        match operation {
            RemoteOperation::Upsert(row) => self.upsert(row).await,
            RemoteOperation::Delete { table, id } => self.delete(table, id).await,
        }
    }
}
