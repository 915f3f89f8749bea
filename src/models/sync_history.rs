use serde::{Deserialize, Serialize};

/// One recorded drain pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub id: String,
    pub started_at: i64,
    pub finished_at: i64,
    pub status: String, // success | failed
    pub records_attempted: i64,
    pub records_applied: i64,
    pub error_message: Option<String>,
}
