use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOperation {
    Create,
    Update,
    Delete,
}

impl MutationOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationOperation::Create => "create",
            MutationOperation::Update => "update",
            MutationOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(MutationOperation::Create),
            "update" => Ok(MutationOperation::Update),
            "delete" => Ok(MutationOperation::Delete),
            other => Err(format!("Unknown mutation operation: {}", other)),
        }
    }
}

/// One pending change, waiting in the queue for the remote store to
/// acknowledge it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    pub id: String,
    /// Position in the queue, assigned on append. 0 until persisted.
    pub seq: i64,
    pub entity_type: EntityType,
    pub operation: MutationOperation,
    pub entity_id: String,
    /// Full entity for create/update, `{"id": ...}` for delete
    pub payload: serde_json::Value,
    pub timestamp: i64, // Unix milliseconds
}

impl MutationRecord {
    pub fn new(
        entity_type: EntityType,
        operation: MutationOperation,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            seq: 0,
            entity_type,
            operation,
            entity_id: entity_id.into(),
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn delete(entity_type: EntityType, entity_id: &str) -> Self {
        Self::new(
            entity_type,
            MutationOperation::Delete,
            entity_id,
            serde_json::json!({ "id": entity_id }),
        )
    }
}
