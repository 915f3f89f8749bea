use serde::{Deserialize, Serialize};

/// Per-user preferences. The engine treats `values` as an opaque JSON
/// object and syncs it whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsBlob {
    pub id: String,
    pub user_id: String,
    #[serde(default = "empty_object")]
    pub values: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
