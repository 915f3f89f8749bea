use serde::{Deserialize, Serialize};

/// Trading account. The current balance is not stored here; it is
/// `initial_balance` plus the pnl of every trade on the account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub initial_balance: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub created_at: i64,
    pub updated_at: i64,
}

fn default_currency() -> String {
    "USD".to_string()
}
