use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

/// Outcome of a trade. Only `Win` and `Loss` move the account balance
/// (commission aside).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
    Breakeven,
    InProgress,
    Missed,
}

impl TradeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeResult::Win => "WIN",
            TradeResult::Loss => "LOSS",
            TradeResult::Breakeven => "BREAKEVEN",
            TradeResult::InProgress => "IN_PROGRESS",
            TradeResult::Missed => "MISSED",
        }
    }
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WIN" => Ok(TradeResult::Win),
            "LOSS" => Ok(TradeResult::Loss),
            "BREAKEVEN" | "BE" => Ok(TradeResult::Breakeven),
            "IN_PROGRESS" | "OPEN" => Ok(TradeResult::InProgress),
            "MISSED" => Ok(TradeResult::Missed),
            other => Err(format!("Unknown trade result: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub account_id: String,

    pub symbol: String,
    pub direction: Direction,
    pub result: TradeResult,
    pub trade_date: i64,

    pub risk_percent: f64,
    pub reward_risk_ratio: f64,
    #[serde(default)]
    pub commission: Option<f64>,

    // Derived at save time, never taken from user input
    #[serde(default)]
    pub risk_amount: f64,
    #[serde(default)]
    pub pnl: f64,

    #[serde(default)]
    pub notes: String,

    pub created_at: i64,
    pub updated_at: i64,
}
