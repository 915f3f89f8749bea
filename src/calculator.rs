//! Derived trade fields.
//!
//! `risk_amount` and `pnl` are computed once, when a trade is saved, from the
//! trade's own inputs and the owning account's balance at that moment. The
//! balance excludes the trade being saved. Trades saved later are computed
//! against the balance they saw; editing an earlier trade does not recompute
//! them.

use crate::models::{Trade, TradeResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeInputs {
    pub risk_percent: f64,
    pub reward_risk_ratio: f64,
    pub result: TradeResult,
    pub commission: Option<f64>,
}

impl From<&Trade> for TradeInputs {
    fn from(trade: &Trade) -> Self {
        Self {
            risk_percent: trade.risk_percent,
            reward_risk_ratio: trade.reward_risk_ratio,
            result: trade.result,
            commission: trade.commission,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFields {
    pub risk_amount: f64,
    pub pnl: f64,
}

/// Compute risk amount and pnl at full precision. Round with
/// [`round_currency`] before persisting.
pub fn calculate_derived_fields(inputs: &TradeInputs, account_balance: f64) -> DerivedFields {
    let risk_amount = account_balance * (inputs.risk_percent / 100.0);

    let gross = match inputs.result {
        TradeResult::Win => risk_amount * inputs.reward_risk_ratio,
        TradeResult::Loss => -risk_amount,
        TradeResult::Breakeven | TradeResult::InProgress | TradeResult::Missed => 0.0,
    };

    DerivedFields {
        risk_amount,
        pnl: gross - inputs.commission.unwrap_or(0.0),
    }
}

/// Round an amount to 2 decimal places
pub fn round_currency(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid persisting -0.0
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Fill in a trade's derived fields, rounded for persistence
pub fn apply_derived_fields(trade: &mut Trade, account_balance: f64) {
    let derived = calculate_derived_fields(&TradeInputs::from(&*trade), account_balance);
    trade.risk_amount = round_currency(derived.risk_amount);
    trade.pnl = round_currency(derived.pnl);
}
