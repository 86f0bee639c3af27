//! Shared types for the RATCHET agent.
//!
//! These types form the data model used across all modules: the persisted
//! investment configuration, per-currency trade records, pass-local market
//! quotes and balances, and the order results emitted by the decision
//! engine. Wire/persisted shapes are camelCase to stay compatible with the
//! configuration documents the operator tooling reads and writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Date format used for `order_date` and `OrderResult::date`.
pub const DATETIME_FORMAT: &str = "%H:%M:%S %d/%m/%Y";

// ---------------------------------------------------------------------------
// Percentage / rounding helpers
// ---------------------------------------------------------------------------

/// Symmetric percentage change between two prices.
///
/// Uses the average of the two values as the denominator so that buy and
/// sell thresholds are comparably scaled: `percent_change(a, b)` is (up to
/// float noise) the negation of `percent_change(b, a)`.
pub fn percent_change(a: f64, b: f64) -> f64 {
    100.0 * ((a - b) / ((a + b) / 2.0))
}

/// Round a quantity down to the number of decimal places an instrument can
/// be traded at. Never rounds up: an order for more than the available
/// balance would be rejected.
pub fn round_down(num: f64, decimal_places: u32) -> f64 {
    let factor = 10f64.powi(decimal_places as i32);
    (num * factor).floor() / factor
}

/// Format a signed percentage to two decimal places with an explicit `+`
/// on gains, e.g. `+14.67%` / `-3.10%`.
pub fn format_signed_percent(diff: f64) -> String {
    if diff > 0.0 {
        format!("+{diff:.2}%")
    } else {
        format!("{diff:.2}%")
    }
}

// ---------------------------------------------------------------------------
// Investment configuration
// ---------------------------------------------------------------------------

/// The persisted investment configuration: which currencies are tracked,
/// their per-currency records, and operator options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub id: String,
    /// Global kill-switch. Set by the fail-safe handler on any unhandled
    /// pass error; cleared only by an operator.
    pub is_paused: bool,
    pub currencies_targeted: Vec<String>,
    #[serde(default)]
    pub records: HashMap<String, CurrencyRecord>,
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub simple_logs: bool,
}

impl Configuration {
    /// Shallow structural check: enough to know the document is usable for
    /// a pass, not a deep business-rule verification.
    pub fn is_structurally_valid(&self) -> bool {
        if self.id.is_empty() || self.currencies_targeted.is_empty() {
            return false;
        }
        self.records.values().all(|r| {
            let anchors_exclusive = !(r.last_buy_price.is_some() && r.last_sell_price.is_some());
            anchors_exclusive
                && r.thresholds.sell_percentage.is_finite()
                && r.thresholds.buy_percentage.is_finite()
        })
    }
}

// ---------------------------------------------------------------------------
// Per-currency record
// ---------------------------------------------------------------------------

/// One tracked currency's trading state.
///
/// Exactly one of `last_buy_price`/`last_sell_price` is set once the record
/// has traded (neither before its first buy); `is_holding` mirrors which.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_buy_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sell_price: Option<f64>,
    #[serde(default)]
    pub is_holding: bool,
    #[serde(default)]
    pub order_date: String,
    #[serde(default)]
    pub timestamp: i64,
    pub thresholds: Thresholds,
    /// Capital cap for this currency in settlement units. Replaced by the
    /// realized settlement value after each sell so allocated capital
    /// compounds gains and losses across cycles.
    #[serde(
        default,
        rename = "limitUSDT",
        skip_serializing_if = "Option::is_none"
    )]
    pub limit_usdt: Option<f64>,
    /// One-shot manual overrides, cleared on use.
    #[serde(default)]
    pub force_buy: bool,
    #[serde(default)]
    pub force_sell: bool,
    /// Break-even recovery sub-state, entered by a stop-loss sell.
    #[serde(default)]
    pub is_at_loss: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_even_price: Option<f64>,
    #[serde(default)]
    pub pause_after_sell: bool,
    /// Per-record pause, terminal until cleared by an operator.
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_reason: Option<String>,
}

impl Default for CurrencyRecord {
    fn default() -> Self {
        Self {
            last_buy_price: None,
            last_sell_price: None,
            is_holding: false,
            order_date: String::new(),
            timestamp: 0,
            thresholds: Thresholds::default(),
            limit_usdt: None,
            force_buy: false,
            force_sell: false,
            is_at_loss: false,
            break_even_price: None,
            pause_after_sell: false,
            is_paused: false,
            paused_reason: None,
        }
    }
}

impl CurrencyRecord {
    /// Whether the record has traded before (has either price anchor).
    pub fn has_anchor(&self) -> bool {
        self.last_buy_price.is_some() || self.last_sell_price.is_some()
    }
}

/// Buy/sell/stop-loss thresholds, all symmetric percentage changes.
///
/// `sell_percentage` is the minimum gain vs. the last buy required to sell;
/// `buy_percentage` the signed change vs. the last sell required to re-buy
/// (e.g. `-1.0` buys once the ask is 1% below the last sell price).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub sell_percentage: f64,
    pub buy_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_percentage: Option<f64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            sell_percentage: 5.0,
            buy_percentage: -1.0,
            warning_percentage: None,
            stop_loss_percentage: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pass-local market data
// ---------------------------------------------------------------------------

/// Best bid/ask for one currency, valid for the current pass only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub best_bid: f64,
    pub best_ask: f64,
}

/// One currency's account balance snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub available: f64,
    pub balance: f64,
}

/// Direction for the short-term trend confirmation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    Rising,
    Falling,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Falling => write!(f, "falling"),
        }
    }
}

// ---------------------------------------------------------------------------
// Order results
// ---------------------------------------------------------------------------

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// The durable, human-reviewable record of one executed order.
///
/// `quantity` and `summary` are display strings; when the fill was never
/// confirmed they carry an `Estimate`/`PLACED` marker and the placed price
/// stands in for the fill price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub name: String,
    /// Settlement units spent (buys) or asset units sold (sells).
    pub amount: f64,
    pub value_placed: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_filled: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Signed percentage vs. the last buy price (sell orders only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difference: Option<String>,
    pub quantity: String,
    pub summary: String,
    pub date: String,
}

impl OrderResult {
    pub fn buy(
        name: &str,
        amount_usdt: f64,
        value_placed: f64,
        value_filled: Option<f64>,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let value = value_filled.unwrap_or(value_placed);
        let (status, estimate) = fill_markers(value_filled.is_some());
        Self {
            side: OrderSide::Buy,
            name: name.to_string(),
            amount: amount_usdt,
            value_placed,
            value_filled,
            order_id,
            difference: None,
            quantity: format!("{estimate}{} {name}", amount_usdt / value),
            summary: format!(
                "Buy order {status} for ${amount_usdt} USD worth of {name} at {value_placed}"
            ),
            date: now.format(DATETIME_FORMAT).to_string(),
        }
    }

    pub fn sell(
        name: &str,
        quantity_sold: f64,
        value_placed: f64,
        value_filled: Option<f64>,
        difference: f64,
        order_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let value = value_filled.unwrap_or(value_placed);
        let (status, estimate) = fill_markers(value_filled.is_some());
        Self {
            side: OrderSide::Sell,
            name: name.to_string(),
            amount: quantity_sold,
            value_placed,
            value_filled,
            order_id,
            difference: Some(format_signed_percent(difference)),
            quantity: format!("{estimate}{:.2} USD", quantity_sold * value),
            summary: format!("Sell order {status} for {quantity_sold} {name} at ${value} USD"),
            date: now.format(DATETIME_FORMAT).to_string(),
        }
    }
}

fn fill_markers(filled: bool) -> (&'static str, &'static str) {
    if filled {
        ("FILLED", "")
    } else {
        ("PLACED", "Estimate ")
    }
}

impl fmt::Display for OrderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary)?;
        writeln!(f, "  quantity: {}", self.quantity)?;
        if let Some(diff) = &self.difference {
            writeln!(f, "  difference: {diff}")?;
        }
        if let Some(id) = &self.order_id {
            writeln!(f, "  orderId: {id}")?;
        }
        write!(f, "  date: {}", self.date)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
