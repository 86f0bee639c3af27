//! Config mutator — the pure function producing the next per-currency
//! record after a settled trade.
//!
//! Owns every record field *except* thresholds and the loss sub-state,
//! which belong to the stop-loss path inside the decision engine. Taking
//! the clock as an argument keeps the function pure: identical inputs
//! always produce identical output.

use chrono::{DateTime, Utc};

use crate::types::{Configuration, OrderSide, DATETIME_FORMAT};

/// Produce the configuration that follows a settled trade on `currency`.
///
/// Sets the matching price anchor, clears the other, flips `is_holding`,
/// stamps the order date/timestamp, clears the one-shot force flag that
/// triggered the trade and, for sells on a capital-limited record, replaces
/// `limit_usdt` with the realized settlement value (floored to whole units)
/// so allocated capital compounds across cycles.
///
/// The record is created with default thresholds when absent; a currency's
/// record comes into existence on its first-ever buy.
pub fn apply_trade(
    config: &Configuration,
    currency: &str,
    settled_price: f64,
    side: OrderSide,
    settled_usdt_value: Option<f64>,
    now: DateTime<Utc>,
) -> Configuration {
    let mut next = config.clone();
    let record = next.records.entry(currency.to_string()).or_default();

    match side {
        OrderSide::Buy => {
            record.last_buy_price = Some(settled_price);
            record.last_sell_price = None;
            record.is_holding = true;
            record.force_buy = false;
        }
        OrderSide::Sell => {
            record.last_sell_price = Some(settled_price);
            record.last_buy_price = None;
            record.is_holding = false;
            record.force_sell = false;
            if record.limit_usdt.is_some() {
                if let Some(realized) = settled_usdt_value {
                    record.limit_usdt = Some(realized.floor());
                }
            }
        }
    }

    record.order_date = now.format(DATETIME_FORMAT).to_string();
    record.timestamp = now.timestamp_millis();

    next
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
