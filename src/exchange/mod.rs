//! Exchange integration.
//!
//! Defines the provider traits the decision engine consumes (market data,
//! account balances, order placement) and the REST client implementing
//! them. The engine only ever sees the traits, so tests substitute
//! deterministic implementations and the client can be swapped without
//! touching trading logic.

pub mod client;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::types::{AccountBalance, Quote, TrendDirection};

/// Market data for one pass: quotes, trend confirmation, and instrument
/// trade precision.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Best bid/ask for every requested currency, quoted against the
    /// settlement currency. One logical call per pass.
    async fn get_quotes(&self, currencies: &[String]) -> Result<HashMap<String, Quote>>;

    /// Whether the currency's recent closes are still moving strictly in
    /// `direction`. Used only to gate non-forced trades.
    async fn is_trending(&self, currency: &str, direction: TrendDirection) -> Result<bool>;

    /// Maximum decimal places the instrument can be traded at.
    async fn quantity_decimals(&self, currency: &str) -> Result<u32>;
}

/// Account balances, refreshed at pass start and after every executed order.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Balances per currency; accounts with nothing available are omitted.
    async fn get_balances(&self) -> Result<HashMap<String, AccountBalance>>;
}

/// Current state of a submitted order as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    Active,
    Canceled,
    Rejected,
    Expired,
}

/// Detail returned by an order-status lookup. `raw` preserves the full
/// provider response for the audit trail.
#[derive(Debug, Clone)]
pub struct OrderDetail {
    pub status: OrderStatus,
    pub avg_price: f64,
    pub raw: serde_json::Value,
}

/// Market-order placement and status lookup.
///
/// Submissions return `None` when trading is globally disabled (internal-run
/// mode); the engine then records the decision with estimated values.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Market buy: spend `notional` settlement units on `currency`.
    async fn submit_buy(&self, currency: &str, notional: f64) -> Result<Option<String>>;

    /// Market sell: sell `quantity` units of `currency`.
    async fn submit_sell(&self, currency: &str, quantity: f64) -> Result<Option<String>>;

    /// Look up a submitted order.
    async fn order_detail(&self, order_id: &str) -> Result<OrderDetail>;
}
