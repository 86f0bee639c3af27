//! Deterministic in-memory collaborators for integration testing.
//!
//! `MockExchange` implements all three provider traits with fully
//! controllable quotes, balances, trend answers, and order behavior, all
//! in-memory with no external dependencies. Calls are counted so tests can
//! assert on provider traffic.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use ratchet::exchange::{AccountProvider, MarketData, OrderDetail, OrderGateway, OrderStatus};
use ratchet::notify::Notifier;
use ratchet::storage::PersistenceSink;
use ratchet::types::{AccountBalance, Configuration, Quote, TrendDirection};

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// One recorded order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub side: &'static str,
    pub currency: String,
    pub amount: f64,
}

#[derive(Default)]
pub struct MockExchange {
    quotes: Mutex<HashMap<String, Quote>>,
    balances: Mutex<HashMap<String, AccountBalance>>,
    falling: Mutex<HashSet<String>>,
    rising: Mutex<HashSet<String>>,
    decimals: Mutex<HashMap<String, u32>>,
    /// Returned from every submission; `None` models disabled trading.
    order_id: Mutex<Option<String>>,
    /// Average fill price reported on lookup; `None` keeps orders ACTIVE.
    fill_price: Mutex<Option<f64>>,
    pub submissions: Mutex<Vec<Submission>>,
    pub balance_fetches: AtomicUsize,
    pub detail_calls: AtomicUsize,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, currency: &str, best_bid: f64, best_ask: f64) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .insert(currency.to_string(), Quote { best_bid, best_ask });
        self
    }

    pub fn with_balance(self, currency: &str, available: f64) -> Self {
        self.balances.lock().unwrap().insert(
            currency.to_string(),
            AccountBalance {
                available,
                balance: available,
            },
        );
        self
    }

    pub fn with_order_id(self, order_id: &str) -> Self {
        *self.order_id.lock().unwrap() = Some(order_id.to_string());
        self
    }

    pub fn with_fill(self, price: f64) -> Self {
        *self.fill_price.lock().unwrap() = Some(price);
        self
    }

    pub fn with_decimals(self, currency: &str, decimal_places: u32) -> Self {
        self.decimals
            .lock()
            .unwrap()
            .insert(currency.to_string(), decimal_places);
        self
    }

    pub fn still_falling(self, currency: &str) -> Self {
        self.falling.lock().unwrap().insert(currency.to_string());
        self
    }

    pub fn still_rising(self, currency: &str) -> Self {
        self.rising.lock().unwrap().insert(currency.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketData for MockExchange {
    async fn get_quotes(&self, currencies: &[String]) -> Result<HashMap<String, Quote>> {
        let quotes = self.quotes.lock().unwrap();
        Ok(currencies
            .iter()
            .filter_map(|c| quotes.get(c).map(|q| (c.clone(), *q)))
            .collect())
    }

    async fn is_trending(&self, currency: &str, direction: TrendDirection) -> Result<bool> {
        Ok(match direction {
            TrendDirection::Falling => self.falling.lock().unwrap().contains(currency),
            TrendDirection::Rising => self.rising.lock().unwrap().contains(currency),
        })
    }

    async fn quantity_decimals(&self, currency: &str) -> Result<u32> {
        Ok(self
            .decimals
            .lock()
            .unwrap()
            .get(currency)
            .copied()
            .unwrap_or(2))
    }
}

#[async_trait]
impl AccountProvider for MockExchange {
    async fn get_balances(&self) -> Result<HashMap<String, AccountBalance>> {
        self.balance_fetches.fetch_add(1, Ordering::SeqCst);
        let balances = self.balances.lock().unwrap();
        Ok(balances
            .iter()
            .filter(|(_, b)| b.available > 0.0)
            .map(|(c, b)| (c.clone(), *b))
            .collect())
    }
}

#[async_trait]
impl OrderGateway for MockExchange {
    async fn submit_buy(&self, currency: &str, notional: f64) -> Result<Option<String>> {
        self.submissions.lock().unwrap().push(Submission {
            side: "BUY",
            currency: currency.to_string(),
            amount: notional,
        });
        Ok(self.order_id.lock().unwrap().clone())
    }

    async fn submit_sell(&self, currency: &str, quantity: f64) -> Result<Option<String>> {
        self.submissions.lock().unwrap().push(Submission {
            side: "SELL",
            currency: currency.to_string(),
            amount: quantity,
        });
        Ok(self.order_id.lock().unwrap().clone())
    }

    async fn order_detail(&self, order_id: &str) -> Result<OrderDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        match *self.fill_price.lock().unwrap() {
            Some(price) => Ok(OrderDetail {
                status: OrderStatus::Filled,
                avg_price: price,
                raw: json!({ "order_id": order_id, "status": "FILLED", "avg_price": price }),
            }),
            None => Ok(OrderDetail {
                status: OrderStatus::Active,
                avg_price: 0.0,
                raw: json!({ "order_id": order_id, "status": "ACTIVE" }),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, bool)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, is_alert)| *is_alert)
            .map(|(m, _)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, is_alert: bool) {
        self.messages
            .lock()
            .unwrap()
            .push((message.to_string(), is_alert));
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySink {
    pub configs: Mutex<Vec<Configuration>>,
    pub trades: Mutex<Vec<serde_json::Value>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn persist_config(&self, config: &Configuration) -> Result<()> {
        self.configs.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn persist_trade(&self, raw_order: &serde_json::Value) -> Result<()> {
        self.trades.lock().unwrap().push(raw_order.clone());
        Ok(())
    }
}
