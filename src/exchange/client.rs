//! Signed REST client for a crypto.com-v2-style exchange API.
//!
//! Public endpoints (ticker, candlestick, instruments) are plain GETs;
//! private endpoints (account summary, orders) use a signed POST envelope:
//! `sig = HMAC-SHA256(method + id + api_key + paramsString + nonce)` with
//! params concatenated in sorted key order, hex-encoded.
//!
//! Instrument trade precision is fetched once per process and cached;
//! the listing changes on exchange maintenance windows, not mid-pass.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AccountProvider, MarketData, OrderDetail, OrderGateway, OrderStatus};
use crate::types::{AccountBalance, Quote, TrendDirection};

type HmacSha256 = Hmac<Sha256>;

/// Number of recent candle closes inspected by the trend check.
const TREND_LOOKBACK: usize = 3;

const REQUEST_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// API response types (exchange JSON → Rust)
// ---------------------------------------------------------------------------

/// Standard response envelope. Non-zero `code` means the call failed.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    data: TickerData,
}

/// Ticker field names follow the exchange's single-letter convention.
#[derive(Debug, Deserialize)]
struct TickerData {
    /// Best bid.
    b: f64,
    /// Best ask.
    k: f64,
}

#[derive(Debug, Deserialize)]
struct CandlestickResult {
    data: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    /// Close price.
    c: f64,
}

#[derive(Debug, Deserialize)]
struct InstrumentsResult {
    instruments: Vec<Instrument>,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    base_currency: String,
    quantity_decimals: u32,
}

#[derive(Debug, Deserialize)]
struct AccountSummaryResult {
    accounts: Vec<Account>,
}

#[derive(Debug, Deserialize)]
struct Account {
    #[serde(default)]
    balance: f64,
    #[serde(default)]
    available: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResult {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderDetailResult {
    order_info: OrderInfo,
}

#[derive(Debug, Deserialize)]
struct OrderInfo {
    status: String,
    #[serde(default)]
    avg_price: f64,
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// Concatenate params in sorted key order as `key1value1key2value2…`,
/// matching the exchange's signature payload convention.
fn params_string(params: &Map<String, Value>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort();
    keys.into_iter().fold(String::new(), |mut acc, key| {
        acc.push_str(key);
        acc.push_str(&value_string(&params[key]));
        acc
    })
}

/// Render a param value the way it appears in the signature payload.
fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn sign(method: &str, id: u64, api_key: &str, params: &Map<String, Value>, nonce: i64, secret: &str) -> Result<String> {
    let payload = format!("{method}{id}{api_key}{}{nonce}", params_string(params));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow!("Invalid API secret length"))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

// ---------------------------------------------------------------------------
// Trend helper
// ---------------------------------------------------------------------------

/// Whether every consecutive pair of closes moves strictly in `direction`.
/// Equal closes break the trend; a flat market is not still moving.
fn is_strictly_trending(closes: &[f64], direction: TrendDirection) -> bool {
    if closes.len() < 2 {
        return false;
    }
    closes.windows(2).all(|pair| match direction {
        TrendDirection::Rising => pair[1] > pair[0],
        TrendDirection::Falling => pair[1] < pair[0],
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Exchange REST client. Implements all three provider traits consumed by
/// the decision engine.
pub struct ExchangeClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    settlement_currency: String,
    trend_timeframe: String,
    /// When false, order submissions are no-ops (internal-run mode).
    trading_enabled: bool,
    request_id: AtomicU64,
    precision_cache: Mutex<HashMap<String, u32>>,
}

impl ExchangeClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        api_secret: SecretString,
        settlement_currency: &str,
        trend_timeframe: &str,
        trading_enabled: bool,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("RATCHET/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build exchange HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            settlement_currency: settlement_currency.to_string(),
            trend_timeframe: trend_timeframe.to_string(),
            trading_enabled,
            request_id: AtomicU64::new(1),
            precision_cache: Mutex::new(HashMap::new()),
        })
    }

    fn instrument_name(&self, currency: &str) -> String {
        format!("{currency}_{}", self.settlement_currency)
    }

    // -- Transport helpers -----------------------------------------------

    async fn get_public(&self, path_and_query: &str) -> Result<Value> {
        let url = format!("{}/{path_and_query}", self.base_url);
        debug!(url = %url, "Exchange GET");

        let envelope: ApiEnvelope = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Request failed: {path_and_query}"))?
            .error_for_status()
            .with_context(|| format!("Request rejected: {path_and_query}"))?
            .json()
            .await
            .with_context(|| format!("Malformed response: {path_and_query}"))?;

        Self::unwrap_envelope(envelope, path_and_query)
    }

    async fn post_private(&self, method: &str, params: Map<String, Value>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let nonce = chrono::Utc::now().timestamp_millis();
        let sig = sign(
            method,
            id,
            &self.api_key,
            &params,
            nonce,
            self.api_secret.expose_secret(),
        )?;

        let body = json!({
            "id": id,
            "method": method,
            "api_key": self.api_key,
            "params": params,
            "nonce": nonce,
            "sig": sig,
        });

        let url = format!("{}/{method}", self.base_url);
        debug!(url = %url, id, "Exchange POST");

        let envelope: ApiEnvelope = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Request failed: {method}"))?
            .error_for_status()
            .with_context(|| format!("Request rejected: {method}"))?
            .json()
            .await
            .with_context(|| format!("Malformed response: {method}"))?;

        Self::unwrap_envelope(envelope, method)
    }

    fn unwrap_envelope(envelope: ApiEnvelope, what: &str) -> Result<Value> {
        if envelope.code != 0 {
            bail!(
                "Exchange error on {what}: code {} ({})",
                envelope.code,
                envelope.message.unwrap_or_default()
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow!("Empty result on {what}"))
    }

    // -- Endpoint helpers ------------------------------------------------

    async fn fetch_ticker(&self, currency: &str) -> Result<(String, Quote)> {
        let instrument = self.instrument_name(currency);
        let result = self
            .get_public(&format!(
                "public/get-ticker?instrument_name={}",
                urlencoding::encode(&instrument)
            ))
            .await?;
        let ticker: TickerResult = serde_json::from_value(result)
            .with_context(|| format!("Unexpected ticker shape for {instrument}"))?;

        Ok((
            currency.to_string(),
            Quote {
                best_bid: ticker.data.b,
                best_ask: ticker.data.k,
            },
        ))
    }

    async fn load_precision_map(&self) -> Result<HashMap<String, u32>> {
        let result = self.get_public("public/get-instruments").await?;
        let listing: InstrumentsResult =
            serde_json::from_value(result).context("Unexpected instruments shape")?;

        Ok(listing
            .instruments
            .into_iter()
            .map(|i| (i.base_currency, i.quantity_decimals))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketData for ExchangeClient {
    async fn get_quotes(&self, currencies: &[String]) -> Result<HashMap<String, Quote>> {
        let fetches = currencies.iter().map(|c| self.fetch_ticker(c));
        let quotes = join_all(fetches)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .collect::<HashMap<_, _>>();

        debug!(count = quotes.len(), "Quotes fetched");
        Ok(quotes)
    }

    async fn is_trending(&self, currency: &str, direction: TrendDirection) -> Result<bool> {
        let instrument = self.instrument_name(currency);
        let result = self
            .get_public(&format!(
                "public/get-candlestick?instrument_name={}&timeframe={}",
                urlencoding::encode(&instrument),
                self.trend_timeframe
            ))
            .await?;
        let candles: CandlestickResult = serde_json::from_value(result)
            .with_context(|| format!("Unexpected candlestick shape for {instrument}"))?;

        let closes: Vec<f64> = candles
            .data
            .iter()
            .rev()
            .take(TREND_LOOKBACK)
            .rev()
            .map(|c| c.c)
            .collect();

        let trending = is_strictly_trending(&closes, direction);
        debug!(currency, %direction, trending, ?closes, "Trend check");
        Ok(trending)
    }

    async fn quantity_decimals(&self, currency: &str) -> Result<u32> {
        {
            let cache = self.precision_cache.lock().unwrap();
            if let Some(dp) = cache.get(currency) {
                return Ok(*dp);
            }
        }

        let map = self.load_precision_map().await?;
        let dp = map
            .get(currency)
            .copied()
            .ok_or_else(|| anyhow!("Currency {currency} not in instrument listing"))?;

        *self.precision_cache.lock().unwrap() = map;
        Ok(dp)
    }
}

#[async_trait]
impl AccountProvider for ExchangeClient {
    async fn get_balances(&self) -> Result<HashMap<String, AccountBalance>> {
        let result = self
            .post_private("private/get-account-summary", Map::new())
            .await?;
        let summary: AccountSummaryResult =
            serde_json::from_value(result).context("Unexpected account summary shape")?;

        // Accounts with nothing available are noise for trading decisions.
        let balances: HashMap<String, AccountBalance> = summary
            .accounts
            .into_iter()
            .filter(|a| a.available > 0.0)
            .map(|a| {
                (
                    a.currency,
                    AccountBalance {
                        available: a.available,
                        balance: a.balance,
                    },
                )
            })
            .collect();

        debug!(count = balances.len(), "Balances fetched");
        Ok(balances)
    }
}

#[async_trait]
impl OrderGateway for ExchangeClient {
    async fn submit_buy(&self, currency: &str, notional: f64) -> Result<Option<String>> {
        if !self.trading_enabled {
            info!(currency, notional, "Trading disabled — buy not submitted");
            return Ok(None);
        }

        let mut params = Map::new();
        params.insert("instrument_name".into(), json!(self.instrument_name(currency)));
        params.insert("side".into(), json!("BUY"));
        params.insert("type".into(), json!("MARKET"));
        params.insert("notional".into(), json!(notional));
        params.insert("client_oid".into(), json!(uuid::Uuid::new_v4().to_string()));

        let result = self.post_private("private/create-order", params).await?;
        let created: CreateOrderResult =
            serde_json::from_value(result).context("Unexpected create-order shape")?;

        info!(currency, notional, order_id = %created.order_id, "Buy order submitted");
        Ok(Some(created.order_id))
    }

    async fn submit_sell(&self, currency: &str, quantity: f64) -> Result<Option<String>> {
        if !self.trading_enabled {
            info!(currency, quantity, "Trading disabled — sell not submitted");
            return Ok(None);
        }

        let mut params = Map::new();
        params.insert("instrument_name".into(), json!(self.instrument_name(currency)));
        params.insert("side".into(), json!("SELL"));
        params.insert("type".into(), json!("MARKET"));
        params.insert("quantity".into(), json!(quantity));
        params.insert("client_oid".into(), json!(uuid::Uuid::new_v4().to_string()));

        let result = self.post_private("private/create-order", params).await?;
        let created: CreateOrderResult =
            serde_json::from_value(result).context("Unexpected create-order shape")?;

        info!(currency, quantity, order_id = %created.order_id, "Sell order submitted");
        Ok(Some(created.order_id))
    }

    async fn order_detail(&self, order_id: &str) -> Result<OrderDetail> {
        let mut params = Map::new();
        params.insert("order_id".into(), json!(order_id));

        let raw = self.post_private("private/get-order-detail", params).await?;
        let detail: OrderDetailResult = serde_json::from_value(raw.clone())
            .with_context(|| format!("Unexpected order detail shape for {order_id}"))?;

        let status = match detail.order_info.status.as_str() {
            "FILLED" => OrderStatus::Filled,
            "ACTIVE" => OrderStatus::Active,
            "CANCELED" => OrderStatus::Canceled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            other => {
                warn!(order_id, status = other, "Unrecognized order status");
                OrderStatus::Active
            }
        };

        Ok(OrderDetail {
            status,
            avg_price: detail.order_info.avg_price,
            raw,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
