//! Decision engine — one pass over the tracked currencies.
//!
//! For each currency, in configured order: apply the buy/sell threshold
//! rules, guardrails and trend confirmation, place at most one market
//! order, resolve its fill through the confirmation protocol, and advance
//! the persisted record through the config mutator. Balances are
//! re-fetched before the first evaluation that follows an executed order
//! so no decision is ever made from a stale balance.
//!
//! Provider failures are not caught here; they propagate to the top-level
//! pause-and-alert handler.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::engine::confirmation::OrderConfirmer;
use crate::engine::mutator::apply_trade;
use crate::engine::runlog::{PriceContext, RunLog};
use crate::exchange::{AccountProvider, MarketData, OrderGateway};
use crate::notify::Notifier;
use crate::storage::PersistenceSink;
use crate::types::{
    format_signed_percent, percent_change, round_down, AccountBalance, Configuration,
    CurrencyRecord, OrderResult, OrderSide, Quote, TrendDirection,
};

/// After a stop-loss sell the thresholds are tightened so the cycle is
/// forced into recovery: re-buy once the price climbs 0.5% clear of the
/// sell, and tolerate at most a further 1% slide before selling again.
const LOSS_REENTRY_TRIGGER_PERCENT: f64 = 0.5;
const LOSS_TOLERANCE_PERCENT: f64 = -1.0;

/// A recovery sell at 1% above the original buy price offsets the realized
/// loss plus the re-entry cost.
const BREAK_EVEN_MULTIPLIER: f64 = 1.01;

/// Everything a pass hands back to its caller: the next configuration to
/// persist and the orders executed, in evaluation order.
#[derive(Debug)]
pub struct PassOutcome {
    pub config: Configuration,
    pub orders: Vec<OrderResult>,
}

pub struct Trader<'a> {
    market: &'a dyn MarketData,
    account: &'a dyn AccountProvider,
    gateway: &'a dyn OrderGateway,
    sink: &'a dyn PersistenceSink,
    notifier: &'a dyn Notifier,
    confirmer: OrderConfirmer,
    settlement_currency: String,
}

impl<'a> Trader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market: &'a dyn MarketData,
        account: &'a dyn AccountProvider,
        gateway: &'a dyn OrderGateway,
        sink: &'a dyn PersistenceSink,
        notifier: &'a dyn Notifier,
        confirmer: OrderConfirmer,
        settlement_currency: &str,
    ) -> Self {
        Self {
            market,
            account,
            gateway,
            sink,
            notifier,
            confirmer,
            settlement_currency: settlement_currency.to_string(),
        }
    }

    /// Run one complete pass and return the updated configuration plus the
    /// executed orders.
    pub async fn run_pass(&self, config: Configuration, log: &mut RunLog) -> Result<PassOutcome> {
        if config.is_paused {
            log.append("Configuration is paused — no trades evaluated");
            info!("Global pause set — skipping pass");
            return Ok(PassOutcome {
                config,
                orders: Vec::new(),
            });
        }

        let currencies = config.currencies_targeted.clone();
        let quotes = self.market.get_quotes(&currencies).await?;
        let mut balances = self.account.get_balances().await?;
        let mut balances_stale = false;

        let mut config = config;
        let mut orders: Vec<OrderResult> = Vec::new();

        for name in &currencies {
            // Never decide from a balance that predates an executed order.
            if balances_stale {
                balances = self.account.get_balances().await?;
                balances_stale = false;
            }

            let record = config.records.get(name).cloned().unwrap_or_default();

            if record.is_paused {
                let reason = record
                    .paused_reason
                    .clone()
                    .unwrap_or_else(|| "no reason recorded".to_string());
                log.append(format!("{name} is paused ({reason}) — skipped"));
                continue;
            }

            let Some(quote) = quotes.get(name).copied() else {
                warn!(currency = %name, "No quote returned");
                log.append(format!("No market quote for {name} — skipped"));
                continue;
            };

            let usdt_available = balances
                .get(&self.settlement_currency)
                .map(|b| b.available)
                .unwrap_or(0.0);
            // Whole units only; fractional remainders read as false
            // buying power.
            let can_buy = usdt_available.floor() >= 1.0;
            let can_sell = balances
                .iter()
                .any(|(currency, b)| currency != &self.settlement_currency && b.available > 0.0);

            if !can_buy && !can_sell {
                log.append("No tradable balances available — stopping pass");
                self.notifier
                    .notify("No balances are available to trade with — pass stopped", true)
                    .await;
                break;
            }

            let amount_usdt = match record.limit_usdt {
                Some(limit) => limit.min(usdt_available).floor(),
                None => usdt_available.floor(),
            };

            let initial_buy = !record.has_anchor() && can_buy;

            let placed = if record.last_sell_price.is_some() || record.force_buy || initial_buy {
                self.evaluate_buy(&mut config, name, &record, quote, amount_usdt, initial_buy, log)
                    .await?
            } else if record.last_buy_price.is_some() {
                self.evaluate_sell(&mut config, name, &record, quote, &balances, log)
                    .await?
            } else {
                // No anchors and nothing to buy with: a record in this state
                // is a data problem, not a trading decision.
                warn!(currency = %name, "Record has no price anchors and no buying power");
                log.append(format!(
                    "{name} has no price history and nothing to buy with — skipped"
                ));
                None
            };

            if let Some(order) = placed {
                orders.push(order);
                balances_stale = true;
            }
        }

        info!(orders = orders.len(), "Pass complete");
        Ok(PassOutcome { config, orders })
    }

    // -- Buy side ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn evaluate_buy(
        &self,
        config: &mut Configuration,
        name: &str,
        record: &CurrencyRecord,
        quote: Quote,
        amount_usdt: f64,
        initial_buy: bool,
        log: &mut RunLog,
    ) -> Result<Option<OrderResult>> {
        let forced = record.force_buy;

        if !forced && !initial_buy {
            let Some(last_sell) = record.last_sell_price else {
                return Ok(None);
            };
            let diff = percent_change(quote.best_ask, last_sell);
            log.price_status(name, PriceContext::Sold, last_sell, quote.best_ask, diff);

            if record.is_at_loss {
                // Recovery buy-back: wait for the price to climb clear of
                // the re-entry trigger before going back in.
                if diff < record.thresholds.buy_percentage {
                    return Ok(None);
                }
            } else if diff > record.thresholds.buy_percentage {
                // Has not dropped enough to re-buy.
                return Ok(None);
            }
        }

        if !forced && self.market.is_trending(name, TrendDirection::Falling).await? {
            log.append(format!("{name} is still falling — holding off buying"));
            return Ok(None);
        }

        if amount_usdt < 1.0 {
            log.append(format!(
                "Not enough {} to buy {name} — skipped",
                self.settlement_currency
            ));
            return Ok(None);
        }

        let order_id = self.gateway.submit_buy(name, amount_usdt).await?;
        let fill = self
            .confirmer
            .confirm(self.gateway, self.sink, order_id.as_deref(), log)
            .await;
        let settled = fill.price().unwrap_or(quote.best_ask);

        *config = apply_trade(config, name, settled, OrderSide::Buy, None, Utc::now());

        info!(currency = %name, amount = amount_usdt, settled, forced, "Buy executed");
        Ok(Some(OrderResult::buy(
            name,
            amount_usdt,
            quote.best_ask,
            fill.price(),
            order_id,
            Utc::now(),
        )))
    }

    // -- Sell side --------------------------------------------------------

    async fn evaluate_sell(
        &self,
        config: &mut Configuration,
        name: &str,
        record: &CurrencyRecord,
        quote: Quote,
        balances: &HashMap<String, AccountBalance>,
        log: &mut RunLog,
    ) -> Result<Option<OrderResult>> {
        let Some(last_buy) = record.last_buy_price else {
            return Ok(None);
        };
        let thresholds = &record.thresholds;

        let diff = percent_change(quote.best_bid, last_buy);
        log.price_status(name, PriceContext::Bought, last_buy, quote.best_bid, diff);

        let stop_loss_hit = thresholds
            .stop_loss_percentage
            .map_or(false, |limit| diff < limit);
        let force_sell = stop_loss_hit || record.force_sell;

        if diff < thresholds.sell_percentage && !force_sell {
            if let Some(warning) = thresholds.warning_percentage {
                if diff < warning {
                    warn!(currency = %name, diff, warning, "Holdings below warning threshold");
                    log.append(format!(
                        "Warning: {name} is at {} against its last buy price",
                        format_signed_percent(diff)
                    ));
                }
            }
            return Ok(None); // hold
        }

        if !force_sell && self.market.is_trending(name, TrendDirection::Rising).await? {
            log.append(format!("{name} is still rising — holding off selling"));
            return Ok(None);
        }

        let available = balances.get(name).map(|b| b.available).unwrap_or(0.0);
        let decimals = self.market.quantity_decimals(name).await?;
        let quantity = round_down(available, decimals);

        if quantity <= 0.0 {
            warn!(currency = %name, available, "Nothing tradable to sell");
            log.append(format!("No tradable {name} balance to sell — skipped"));
            return Ok(None);
        }

        let order_id = self.gateway.submit_sell(name, quantity).await?;
        let fill = self
            .confirmer
            .confirm(self.gateway, self.sink, order_id.as_deref(), log)
            .await;
        let settled = fill.price().unwrap_or(quote.best_bid);

        *config = apply_trade(
            config,
            name,
            settled,
            OrderSide::Sell,
            Some(quantity * settled),
            Utc::now(),
        );

        if let Some(updated) = config.records.get_mut(name) {
            if stop_loss_hit {
                // Tighten the cycle so the next buy must be a recovery
                // buy-back and the next slide is cut early.
                updated.thresholds.buy_percentage = LOSS_REENTRY_TRIGGER_PERCENT;
                updated.thresholds.stop_loss_percentage = Some(LOSS_TOLERANCE_PERCENT);
                if !record.is_at_loss {
                    let break_even = last_buy * BREAK_EVEN_MULTIPLIER;
                    updated.break_even_price = Some(break_even);
                    // The next sell at break-even recovers this loss plus
                    // the re-entry cost.
                    updated.thresholds.sell_percentage = percent_change(break_even, settled);
                }
                updated.is_at_loss = true;
                updated.pause_after_sell = true;
                log.append(format!(
                    "Stop-loss sell for {name} — entering break-even recovery"
                ));
            } else if record.pause_after_sell {
                updated.is_paused = true;
                updated.paused_reason =
                    Some("Break-even reached after stop-loss recovery".to_string());
                updated.is_at_loss = false;
                updated.break_even_price = None;
                updated.pause_after_sell = false;
                log.append(format!("{name} recovered to break-even — pausing the cycle"));
            }
        }

        info!(
            currency = %name,
            quantity,
            settled,
            stop_loss = stop_loss_hit,
            "Sell executed"
        );
        Ok(Some(OrderResult::sell(
            name,
            quantity,
            quote.best_bid,
            fill.price(),
            diff,
            order_id,
            Utc::now(),
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
//
// Full-pass scenarios live in tests/engine_pass.rs against the in-memory
// mock exchange; these unit tests pin the two properties that forbid any
// provider traffic.
