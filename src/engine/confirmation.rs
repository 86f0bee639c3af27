//! Order-fill confirmation.
//!
//! Market orders usually settle near-instantly, but the exchange's read
//! path can lag the matching engine. After submitting an order the engine
//! waits a short fixed delay and looks the order up; if it is not yet
//! filled it waits a shorter delay and looks up exactly once more. Whatever
//! happens, the order detail that was seen is persisted so every submitted
//! order leaves an audit record, and an unresolved fill falls back to the
//! decision-time price at the caller.
//!
//! A bounded loop with an explicit attempt counter and a total-timeout
//! guard: nothing here can stall a time-boxed scheduled pass.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::runlog::RunLog;
use crate::exchange::{OrderDetail, OrderGateway, OrderStatus};
use crate::storage::PersistenceSink;

/// Exactly two status lookups per order.
const MAX_ATTEMPTS: u32 = 2;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1500);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(750);
const DEFAULT_TOTAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the confirmation protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillOutcome {
    /// Average fill price reported by the exchange.
    Confirmed(f64),
    /// Fill could not be confirmed in time; callers fall back to the
    /// price used at decision time.
    Unresolved,
}

impl FillOutcome {
    pub fn price(&self) -> Option<f64> {
        match self {
            FillOutcome::Confirmed(price) => Some(*price),
            FillOutcome::Unresolved => None,
        }
    }
}

pub struct OrderConfirmer {
    initial_delay: Duration,
    retry_delay: Duration,
    total_timeout: Duration,
}

impl Default for OrderConfirmer {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            retry_delay: DEFAULT_RETRY_DELAY,
            total_timeout: DEFAULT_TOTAL_TIMEOUT,
        }
    }
}

impl OrderConfirmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the poll delays; tests run with zero delays.
    pub fn with_delays(initial: Duration, retry: Duration, total: Duration) -> Self {
        Self {
            initial_delay: initial,
            retry_delay: retry,
            total_timeout: total,
        }
    }

    /// Resolve the realized fill price for a just-submitted order.
    ///
    /// Failures in here are never fatal: lookup and persistence errors are
    /// logged and the outcome degrades to `Unresolved`.
    pub async fn confirm(
        &self,
        gateway: &dyn OrderGateway,
        sink: &dyn PersistenceSink,
        order_id: Option<&str>,
        log: &mut RunLog,
    ) -> FillOutcome {
        let Some(order_id) = order_id else {
            log.append("No order id returned — recording trade at decision-time price");
            return FillOutcome::Unresolved;
        };

        let started = Instant::now();
        let mut last_detail: Option<OrderDetail> = None;

        for attempt in 1..=MAX_ATTEMPTS {
            let delay = if attempt == 1 {
                self.initial_delay
            } else {
                self.retry_delay
            };
            tokio::time::sleep(delay).await;

            if started.elapsed() > self.total_timeout {
                warn!(order_id, attempt, "Confirmation timeout exceeded");
                break;
            }

            match gateway.order_detail(order_id).await {
                Ok(detail) => {
                    if detail.status == OrderStatus::Filled {
                        debug!(order_id, avg_price = detail.avg_price, "Order filled");
                        Self::persist(sink, &detail.raw).await;
                        return FillOutcome::Confirmed(detail.avg_price);
                    }
                    debug!(order_id, attempt, status = ?detail.status, "Order not yet filled");
                    last_detail = Some(detail);
                }
                Err(e) => {
                    warn!(order_id, attempt, error = %e, "Order lookup failed");
                }
            }
        }

        // Persist whatever was seen so the audit trail stays complete even
        // for unresolved fills.
        if let Some(detail) = last_detail {
            Self::persist(sink, &detail.raw).await;
        }

        log.append(format!(
            "Order {order_id} unconfirmed after {MAX_ATTEMPTS} checks — recording trade at decision-time price"
        ));
        FillOutcome::Unresolved
    }

    async fn persist(sink: &dyn PersistenceSink, raw: &serde_json::Value) {
        if let Err(e) = sink.persist_trade(raw).await {
            warn!(error = %e, "Failed to persist trade record");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
