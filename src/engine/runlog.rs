//! Run logger — the per-pass diagnostic line buffer.
//!
//! One pass makes many micro-decisions that are individually too small to
//! notify about. Lines accumulate here and are flushed as a single batched
//! notification at pass end, whatever the outcome. Each appended line is
//! also emitted through `tracing` so local logs stay complete.

use tracing::debug;

use crate::types::format_signed_percent;

/// Append-only line buffer for one pass.
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
    simple: bool,
}

/// Which anchor a price-status line is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceContext {
    Bought,
    Sold,
}

impl RunLog {
    pub fn new(simple_logs: bool) -> Self {
        Self {
            lines: Vec::new(),
            simple: simple_logs,
        }
    }

    pub fn append(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(target: "ratchet::pass", "{line}");
        self.lines.push(line);
    }

    /// Append the standard per-currency price-status line.
    pub fn price_status(&mut self, name: &str, context: PriceContext, anchor: f64, current: f64, diff: f64) {
        let line = format_price_status(name, context, anchor, current, diff, self.simple);
        self.append(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// All lines joined for the single batched notification.
    pub fn to_message(&self) -> String {
        self.lines.join("\n")
    }
}

/// One line describing where a currency sits relative to its price anchor.
///
/// Verbose: `DOGE was last bought at 0.34 and is now 0.4 (+14.67%)`.
/// Simple: `Holding DOGE (+14.67%)` / `Waiting to buy DOGE (-0.50%)`.
fn format_price_status(
    name: &str,
    context: PriceContext,
    anchor: f64,
    current: f64,
    diff: f64,
    simple: bool,
) -> String {
    let signed = format_signed_percent(diff);

    if simple {
        return match context {
            PriceContext::Bought => format!("Holding {name} ({signed})"),
            PriceContext::Sold => format!("Waiting to buy {name} ({signed})"),
        };
    }

    let verb = match context {
        PriceContext::Bought => "bought",
        PriceContext::Sold => "sold",
    };

    format!(
        "{name} was last {verb} at {} and is now {} ({signed})",
        trim_price(anchor),
        trim_price(current)
    )
}

/// Large prices carry pointless decimal tails; trim anything above 10 to
/// two decimal places.
fn trim_price(price: f64) -> String {
    if price > 10.0 {
        format!("{price:.2}")
    } else {
        price.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
