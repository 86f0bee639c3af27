//! RATCHET — Recurring Automated Threshold-CHecked Evaluation Trader
//!
//! Entry point for one scheduled pass. Loads configuration, initialises
//! structured logging, wires the exchange client, store and notifier into
//! the decision engine, runs a single pass, persists the result, and
//! flushes the batched run log. Any unhandled pass error trips the
//! fail-safe: the configuration is marked globally paused and an alert is
//! sent; no automated trading happens again until a human clears it.

use anyhow::Result;
use secrecy::SecretString;
use tracing::{error, info};

use ratchet::config::AppConfig;
use ratchet::engine::{OrderConfirmer, RunLog, Trader};
use ratchet::exchange::client::ExchangeClient;
use ratchet::notify::{DiscordNotifier, Notifier, NullNotifier};
use ratchet::storage::{JsonStore, PersistenceSink};

const BANNER: &str = r#"
 ____      _  _____ ____ _   _ _____ _____
|  _ \    / \|_   _/ ___| | | | ____|_   _|
| |_) |  / _ \ | || |   | |_| |  _|   | |
|  _ <  / ___ \| || |___|  _  | |___  | |
|_| \_\/_/   \_\_| \____|_| |_|_____| |_|

  Recurring Automated Threshold-CHecked Evaluation Trader
  v0.1.0 — one pass per invocation
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();
    println!("{BANNER}");
    info!(
        settlement = %cfg.trading.settlement_currency,
        trading_enabled = cfg.trading.enabled,
        "RATCHET starting up"
    );

    // -- Wire components --------------------------------------------------

    let notifier: Box<dyn Notifier> = if cfg.notifications.discord_enabled {
        let logs_url = cfg
            .notifications
            .logs_webhook_env
            .as_deref()
            .map(AppConfig::resolve_env)
            .transpose()?
            .unwrap_or_default();
        let alerts_url = cfg
            .notifications
            .alerts_webhook_env
            .as_deref()
            .map(AppConfig::resolve_env)
            .transpose()?
            .unwrap_or_default();
        Box::new(DiscordNotifier::new(logs_url, alerts_url))
    } else {
        Box::new(NullNotifier)
    };

    let api_key = AppConfig::resolve_env(&cfg.exchange.api_key_env)?;
    let api_secret = SecretString::new(AppConfig::resolve_env(&cfg.exchange.api_secret_env)?);

    let client = ExchangeClient::new(
        &cfg.exchange.base_url,
        api_key,
        api_secret,
        &cfg.trading.settlement_currency,
        &cfg.trading.trend_timeframe,
        cfg.trading.enabled,
    )?;

    let store = JsonStore::new(&cfg.state.config_path, &cfg.state.trades_path);

    // -- Load and validate the investment configuration --------------------

    // A load or validation failure is treated as a transient data problem:
    // alert and abort, leaving persisted state untouched.
    let investment = match store.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Could not load investment configuration");
            notifier
                .notify(&format!("Could not load investment configuration: {e}"), true)
                .await;
            return Err(e);
        }
    };

    if !investment.is_structurally_valid() {
        error!("Investment configuration failed structural validation");
        notifier
            .notify("Investment configuration failed validation — pass aborted", true)
            .await;
        anyhow::bail!("Investment configuration failed structural validation");
    }

    // -- Run one pass ------------------------------------------------------

    let mut log = RunLog::new(investment.options.simple_logs);
    let trader = Trader::new(
        &client,
        &client,
        &client,
        &store,
        notifier.as_ref(),
        OrderConfirmer::new(),
        &cfg.trading.settlement_currency,
    );

    let result = trader.run_pass(investment.clone(), &mut log).await;

    match result {
        Ok(outcome) => {
            if let Err(e) = store.persist_config(&outcome.config).await {
                error!(error = %e, "Failed to persist updated configuration");
                notifier
                    .notify(&format!("Failed to persist updated configuration: {e}"), true)
                    .await;
                flush_run_log(&log, notifier.as_ref()).await;
                return Err(e);
            }

            for order in &outcome.orders {
                notifier.notify(&order.to_string(), true).await;
            }
            flush_run_log(&log, notifier.as_ref()).await;

            info!(orders = outcome.orders.len(), "Invocation complete");
        }
        Err(e) => {
            // Fail-safe: stop all automated trading until a human clears it.
            error!(error = %e, "Pass failed — pausing all trading");

            let mut paused = investment;
            paused.is_paused = true;
            if let Err(persist_err) = store.persist_config(&paused).await {
                error!(error = %persist_err, "Failed to persist paused configuration");
            }

            notifier
                .notify(&format!("Trading pass failed and has been paused: {e}"), true)
                .await;
            flush_run_log(&log, notifier.as_ref()).await;
        }
    }

    Ok(())
}

/// Flush the accumulated pass log as one batched notification.
async fn flush_run_log(log: &RunLog, notifier: &dyn Notifier) {
    if !log.is_empty() {
        notifier.notify(&log.to_message(), false).await;
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ratchet=info"));

    let json_logging = std::env::var("RATCHET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
