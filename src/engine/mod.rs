//! The trading core: decision engine, order confirmation, config mutation,
//! and the per-pass run log.

pub mod confirmation;
pub mod mutator;
pub mod runlog;
pub mod trader;

pub use confirmation::{FillOutcome, OrderConfirmer};
pub use runlog::RunLog;
pub use trader::{PassOutcome, Trader};
