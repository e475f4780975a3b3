//! Typed error taxonomy for the engine core.
//!
//! Component boundaries return `anyhow::Result` (matching the rest of the
//! crate), but the tick handler and initialization gate need to tell fatal
//! errors apart from transient ones, so the taxonomy is a concrete enum
//! that gets wrapped with `anyhow::Error::from` and can be recovered with
//! `.downcast_ref::<EngineError>()` at the point that cares.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid spacing type, non-positive ranges, missing investment.
    /// Fatal at construction.
    #[error("config error: {0}")]
    Config(String),

    /// Wallet free fiat balance is below the configured investment.
    /// Fatal at startup; the tick handler is never installed.
    #[error("insufficient funds: wallet has {available}, investment requires {required}")]
    InsufficientFunds { available: String, required: String },

    /// Network, rate-limit, or timeout on a non-critical exchange call.
    /// Logged and swallowed by the caller.
    #[error("transient exchange error: {0}")]
    ExchangeTransient(String),

    /// Failed initial purchase or failed initial grid placement.
    /// Sets running=false and surfaces to the supervisor.
    #[error("fatal exchange error: {0}")]
    ExchangeFatal(String),

    /// Unknown strategy type, unknown spacing, invalid pairing type.
    /// Programmer error, fail loudly.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Ledger already has an OPEN order at this price within tolerance.
    /// Skip placement, log, continue.
    #[error("duplicate order at price {price} for bot {bot_id}")]
    DuplicateOrder { bot_id: i64, price: String },
}

impl EngineError {
    /// True for errors that should halt the bot (vs. being logged and
    /// skipped at the next tick).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::InsufficientFunds { .. }
                | EngineError::ExchangeFatal(_)
                | EngineError::InvariantViolation(_)
        )
    }
}

pub type Result<T> = anyhow::Result<T>;
