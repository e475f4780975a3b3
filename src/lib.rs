//! Grid trading engine core: a lattice state machine, a persistent
//! order ledger, and the strategy loop that ties them to an abstract
//! exchange. See `DESIGN.md` for the grounding of each module.

pub mod balance;
pub mod bot;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod exchange;
pub mod grid;
pub mod ledger;
pub mod metrics;
pub mod order_manager;
pub mod strategy;

/// Initializes the `env_logger` backend. Call once, at process startup.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

pub mod prelude {
    pub use crate::balance::BalanceTracker;
    pub use crate::bot::GridBot;
    pub use crate::config::{Config, TradingMode};
    pub use crate::error::EngineError;
    pub use crate::event_bus::{BotEvent, ChannelEventBus, EventBus};
    pub use crate::exchange::{BacktestExchange, Exchange, OrderSide, PaperExchange};
    pub use crate::grid::{GridCycleState, GridLevel, GridManager};
    pub use crate::ledger::OrderLedger;
    pub use crate::order_manager::OrderManager;
    pub use crate::strategy::TradingStrategy;
}
