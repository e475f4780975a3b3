//! Assembles a single bot instance: config, grid, ledger, exchange, and
//! the strategy loop that drives them. One `GridBot` per configured
//! trading pair; bots never share mutable state (spec §5).

use std::sync::Arc;

use log::info;

use crate::config::Config;
use crate::event_bus::{ChannelEventBus, EventBus};
use crate::exchange::Exchange;
use crate::grid::manager::{GridConfig, GridManager};
use crate::ledger::OrderLedger;
use crate::order_manager::OrderManager;
use crate::strategy::TradingStrategy;

pub struct GridBot {
    pub strategy: TradingStrategy,
}

impl GridBot {
    pub async fn build(
        config: Config,
        exchange: Arc<dyn Exchange>,
        event_bus: Arc<dyn EventBus>,
    ) -> crate::error::Result<Self> {
        config.validate_ranges()?;

        let grid = GridManager::new(
            GridConfig {
                bottom: config.bottom_range,
                top: config.top_range,
                num_grids: config.num_grids,
                spacing: config.spacing_type,
            },
            config.strategy_type,
        );

        let ledger = OrderLedger::connect(&config.database_url).await?;
        let order_manager = OrderManager::new(config.bot_id, ledger);

        let strategy = TradingStrategy::new(config, grid, order_manager, exchange, event_bus);
        Ok(Self { strategy })
    }

    /// Convenience constructor wiring a fresh in-memory event bus,
    /// callers that don't care about consuming bot lifecycle events can
    /// use this instead of building one themselves.
    pub async fn build_with_default_bus(
        config: Config,
        exchange: Arc<dyn Exchange>,
    ) -> crate::error::Result<Self> {
        let (bus, _receiver) = ChannelEventBus::new();
        let bot = Self::build(config, exchange, Arc::new(bus)).await?;
        info!("bot built in {:?} mode", bot.strategy.mode());
        Ok(bot)
    }
}
