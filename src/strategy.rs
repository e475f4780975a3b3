//! The trading strategy loop: the once-only grid-placement gate,
//! take-profit/stop-loss evaluation, and the live/paper and backtest
//! drivers. Unchanged in shape from spec §4.F; grounded on
//! `original_source/strategies/grid_trading_strategy.py` for the exact
//! control flow (balance sync → cap to investment → once-only init gate
//! → TP/SL gate → shutdown) and on the teacher's `async_trait`-based
//! `Strategy` trait (`src/strategies/mod.rs`) for the Rust trait shape.

use std::sync::Arc;

use log::{info, warn};
use rust_decimal::Decimal;

use crate::balance::BalanceTracker;
use crate::config::{Config, TradingMode};
use crate::error::EngineError;
use crate::event_bus::{BotEvent, EventBus};
use crate::exchange::{BacktestExchange, Exchange, PlacedOrder};
use crate::grid::manager::GridManager;
use crate::metrics::{MetricsRecorder, PerformanceSummary};
use crate::order_manager::OrderManager;

pub struct TradingStrategy {
    config: Config,
    grid: GridManager,
    balances: BalanceTracker,
    order_manager: OrderManager,
    exchange: Arc<dyn Exchange>,
    event_bus: Arc<dyn EventBus>,
    metrics: MetricsRecorder,
    /// Set once the first tick has placed the initial grid of orders,
    /// mirrors the Python driver's `_initialize_grid_orders_once` gate.
    grid_orders_initialized: bool,
    running: bool,
    initial_account_value: Decimal,
}

impl TradingStrategy {
    pub fn new(
        config: Config,
        grid: GridManager,
        order_manager: OrderManager,
        exchange: Arc<dyn Exchange>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            config,
            grid,
            balances: BalanceTracker::new(),
            order_manager,
            exchange,
            event_bus,
            metrics: MetricsRecorder::new(),
            grid_orders_initialized: false,
            running: true,
            initial_account_value: Decimal::ZERO,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Syncs balances from the venue and caps exposure to the configured
    /// investment. Zone classification, the rebalance purchase, and grid
    /// placement happen once, on the first `on_ticker_update` tick, not
    /// here, matching the Python driver's `initialize_strategy` (balance
    /// sync only) versus `_initialize_grid_orders_once` (the rest).
    pub async fn initialize_strategy(&mut self, current_price: Decimal) -> crate::error::Result<()> {
        let live_balance = self.exchange.get_balance().await?;

        // Cap exposure to the configured investment even if the venue
        // reports more, mirrors the Python driver's investment-cap
        // logic in `_run_live_or_paper_trading`.
        let capped_fiat = live_balance.fiat.min(self.config.investment_amount);
        if capped_fiat < self.config.investment_amount && live_balance.fiat < self.config.investment_amount {
            return Err(EngineError::InsufficientFunds {
                available: live_balance.fiat.to_string(),
                required: self.config.investment_amount.to_string(),
            }
            .into());
        }
        self.balances.setup_balances(capped_fiat, live_balance.crypto);

        self.grid.initialize_grids_and_levels()?;

        self.initial_account_value = self.balances.get_total_balance_value(current_price);
        info!(
            "strategy initialized for bot {}: investment={} starting value={}",
            self.config.bot_id, self.config.investment_amount, self.initial_account_value
        );
        Ok(())
    }

    /// Runs, in order and exactly once, the gate the Python driver calls
    /// `_initialize_grid_orders_once`: cancel anything resting from a
    /// prior run, classify rungs against the current price, perform the
    /// rebalance purchase, then place the initial grid. Any failure here
    /// halts the loop, matching the Python's `except: self._running =
    /// False; return False`.
    async fn initialize_grid_orders_once(&mut self, current_price: Decimal) -> crate::error::Result<()> {
        if let Err(err) = self
            .order_manager
            .cancel_all_open_orders(&mut self.balances, self.exchange.as_ref())
            .await
        {
            warn!("cancel_all_open_orders failed during grid init for bot {}: {}", self.config.bot_id, err);
        }

        self.grid.update_zones_based_on_price(current_price);

        if let Err(err) = self
            .order_manager
            .perform_initial_purchase(&self.grid, &mut self.balances, self.exchange.as_ref(), current_price)
            .await
        {
            self.running = false;
            return Err(err);
        }

        if let Err(err) = self
            .order_manager
            .initialize_grid_orders(&mut self.grid, &mut self.balances, self.exchange.as_ref())
            .await
        {
            self.running = false;
            return Err(err);
        }

        Ok(())
    }

    /// Handles one price tick: places the initial grid on the first
    /// call, settles any fills the caller observed, records a metric
    /// sample, and checks TP/SL.
    pub async fn on_ticker_update(
        &mut self,
        current_price: Decimal,
        filled: Vec<PlacedOrder>,
    ) -> crate::error::Result<()> {
        if !self.running {
            return Ok(());
        }

        if !self.grid_orders_initialized {
            self.initialize_grid_orders_once(current_price).await?;
            self.grid_orders_initialized = true;
        }

        if !filled.is_empty() {
            self.order_manager
                .simulate_order_fills(&mut self.grid, &mut self.balances, self.exchange.as_ref(), filled)
                .await?;
        }

        let account_value = self.balances.get_total_balance_value(current_price);
        self.metrics.push(account_value, current_price);

        self.evaluate_tp_or_sl(account_value, current_price).await?;
        Ok(())
    }

    /// Absolute-threshold TP/SL, matching
    /// `_evaluate_tp_or_sl`/`_handle_take_profit`/`_handle_stop_loss`,
    /// not the teacher's percentage-trailing `StopLossManager`.
    async fn evaluate_tp_or_sl(
        &mut self,
        account_value: Decimal,
        current_price: Decimal,
    ) -> crate::error::Result<()> {
        if self.initial_account_value.is_zero() {
            return Ok(());
        }
        let return_pct = (account_value - self.initial_account_value) / self.initial_account_value
            * Decimal::from(100);

        let take_profit_hit = self.config.take_profit_enabled
            && self
                .config
                .take_profit_threshold
                .is_some_and(|threshold| return_pct >= threshold);
        let stop_loss_hit = self.config.stop_loss_enabled
            && self
                .config
                .stop_loss_threshold
                .is_some_and(|threshold| return_pct <= -threshold);

        if take_profit_hit || stop_loss_hit {
            let reason = if take_profit_hit { "take profit" } else { "stop loss" };
            warn!(
                "{} triggered for bot {} at return {}%",
                reason, self.config.bot_id, return_pct
            );
            self.order_manager
                .execute_take_profit_or_stop_loss_order(&mut self.balances, self.exchange.as_ref(), current_price)
                .await?;
            self.running = false;
            self.event_bus
                .publish(BotEvent::StopBot {
                    bot_id: self.config.bot_id,
                    reason: reason.to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Cancels every resting order and, if `sell_assets`, liquidates the
    /// crypto position. Always halts the loop.
    pub async fn stop(&mut self, sell_assets: bool) -> crate::error::Result<()> {
        self.order_manager
            .cancel_all_open_orders(&mut self.balances, self.exchange.as_ref())
            .await?;
        if sell_assets {
            let price = self.exchange.get_price().await?;
            self.order_manager
                .liquidate_positions(&mut self.balances, self.exchange.as_ref(), price)
                .await?;
        }
        self.running = false;
        self.event_bus
            .publish(BotEvent::StopBot {
                bot_id: self.config.bot_id,
                reason: "manual stop".into(),
            })
            .await;
        Ok(())
    }

    /// Re-arms the once-only init gate and resumes the loop, without
    /// touching the persisted ledger.
    pub async fn restart(&mut self, current_price: Decimal) -> crate::error::Result<()> {
        self.grid.initialize_grids_and_levels()?;
        self.grid.update_zones_based_on_price(current_price);
        self.grid_orders_initialized = false;
        self.running = true;
        Ok(())
    }

    /// Drives a `BacktestExchange` candle-by-candle until exhausted or
    /// TP/SL halts the loop.
    pub async fn run_backtest(&mut self, exchange: &BacktestExchange) -> crate::error::Result<()> {
        while self.running {
            let Some((candle, filled)) = exchange.advance() else {
                break;
            };
            self.on_ticker_update(candle.close, filled).await?;
        }
        Ok(())
    }

    pub fn performance_summary(&self) -> Option<PerformanceSummary> {
        self.metrics.summary(self.balances.total_fees)
    }

    pub fn balances(&self) -> &BalanceTracker {
        &self.balances
    }

    pub fn mode(&self) -> TradingMode {
        self.config.trading_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperExchange;
    use crate::grid::manager::{GridConfig, SpacingType, StrategyType};
    use crate::ledger::OrderLedger;
    use crate::event_bus::ChannelEventBus;
    use rust_decimal_macros::dec;

    async fn make_strategy(investment: Decimal) -> (TradingStrategy, Arc<PaperExchange>) {
        let exchange = Arc::new(PaperExchange::new(investment, dec!(0), dec!(100)));
        let mut grid = GridManager::new(
            GridConfig {
                bottom: dec!(90),
                top: dec!(110),
                num_grids: 5,
                spacing: SpacingType::Arithmetic,
            },
            StrategyType::SimpleGrid,
        );
        grid.initialize_grids_and_levels().unwrap();
        let ledger = OrderLedger::connect("sqlite::memory:").await.unwrap();
        let order_manager = OrderManager::new(1, ledger);
        let (bus, _rx) = ChannelEventBus::new();
        let config = Config {
            bot_id: 1,
            bottom_range: dec!(90),
            top_range: dec!(110),
            num_grids: 5,
            spacing_type: SpacingType::Arithmetic,
            strategy_type: StrategyType::SimpleGrid,
            investment_amount: investment,
            trading_mode: TradingMode::PaperTrading,
            timeframe: "1h".into(),
            start_date: None,
            end_date: None,
            take_profit_enabled: true,
            take_profit_threshold: Some(dec!(5)),
            stop_loss_enabled: true,
            stop_loss_threshold: Some(dec!(5)),
            database_url: "sqlite::memory:".into(),
        };
        let strategy = TradingStrategy::new(
            config,
            grid,
            order_manager,
            exchange.clone() as Arc<dyn Exchange>,
            Arc::new(bus),
        );
        (strategy, exchange)
    }

    #[tokio::test]
    async fn initialize_strategy_caps_to_investment() {
        let (mut strategy, _exchange) = make_strategy(dec!(1000)).await;
        strategy.initialize_strategy(dec!(100)).await.unwrap();
        assert_eq!(strategy.balances().fiat_balance, dec!(1000));
    }

    #[tokio::test]
    async fn first_tick_places_grid_orders_once() {
        let (mut strategy, _exchange) = make_strategy(dec!(1000)).await;
        strategy.initialize_strategy(dec!(100)).await.unwrap();
        strategy.on_ticker_update(dec!(100), vec![]).await.unwrap();
        assert!(strategy.grid_orders_initialized);
        strategy.on_ticker_update(dec!(101), vec![]).await.unwrap();
        // Second tick should not re-place and should not error.
        assert!(strategy.is_running());
    }

    #[tokio::test]
    async fn take_profit_halts_the_loop() {
        let (mut strategy, _exchange) = make_strategy(dec!(1000)).await;
        strategy.initialize_strategy(dec!(100)).await.unwrap();
        strategy.on_ticker_update(dec!(100), vec![]).await.unwrap();
        // Fabricate a large account value to trip the 5% take-profit.
        strategy.balances.fiat_balance = dec!(2000);
        strategy.on_ticker_update(dec!(100), vec![]).await.unwrap();
        assert!(!strategy.is_running());
    }

    #[tokio::test]
    async fn stop_cancels_and_halts() {
        let (mut strategy, _exchange) = make_strategy(dec!(1000)).await;
        strategy.initialize_strategy(dec!(100)).await.unwrap();
        strategy.on_ticker_update(dec!(100), vec![]).await.unwrap();
        strategy.stop(false).await.unwrap();
        assert!(!strategy.is_running());
    }
}
