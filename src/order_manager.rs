//! Bridges `GridManager`/`BalanceTracker` state to a concrete `Exchange`
//! and the persistent ledger. Unchanged in shape from spec §4.E; grounded
//! on `src/dex/order_manager.rs`'s active/filled/cancelled tracking shape
//! and `src/trading/paper_trader.rs`'s fill-then-settle sequencing,
//! generalized from a bespoke Solana API onto the `Exchange` trait.

use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::balance::BalanceTracker;
use crate::error::EngineError;
use crate::exchange::{Exchange, OrderSide, PlacedOrder};
use crate::grid::level::{OrderRecord, OrderRecordStatus};
use crate::grid::manager::GridManager;
use crate::ledger::OrderLedger;

/// Taker fee applied to every simulated fill. Mirrors the teacher's
/// `calculate_trading_fee` default.
const FEE_RATE: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

pub struct OrderManager {
    bot_id: i64,
    ledger: OrderLedger,
}

impl OrderManager {
    pub fn new(bot_id: i64, ledger: OrderLedger) -> Self {
        Self { bot_id, ledger }
    }

    /// Places one order per idle rung with an order-manager-level
    /// duplicate check (`find_open_at`) ahead of `GridManager`'s own
    /// state-based guard, belt and suspenders against the ledger and
    /// the in-memory grid drifting apart.
    pub async fn initialize_grid_orders(
        &self,
        grid: &mut GridManager,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
    ) -> crate::error::Result<()> {
        let prices = grid.price_grids.clone();
        for price in prices {
            let side = {
                let level = grid.levels.get(&price).ok_or_else(|| {
                    EngineError::InvariantViolation(format!("no level at {}", price))
                })?;
                match level.state {
                    crate::grid::level::GridCycleState::ReadyToBuy => Some(OrderSide::Buy),
                    crate::grid::level::GridCycleState::ReadyToSell => Some(OrderSide::Sell),
                    crate::grid::level::GridCycleState::ReadyToBuyOrSell => Some(OrderSide::Buy),
                    _ => None,
                }
            };
            let Some(side) = side else { continue };

            if !grid.can_place_order(price, side) {
                continue;
            }
            if self.ledger.find_open_at(self.bot_id, price).await?.is_some() {
                warn!("skipping duplicate order at {} for bot {}", price, self.bot_id);
                continue;
            }

            // Uniform per-rung sizing for both sides, `get_initial_order_quantity`
            // is a distinct formula reserved for the one-time rebalance purchase
            // in `perform_initial_purchase`, see `grid_manager.py`'s two separate
            // methods and DESIGN.md.
            let total_value = balances.get_total_balance_value(price);
            let quantity = grid.get_order_size_for_grid_level(total_value, price);
            if quantity <= Decimal::ZERO {
                continue;
            }

            self.place_and_track(grid, balances, exchange, price, side, quantity)
                .await?;
        }
        Ok(())
    }

    /// One-time rebalance so sell rungs above the current price are
    /// already backed by crypto inventory (spec §4.F startup sequence).
    pub async fn perform_initial_purchase(
        &self,
        grid: &GridManager,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
        current_price: Decimal,
    ) -> crate::error::Result<()> {
        let quantity = grid.get_initial_order_quantity(
            balances.get_adjusted_fiat_balance(),
            balances.get_adjusted_crypto_balance(),
            current_price,
        );
        if quantity <= Decimal::ZERO {
            return Ok(());
        }

        let order = exchange
            .place_order(OrderSide::Buy, current_price, quantity)
            .await
            .map_err(|e| EngineError::ExchangeFatal(e.to_string()))?;
        let fee = order.price * order.quantity * FEE_RATE;
        balances.apply_fill(OrderSide::Buy, order.price, order.quantity, fee);
        info!(
            "initial purchase: {} @ {} for bot {}",
            order.quantity, order.price, self.bot_id
        );
        Ok(())
    }

    async fn place_and_track(
        &self,
        grid: &mut GridManager,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
        price: Decimal,
        side: OrderSide,
        quantity: Decimal,
    ) -> crate::error::Result<()> {
        balances.reserve(side, price, quantity)?;
        let placed = match exchange.place_order(side, price, quantity).await {
            Ok(placed) => placed,
            Err(err) => {
                balances.release(side, price, quantity);
                return Err(EngineError::ExchangeTransient(err.to_string()).into());
            }
        };

        self.ledger
            .add_order(self.bot_id, &placed.order_id, price, side, quantity)
            .await?;

        let now = Utc::now();
        grid.mark_order_pending(
            price,
            OrderRecord {
                order_id: placed.order_id,
                side,
                price,
                quantity,
                status: OrderRecordStatus::Open,
                created_at: now,
                updated_at: now,
            },
        )?;
        Ok(())
    }

    /// Settle a batch of venue-reported fills: close the ledger row,
    /// move balances, transition the grid level, then re-place the
    /// opposite leg at the paired rung to keep the cycle running.
    pub async fn simulate_order_fills(
        &self,
        grid: &mut GridManager,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
        filled: Vec<PlacedOrder>,
    ) -> crate::error::Result<()> {
        for order in filled {
            self.ledger
                .update_order_status(&order.order_id, OrderRecordStatus::Closed)
                .await?;

            let fee = order.price * order.quantity * FEE_RATE;
            balances.apply_fill(order.side, order.price, order.quantity, fee);
            grid.complete_order(order.price, order.side)?;

            let (opposite_side, opposite_price) = match order.side {
                OrderSide::Buy => (OrderSide::Sell, grid.get_paired_sell_level(order.price).map(|l| l.price)),
                OrderSide::Sell => (OrderSide::Buy, grid.get_grid_level_below(order.price).map(|l| l.price)),
            };

            let Some(opposite_price) = opposite_price else {
                continue;
            };
            if !grid.can_place_order(opposite_price, opposite_side) {
                continue;
            }
            if self.ledger.find_open_at(self.bot_id, opposite_price).await?.is_some() {
                continue;
            }

            if let Err(err) = self
                .place_and_track(grid, balances, exchange, opposite_price, opposite_side, order.quantity)
                .await
            {
                warn!("failed to re-place {:?} leg at {}: {}", opposite_side, opposite_price, err);
            }
        }
        Ok(())
    }

    /// Cancels every open order on the venue, releases its reservation
    /// back to free balance, and transitions the matching ledger row to
    /// CANCELED (not deletion, see DESIGN.md).
    pub async fn cancel_all_open_orders(
        &self,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
    ) -> crate::error::Result<()> {
        let open = self.ledger.list_open(self.bot_id).await?;
        for row in open {
            if let Err(err) = exchange.cancel_order(&row.order_id).await {
                warn!("cancel failed for {}: {}", row.order_id, err);
                continue;
            }
            self.ledger
                .update_order_status(&row.order_id, OrderRecordStatus::Canceled)
                .await?;
            balances.release(row.side, row.price, row.quantity);
        }
        Ok(())
    }

    /// Sells the entire crypto balance at market, used by `stop(true)`
    /// and by stop-loss/take-profit triggers.
    pub async fn liquidate_positions(
        &self,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
        current_price: Decimal,
    ) -> crate::error::Result<()> {
        let quantity = balances.get_adjusted_crypto_balance();
        if quantity <= Decimal::ZERO {
            return Ok(());
        }
        let order = exchange
            .place_order(OrderSide::Sell, current_price, quantity)
            .await
            .map_err(|e| EngineError::ExchangeFatal(e.to_string()))?;
        let fee = order.price * order.quantity * FEE_RATE;
        balances.apply_fill(OrderSide::Sell, order.price, order.quantity, fee);
        info!("liquidated {} @ {} for bot {}", order.quantity, order.price, self.bot_id);
        Ok(())
    }

    /// Cancels everything resting, then liquidates. Used when a TP/SL
    /// threshold trips (spec §4.F `_handle_take_profit_stop_loss`).
    pub async fn execute_take_profit_or_stop_loss_order(
        &self,
        balances: &mut BalanceTracker,
        exchange: &dyn Exchange,
        current_price: Decimal,
    ) -> crate::error::Result<()> {
        self.cancel_all_open_orders(balances, exchange).await?;
        self.liquidate_positions(balances, exchange, current_price).await
    }
}
