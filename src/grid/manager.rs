//! Grid lattice construction and lifecycle transitions.
//!
//! `GridManager` builds the price lattice, owns every `GridLevel`, and is
//! the only thing allowed to move a level between states. The two guard
//! methods, `can_place_order` and `complete_order`, are what make the
//! engine safe under the two adversarial sequences described in spec §4.B:
//! the "dead zone" (center configured away from market) and the "neighbor
//! claim" race (a filled sell and a neighbor's fresh buy landing on the
//! same rung in the same tick).

use std::collections::HashMap;

use log::{debug, info, warn};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::exchange::OrderSide;
use crate::grid::level::{GridCycleState, GridLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyType {
    SimpleGrid,
    HedgedGrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpacingType {
    Arithmetic,
    Geometric,
}

#[derive(Debug, Clone, Copy)]
pub struct GridConfig {
    pub bottom: Decimal,
    pub top: Decimal,
    pub num_grids: usize,
    pub spacing: SpacingType,
}

pub struct GridManager {
    pub strategy_type: StrategyType,
    config: GridConfig,
    pub price_grids: Vec<Decimal>,
    pub central_price: Decimal,
    pub sorted_buy_grids: Vec<Decimal>,
    pub sorted_sell_grids: Vec<Decimal>,
    pub levels: HashMap<Decimal, GridLevel>,
}

impl GridManager {
    pub fn new(config: GridConfig, strategy_type: StrategyType) -> Self {
        Self {
            strategy_type,
            config,
            price_grids: Vec::new(),
            central_price: Decimal::ZERO,
            sorted_buy_grids: Vec::new(),
            sorted_sell_grids: Vec::new(),
            levels: HashMap::new(),
        }
    }

    /// Builds `price_grids` and a `GridLevel` per rung, with initial
    /// idle states per spec §4.B. Idempotent, safe to call once at
    /// startup.
    pub fn initialize_grids_and_levels(&mut self) -> crate::error::Result<()> {
        let (grids, central_price) = self.calculate_price_grids_and_central_price()?;
        self.price_grids = grids;
        self.central_price = central_price;

        match self.strategy_type {
            StrategyType::SimpleGrid => {
                self.sorted_buy_grids = self
                    .price_grids
                    .iter()
                    .copied()
                    .filter(|p| *p <= self.central_price)
                    .collect();
                self.sorted_sell_grids = self
                    .price_grids
                    .iter()
                    .copied()
                    .filter(|p| *p > self.central_price)
                    .collect();
                self.levels = self
                    .price_grids
                    .iter()
                    .map(|&price| {
                        let state = if price <= self.central_price {
                            GridCycleState::ReadyToBuy
                        } else {
                            GridCycleState::ReadyToSell
                        };
                        (price, GridLevel::new(price, state))
                    })
                    .collect();
            }
            StrategyType::HedgedGrid => {
                let top = *self.price_grids.last().ok_or_else(|| {
                    EngineError::InvariantViolation("grid has no rungs".into())
                })?;
                self.sorted_buy_grids = self.price_grids[..self.price_grids.len() - 1].to_vec();
                self.sorted_sell_grids = self.price_grids[1..].to_vec();
                self.levels = self
                    .price_grids
                    .iter()
                    .map(|&price| {
                        let state = if price == top {
                            GridCycleState::ReadyToSell
                        } else {
                            GridCycleState::ReadyToBuyOrSell
                        };
                        (price, GridLevel::new(price, state))
                    })
                    .collect();
            }
        }

        self.pair_adjacent_levels();
        info!(
            "grid initialized: {} rungs, central price {}",
            self.price_grids.len(),
            self.central_price
        );
        Ok(())
    }

    /// Every rung pairs with its immediate neighbor above/below, this is
    /// what `get_paired_sell_level`/`complete_order` walk.
    fn pair_adjacent_levels(&mut self) {
        let sorted_prices = self.price_grids.clone();
        for window in sorted_prices.windows(2) {
            let (below, above) = (window[0], window[1]);
            if let Some(level) = self.levels.get_mut(&below) {
                level.paired_sell_level = Some(above);
            }
            if let Some(level) = self.levels.get_mut(&above) {
                level.paired_buy_level = Some(below);
            }
        }
    }

    /// Re-aligns buy/sell zones to the first live tick (spec §4.B "dead
    /// zone" fix). No-op under `HedgedGrid`.
    pub fn update_zones_based_on_price(&mut self, current_price: Decimal) {
        if self.strategy_type != StrategyType::SimpleGrid {
            return;
        }

        info!("re-aligning grid zones to current price {}", current_price);
        self.sorted_buy_grids.clear();
        self.sorted_sell_grids.clear();

        let prices = self.price_grids.clone();
        for price in prices {
            let ideal_state = if price < current_price {
                GridCycleState::ReadyToBuy
            } else {
                GridCycleState::ReadyToSell
            };

            if price < current_price {
                self.sorted_buy_grids.push(price);
            } else {
                self.sorted_sell_grids.push(price);
            }

            let level = self
                .levels
                .get_mut(&price)
                .expect("every price_grids entry has a level");

            // Only overwrite idle states, a waiting level has a live order.
            if level.state.is_idle() {
                level.state = ideal_state;
            } else {
                debug!(
                    "skipping zone update for busy rung {} (state: {:?})",
                    price, level.state
                );
            }
        }
    }

    pub fn get_trigger_price(&self) -> Decimal {
        self.central_price
    }

    /// Next rung above `price`, or `None` if `price` is the top rung.
    pub fn get_paired_sell_level(&self, price: Decimal) -> Option<&GridLevel> {
        let level = self.levels.get(&price)?;
        let sibling_price = level.paired_sell_level?;
        self.levels.get(&sibling_price)
    }

    /// Next rung below `price`, or `None` if `price` is the bottom rung.
    pub fn get_grid_level_below(&self, price: Decimal) -> Option<&GridLevel> {
        let level = self.levels.get(&price)?;
        let sibling_price = level.paired_buy_level?;
        self.levels.get(&sibling_price)
    }

    /// May a new order of `side` be placed at `price`?
    pub fn can_place_order(&self, price: Decimal, side: OrderSide) -> bool {
        let Some(level) = self.levels.get(&price) else {
            return false;
        };

        match self.strategy_type {
            StrategyType::SimpleGrid => match side {
                OrderSide::Buy => {
                    if level.state != GridCycleState::ReadyToBuy {
                        return false;
                    }
                    // Guard against paired-overlap: the rung this buy's
                    // exit sell would occupy must not already be busy.
                    match self.get_paired_sell_level(price) {
                        Some(sibling) if sibling.state == GridCycleState::WaitingForSellFill => {
                            false
                        }
                        _ => true,
                    }
                }
                OrderSide::Sell => level.state == GridCycleState::ReadyToSell,
            },
            StrategyType::HedgedGrid => match side {
                OrderSide::Buy => matches!(
                    level.state,
                    GridCycleState::ReadyToBuy | GridCycleState::ReadyToBuyOrSell
                ),
                OrderSide::Sell => matches!(
                    level.state,
                    GridCycleState::ReadyToSell | GridCycleState::ReadyToBuyOrSell
                ),
            },
        }
    }

    /// Attach the order and transition to the matching WAITING state.
    pub fn mark_order_pending(
        &mut self,
        price: Decimal,
        order: crate::grid::level::OrderRecord,
    ) -> crate::error::Result<()> {
        let side = order.side;
        let level = self.levels.get_mut(&price).ok_or_else(|| {
            EngineError::InvariantViolation(format!("no grid level at price {}", price))
        })?;
        level.attach_order(order);
        level.state = match side {
            OrderSide::Buy => GridCycleState::WaitingForBuyFill,
            OrderSide::Sell => GridCycleState::WaitingForSellFill,
        };
        Ok(())
    }

    /// Transition on fill. This and `can_place_order` are the two guards
    /// documented in spec §4.B: this one preserves a neighbor's claim on
    /// a rung that just filled its sell leg; `can_place_order` stops the
    /// symmetric case at placement time.
    pub fn complete_order(
        &mut self,
        price: Decimal,
        side: OrderSide,
    ) -> crate::error::Result<()> {
        let paired_sell = self
            .levels
            .get(&price)
            .and_then(|l| l.paired_sell_level);
        let paired_buy = self.levels.get(&price).and_then(|l| l.paired_buy_level);

        match self.strategy_type {
            StrategyType::SimpleGrid => match side {
                OrderSide::Buy => {
                    self.set_state(price, GridCycleState::ReadyToSell)?;
                    if let Some(sibling) = paired_sell {
                        self.set_state(sibling, GridCycleState::ReadyToSell)?;
                    }
                }
                OrderSide::Sell => {
                    let current = self
                        .levels
                        .get(&price)
                        .ok_or_else(|| EngineError::InvariantViolation("missing level".into()))?
                        .state;
                    if current == GridCycleState::WaitingForBuyFill {
                        debug!(
                            "sell completed at {} but level already claimed by neighbor buy, leaving state",
                            price
                        );
                    } else {
                        self.set_state(price, GridCycleState::ReadyToBuy)?;
                    }
                    if let Some(sibling) = paired_buy {
                        self.set_state(sibling, GridCycleState::ReadyToBuy)?;
                    }
                }
            },
            StrategyType::HedgedGrid => match side {
                OrderSide::Buy => {
                    self.set_state(price, GridCycleState::ReadyToBuyOrSell)?;
                    if let Some(sibling) = paired_sell {
                        self.set_state(sibling, GridCycleState::ReadyToSell)?;
                    }
                }
                OrderSide::Sell => {
                    self.set_state(price, GridCycleState::ReadyToBuyOrSell)?;
                    if let Some(sibling) = paired_buy {
                        self.set_state(sibling, GridCycleState::ReadyToBuy)?;
                    }
                }
            },
        }
        Ok(())
    }

    fn set_state(&mut self, price: Decimal, state: GridCycleState) -> crate::error::Result<()> {
        let level = self.levels.get_mut(&price).ok_or_else(|| {
            EngineError::InvariantViolation(format!("no grid level at price {}", price))
        })?;
        level.state = state;
        Ok(())
    }

    /// `total_balance / |levels| / price`. Division by zero (empty grid)
    /// yields zero rather than panicking.
    pub fn get_order_size_for_grid_level(&self, total_balance: Decimal, price: Decimal) -> Decimal {
        let total_grids = self.levels.len();
        if total_grids == 0 || price.is_zero() {
            return Decimal::ZERO;
        }
        total_balance / Decimal::from(total_grids) / price
    }

    /// One-time rebalance at startup so sell rungs above the current
    /// price are already covered by crypto inventory.
    pub fn get_initial_order_quantity(
        &self,
        current_fiat_balance: Decimal,
        current_crypto_balance: Decimal,
        current_price: Decimal,
    ) -> Decimal {
        if current_price.is_zero() {
            return Decimal::ZERO;
        }
        let current_crypto_value = current_crypto_balance * current_price;
        let total_portfolio_value = current_fiat_balance + current_crypto_value;

        let total_grid_count = self.price_grids.len();
        if total_grid_count == 0 {
            return Decimal::ZERO;
        }
        let sell_grid_count = self
            .price_grids
            .iter()
            .filter(|p| **p > current_price)
            .count();

        let target_crypto_ratio =
            Decimal::from(sell_grid_count) / Decimal::from(total_grid_count);
        let target_crypto_value = total_portfolio_value * target_crypto_ratio;

        let mut fiat_to_allocate = target_crypto_value - current_crypto_value;
        fiat_to_allocate = fiat_to_allocate.max(Decimal::ZERO);
        fiat_to_allocate = fiat_to_allocate.min(current_fiat_balance);

        fiat_to_allocate / current_price
    }

    fn calculate_price_grids_and_central_price(
        &self,
    ) -> crate::error::Result<(Vec<Decimal>, Decimal)> {
        let GridConfig {
            bottom,
            top,
            num_grids,
            spacing,
        } = self.config;

        if bottom <= Decimal::ZERO || top <= Decimal::ZERO {
            return Err(EngineError::Config("grid bounds must be positive".into()).into());
        }
        if top <= bottom {
            return Err(EngineError::Config("top range must exceed bottom range".into()).into());
        }
        if num_grids == 0 {
            return Err(EngineError::Config("num_grids must be > 0".into()).into());
        }

        // Ensure an odd count so one rung lands exactly on the center.
        let points_to_generate = if num_grids % 2 == 0 {
            warn!("num_grids {} is even; generating {} rungs to include a center point", num_grids, num_grids + 1);
            num_grids + 1
        } else {
            num_grids
        };

        match spacing {
            SpacingType::Arithmetic => {
                let grids = linspace(bottom, top, points_to_generate);
                let central_price = (top + bottom) / Decimal::from(2);
                Ok((grids, central_price))
            }
            SpacingType::Geometric => {
                if points_to_generate <= 1 {
                    return Ok((vec![bottom], bottom));
                }
                let bottom_f = bottom.to_f64().ok_or_else(|| {
                    EngineError::InvariantViolation("bottom price not representable as f64".into())
                })?;
                let top_f = top.to_f64().ok_or_else(|| {
                    EngineError::InvariantViolation("top price not representable as f64".into())
                })?;
                let ratio = (top_f / bottom_f).powf(1.0 / (points_to_generate as f64 - 1.0));

                let mut grids = Vec::with_capacity(points_to_generate);
                let mut current = bottom_f;
                for _ in 0..points_to_generate {
                    grids.push(
                        Decimal::from_f64(current).ok_or_else(|| {
                            EngineError::InvariantViolation("grid price overflow".into())
                        })?,
                    );
                    current *= ratio;
                }
                let central_index = grids.len() / 2;
                let central_price = grids[central_index];
                Ok((grids, central_price))
            }
        }
    }
}

/// `num_points` evenly spaced values from `start` to `stop`, inclusive.
fn linspace(start: Decimal, stop: Decimal, num_points: usize) -> Vec<Decimal> {
    if num_points == 1 {
        return vec![start];
    }
    let step = (stop - start) / Decimal::from(num_points - 1);
    (0..num_points)
        .map(|i| start + step * Decimal::from(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn simple_manager(bottom: Decimal, top: Decimal, num_grids: usize) -> GridManager {
        let mut mgr = GridManager::new(
            GridConfig {
                bottom,
                top,
                num_grids,
                spacing: SpacingType::Arithmetic,
            },
            StrategyType::SimpleGrid,
        );
        mgr.initialize_grids_and_levels().unwrap();
        mgr
    }

    #[test]
    fn s1_arithmetic_grid_parity() {
        let mgr = simple_manager(dec!(100), dec!(200), 4);
        assert_eq!(
            mgr.price_grids,
            vec![dec!(100), dec!(125), dec!(150), dec!(175), dec!(200)]
        );
        assert_eq!(mgr.central_price, dec!(150));
    }

    #[test]
    fn s2_geometric_grid() {
        let mut mgr = GridManager::new(
            GridConfig {
                bottom: dec!(100),
                top: dec!(400),
                num_grids: 3,
                spacing: SpacingType::Geometric,
            },
            StrategyType::SimpleGrid,
        );
        mgr.initialize_grids_and_levels().unwrap();
        assert_eq!(mgr.price_grids.len(), 3);
        assert_eq!(mgr.price_grids[0], dec!(100));
        assert_eq!(mgr.central_price, mgr.price_grids[1]);
        // ratio^2 * 100 == 400 => ratio == 2, so rungs are ~100, 200, 400.
        let mid = mgr.price_grids[1].round_dp(0);
        assert_eq!(mid, dec!(200));
    }

    #[test]
    fn s5_paired_overlap_guard() {
        let mut mgr = simple_manager(dec!(90), dec!(110), 5);
        // rungs: 90, 95, 100, 105, 110 central=100
        mgr.update_zones_based_on_price(dec!(107));
        mgr.set_state(dec!(100), GridCycleState::WaitingForSellFill)
            .unwrap();
        assert!(!mgr.can_place_order(dec!(95), OrderSide::Buy));
    }

    #[test]
    fn s3_dead_zone_fix() {
        let mut mgr = simple_manager(dec!(90), dec!(110), 5);
        mgr.update_zones_based_on_price(dec!(107));
        assert_eq!(
            mgr.sorted_buy_grids,
            vec![dec!(90), dec!(95), dec!(100), dec!(105)]
        );
        assert_eq!(mgr.sorted_sell_grids, vec![dec!(110)]);
    }

    #[test]
    fn update_zones_never_touches_waiting_levels() {
        let mut mgr = simple_manager(dec!(90), dec!(110), 5);
        mgr.set_state(dec!(100), GridCycleState::WaitingForSellFill)
            .unwrap();
        mgr.update_zones_based_on_price(dec!(107));
        assert_eq!(
            mgr.levels[&dec!(100)].state,
            GridCycleState::WaitingForSellFill
        );
    }

    #[test]
    fn s4_neighbor_race_preserved() {
        let mut mgr = simple_manager(dec!(90), dec!(110), 5);
        // Rung 100 waiting on a sell; 95's buy fills and claims rung 100
        // as its sell exit, flipping 100 to WaitingForBuyFill.
        mgr.set_state(dec!(100), GridCycleState::WaitingForBuyFill)
            .unwrap();
        mgr.complete_order(dec!(100), OrderSide::Sell).unwrap();
        assert_eq!(
            mgr.levels[&dec!(100)].state,
            GridCycleState::WaitingForBuyFill
        );
    }

    #[test]
    fn complete_order_sell_resets_to_ready_to_buy_normally() {
        let mut mgr = simple_manager(dec!(90), dec!(110), 5);
        mgr.set_state(dec!(100), GridCycleState::WaitingForSellFill)
            .unwrap();
        mgr.complete_order(dec!(100), OrderSide::Sell).unwrap();
        assert_eq!(mgr.levels[&dec!(100)].state, GridCycleState::ReadyToBuy);
    }

    #[test]
    fn even_num_grids_generates_odd_count_with_central_rung() {
        let mgr = simple_manager(dec!(100), dec!(200), 4);
        assert_eq!(mgr.price_grids.len(), 5);
        assert_eq!(mgr.price_grids[4 / 2], mgr.central_price);
    }

    #[test]
    fn order_size_division_by_zero_yields_zero() {
        let mgr = GridManager::new(
            GridConfig {
                bottom: dec!(1),
                top: dec!(2),
                num_grids: 1,
                spacing: SpacingType::Arithmetic,
            },
            StrategyType::SimpleGrid,
        );
        assert_eq!(
            mgr.get_order_size_for_grid_level(dec!(1000), dec!(100)),
            Decimal::ZERO
        );
    }

    #[test]
    fn zones_partition_price_grids() {
        let mgr = simple_manager(dec!(90), dec!(110), 5);
        let mut union: Vec<Decimal> = mgr
            .sorted_buy_grids
            .iter()
            .chain(mgr.sorted_sell_grids.iter())
            .copied()
            .collect();
        union.sort();
        let mut grids = mgr.price_grids.clone();
        grids.sort();
        assert_eq!(union, grids);
    }
}
