//! Grid level state machine.
//!
//! A `GridLevel` is a passive record of one rung's lifecycle state and its
//! order history. All state transitions happen through `GridManager`,
//! `GridLevel` itself never decides when to change state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::OrderSide;

/// Lifecycle state of a single rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridCycleState {
    ReadyToBuy,
    ReadyToSell,
    ReadyToBuyOrSell,
    WaitingForBuyFill,
    WaitingForSellFill,
}

impl GridCycleState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::ReadyToBuy | Self::ReadyToSell)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingForBuyFill | Self::WaitingForSellFill)
    }
}

/// A reference to an order placed against a grid level. The order itself
/// is authoritative in the ledger, this is a lightweight local mirror
/// used to reconstruct history without round-tripping to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: OrderRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRecordStatus {
    Open,
    Closed,
    Canceled,
}

/// Single rung in the grid lattice.
///
/// `paired_buy_level`/`paired_sell_level` are stored as prices rather than
/// references, `GridManager` owns every level exclusively, so a sibling
/// is looked up by price key, never borrowed directly. This is what keeps
/// the buy/sell pairing acyclic in safe Rust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub price: Decimal,
    pub state: GridCycleState,
    pub orders: Vec<OrderRecord>,
    pub paired_buy_level: Option<Decimal>,
    pub paired_sell_level: Option<Decimal>,
}

impl GridLevel {
    pub fn new(price: Decimal, state: GridCycleState) -> Self {
        Self {
            price,
            state,
            orders: Vec::new(),
            paired_buy_level: None,
            paired_sell_level: None,
        }
    }

    /// Append an order to history and make it the current pending order.
    pub fn attach_order(&mut self, order: OrderRecord) {
        self.orders.push(order);
    }

    /// The most recently attached order, if any.
    pub fn current_order(&self) -> Option<&OrderRecord> {
        self.orders.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_level_starts_with_no_orders() {
        let level = GridLevel::new(dec!(100), GridCycleState::ReadyToBuy);
        assert!(level.orders.is_empty());
        assert!(level.current_order().is_none());
        assert_eq!(level.state, GridCycleState::ReadyToBuy);
    }

    #[test]
    fn attach_order_becomes_current() {
        let mut level = GridLevel::new(dec!(100), GridCycleState::ReadyToBuy);
        let now = Utc::now();
        level.attach_order(OrderRecord {
            order_id: "o1".into(),
            side: OrderSide::Buy,
            price: dec!(100),
            quantity: dec!(1),
            status: OrderRecordStatus::Open,
            created_at: now,
            updated_at: now,
        });
        assert_eq!(level.current_order().unwrap().order_id, "o1");
    }

    #[test]
    fn idle_and_waiting_predicates() {
        assert!(GridCycleState::ReadyToBuy.is_idle());
        assert!(GridCycleState::ReadyToSell.is_idle());
        assert!(!GridCycleState::ReadyToBuyOrSell.is_idle());
        assert!(GridCycleState::WaitingForBuyFill.is_waiting());
        assert!(GridCycleState::WaitingForSellFill.is_waiting());
        assert!(!GridCycleState::ReadyToBuy.is_waiting());
    }
}
