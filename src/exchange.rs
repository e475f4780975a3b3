//! The `Exchange` capability trait and the two in-tree implementations
//! used to drive the engine core without a real venue connection.
//!
//! Grounded on `src/dex/mod.rs`'s `Trader` trait: `async_trait`,
//! `Send + Sync`, a small enum-heavy order model. Generalized here from
//! Solana/Serum specifics to the exchange-agnostic operations spec §6
//! requires: `get_price`, `get_balance`, `place_order`, `cancel_order`,
//! `stream_ticks`, `close`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, OrderSide::Sell)
    }
}

/// A single OHLCV bar, used by `BacktestExchange`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A single trade tick, as delivered by `Exchange::stream_ticks`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeOrderStatus {
    Open,
    Filled,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub side: OrderSide,
    pub price: Decimal,
    pub quantity: Decimal,
    pub status: ExchangeOrderStatus,
    pub placed_at: DateTime<Utc>,
}

/// Free balances for the two legs of a trading pair (e.g. USDC/SOL).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub fiat: Decimal,
    pub crypto: Decimal,
}

/// Capability set every venue (real or simulated) must provide.
///
/// `Send + Sync` so an `Exchange` can be shared across bot tasks behind
/// an `Arc`, matching `src/dex/mod.rs`'s `Trader: Send + Sync`.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn get_price(&self) -> crate::error::Result<Decimal>;

    async fn get_balance(&self) -> crate::error::Result<Balance>;

    async fn place_order(
        &self,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> crate::error::Result<PlacedOrder>;

    async fn cancel_order(&self, order_id: &str) -> crate::error::Result<()>;

    /// A live stream of ticks. `BacktestExchange` does not implement this
    /// meaningfully, the backtest driver pulls candles directly instead.
    async fn stream_ticks(&self) -> crate::error::Result<BoxStream<'static, Tick>>;

    async fn close(&self) -> crate::error::Result<()>;
}

/// In-memory simulated venue: fills immediately at the requested price,
/// tracks a virtual wallet. Grounded on `src/trading/paper_trader.rs`'s
/// `VirtualWallet`/`PaperTradingEngine` shape, collapsed onto the
/// `Exchange` trait directly instead of a bespoke API.
pub struct PaperExchange {
    state: Mutex<PaperState>,
    fee_rate: Decimal,
}

struct PaperState {
    last_price: Decimal,
    balance: Balance,
    open_orders: HashMap<String, PlacedOrder>,
}

impl PaperExchange {
    pub fn new(starting_fiat: Decimal, starting_crypto: Decimal, initial_price: Decimal) -> Self {
        Self {
            state: Mutex::new(PaperState {
                last_price: initial_price,
                balance: Balance {
                    fiat: starting_fiat,
                    crypto: starting_crypto,
                },
                open_orders: HashMap::new(),
            }),
            fee_rate: Decimal::new(1, 3), // 0.001 == 10 bps, matches teacher's default taker fee
        }
    }

    /// Advance simulated market price and fill any resting order crossed
    /// by the move, mirroring `PaperTradingEngine::process_price_update`.
    pub fn process_price_update(&self, new_price: Decimal) -> Vec<PlacedOrder> {
        let mut state = self.state.lock().expect("paper exchange state poisoned");
        state.last_price = new_price;

        let mut filled = Vec::new();
        let crossed: Vec<String> = state
            .open_orders
            .iter()
            .filter(|(_, order)| match order.side {
                OrderSide::Buy => new_price <= order.price,
                OrderSide::Sell => new_price >= order.price,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in crossed {
            if let Some(mut order) = state.open_orders.remove(&id) {
                order.status = ExchangeOrderStatus::Filled;
                let notional = order.price * order.quantity;
                let fee = notional * self.fee_rate;
                match order.side {
                    OrderSide::Buy => {
                        state.balance.fiat -= notional + fee;
                        state.balance.crypto += order.quantity;
                    }
                    OrderSide::Sell => {
                        state.balance.crypto -= order.quantity;
                        state.balance.fiat += notional - fee;
                    }
                }
                debug!("paper fill: {} {} @ {}", order.side.as_str(), order.quantity, order.price);
                filled.push(order);
            }
        }
        filled
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_price(&self) -> crate::error::Result<Decimal> {
        Ok(self.state.lock().expect("paper exchange state poisoned").last_price)
    }

    async fn get_balance(&self) -> crate::error::Result<Balance> {
        Ok(self.state.lock().expect("paper exchange state poisoned").balance)
    }

    async fn place_order(
        &self,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> crate::error::Result<PlacedOrder> {
        if quantity <= Decimal::ZERO {
            return Err(EngineError::InvariantViolation("order quantity must be positive".into()).into());
        }
        let mut state = self.state.lock().expect("paper exchange state poisoned");
        let notional = price * quantity;
        match side {
            OrderSide::Buy if notional > state.balance.fiat => {
                return Err(EngineError::InsufficientFunds {
                    available: state.balance.fiat.to_string(),
                    required: notional.to_string(),
                }
                .into());
            }
            OrderSide::Sell if quantity > state.balance.crypto => {
                return Err(EngineError::InsufficientFunds {
                    available: state.balance.crypto.to_string(),
                    required: quantity.to_string(),
                }
                .into());
            }
            _ => {}
        }

        let order = PlacedOrder {
            order_id: Uuid::new_v4().to_string(),
            side,
            price,
            quantity,
            status: ExchangeOrderStatus::Open,
            placed_at: Utc::now(),
        };
        state.open_orders.insert(order.order_id.clone(), order.clone());
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> crate::error::Result<()> {
        let mut state = self.state.lock().expect("paper exchange state poisoned");
        if state.open_orders.remove(order_id).is_none() {
            warn!("cancel requested for unknown paper order {}", order_id);
        }
        Ok(())
    }

    async fn stream_ticks(&self) -> crate::error::Result<BoxStream<'static, Tick>> {
        Ok(Box::pin(stream::empty()))
    }

    async fn close(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

/// Drives fills from a pre-loaded candle sequence instead of a live feed.
/// `stream_ticks` is intentionally unimplemented, the backtest driver in
/// `TradingStrategy::run_backtest` steps candles itself, per spec §4.F.
pub struct BacktestExchange {
    candles: Vec<Candle>,
    cursor: Mutex<usize>,
    inner: PaperExchange,
}

impl BacktestExchange {
    pub fn new(candles: Vec<Candle>, starting_fiat: Decimal, starting_crypto: Decimal) -> Self {
        let initial_price = candles.first().map(|c| c.close).unwrap_or(Decimal::ZERO);
        Self {
            candles,
            cursor: Mutex::new(0),
            inner: PaperExchange::new(starting_fiat, starting_crypto, initial_price),
        }
    }

    /// Advances to the next candle, applying its close as the new market
    /// price and returning any orders that fill as a result. `None` once
    /// the sequence is exhausted.
    pub fn advance(&self) -> Option<(Candle, Vec<PlacedOrder>)> {
        let mut cursor = self.cursor.lock().expect("backtest cursor poisoned");
        let candle = *self.candles.get(*cursor)?;
        *cursor += 1;
        drop(cursor);
        let filled = self.inner.process_price_update(candle.close);
        Some((candle, filled))
    }

    pub fn candle_count(&self) -> usize {
        self.candles.len()
    }
}

#[async_trait]
impl Exchange for BacktestExchange {
    async fn get_price(&self) -> crate::error::Result<Decimal> {
        self.inner.get_price().await
    }

    async fn get_balance(&self) -> crate::error::Result<Balance> {
        self.inner.get_balance().await
    }

    async fn place_order(
        &self,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> crate::error::Result<PlacedOrder> {
        self.inner.place_order(side, price, quantity).await
    }

    async fn cancel_order(&self, order_id: &str) -> crate::error::Result<()> {
        self.inner.cancel_order(order_id).await
    }

    async fn stream_ticks(&self) -> crate::error::Result<BoxStream<'static, Tick>> {
        Err(EngineError::InvariantViolation(
            "BacktestExchange does not stream ticks; call advance() instead".into(),
        )
        .into())
    }

    async fn close(&self) -> crate::error::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn place_order_rejects_insufficient_fiat() {
        let exchange = PaperExchange::new(dec!(10), dec!(0), dec!(100));
        let result = exchange.place_order(OrderSide::Buy, dec!(100), dec!(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn place_order_rejects_insufficient_crypto() {
        let exchange = PaperExchange::new(dec!(0), dec!(0), dec!(100));
        let result = exchange.place_order(OrderSide::Sell, dec!(100), dec!(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn buy_order_fills_when_price_drops_to_it() {
        let exchange = PaperExchange::new(dec!(1000), dec!(0), dec!(150));
        exchange.place_order(OrderSide::Buy, dec!(100), dec!(2)).await.unwrap();
        let filled = exchange.process_price_update(dec!(99));
        assert_eq!(filled.len(), 1);
        let balance = exchange.get_balance().await.unwrap();
        assert_eq!(balance.crypto, dec!(2));
    }

    #[tokio::test]
    async fn sell_order_fills_when_price_rises_to_it() {
        let exchange = PaperExchange::new(dec!(0), dec!(5), dec!(90));
        exchange.place_order(OrderSide::Sell, dec!(100), dec!(2)).await.unwrap();
        let filled = exchange.process_price_update(dec!(101));
        assert_eq!(filled.len(), 1);
        let balance = exchange.get_balance().await.unwrap();
        assert_eq!(balance.crypto, dec!(3));
    }

    #[test]
    fn opposite_side_round_trips() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite(), OrderSide::Buy);
    }

    #[tokio::test]
    async fn backtest_exchange_advances_through_candles() {
        let candles = vec![
            Candle {
                timestamp: Utc::now(),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100),
                volume: dec!(10),
            },
            Candle {
                timestamp: Utc::now(),
                open: dec!(100),
                high: dec!(105),
                low: dec!(99),
                close: dec!(104),
                volume: dec!(10),
            },
        ];
        let exchange = BacktestExchange::new(candles, dec!(1000), dec!(0));
        assert!(exchange.advance().is_some());
        assert!(exchange.advance().is_some());
        assert!(exchange.advance().is_none());
    }
}
