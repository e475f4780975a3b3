//! Balance tracking: free vs. reserved funds on both legs of the pair,
//! plus cumulative fees. Unchanged in shape from spec §4.D; grounded on
//! the reservation bookkeeping implied by `original_source`'s
//! `_run_live_or_paper_trading` balance sync (fetch live balance, cap to
//! configured investment, track what's already committed to resting
//! orders).

use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::exchange::OrderSide;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BalanceTracker {
    pub fiat_balance: Decimal,
    pub crypto_balance: Decimal,
    pub reserved_fiat: Decimal,
    pub reserved_crypto: Decimal,
    pub total_fees: Decimal,
}

impl BalanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds both balances from a fresh exchange read. Called once at
    /// startup and whenever the strategy re-syncs with the venue.
    pub fn setup_balances(&mut self, fiat_balance: Decimal, crypto_balance: Decimal) {
        self.fiat_balance = fiat_balance;
        self.crypto_balance = crypto_balance;
    }

    /// Fiat available for new buys: total minus whatever is already
    /// committed to resting buy orders.
    pub fn get_adjusted_fiat_balance(&self) -> Decimal {
        (self.fiat_balance - self.reserved_fiat).max(Decimal::ZERO)
    }

    /// Crypto available for new sells: total minus whatever is already
    /// committed to resting sell orders.
    pub fn get_adjusted_crypto_balance(&self) -> Decimal {
        (self.crypto_balance - self.reserved_crypto).max(Decimal::ZERO)
    }

    pub fn get_total_balance_value(&self, current_price: Decimal) -> Decimal {
        self.fiat_balance + self.crypto_balance * current_price
    }

    /// Commit funds to a newly placed order. Fails closed if the free
    /// balance can't cover it, the caller should have checked first via
    /// `get_adjusted_*_balance`, this is the last line of defense.
    pub fn reserve(
        &mut self,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> crate::error::Result<()> {
        match side {
            OrderSide::Buy => {
                let notional = price * quantity;
                if notional > self.get_adjusted_fiat_balance() {
                    return Err(EngineError::InsufficientFunds {
                        available: self.get_adjusted_fiat_balance().to_string(),
                        required: notional.to_string(),
                    }
                    .into());
                }
                self.reserved_fiat += notional;
            }
            OrderSide::Sell => {
                if quantity > self.get_adjusted_crypto_balance() {
                    return Err(EngineError::InsufficientFunds {
                        available: self.get_adjusted_crypto_balance().to_string(),
                        required: quantity.to_string(),
                    }
                    .into());
                }
                self.reserved_crypto += quantity;
            }
        }
        Ok(())
    }

    /// Release a reservation without a fill (order canceled).
    pub fn release(&mut self, side: OrderSide, price: Decimal, quantity: Decimal) {
        match side {
            OrderSide::Buy => self.reserved_fiat = (self.reserved_fiat - price * quantity).max(Decimal::ZERO),
            OrderSide::Sell => self.reserved_crypto = (self.reserved_crypto - quantity).max(Decimal::ZERO),
        }
    }

    /// Settle a fill: move the reservation into the actual balance shift
    /// and record the fee charged.
    pub fn apply_fill(
        &mut self,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
    ) {
        self.release(side, price, quantity);
        let notional = price * quantity;
        match side {
            OrderSide::Buy => {
                self.fiat_balance -= notional + fee;
                self.crypto_balance += quantity;
            }
            OrderSide::Sell => {
                self.crypto_balance -= quantity;
                self.fiat_balance += notional - fee;
            }
        }
        self.total_fees += fee;
        debug!(
            "balance after fill: fiat={} crypto={} fees={}",
            self.fiat_balance, self.crypto_balance, self.total_fees
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reserve_buy_reduces_adjusted_fiat() {
        let mut tracker = BalanceTracker::new();
        tracker.setup_balances(dec!(1000), dec!(0));
        tracker.reserve(OrderSide::Buy, dec!(100), dec!(2)).unwrap();
        assert_eq!(tracker.get_adjusted_fiat_balance(), dec!(800));
    }

    #[test]
    fn reserve_rejects_when_insufficient() {
        let mut tracker = BalanceTracker::new();
        tracker.setup_balances(dec!(100), dec!(0));
        let result = tracker.reserve(OrderSide::Buy, dec!(100), dec!(2));
        assert!(result.is_err());
    }

    #[test]
    fn apply_fill_moves_reservation_into_balance() {
        let mut tracker = BalanceTracker::new();
        tracker.setup_balances(dec!(1000), dec!(0));
        tracker.reserve(OrderSide::Buy, dec!(100), dec!(2)).unwrap();
        tracker.apply_fill(OrderSide::Buy, dec!(100), dec!(2), dec!(0.2));
        assert_eq!(tracker.fiat_balance, dec!(799.8));
        assert_eq!(tracker.crypto_balance, dec!(2));
        assert_eq!(tracker.reserved_fiat, Decimal::ZERO);
        assert_eq!(tracker.total_fees, dec!(0.2));
    }

    #[test]
    fn release_never_goes_negative() {
        let mut tracker = BalanceTracker::new();
        tracker.release(OrderSide::Sell, dec!(100), dec!(5));
        assert_eq!(tracker.reserved_crypto, Decimal::ZERO);
    }

    #[test]
    fn total_balance_value_includes_crypto_at_price() {
        let mut tracker = BalanceTracker::new();
        tracker.setup_balances(dec!(500), dec!(2));
        assert_eq!(tracker.get_total_balance_value(dec!(100)), dec!(700));
    }
}
