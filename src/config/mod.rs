//! Bot configuration: grid shape, investment sizing, trading mode, and
//! TP/SL thresholds. Grounded on `src/config/builder.rs`'s
//! `TradingConfig`/`GridConfig`/`RiskConfig` field set and
//! `GridRebalancerConfig::validate`'s range-check style
//! (`src/strategies/grid_rebalancer.rs`), unlike the teacher's own
//! `config` module, which never defines a working `Config` type, this
//! one is complete.

pub mod loader;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::EngineError;
use crate::grid::manager::{SpacingType, StrategyType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    Live,
    PaperTrading,
    Backtest,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    pub bot_id: i64,

    pub bottom_range: Decimal,
    pub top_range: Decimal,

    #[validate(range(min = 1))]
    pub num_grids: usize,

    pub spacing_type: SpacingType,
    pub strategy_type: StrategyType,

    pub investment_amount: Decimal,

    pub trading_mode: TradingMode,

    /// Exchange candle interval, e.g. "1m"/"1h", only meaningful for
    /// `Backtest` and live polling, unused by `PaperTrading`.
    pub timeframe: String,

    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,

    pub take_profit_enabled: bool,
    pub take_profit_threshold: Option<Decimal>,

    pub stop_loss_enabled: bool,
    pub stop_loss_threshold: Option<Decimal>,

    pub database_url: String,
}

impl Config {
    /// Range and consistency checks beyond what `validator` derives can
    /// express (cross-field comparisons, decimal sign checks).
    pub fn validate_ranges(&self) -> crate::error::Result<()> {
        self.validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        if self.bottom_range <= Decimal::ZERO || self.top_range <= Decimal::ZERO {
            return Err(EngineError::Config("grid bounds must be positive".into()).into());
        }
        if self.top_range <= self.bottom_range {
            return Err(EngineError::Config("top_range must exceed bottom_range".into()).into());
        }
        if self.investment_amount <= Decimal::ZERO {
            return Err(EngineError::Config("investment_amount must be positive".into()).into());
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end <= start {
                return Err(EngineError::Config("end_date must be after start_date".into()).into());
            }
        }
        if self.take_profit_enabled && self.take_profit_threshold.is_none() {
            return Err(EngineError::Config(
                "take_profit_enabled requires take_profit_threshold".into(),
            )
            .into());
        }
        if self.stop_loss_enabled && self.stop_loss_threshold.is_none() {
            return Err(
                EngineError::Config("stop_loss_enabled requires stop_loss_threshold".into()).into(),
            );
        }
        if matches!(self.trading_mode, TradingMode::Backtest) && self.start_date.is_none() {
            return Err(EngineError::Config("backtest mode requires start_date".into()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> Config {
        Config {
            bot_id: 1,
            bottom_range: dec!(90),
            top_range: dec!(110),
            num_grids: 5,
            spacing_type: SpacingType::Arithmetic,
            strategy_type: StrategyType::SimpleGrid,
            investment_amount: dec!(1000),
            trading_mode: TradingMode::PaperTrading,
            timeframe: "1h".into(),
            start_date: None,
            end_date: None,
            take_profit_enabled: false,
            take_profit_threshold: None,
            stop_loss_enabled: false,
            stop_loss_threshold: None,
            database_url: "sqlite::memory:".into(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate_ranges().is_ok());
    }

    #[test]
    fn top_must_exceed_bottom() {
        let mut config = base_config();
        config.top_range = dec!(80);
        assert!(config.validate_ranges().is_err());
    }

    #[test]
    fn take_profit_requires_threshold() {
        let mut config = base_config();
        config.take_profit_enabled = true;
        assert!(config.validate_ranges().is_err());
    }

    #[test]
    fn backtest_requires_start_date() {
        let mut config = base_config();
        config.trading_mode = TradingMode::Backtest;
        assert!(config.validate_ranges().is_err());
    }
}
