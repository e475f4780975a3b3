//! Account-value recording and a lightweight performance summary.
//!
//! Not a `prometheus`/Grafana exporter, that outer observability
//! surface is out of scope, but the control loop recording
//! `(timestamp, account_value, price)` samples at every tick is in
//! scope (spec §4.F). Grounded on the stats-accumulator style of
//! `src/metrics/mod.rs`, simplified to a plain `Vec` with a `push` and
//! summary accessors.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub account_value: Decimal,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    pub total_return_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub total_fees: Decimal,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    samples: Vec<MetricSample>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, account_value: Decimal, price: Decimal) {
        self.samples.push(MetricSample {
            timestamp: Utc::now(),
            account_value,
            price,
        });
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Total return from first to last sample, peak-to-trough drawdown
    /// across the run, plus whatever fee total the caller supplies (the
    /// recorder itself doesn't track fees, `BalanceTracker` does).
    pub fn summary(&self, total_fees: Decimal) -> Option<PerformanceSummary> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        let total_return_pct = if first.account_value.is_zero() {
            Decimal::ZERO
        } else {
            (last.account_value - first.account_value) / first.account_value * Decimal::from(100)
        };

        let mut peak = first.account_value;
        let mut max_drawdown_pct = Decimal::ZERO;
        for sample in &self.samples {
            if sample.account_value > peak {
                peak = sample.account_value;
            }
            if !peak.is_zero() {
                let drawdown = (peak - sample.account_value) / peak * Decimal::from(100);
                if drawdown > max_drawdown_pct {
                    max_drawdown_pct = drawdown;
                }
            }
        }

        Some(PerformanceSummary {
            total_return_pct,
            max_drawdown_pct,
            total_fees,
            sample_count: self.samples.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn summary_none_with_no_samples() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.summary(Decimal::ZERO).is_none());
    }

    #[test]
    fn total_return_reflects_first_to_last() {
        let mut recorder = MetricsRecorder::new();
        recorder.push(dec!(1000), dec!(100));
        recorder.push(dec!(1100), dec!(110));
        let summary = recorder.summary(dec!(5)).unwrap();
        assert_eq!(summary.total_return_pct, dec!(10));
        assert_eq!(summary.total_fees, dec!(5));
        assert_eq!(summary.sample_count, 2);
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let mut recorder = MetricsRecorder::new();
        recorder.push(dec!(1000), dec!(100));
        recorder.push(dec!(1200), dec!(120));
        recorder.push(dec!(900), dec!(90));
        let summary = recorder.summary(Decimal::ZERO).unwrap();
        // (1200 - 900) / 1200 * 100 = 25
        assert_eq!(summary.max_drawdown_pct, dec!(25));
    }
}
