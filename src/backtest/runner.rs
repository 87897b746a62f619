use anyhow::{Context, Result};
use chrono::Duration;

use crate::backtest::metrics::{BacktestMetrics, ForecastAccuracy};
use crate::execution::{AccountState, DecisionEngine, RunSummary, StopReason};
use crate::forecast::Forecaster;
use crate::history::PriceHistory;
use crate::ledger::Ledger;

/// Outcome of replaying the test split
#[derive(Debug)]
pub struct BacktestReport {
    pub train_points: usize,
    pub test_points: usize,
    pub summary: RunSummary,
    pub metrics: BacktestMetrics,
}

/// Replays the held-out part of a price history through the decision engine
///
/// Each test close is treated as one tick. The forecaster is refitted on
/// everything up to and including that close before predicting, so it never
/// sees the future.
pub struct BacktestRunner<F> {
    engine: DecisionEngine,
    forecaster: F,
    train_fraction: f64,
    initial_balance: f64,
}

impl<F: Forecaster> BacktestRunner<F> {
    pub fn new(
        engine: DecisionEngine,
        forecaster: F,
        train_fraction: f64,
        initial_balance: f64,
    ) -> Self {
        Self {
            engine,
            forecaster,
            train_fraction,
            initial_balance,
        }
    }

    pub fn run(&mut self, history: &PriceHistory) -> Result<BacktestReport> {
        let (train, test) = history.split(self.train_fraction)?;
        if test.is_empty() {
            anyhow::bail!(
                "Not enough history for a backtest: {} points leave no test data at {:.0}% train",
                history.len(),
                self.train_fraction * 100.0
            );
        }

        tracing::info!(
            "Starting backtest: {} training / {} test days, forecaster {}",
            train.len(),
            test.len(),
            self.forecaster.name()
        );

        let points = history.points();
        let train_len = train.len();
        let horizon = Duration::days(self.forecaster.horizon_days() as i64);

        let mut state = AccountState::new(self.initial_balance);
        let mut ledger = Ledger::new();
        let mut equity_curve = Vec::with_capacity(test.len());
        let mut forecast_pairs = Vec::new();
        let mut stop_reason = StopReason::EndOfData;
        let mut ticks = 0u64;

        for (i, point) in test.iter().enumerate() {
            self.forecaster
                .fit(&points[..train_len + i + 1])
                .with_context(|| format!("Failed to fit forecaster at {}", point.date))?;
            let predicted = self
                .forecaster
                .predict()
                .with_context(|| format!("Forecast failed at {}", point.date))?;

            if let Some(actual) = history.close_on(point.date + horizon) {
                forecast_pairs.push((predicted, actual));
            }

            let tick = self.engine.evaluate(point.close, predicted, state)?;
            ticks += 1;

            if let Some(transaction) = tick.transaction {
                tracing::debug!(date = %point.date, "{}", transaction);
                ledger.append(transaction)?;
            }

            state = tick.state;
            equity_curve.push(state.equity(point.close));

            if let Some(termination) = state.termination() {
                tracing::info!(date = %point.date, "Backtest stopped early: {:?}", termination);
                stop_reason = termination.into();
                break;
            }
        }

        let first_close = test[0].close;
        let last_close = test[ticks as usize - 1].close;

        let metrics = BacktestMetrics::compute(
            &ledger,
            self.initial_balance,
            &equity_curve,
            (first_close, last_close),
            ForecastAccuracy::from_pairs(&forecast_pairs),
        );

        Ok(BacktestReport {
            train_points: train_len,
            test_points: test.len(),
            summary: RunSummary {
                state,
                stop_reason,
                ticks,
                skipped_ticks: 0,
                last_price: Some(last_close),
                ledger,
            },
            metrics,
        })
    }

    /// Run and print the report
    pub fn run_and_report(&mut self, history: &PriceHistory) -> Result<BacktestReport> {
        println!("\n🧪 Backtesting {}", self.forecaster.name());
        println!("   History: {} days", history.len());
        println!("   Initial Balance: ${:.2}", self.initial_balance);

        let report = self.run(history)?;
        report.metrics.print_report();

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::EngineConfig;
    use crate::forecast::LinearTrendForecaster;
    use crate::models::{PricePoint, TriggerReason};
    use chrono::NaiveDate;

    fn history(closes: &[f64]) -> PriceHistory {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        PriceHistory::from_points(
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| PricePoint {
                    date: start + Duration::days(i as i64),
                    close,
                })
                .collect(),
        )
    }

    fn runner(goal: f64, train_fraction: f64) -> BacktestRunner<LinearTrendForecaster> {
        let engine = DecisionEngine::new(EngineConfig {
            goal,
            ..Default::default()
        })
        .unwrap();
        BacktestRunner::new(engine, LinearTrendForecaster::new(2, 1), train_fraction, 1000.0)
    }

    #[test]
    fn test_backtest_uptrend_reaches_goal() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 * 1.05f64.powi(i)).collect();
        let report = runner(1300.0, 0.5).run(&history(&closes)).unwrap();

        assert_eq!(report.summary.stop_reason, StopReason::GoalReached);
        assert!(report.summary.state.goal_reached);
        assert!(report.summary.state.balance >= 1300.0);

        let transactions = report.summary.ledger.transactions();
        assert!(transactions[0].is_buy());
        assert_eq!(transactions[0].price(), closes[20]);
        let last = transactions.last().unwrap();
        assert_eq!(last.trigger(), TriggerReason::GoalReached);
        assert!(report.metrics.total_return_pct >= 30.0);
    }

    #[test]
    fn test_backtest_downtrend_never_buys() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 0.95f64.powi(i)).collect();
        let report = runner(1_000_000.0, 0.5).run(&history(&closes)).unwrap();

        assert_eq!(report.summary.stop_reason, StopReason::EndOfData);
        assert!(report.summary.ledger.is_empty());
        assert_eq!(report.metrics.final_equity, 1000.0);
        assert_eq!(report.summary.ticks, 15);
        assert!(report.metrics.buy_and_hold_return_pct < 0.0);
    }

    #[test]
    fn test_backtest_stop_loss_after_crash() {
        let mut closes: Vec<f64> = (0..10).map(|i| 100.0 * 1.05f64.powi(i)).collect();
        let peak = closes[9];
        closes.push(peak * 0.85);
        for _ in 0..9 {
            let last = *closes.last().unwrap();
            closes.push(last * 0.99);
        }

        // 20 points at 0.42 train leaves 11 test points starting at the peak
        let report = runner(1_000_000.0, 0.42).run(&history(&closes)).unwrap();
        assert_eq!(report.train_points, 9);

        let transactions = report.summary.ledger.transactions();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].price(), peak);
        assert_eq!(transactions[1].trigger(), TriggerReason::CurrentPriceStopLoss);

        let pnl = transactions[1].profit_or_loss().unwrap();
        assert!((report.summary.state.balance - (1000.0 + pnl)).abs() < 1e-6);
        assert_eq!(report.metrics.losing_trades, 1);

        let entries = report.summary.ledger.profit_and_loss();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction_id, transactions[1].id());
        report.summary.log();
    }

    #[test]
    fn test_backtest_records_forecast_accuracy() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let report = runner(1_000_000.0, 0.5).run(&history(&closes)).unwrap();

        // Perfectly linear data: every forecast with a known outcome is exact
        let forecast = report.metrics.forecast.unwrap();
        assert_eq!(forecast.samples, 9);
        assert!(forecast.mae < 1e-9);
    }

    #[test]
    fn test_backtest_insufficient_data() {
        let result = runner(1_000_000.0, 0.85).run(&history(&[100.0, 101.0]));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Not enough history"));
    }
}
