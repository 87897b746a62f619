use serde::Serialize;

use crate::ledger::Ledger;

/// How far predictions landed from the realized closes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastAccuracy {
    pub samples: usize,
    /// Mean absolute error, quote currency
    pub mae: f64,
    /// Mean absolute percentage error
    pub mape: f64,
}

impl ForecastAccuracy {
    /// From `(predicted, actual)` pairs; `None` when there are none
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Option<Self> {
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let mae = pairs.iter().map(|(p, a)| (p - a).abs()).sum::<f64>() / n;
        let mape = pairs
            .iter()
            .map(|(p, a)| ((p - a) / a).abs())
            .sum::<f64>()
            / n
            * 100.0;

        Some(Self {
            samples: pairs.len(),
            mae,
            mape,
        })
    }
}

/// Backtest performance
#[derive(Debug, Clone, Serialize)]
pub struct BacktestMetrics {
    // P&L
    pub initial_balance: f64,
    pub final_equity: f64,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    /// Return of buying at the first test close and holding to the last
    pub buy_and_hold_return_pct: f64,

    // Trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    pub forecast: Option<ForecastAccuracy>,
}

impl BacktestMetrics {
    /// # Arguments
    /// * `equity_curve` - Account equity after each evaluated tick
    /// * `test_closes` - `(first, last)` closes of the replayed period
    pub fn compute(
        ledger: &Ledger,
        initial_balance: f64,
        equity_curve: &[f64],
        test_closes: (f64, f64),
        forecast: Option<ForecastAccuracy>,
    ) -> Self {
        let final_equity = equity_curve.last().copied().unwrap_or(initial_balance);
        let summary = ledger.summary();

        let pnls: Vec<f64> = ledger
            .profit_and_loss()
            .iter()
            .map(|e| e.profit_or_loss)
            .collect();
        let gross_wins: f64 = pnls.iter().filter(|p| **p > 0.0).sum();
        let gross_losses: f64 = pnls.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();

        let profit_factor = if gross_losses > 0.0 {
            gross_wins / gross_losses
        } else if gross_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = max_drawdown(initial_balance, equity_curve);

        Self {
            initial_balance,
            final_equity,
            total_pnl: final_equity - initial_balance,
            total_return_pct: pct_change(initial_balance, final_equity),
            buy_and_hold_return_pct: pct_change(test_closes.0, test_closes.1),
            total_trades: summary.sells,
            winning_trades: summary.winning_sells,
            losing_trades: summary.losing_sells,
            win_rate: summary.win_rate,
            largest_win: pnls.iter().copied().fold(0.0, f64::max),
            largest_loss: pnls.iter().copied().fold(0.0, f64::min),
            profit_factor,
            max_drawdown,
            max_drawdown_pct,
            forecast,
        }
    }

    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📊 P&L SUMMARY");
        println!("  Initial Balance:       ${:.2}", self.initial_balance);
        println!("  Final Equity:          ${:.2}", self.final_equity);
        println!(
            "  Total P&L:             ${:.2} ({:+.2}%)",
            self.total_pnl, self.total_return_pct
        );
        println!(
            "  Buy & Hold:            {:+.2}%",
            self.buy_and_hold_return_pct
        );

        println!("\n📈 TRADE STATISTICS");
        println!("  Completed Trades:      {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        if self.total_trades > 0 {
            println!("  Largest Win:           ${:.2}", self.largest_win);
            println!("  Largest Loss:          ${:.2}", self.largest_loss);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
        }

        println!("\n⚠️  RISK");
        println!(
            "  Max Drawdown:          ${:.2} ({:.2}%)",
            self.max_drawdown, self.max_drawdown_pct
        );

        if let Some(forecast) = &self.forecast {
            println!("\n🔮 FORECAST ACCURACY");
            println!("  Samples:               {}", forecast.samples);
            println!("  MAE:                   ${:.2}", forecast.mae);
            println!("  MAPE:                  {:.2}%", forecast.mape);
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to - from) / from * 100.0
    } else {
        0.0
    }
}

/// Largest peak-to-trough fall, absolute and as % of the peak
fn max_drawdown(initial: f64, equity_curve: &[f64]) -> (f64, f64) {
    let mut peak = initial;
    let mut worst = (0.0, 0.0);

    for &equity in equity_curve {
        peak = peak.max(equity);
        let drawdown = peak - equity;
        if drawdown > worst.0 {
            worst = (drawdown, pct_change(peak, equity).abs());
        }
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Transaction, TriggerReason};

    fn ledger_with(pnls: &[(f64, f64)]) -> Ledger {
        let mut ledger = Ledger::new();
        for &(buy, sell) in pnls {
            ledger
                .append(Transaction::buy(buy, 1.0, TriggerReason::PredictedGrowth).unwrap())
                .unwrap();
            ledger
                .append(
                    Transaction::sell(sell, 1.0, buy, TriggerReason::PredictedPriceStopLoss)
                        .unwrap(),
                )
                .unwrap();
        }
        ledger
    }

    #[test]
    fn test_metrics_with_trades() {
        let ledger = ledger_with(&[(100.0, 300.0), (100.0, 200.0), (100.0, 50.0)]);
        let metrics =
            BacktestMetrics::compute(&ledger, 1000.0, &[1200.0, 1300.0, 1250.0], (10.0, 12.0), None);

        assert_eq!(metrics.total_trades, 3);
        assert_eq!(metrics.winning_trades, 2);
        assert_eq!(metrics.losing_trades, 1);
        assert!((metrics.profit_factor - 6.0).abs() < 1e-9);
        assert_eq!(metrics.largest_win, 200.0);
        assert_eq!(metrics.largest_loss, -50.0);
        assert_eq!(metrics.total_pnl, 250.0);
        assert!((metrics.total_return_pct - 25.0).abs() < 1e-9);
        assert!((metrics.buy_and_hold_return_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_with_no_trades() {
        let metrics = BacktestMetrics::compute(&Ledger::new(), 1000.0, &[], (10.0, 10.0), None);

        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.final_equity, 1000.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn test_drawdown_calculation() {
        let (abs, pct) = max_drawdown(10_000.0, &[10_100.0, 9_900.0, 9_950.0]);
        assert!((abs - 200.0).abs() < 1e-9);
        assert!((pct - 200.0 / 10_100.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_forecast_accuracy() {
        let accuracy = ForecastAccuracy::from_pairs(&[(110.0, 100.0), (90.0, 100.0)]).unwrap();
        assert_eq!(accuracy.samples, 2);
        assert!((accuracy.mae - 10.0).abs() < 1e-9);
        assert!((accuracy.mape - 10.0).abs() < 1e-9);

        assert!(ForecastAccuracy::from_pairs(&[]).is_none());
    }
}
