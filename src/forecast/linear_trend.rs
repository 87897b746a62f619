use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::Forecaster;
use crate::models::PricePoint;

/// Fitted `close = intercept + slope * day` line
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrendLine {
    origin: NaiveDate,
    slope: f64,
    intercept: f64,
    last_day: f64,
}

/// Least-squares trend over the most recent closes, extrapolated forward
///
/// Days are measured from the first point in the lookback window, so gaps
/// in the series (weekends, missing rows) stretch the x axis correctly.
#[derive(Debug, Clone)]
pub struct LinearTrendForecaster {
    lookback_days: usize,
    horizon_days: u32,
    trend: Option<TrendLine>,
}

impl LinearTrendForecaster {
    pub fn new(lookback_days: usize, horizon_days: u32) -> Self {
        Self {
            lookback_days: lookback_days.max(2),
            horizon_days,
            trend: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.trend.is_some()
    }

    /// Predicted close on an arbitrary date
    pub fn predict_on(&self, date: NaiveDate) -> Result<f64> {
        let trend = self.trend.context("Forecaster has not been fitted")?;
        let day = (date - trend.origin).num_days() as f64;
        positive(trend.intercept + trend.slope * day)
    }
}

impl Default for LinearTrendForecaster {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

impl Forecaster for LinearTrendForecaster {
    fn name(&self) -> &str {
        "LinearTrend"
    }

    fn horizon_days(&self) -> u32 {
        self.horizon_days
    }

    fn fit(&mut self, history: &[PricePoint]) -> Result<()> {
        let window = &history[history.len().saturating_sub(self.lookback_days)..];

        if window.len() < 2 {
            anyhow::bail!(
                "Need at least 2 price points to fit a trend, got {}",
                window.len()
            );
        }
        if let Some(bad) = window.iter().find(|p| !(p.close.is_finite() && p.close > 0.0)) {
            anyhow::bail!("Invalid close {} on {}", bad.close, bad.date);
        }

        let origin = window[0].date;
        let xs: Vec<f64> = window
            .iter()
            .map(|p| (p.date - origin).num_days() as f64)
            .collect();
        let ys: Vec<f64> = window.iter().map(|p| p.close).collect();

        let n = xs.len() as f64;
        let mean_x = xs.iter().sum::<f64>() / n;
        let mean_y = ys.iter().sum::<f64>() / n;

        let (mut covariance, mut variance) = (0.0, 0.0);
        for (x, y) in xs.iter().zip(&ys) {
            covariance += (x - mean_x) * (y - mean_y);
            variance += (x - mean_x).powi(2);
        }

        // All points on one date: flat line through the mean
        let slope = if variance > 0.0 { covariance / variance } else { 0.0 };
        let intercept = mean_y - slope * mean_x;
        let last_day = xs[xs.len() - 1];

        tracing::debug!(
            points = window.len(),
            slope,
            intercept,
            "Fitted linear trend"
        );

        self.trend = Some(TrendLine {
            origin,
            slope,
            intercept,
            last_day,
        });
        Ok(())
    }

    fn predict(&self) -> Result<f64> {
        let trend = self.trend.context("Forecaster has not been fitted")?;
        let day = trend.last_day + self.horizon_days as f64;
        positive(trend.intercept + trend.slope * day)
    }
}

fn positive(prediction: f64) -> Result<f64> {
    if prediction.is_finite() && prediction > 0.0 {
        Ok(prediction)
    } else {
        anyhow::bail!("Trend extrapolates to an unusable price: {}", prediction)
    }
}
