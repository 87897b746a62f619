// Price forecasting
pub mod linear_trend;

use anyhow::Result;

use crate::models::PricePoint;

pub use linear_trend::LinearTrendForecaster;

/// Predicts the price a fixed horizon ahead of the data it was fitted on
pub trait Forecaster: Send + Sync {
    fn name(&self) -> &str;

    /// Days past the last fitted observation that `predict` looks at
    fn horizon_days(&self) -> u32;

    /// Fit the model to a chronologically ordered history
    fn fit(&mut self, history: &[PricePoint]) -> Result<()>;

    fn predict(&self) -> Result<f64>;
}
