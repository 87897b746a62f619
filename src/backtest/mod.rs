pub mod metrics;
pub mod runner;

pub use metrics::{BacktestMetrics, ForecastAccuracy};
pub use runner::{BacktestReport, BacktestRunner};
