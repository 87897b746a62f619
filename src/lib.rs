// Core modules
pub mod api;
pub mod backtest;
pub mod error;
pub mod execution;
pub mod forecast;
pub mod history;
pub mod ledger;
pub mod models;
pub mod settings;

// Re-export commonly used types
pub use error::{ConfigError, EngineError, LedgerError};
pub use execution::{AccountState, DecisionEngine, Driver, EngineConfig, PriceSource};
pub use forecast::Forecaster;
pub use ledger::Ledger;
pub use models::*;
pub use settings::Settings;
