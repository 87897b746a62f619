// Decision engine, account state and the live polling loop
pub mod account;
pub mod driver;
pub mod executor;
pub mod price_feed;

pub use account::{AccountState, Position, Termination};
pub use driver::{Driver, DriverConfig, RunSummary, StopReason, TickOutcome};
pub use executor::{DecisionEngine, EngineConfig, Tick, TickStatus, WaitReason};
pub use price_feed::{PriceFeed, PriceSource};
