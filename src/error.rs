use thiserror::Error;
use uuid::Uuid;

/// Rejected decision-engine inputs and broken account invariants
///
/// These are programming errors on the caller's side, never market conditions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("{field} price must be positive and finite, got {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("transaction quantity must be positive and finite, got {0}")]
    InvalidQuantity(f64),

    #[error("trade value of {quantity} @ {price} does not fit in an f64")]
    NotionalOutOfRange { price: f64, quantity: f64 },

    #[error("balance must be non-negative and finite, got {0}")]
    InvalidBalance(f64),

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot sell: no open position")]
    NoOpenPosition,

    #[error("cannot buy: position {0} is still open")]
    PositionAlreadyOpen(Uuid),

    #[error("transaction {0} is not a buy and cannot open a position")]
    NotABuy(Uuid),
}

/// Violations of the ledger's append-only buy/sell ordering
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("transaction {0} is already recorded")]
    DuplicateTransaction(Uuid),

    #[error("sell {0} has no open buy to match")]
    UnmatchedSell(Uuid),

    #[error("buy {buy} recorded while buy {open} is still unmatched")]
    BuyWhileOpen { buy: Uuid, open: Uuid },
}

/// Settings that could not be loaded or make no sense
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
