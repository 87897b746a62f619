use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{Transaction, TriggerReason};

/// The single open buy leg awaiting a sell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    buy: Transaction,
}

impl Position {
    /// Open a position from the buy that created it
    pub fn open(buy: Transaction) -> Result<Self, EngineError> {
        if !buy.is_buy() {
            return Err(EngineError::NotABuy(buy.id()));
        }
        Ok(Self { buy })
    }

    pub fn buy(&self) -> &Transaction {
        &self.buy
    }

    pub fn buy_id(&self) -> Uuid {
        self.buy.id()
    }

    pub fn entry_price(&self) -> f64 {
        self.buy.price()
    }

    pub fn quantity(&self) -> f64 {
        self.buy.quantity()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.buy.created_at()
    }

    /// What the held quantity is worth at `current_price`
    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity() * current_price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity() * (current_price - self.entry_price())
    }
}

/// Why a run has nowhere left to go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    GoalReached,
    CapitalExhausted,
}

/// Everything a tick needs to know about the account
///
/// Threaded through [`crate::execution::DecisionEngine::evaluate`] by value:
/// each tick consumes the previous state and returns the next one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountState {
    pub balance: f64,
    pub position: Option<Position>,
    pub goal_reached: bool,
}

impl AccountState {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            position: None,
            goal_reached: false,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Cash plus the market value of any open position
    pub fn equity(&self, current_price: f64) -> f64 {
        self.balance
            + self
                .position
                .as_ref()
                .map(|p| p.market_value(current_price))
                .unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.balance.is_finite() && self.balance >= 0.0) {
            return Err(EngineError::InvalidBalance(self.balance));
        }
        Ok(())
    }

    /// Terminal condition, if any
    ///
    /// Goal takes priority; capital is exhausted only when there is neither
    /// cash nor a position left to sell.
    pub fn termination(&self) -> Option<Termination> {
        if self.goal_reached {
            Some(Termination::GoalReached)
        } else if self.balance <= 0.0 && self.position.is_none() {
            Some(Termination::CapitalExhausted)
        } else {
            None
        }
    }

    /// Spend the whole balance on a buy at `price`
    pub fn open_position(
        self,
        price: f64,
        trigger: TriggerReason,
    ) -> Result<(AccountState, Transaction), EngineError> {
        if let Some(position) = &self.position {
            return Err(EngineError::PositionAlreadyOpen(position.buy_id()));
        }

        let buy = Transaction::buy_for(price, self.balance, trigger)?;
        let position = Position::open(buy.clone())?;

        let next = AccountState {
            balance: 0.0,
            position: Some(position),
            goal_reached: self.goal_reached,
        };
        Ok((next, buy))
    }

    /// Sell the whole open position at `price`
    pub fn close_position(
        self,
        price: f64,
        trigger: TriggerReason,
    ) -> Result<(AccountState, Transaction), EngineError> {
        let position = self.position.ok_or(EngineError::NoOpenPosition)?;

        let sell = Transaction::sell(price, position.quantity(), position.entry_price(), trigger)?;

        let next = AccountState {
            balance: self.balance + sell.notional(),
            position: None,
            goal_reached: self.goal_reached,
        };
        Ok((next, sell))
    }
}
