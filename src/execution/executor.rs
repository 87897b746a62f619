use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;
use crate::execution::AccountState;
use crate::models::{Transaction, TriggerReason};

/// Thresholds driving entry and exit decisions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Predicted rise over the current price needed to buy (0.02 = 2%)
    pub minimum_growth: f64,
    /// Fall that forces a sell (0.05 = 5%)
    pub stop_loss_pct: f64,
    /// Balance at which trading stops for good
    pub goal: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_growth: 0.02,
            stop_loss_pct: 0.05,
            goal: 1_200_000.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.minimum_growth.is_finite() && self.minimum_growth >= 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "minimum_growth must be >= 0, got {}",
                self.minimum_growth
            )));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(EngineError::InvalidConfig(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if !(self.goal.is_finite() && self.goal > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "goal must be positive, got {}",
                self.goal
            )));
        }
        Ok(())
    }
}

/// Why a tick did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitReason {
    GrowthThresholdNotMet,
    InsufficientBalance,
    SellThresholdNotMet,
    GoalAlreadyReached,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitReason::GrowthThresholdNotMet => "growth threshold not met",
            WaitReason::InsufficientBalance => "insufficient balance",
            WaitReason::SellThresholdNotMet => "waiting for sell threshold",
            WaitReason::GoalAlreadyReached => "investment goal already reached",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Fired(TriggerReason),
    Waiting(WaitReason),
}

impl fmt::Display for TickStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickStatus::Fired(reason) => write!(f, "fired: {}", reason),
            TickStatus::Waiting(reason) => write!(f, "waiting: {}", reason),
        }
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub state: AccountState,
    pub transaction: Option<Transaction>,
    pub status: TickStatus,
}

impl Tick {
    fn waiting(state: AccountState, reason: WaitReason) -> Self {
        Self {
            state,
            transaction: None,
            status: TickStatus::Waiting(reason),
        }
    }

    fn fired(state: AccountState, transaction: Transaction) -> Self {
        let status = TickStatus::Fired(transaction.trigger());
        Self {
            state,
            transaction: Some(transaction),
            status,
        }
    }
}

/// Flat/Long state machine deciding when to buy and sell
///
/// Pure: no I/O, no clock reads beyond transaction timestamps, and the
/// account state goes in by value and comes back out in the [`Tick`].
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate one tick
    ///
    /// Once `goal_reached` is set every further call is a no-op.
    pub fn evaluate(
        &self,
        current_price: f64,
        predicted_price: f64,
        state: AccountState,
    ) -> Result<Tick, EngineError> {
        check_price("current", current_price)?;
        check_price("predicted", predicted_price)?;
        state.validate()?;

        if state.goal_reached {
            return Ok(Tick::waiting(state, WaitReason::GoalAlreadyReached));
        }

        let mut tick = if state.is_flat() {
            self.evaluate_entry(current_price, predicted_price, state)?
        } else {
            self.evaluate_exit(current_price, predicted_price, state)?
        };

        if tick.state.is_flat() && tick.state.balance >= self.config.goal {
            tracing::info!(
                balance = tick.state.balance,
                goal = self.config.goal,
                "Investment goal reached, trading stops"
            );
            tick.state.goal_reached = true;
        }

        Ok(tick)
    }

    fn evaluate_entry(
        &self,
        current_price: f64,
        predicted_price: f64,
        state: AccountState,
    ) -> Result<Tick, EngineError> {
        let growth_target = current_price * (1.0 + self.config.minimum_growth);

        if predicted_price < growth_target {
            tracing::debug!(
                current_price,
                predicted_price,
                growth_target,
                "Predicted growth below {:.1}% threshold",
                self.config.minimum_growth * 100.0
            );
            return Ok(Tick::waiting(state, WaitReason::GrowthThresholdNotMet));
        }

        if state.balance <= 0.0 {
            return Ok(Tick::waiting(state, WaitReason::InsufficientBalance));
        }

        let (next, buy) = state.open_position(current_price, TriggerReason::PredictedGrowth)?;
        Ok(Tick::fired(next, buy))
    }

    fn evaluate_exit(
        &self,
        current_price: f64,
        predicted_price: f64,
        state: AccountState,
    ) -> Result<Tick, EngineError> {
        match self.exit_trigger(current_price, predicted_price, &state) {
            Some(trigger) => {
                let (next, sell) = state.close_position(current_price, trigger)?;
                Ok(Tick::fired(next, sell))
            }
            None => Ok(Tick::waiting(state, WaitReason::SellThresholdNotMet)),
        }
    }

    /// First matching exit rule: realized stop-loss, then goal, then predicted stop-loss
    fn exit_trigger(
        &self,
        current_price: f64,
        predicted_price: f64,
        state: &AccountState,
    ) -> Option<TriggerReason> {
        let position = state.position.as_ref()?;
        let keep_fraction = 1.0 - self.config.stop_loss_pct;

        if current_price <= position.entry_price() * keep_fraction {
            return Some(TriggerReason::CurrentPriceStopLoss);
        }

        if state.balance + position.market_value(current_price) >= self.config.goal {
            return Some(TriggerReason::GoalReached);
        }

        if predicted_price <= current_price * keep_fraction {
            return Some(TriggerReason::PredictedPriceStopLoss);
        }

        None
    }
}

fn check_price(field: &'static str, value: f64) -> Result<(), EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidPrice { field, value })
    }
}
