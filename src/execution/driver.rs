use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::execution::{
    AccountState, DecisionEngine, PriceFeed, PriceSource, Termination, TickStatus,
};
use crate::forecast::Forecaster;
use crate::ledger::Ledger;

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    GoalReached,
    CapitalExhausted,
    TickLimit,
    Cancelled,
    /// Backtest ran out of history
    EndOfData,
    /// Forecaster could not produce a prediction; carries the error chain
    ForecastFailed(String),
}

impl StopReason {
    /// The run ended because something broke, not because it was done
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::ForecastFailed(_))
    }
}

impl From<Termination> for StopReason {
    fn from(termination: Termination) -> Self {
        match termination {
            Termination::GoalReached => StopReason::GoalReached,
            Termination::CapitalExhausted => StopReason::CapitalExhausted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub interval: Duration,
    /// Stop after this many ticks (evaluated or skipped)
    pub max_ticks: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_ticks: None,
        }
    }
}

/// What a single tick did to the account
#[derive(Debug)]
pub enum TickOutcome {
    /// Price fetch failed; state untouched
    Skipped(AccountState),
    Evaluated {
        state: AccountState,
        status: TickStatus,
    },
    /// No prediction; state untouched and the run must stop
    ForecastFailed {
        state: AccountState,
        error: anyhow::Error,
    },
}

/// Final state of a run plus everything it traded
#[derive(Debug)]
pub struct RunSummary {
    pub state: AccountState,
    pub stop_reason: StopReason,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub last_price: Option<f64>,
    pub ledger: Ledger,
}

impl RunSummary {
    pub fn log(&self) {
        let summary = self.ledger.summary();
        tracing::info!(
            "Run stopped ({:?}) after {} ticks ({} skipped)",
            self.stop_reason,
            self.ticks,
            self.skipped_ticks
        );
        tracing::info!(
            "  Balance: ${:.2} | Open position: {} | Goal reached: {}",
            self.state.balance,
            self.state.position.is_some(),
            self.state.goal_reached
        );
        tracing::info!(
            "  Trades: {} buys / {} sells | Realized P&L: ${:+.2} | Win rate: {:.1}%",
            summary.buys,
            summary.sells,
            summary.total_profit_or_loss,
            summary.win_rate
        );
        for transaction in self.ledger.transactions() {
            tracing::info!("    {}", transaction);
        }
        tracing::info!("  Profit/loss by sell:");
        for entry in self.ledger.profit_and_loss() {
            tracing::info!(
                "    {} -> ${:+.2}",
                entry.transaction_id,
                entry.profit_or_loss
            );
        }
    }
}

/// Polls prices, asks the forecaster, feeds the engine and records trades
///
/// Ticks are strictly sequential; cancellation is only observed while
/// waiting for the next tick, so a tick in progress always finishes.
pub struct Driver<P, F> {
    feed: PriceFeed<P>,
    forecaster: F,
    engine: DecisionEngine,
    config: DriverConfig,
}

impl<P: PriceSource, F: Forecaster> Driver<P, F> {
    /// `forecaster` must already be fitted
    pub fn new(source: P, forecaster: F, engine: DecisionEngine, config: DriverConfig) -> Self {
        Self {
            feed: PriceFeed::new(source, 100),
            forecaster,
            engine,
            config,
        }
    }

    pub fn feed(&self) -> &PriceFeed<P> {
        &self.feed
    }

    /// Run until a terminal state, the tick limit, or Ctrl+C
    pub async fn run(&mut self, initial: AccountState) -> Result<RunSummary> {
        self.run_until(initial, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C, stopping after the current tick");
        })
        .await
    }

    /// Run until a terminal state, the tick limit, or `shutdown` completes
    pub async fn run_until<S>(&mut self, initial: AccountState, shutdown: S) -> Result<RunSummary>
    where
        S: Future<Output = ()>,
    {
        initial.validate()?;

        let mut state = initial;
        let mut ledger = Ledger::new();
        if let Some(position) = &state.position {
            ledger.append(position.buy().clone())?;
        }

        let mut ticks = 0u64;
        let mut skipped_ticks = 0u64;

        let stop_reason = if let Some(termination) = state.termination() {
            tracing::warn!("Account is already terminal ({:?}), not trading", termination);
            termination.into()
        } else {
            tracing::info!(
                symbol = self.feed.source().symbol(),
                forecaster = self.forecaster.name(),
                interval_secs = self.config.interval.as_secs_f64(),
                "Starting trading loop with balance ${:.2}",
                state.balance
            );

            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tokio::pin!(shutdown);

            loop {
                tokio::select! {
                    _ = &mut shutdown => break StopReason::Cancelled,
                    _ = ticker.tick() => {}
                }

                ticks += 1;
                match self.tick(state, &mut ledger).await? {
                    TickOutcome::Skipped(next) => {
                        skipped_ticks += 1;
                        state = next;
                    }
                    TickOutcome::Evaluated { state: next, .. } => state = next,
                    TickOutcome::ForecastFailed { state: next, error } => {
                        state = next;
                        tracing::error!("Forecast failed, stopping: {:#}", error);
                        break StopReason::ForecastFailed(format!("{:#}", error));
                    }
                }

                if let Some(termination) = state.termination() {
                    break termination.into();
                }
                if self.config.max_ticks.is_some_and(|max| ticks >= max) {
                    break StopReason::TickLimit;
                }
            }
        };

        Ok(RunSummary {
            state,
            stop_reason,
            ticks,
            skipped_ticks,
            last_price: self.feed.latest().map(|s| s.price),
            ledger,
        })
    }

    /// One fetch → forecast → decide → record cycle
    ///
    /// A failed price fetch skips the tick; a failed forecast hands the state
    /// back in [`TickOutcome::ForecastFailed`] so the caller can stop cleanly.
    /// `Err` is reserved for engine or ledger invariant violations.
    pub async fn tick(&mut self, state: AccountState, ledger: &mut Ledger) -> Result<TickOutcome> {
        let snapshot = match self.feed.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Error getting price, skipping tick: {:#}", e);
                return Ok(TickOutcome::Skipped(state));
            }
        };

        let predicted_price = match self
            .forecaster
            .predict()
            .with_context(|| format!("{} forecast failed", self.forecaster.name()))
        {
            Ok(price) => price,
            Err(error) => return Ok(TickOutcome::ForecastFailed { state, error }),
        };

        tracing::info!(
            "Current price of {}: ${:.2} | predicted in {}d: ${:.2}",
            snapshot.symbol,
            snapshot.price,
            self.forecaster.horizon_days(),
            predicted_price
        );

        let tick = self
            .engine
            .evaluate(snapshot.price, predicted_price, state)?;

        if let Some(transaction) = tick.transaction {
            tracing::info!("New order filled: {}", transaction);
            ledger.append(transaction)?;
        } else {
            tracing::info!("No trade: {}", tick.status);
        }
        tracing::info!("Remaining balance: ${:.2}", tick.state.balance);

        Ok(TickOutcome::Evaluated {
            state: tick.state,
            status: tick.status,
        })
    }
}
