use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EngineError;

/// Why a transaction fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    PredictedGrowth,
    CurrentPriceStopLoss,
    GoalReached,
    PredictedPriceStopLoss,
}

impl TriggerReason {
    pub fn description(&self) -> &'static str {
        match self {
            TriggerReason::PredictedGrowth => "predicted future growth",
            TriggerReason::CurrentPriceStopLoss => "current price stop-loss",
            TriggerReason::GoalReached => "investment goal reached",
            TriggerReason::PredictedPriceStopLoss => "predicted price stop-loss",
        }
    }
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Buy or sell. Realized P&L only exists on the sell side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum TransactionKind {
    Buy,
    Sell { profit_or_loss: f64 },
}

/// An executed trade
///
/// Built only through [`Transaction::buy`] and [`Transaction::sell`], which
/// reject non-positive prices and quantities. Immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    id: Uuid,
    kind: TransactionKind,
    price: f64,
    quantity: f64,
    notional: f64,
    trigger: TriggerReason,
    created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn buy(price: f64, quantity: f64, trigger: TriggerReason) -> Result<Self, EngineError> {
        Self::create(TransactionKind::Buy, price, quantity, price * quantity, trigger)
    }

    /// Buy whatever `notional` affords at `price`
    ///
    /// The recorded notional is exactly the amount spent, not `price * quantity`
    /// recomputed after rounding.
    pub fn buy_for(price: f64, notional: f64, trigger: TriggerReason) -> Result<Self, EngineError> {
        if !(notional.is_finite() && notional > 0.0) {
            return Err(EngineError::InvalidBalance(notional));
        }
        Self::create(TransactionKind::Buy, price, notional / price, notional, trigger)
    }

    /// Sell `quantity` at `price`, closing a buy made at `buy_price`
    pub fn sell(
        price: f64,
        quantity: f64,
        buy_price: f64,
        trigger: TriggerReason,
    ) -> Result<Self, EngineError> {
        let profit_or_loss = quantity * (price - buy_price);
        Self::create(
            TransactionKind::Sell { profit_or_loss },
            price,
            quantity,
            price * quantity,
            trigger,
        )
    }

    fn create(
        kind: TransactionKind,
        price: f64,
        quantity: f64,
        notional: f64,
        trigger: TriggerReason,
    ) -> Result<Self, EngineError> {
        if !(price.is_finite() && price > 0.0) {
            return Err(EngineError::InvalidPrice {
                field: "transaction",
                value: price,
            });
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(EngineError::InvalidQuantity(quantity));
        }
        if !notional.is_finite() {
            return Err(EngineError::NotionalOutOfRange { price, quantity });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            price,
            quantity,
            notional,
            trigger,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    pub fn is_buy(&self) -> bool {
        matches!(self.kind, TransactionKind::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self.kind, TransactionKind::Sell { .. })
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Quote-currency value of the trade
    pub fn notional(&self) -> f64 {
        self.notional
    }

    pub fn profit_or_loss(&self) -> Option<f64> {
        match self.kind {
            TransactionKind::Buy => None,
            TransactionKind::Sell { profit_or_loss } => Some(profit_or_loss),
        }
    }

    pub fn trigger(&self) -> TriggerReason {
        self.trigger
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = if self.is_buy() { "BUY" } else { "SELL" };
        write!(
            f,
            "{} {} {:.8} @ ${:.2} (notional ${:.2}, {})",
            side,
            self.id,
            self.quantity,
            self.price,
            self.notional(),
            self.trigger
        )?;
        if let Some(pnl) = self.profit_or_loss() {
            write!(f, " P&L ${:+.2}", pnl)?;
        }
        Ok(())
    }
}

/// Current market price as fetched from a price source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// One daily close from a historical series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_has_no_profit_or_loss() {
        let buy = Transaction::buy(100.0, 2.0, TriggerReason::PredictedGrowth).unwrap();

        assert!(buy.is_buy());
        assert_eq!(buy.notional(), 200.0);
        assert_eq!(buy.profit_or_loss(), None);
        assert_eq!(buy.trigger(), TriggerReason::PredictedGrowth);
    }

    #[test]
    fn test_sell_computes_profit_or_loss() {
        let sell = Transaction::sell(94.0, 10_000.0, 100.0, TriggerReason::CurrentPriceStopLoss)
            .unwrap();

        assert!(sell.is_sell());
        assert_eq!(sell.profit_or_loss(), Some(-60_000.0));
        assert_eq!(sell.notional(), 940_000.0);
    }

    #[test]
    fn test_rejects_non_positive_values() {
        assert!(matches!(
            Transaction::buy(0.0, 1.0, TriggerReason::PredictedGrowth),
            Err(EngineError::InvalidPrice { .. })
        ));
        assert_eq!(
            Transaction::buy(100.0, -1.0, TriggerReason::PredictedGrowth),
            Err(EngineError::InvalidQuantity(-1.0))
        );
        assert!(Transaction::sell(f64::NAN, 1.0, 100.0, TriggerReason::GoalReached).is_err());
    }

    #[test]
    fn test_buy_for_records_exact_spend() {
        let buy = Transaction::buy_for(3.0, 1000.0, TriggerReason::PredictedGrowth).unwrap();

        assert_eq!(buy.notional(), 1000.0);
        assert_eq!(buy.quantity(), 1000.0 / 3.0);
        assert!(Transaction::buy_for(3.0, 0.0, TriggerReason::PredictedGrowth).is_err());
    }

    #[test]
    fn test_unrepresentable_trades_are_rejected() {
        // Quantity overflows f64
        assert_eq!(
            Transaction::buy_for(1e-10, 1e308, TriggerReason::PredictedGrowth),
            Err(EngineError::InvalidQuantity(f64::INFINITY))
        );
        // Quantity fits, its value does not
        assert!(matches!(
            Transaction::sell(1e300, 1e300, 1.0, TriggerReason::GoalReached),
            Err(EngineError::NotionalOutOfRange { .. })
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Transaction::buy(100.0, 1.0, TriggerReason::PredictedGrowth).unwrap();
        let b = Transaction::buy(100.0, 1.0, TriggerReason::PredictedGrowth).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_trigger_descriptions() {
        assert_eq!(TriggerReason::GoalReached.to_string(), "investment goal reached");
        assert_eq!(
            TriggerReason::PredictedPriceStopLoss.to_string(),
            "predicted price stop-loss"
        );
    }

    #[test]
    fn test_transaction_serializes_tagged_kind() {
        let sell = Transaction::sell(120.0, 1.0, 100.0, TriggerReason::GoalReached).unwrap();
        let json = serde_json::to_value(&sell).unwrap();

        assert_eq!(json["kind"]["side"], "sell");
        assert_eq!(json["kind"]["profit_or_loss"], 20.0);
        assert_eq!(json["trigger"], "goal_reached");
    }
}
