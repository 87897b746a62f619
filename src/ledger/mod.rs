use anyhow::Context;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::Transaction;

/// Realized result of one sell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitAndLossEntry {
    pub transaction_id: Uuid,
    pub profit_or_loss: f64,
}

/// Append-only record of executed transactions
///
/// Buys and sells must alternate, starting with a buy. Alongside the ordered
/// transactions it keeps the sell id → realized P&L mapping in sell order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    transactions: Vec<Transaction>,
    profit_and_loss: Vec<ProfitAndLossEntry>,
    ids: HashSet<Uuid>,
    open_buy: Option<Uuid>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction
    pub fn append(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        let id = transaction.id();
        if self.ids.contains(&id) {
            return Err(LedgerError::DuplicateTransaction(id));
        }

        match (transaction.profit_or_loss(), self.open_buy) {
            (None, Some(open)) => return Err(LedgerError::BuyWhileOpen { buy: id, open }),
            (None, None) => self.open_buy = Some(id),
            (Some(_), None) => return Err(LedgerError::UnmatchedSell(id)),
            (Some(profit_or_loss), Some(_)) => {
                self.open_buy = None;
                self.profit_and_loss.push(ProfitAndLossEntry {
                    transaction_id: id,
                    profit_or_loss,
                });
            }
        }

        tracing::debug!(transaction = %transaction, "Recorded transaction");
        self.ids.insert(id);
        self.transactions.push(transaction);
        Ok(())
    }

    /// All transactions in the order they were recorded
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Sell id → realized P&L, in sell order
    pub fn profit_and_loss(&self) -> &[ProfitAndLossEntry] {
        &self.profit_and_loss
    }

    pub fn profit_or_loss_for(&self, sell_id: Uuid) -> Option<f64> {
        self.profit_and_loss
            .iter()
            .find(|e| e.transaction_id == sell_id)
            .map(|e| e.profit_or_loss)
    }

    /// The buy still waiting for its sell, if any
    pub fn open_buy(&self) -> Option<&Transaction> {
        let id = self.open_buy?;
        self.transactions.iter().rev().find(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn total_profit_or_loss(&self) -> f64 {
        self.profit_and_loss.iter().map(|e| e.profit_or_loss).sum()
    }

    pub fn summary(&self) -> LedgerSummary {
        let sells = self.profit_and_loss.len();
        let winning_sells = self
            .profit_and_loss
            .iter()
            .filter(|e| e.profit_or_loss > 0.0)
            .count();
        let losing_sells = self
            .profit_and_loss
            .iter()
            .filter(|e| e.profit_or_loss < 0.0)
            .count();

        LedgerSummary {
            buys: self.transactions.len() - sells,
            sells,
            winning_sells,
            losing_sells,
            win_rate: if sells > 0 {
                (winning_sells as f64 / sells as f64) * 100.0
            } else {
                0.0
            },
            total_profit_or_loss: self.total_profit_or_loss(),
        }
    }

    pub fn report(&self) -> LedgerReport<'_> {
        LedgerReport {
            summary: self.summary(),
            transactions: &self.transactions,
            profit_and_loss: &self.profit_and_loss,
        }
    }
}

/// Trade counts and realized P&L
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub buys: usize,
    pub sells: usize,
    pub winning_sells: usize,
    pub losing_sells: usize,
    pub win_rate: f64,
    pub total_profit_or_loss: f64,
}

/// End-of-run output: summary, ordered transactions and the P&L mapping
#[derive(Debug, Serialize)]
pub struct LedgerReport<'a> {
    pub summary: LedgerSummary,
    pub transactions: &'a [Transaction],
    pub profit_and_loss: &'a [ProfitAndLossEntry],
}

impl LedgerReport<'_> {
    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize ledger report")
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write ledger report to {}", path.display()))?;
        tracing::info!("Ledger report written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerReason;

    fn buy(price: f64) -> Transaction {
        Transaction::buy(price, 10.0, TriggerReason::PredictedGrowth).unwrap()
    }

    fn sell(price: f64, buy_price: f64) -> Transaction {
        Transaction::sell(price, 10.0, buy_price, TriggerReason::CurrentPriceStopLoss).unwrap()
    }

    #[test]
    fn test_append_keeps_order_and_pnl() {
        let mut ledger = Ledger::new();
        let b1 = buy(100.0);
        let s1 = sell(110.0, 100.0);
        let b2 = buy(105.0);
        let s2 = sell(95.0, 105.0);

        for t in [&b1, &s1, &b2, &s2] {
            ledger.append(t.clone()).unwrap();
        }

        let ids: Vec<Uuid> = ledger.transactions().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![b1.id(), s1.id(), b2.id(), s2.id()]);

        assert_eq!(ledger.profit_and_loss().len(), 2);
        assert_eq!(ledger.profit_or_loss_for(s1.id()), Some(100.0));
        assert_eq!(ledger.profit_or_loss_for(s2.id()), Some(-100.0));
        assert_eq!(ledger.profit_or_loss_for(b1.id()), None);
        assert_eq!(ledger.total_profit_or_loss(), 0.0);
    }

    #[test]
    fn test_rejects_duplicate() {
        let mut ledger = Ledger::new();
        let b = buy(100.0);
        ledger.append(b.clone()).unwrap();

        assert_eq!(
            ledger.append(b.clone()),
            Err(LedgerError::DuplicateTransaction(b.id()))
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_rejects_sell_without_buy() {
        let mut ledger = Ledger::new();
        let s = sell(110.0, 100.0);

        assert_eq!(ledger.append(s.clone()), Err(LedgerError::UnmatchedSell(s.id())));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_rejects_second_open_buy() {
        let mut ledger = Ledger::new();
        let b1 = buy(100.0);
        let b2 = buy(101.0);
        ledger.append(b1.clone()).unwrap();

        assert_eq!(
            ledger.append(b2.clone()),
            Err(LedgerError::BuyWhileOpen {
                buy: b2.id(),
                open: b1.id()
            })
        );
        assert_eq!(ledger.open_buy().map(|t| t.id()), Some(b1.id()));
    }

    #[test]
    fn test_summary() {
        let mut ledger = Ledger::new();
        ledger.append(buy(100.0)).unwrap();
        ledger.append(sell(120.0, 100.0)).unwrap();
        ledger.append(buy(120.0)).unwrap();
        ledger.append(sell(110.0, 120.0)).unwrap();
        ledger.append(buy(110.0)).unwrap();

        let summary = ledger.summary();
        assert_eq!(summary.buys, 3);
        assert_eq!(summary.sells, 2);
        assert_eq!(summary.winning_sells, 1);
        assert_eq!(summary.losing_sells, 1);
        assert_eq!(summary.win_rate, 50.0);
        assert_eq!(summary.total_profit_or_loss, 100.0);
        assert!(ledger.open_buy().is_some());
    }

    #[test]
    fn test_report_json() {
        let mut ledger = Ledger::new();
        ledger.append(buy(100.0)).unwrap();
        let s = sell(90.0, 100.0);
        ledger.append(s.clone()).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&ledger.report().to_json().unwrap()).unwrap();

        assert_eq!(json["transactions"].as_array().unwrap().len(), 2);
        assert_eq!(
            json["profit_and_loss"][0]["transaction_id"],
            s.id().to_string()
        );
        assert_eq!(json["profit_and_loss"][0]["profit_or_loss"], -100.0);
        assert_eq!(json["summary"]["sells"], 1);
    }
}
