use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;

use crate::models::PriceSnapshot;

/// Anything that can quote the current price of the traded asset
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Symbol being quoted (e.g. "BTC")
    fn symbol(&self) -> &str;

    async fn fetch(&self) -> Result<f64>;
}

/// Validating wrapper around a [`PriceSource`]
///
/// Rejects non-positive or non-finite quotes and keeps a short rolling
/// window of the snapshots it accepted.
pub struct PriceFeed<P> {
    source: P,
    recent: VecDeque<PriceSnapshot>,
    max_snapshots: usize,
}

impl<P: PriceSource> PriceFeed<P> {
    pub fn new(source: P, max_snapshots: usize) -> Self {
        Self {
            source,
            recent: VecDeque::with_capacity(max_snapshots),
            max_snapshots: max_snapshots.max(1),
        }
    }

    /// Fetch the current price and record it
    pub async fn fetch_snapshot(&mut self) -> Result<PriceSnapshot> {
        let price = self.source.fetch().await?;

        if !(price.is_finite() && price > 0.0) {
            anyhow::bail!(
                "{} returned an unusable price: {}",
                self.source.symbol(),
                price
            );
        }

        let snapshot = PriceSnapshot {
            symbol: self.source.symbol().to_string(),
            price,
            timestamp: Utc::now(),
        };

        self.recent.push_back(snapshot.clone());
        while self.recent.len() > self.max_snapshots {
            self.recent.pop_front();
        }

        tracing::debug!(symbol = %snapshot.symbol, price, "Fetched price snapshot");

        Ok(snapshot)
    }

    pub fn latest(&self) -> Option<&PriceSnapshot> {
        self.recent.back()
    }

    /// Accepted snapshots, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &PriceSnapshot> {
        self.recent.iter()
    }

    pub fn source(&self) -> &P {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedPrices {
        prices: Mutex<Vec<f64>>,
    }

    #[async_trait]
    impl PriceSource for FixedPrices {
        fn symbol(&self) -> &str {
            "BTC"
        }

        async fn fetch(&self) -> Result<f64> {
            let mut prices = self.prices.lock().unwrap();
            if prices.is_empty() {
                anyhow::bail!("no more prices");
            }
            Ok(prices.remove(0))
        }
    }

    fn feed(prices: Vec<f64>, window: usize) -> PriceFeed<FixedPrices> {
        PriceFeed::new(
            FixedPrices {
                prices: Mutex::new(prices),
            },
            window,
        )
    }

    #[tokio::test]
    async fn test_records_snapshots() {
        let mut feed = feed(vec![100.0, 101.0], 10);

        let snapshot = feed.fetch_snapshot().await.unwrap();
        assert_eq!(snapshot.symbol, "BTC");
        assert_eq!(snapshot.price, 100.0);

        feed.fetch_snapshot().await.unwrap();
        assert_eq!(feed.latest().unwrap().price, 101.0);
        assert_eq!(feed.recent().count(), 2);
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let mut feed = feed(vec![1.0, 2.0, 3.0], 2);
        for _ in 0..3 {
            feed.fetch_snapshot().await.unwrap();
        }

        let prices: Vec<f64> = feed.recent().map(|s| s.price).collect();
        assert_eq!(prices, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_rejects_unusable_price() {
        let mut feed = feed(vec![0.0, f64::INFINITY], 10);

        assert!(feed.fetch_snapshot().await.is_err());
        assert!(feed.fetch_snapshot().await.is_err());
        assert!(feed.latest().is_none());
    }

    #[tokio::test]
    async fn test_propagates_source_error() {
        let mut feed = feed(vec![], 10);
        let err = feed.fetch_snapshot().await.unwrap_err();
        assert!(err.to_string().contains("no more prices"));
    }
}
