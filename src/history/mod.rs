use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

use crate::models::PricePoint;

/// Yahoo-style daily row; only `Date` and `Close` are used
#[derive(Debug, Deserialize)]
struct HistoryRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Close")]
    close: String,
}

/// Chronologically ordered daily closes
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    points: Vec<PricePoint>,
}

impl PriceHistory {
    /// Build from points in any order; sorted by date, later duplicates dropped
    pub fn from_points(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self { points }
    }

    /// Load a CSV from an http(s) URL or a local path
    pub async fn load(uri: &str) -> Result<Self> {
        let bytes = if uri.starts_with("http://") || uri.starts_with("https://") {
            tracing::info!("Downloading price history from {}", uri);
            let response = reqwest::get(uri)
                .await
                .with_context(|| format!("Failed to download {}", uri))?
                .error_for_status()
                .with_context(|| format!("Bad response downloading {}", uri))?;
            response.bytes().await?.to_vec()
        } else {
            tokio::fs::read(uri)
                .await
                .with_context(|| format!("Failed to read {}", uri))?
        };

        let history = Self::from_reader(bytes.as_slice())?;
        tracing::info!(
            "Loaded {} daily closes ({} to {})",
            history.len(),
            history.first().map(|p| p.date.to_string()).unwrap_or_default(),
            history.last().map(|p| p.date.to_string()).unwrap_or_default()
        );
        Ok(history)
    }

    /// Parse `Date,...,Close,...` CSV with a header row
    ///
    /// Rows with an unparsable date or a missing/`null` close are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut points = Vec::new();
        let mut skipped = 0usize;

        for (line, result) in rdr.deserialize::<HistoryRow>().enumerate() {
            let row = result.with_context(|| format!("Malformed CSV record {}", line + 1))?;

            let date = match NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") {
                Ok(date) => date,
                Err(e) => {
                    tracing::warn!(date = %row.date, error = %e, "Skipping row with bad date");
                    skipped += 1;
                    continue;
                }
            };

            match row.close.parse::<f64>() {
                Ok(close) if close.is_finite() && close > 0.0 => {
                    points.push(PricePoint { date, close })
                }
                _ => {
                    tracing::warn!(%date, close = %row.close, "Skipping row with unusable close");
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} unusable history rows", skipped);
        }

        Ok(Self::from_points(points))
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&PricePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Close recorded on `date`, if the series has that day
    pub fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| self.points[i].close)
    }

    /// Chronological train/test split
    ///
    /// The test side gets `floor(len * (1 - train_fraction))` points, so a
    /// 365-day file at 0.85 splits 311/54.
    pub fn split(&self, train_fraction: f64) -> Result<(&[PricePoint], &[PricePoint])> {
        if !(train_fraction > 0.0 && train_fraction <= 1.0) {
            anyhow::bail!("train_fraction must be in (0, 1], got {}", train_fraction);
        }

        let test_len = (self.points.len() as f64 * (1.0 - train_fraction)).floor() as usize;
        let train_len = self.points.len() - test_len;
        if train_len == 0 {
            anyhow::bail!("History has no points to train on");
        }

        Ok(self.points.split_at(train_len))
    }
}
