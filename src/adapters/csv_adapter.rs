//! CSV file adapters for bars and exchange rates.

use crate::adapters::historic_feed::HistoricFeed;
use crate::domain::action::PriceBar;
use crate::domain::converter::RateTable;
use crate::domain::currency::{Asset, Currency};
use crate::domain::error::{BackflowError, Result};
use crate::domain::timeframe::parse_instant;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

fn field<'a>(record: &'a csv::StringRecord, index: usize, name: &str) -> Result<&'a str> {
    record
        .get(index)
        .map(str::trim)
        .ok_or_else(|| BackflowError::Data {
            reason: format!("missing {name} column"),
        })
}

fn number(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64> {
    let raw = field(record, index, name)?;
    raw.parse().map_err(|e| BackflowError::Data {
        reason: format!("invalid {name} value '{raw}': {e}"),
    })
}

/// Reads `time,symbol,open,high,low,close,volume` rows.
///
/// Rows may appear in any order; bars are returned sorted by time.
pub struct CsvFeedAdapter {
    path: PathBuf,
    currency: Currency,
}

impl CsvFeedAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            currency: Currency::new("USD"),
        }
    }

    /// Quote currency for every symbol in the file.
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_bars(&self) -> Result<Vec<(DateTime<Utc>, PriceBar)>> {
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result?;
            let time = parse_instant(field(&record, 0, "time")?)?;
            let symbol = field(&record, 1, "symbol")?;
            let asset = Asset::new(symbol, self.currency.clone());
            let bar = PriceBar::new(
                asset,
                number(&record, 2, "open")?,
                number(&record, 3, "high")?,
                number(&record, 4, "low")?,
                number(&record, 5, "close")?,
                number(&record, 6, "volume")?,
            );
            bars.push((time, bar));
        }

        bars.sort_by_key(|(time, _)| *time);
        tracing::debug!(path = %self.path.display(), bars = bars.len(), "loaded bars");
        Ok(bars)
    }

    pub fn load(&self) -> Result<HistoricFeed> {
        let feed = HistoricFeed::from_bars(self.load_bars()?);
        if feed.is_empty() {
            return Err(BackflowError::EmptyFeed(self.path.display().to_string()));
        }
        Ok(feed)
    }
}

/// Reads `time,currency,rate` rows into a [`RateTable`].
pub struct CsvRatesAdapter {
    path: PathBuf,
}

impl CsvRatesAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<RateTable> {
        let mut rdr = csv::Reader::from_path(&self.path)?;
        let mut rows = Vec::new();

        for result in rdr.records() {
            let record = result?;
            let time = parse_instant(field(&record, 0, "time")?)?;
            let currency = Currency::new(field(&record, 1, "currency")?);
            let rate = number(&record, 2, "rate")?;
            rows.push((currency, time, rate));
        }

        rows.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        let mut table = RateTable::new();
        for (currency, time, rate) in rows {
            table.insert(currency, time, rate)?;
        }
        tracing::debug!(path = %self.path.display(), currencies = table.len(), "loaded rates");
        Ok(table)
    }
}
