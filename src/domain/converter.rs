//! Currency conversion through a base currency.
//!
//! Every rate is expressed against the base: `rate(EUR) = 1.1` means one EUR
//! buys 1.1 units of base. Cross conversions triangulate through the base,
//! so `convert(a, b)` followed by `convert(b, a)` is not guaranteed to round
//! trip exactly.

use crate::domain::currency::Currency;
use crate::domain::error::{BackflowError, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

pub trait CurrencyConverter: Send + Sync {
    /// Convert `amount` of `from` into `to` at time `at`.
    fn convert(&self, from: &Currency, to: &Currency, amount: f64, at: DateTime<Utc>)
    -> Result<f64>;
}

/// Time-indexed exchange rates per currency.
#[derive(Debug, Clone, Default)]
pub struct RateTable {
    rates: HashMap<Currency, BTreeMap<DateTime<Utc>, f64>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `rate` for `currency` from `time` onwards.
    ///
    /// Times must be strictly increasing per currency and rates positive.
    pub fn insert(&mut self, currency: Currency, time: DateTime<Utc>, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BackflowError::InvalidRate { currency, rate });
        }
        let series = self.rates.entry(currency.clone()).or_default();
        if let Some((&last, _)) = series.last_key_value() {
            if time <= last {
                return Err(BackflowError::invalid_argument(format!(
                    "rate for {currency} at {time} does not follow {last}"
                )));
            }
        }
        series.insert(time, rate);
        Ok(())
    }

    /// Rate in force at `at`: the latest entry not after `at`, or the
    /// earliest known entry when `at` predates all data.
    pub fn rate(&self, currency: &Currency, at: DateTime<Utc>) -> Result<f64> {
        let series = self
            .rates
            .get(currency)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BackflowError::UnknownCurrency(currency.clone()))?;
        series
            .range(..=at)
            .next_back()
            .or_else(|| series.first_key_value())
            .map(|(_, &rate)| rate)
            .ok_or_else(|| BackflowError::UnknownCurrency(currency.clone()))
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.rates
            .iter()
            .filter(|(_, series)| !series.is_empty())
            .map(|(c, _)| c)
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.rates.get(currency).is_some_and(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.currencies().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn triangulate(
    base: &Currency,
    from: &Currency,
    to: &Currency,
    amount: f64,
    rate: impl Fn(&Currency) -> Result<f64>,
) -> Result<f64> {
    if from == to {
        return Ok(amount);
    }
    if to == base {
        return Ok(rate(from)? * amount);
    }
    if from == base {
        return Ok(amount / rate(to)?);
    }
    Ok(rate(from)? / rate(to)? * amount)
}

/// Converter backed by a [`RateTable`].
#[derive(Debug, Clone)]
pub struct TimeRateConverter {
    base: Currency,
    table: RateTable,
}

impl TimeRateConverter {
    pub fn new(base: Currency, table: RateTable) -> Self {
        Self { base, table }
    }

    pub fn base(&self) -> &Currency {
        &self.base
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    /// Rate of `currency` against the base; the base itself is always 1.
    pub fn rate(&self, currency: &Currency, at: DateTime<Utc>) -> Result<f64> {
        if *currency == self.base {
            return Ok(1.0);
        }
        self.table.rate(currency, at)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &Currency> {
        self.table.currencies()
    }
}

impl CurrencyConverter for TimeRateConverter {
    fn convert(
        &self,
        from: &Currency,
        to: &Currency,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<f64> {
        triangulate(&self.base, from, to, amount, |c| self.table.rate(c, at))
    }
}

/// Converter with one constant rate per currency.
#[derive(Debug, Clone)]
pub struct FixedRateConverter {
    base: Currency,
    rates: HashMap<Currency, f64>,
}

impl FixedRateConverter {
    pub fn new(base: Currency) -> Self {
        Self {
            base,
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, currency: Currency, rate: f64) -> Result<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(BackflowError::InvalidRate { currency, rate });
        }
        self.rates.insert(currency, rate);
        Ok(self)
    }
}

impl CurrencyConverter for FixedRateConverter {
    fn convert(
        &self,
        from: &Currency,
        to: &Currency,
        amount: f64,
        _at: DateTime<Utc>,
    ) -> Result<f64> {
        triangulate(&self.base, from, to, amount, |c| {
            self.rates
                .get(c)
                .copied()
                .ok_or_else(|| BackflowError::UnknownCurrency(c.clone()))
        })
    }
}
