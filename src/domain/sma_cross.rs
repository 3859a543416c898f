//! Moving-average crossover trial used by the `optimize` command.

use crate::domain::channel::{DEFAULT_CHANNEL_CAPACITY, Received};
use crate::domain::converter::CurrencyConverter;
use crate::domain::currency::{Asset, Currency};
use crate::domain::error::{BackflowError, Result};
use crate::domain::metrics::{EquityPoint, EquityStats, MetricSnapshot, ProgressMetric};
use crate::domain::multi_asset_series::MultiAssetSeries;
use crate::domain::playback::Playback;
use crate::domain::search_space::Params;
use crate::domain::timeframe::Timeframe;
use crate::domain::trial::Trial;
use crate::ports::feed_port::Feed;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cash and holdings for one asset. Cash is in the base currency.
#[derive(Debug, Clone)]
struct Sleeve {
    cash: f64,
    quantity: f64,
    last_price: f64,
}

/// Long one asset while its fast SMA of closes is above the slow SMA, flat
/// otherwise. Capital is split evenly across the feed's assets.
pub struct SmaCrossTrial {
    fast: usize,
    slow: usize,
    initial_cash: f64,
    capacity: usize,
    converter: Option<(Arc<dyn CurrencyConverter>, Currency)>,
}

impl SmaCrossTrial {
    pub fn new(fast: usize, slow: usize, initial_cash: f64) -> Result<Self> {
        if fast == 0 || fast >= slow {
            return Err(BackflowError::invalid_argument(format!(
                "need 0 < fast < slow, got fast={fast} slow={slow}"
            )));
        }
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(BackflowError::invalid_argument(
                "initial cash must be positive",
            ));
        }
        Ok(Self {
            fast,
            slow,
            initial_cash,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            converter: None,
        })
    }

    /// Reads `fast` and `slow`. A point's own `initial_cash` parameter wins
    /// over the one passed in.
    pub fn from_params(params: &Params, initial_cash: f64) -> Result<Self> {
        let window = |name: &str| -> Result<usize> {
            usize::try_from(params.get_int(name)?).map_err(|_| {
                BackflowError::invalid_argument(format!("parameter '{name}' must be non-negative"))
            })
        };
        let initial_cash = match params.get("initial_cash") {
            Some(_) => params.get_double("initial_cash")?,
            None => initial_cash,
        };
        Self::new(window("fast")?, window("slow")?, initial_cash)
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Value holdings in `base` through `converter`. Without one, every
    /// asset is assumed to be quoted in the account currency.
    pub fn with_converter(mut self, converter: Arc<dyn CurrencyConverter>, base: Currency) -> Self {
        self.converter = Some((converter, base));
        self
    }

    fn to_base(&self, currency: &Currency, amount: f64, at: DateTime<Utc>) -> Result<f64> {
        match &self.converter {
            Some((converter, base)) => converter.convert(currency, base, amount, at),
            None => Ok(amount),
        }
    }

    fn from_base(&self, currency: &Currency, amount: f64, at: DateTime<Utc>) -> Result<f64> {
        match &self.converter {
            Some((converter, base)) => converter.convert(base, currency, amount, at),
            None => Ok(amount),
        }
    }

    fn rebalance(
        &self,
        sleeve: &mut Sleeve,
        asset: &Asset,
        closes: &[f64],
        at: DateTime<Utc>,
    ) -> Result<()> {
        let slow = mean(closes);
        let fast = mean(&closes[closes.len() - self.fast..]);
        let price = sleeve.last_price;
        if price <= 0.0 {
            return Ok(());
        }
        if fast > slow && sleeve.quantity == 0.0 {
            sleeve.quantity = self.from_base(&asset.currency, sleeve.cash, at)? / price;
            sleeve.cash = 0.0;
        } else if fast <= slow && sleeve.quantity > 0.0 {
            sleeve.cash += self.to_base(&asset.currency, sleeve.quantity * price, at)?;
            sleeve.quantity = 0.0;
        }
        Ok(())
    }

    fn equity(
        &self,
        sleeves: &BTreeMap<Asset, Sleeve>,
        idle_cash: f64,
        at: DateTime<Utc>,
    ) -> Result<f64> {
        let mut equity = idle_cash;
        for (asset, sleeve) in sleeves {
            equity += sleeve.cash;
            if sleeve.quantity > 0.0 {
                equity += self.to_base(&asset.currency, sleeve.quantity * sleeve.last_price, at)?;
            }
        }
        Ok(equity)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[async_trait]
impl Trial for SmaCrossTrial {
    async fn run(&mut self, feed: Arc<dyn Feed>, timeframe: Timeframe) -> Result<MetricSnapshot> {
        let slots = feed.assets().len().max(1);
        let per_asset = self.initial_cash / slots as f64;
        let mut sleeves: BTreeMap<Asset, Sleeve> = BTreeMap::new();
        let mut series = MultiAssetSeries::new(self.slow);
        let mut progress = ProgressMetric::default();
        let mut curve = Vec::new();

        let mut playback = Playback::start(feed, timeframe, self.capacity)?;
        while let Received::Event(event) = playback.receive().await {
            progress.record(&event);
            series.add_all(&event);
            for bar in event.price_bars() {
                let sleeve = sleeves.entry(bar.asset.clone()).or_insert(Sleeve {
                    cash: per_asset,
                    quantity: 0.0,
                    last_price: bar.close,
                });
                sleeve.last_price = bar.close;
                let history = series.get_value(&bar.asset)?;
                if history.is_full() {
                    self.rebalance(sleeve, &bar.asset, &history.close(), event.time)?;
                }
            }
            let idle = slots.saturating_sub(sleeves.len()) as f64 * per_asset;
            curve.push(EquityPoint {
                time: event.time,
                equity: self.equity(&sleeves, idle, event.time)?,
            });
        }
        playback.finish().await?;

        let mut snapshot = progress.snapshot();
        EquityStats::compute(&curve, self.initial_cash).write_to(&mut snapshot);
        snapshot.insert("run.assets", series.len() as f64);
        tracing::debug!(
            fast = self.fast,
            slow = self.slow,
            %timeframe,
            equity = snapshot.get("account.equity"),
            "sma cross finished"
        );
        Ok(snapshot)
    }
}
