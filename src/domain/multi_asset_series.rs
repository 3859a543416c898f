//! Rolling price bars for a universe of assets.
//!
//! Series are created on first sight of an asset and never removed. Storage
//! is a dense vector of series plus an asset → slot index.

use crate::domain::action::{Action, PriceBar};
use crate::domain::currency::Asset;
use crate::domain::error::{BackflowError, Result};
use crate::domain::event::Event;
use crate::domain::price_bar_series::PriceBarSeries;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct MultiAssetSeries {
    capacity: usize,
    index: HashMap<Asset, usize>,
    assets: Vec<Asset>,
    series: Vec<PriceBarSeries>,
}

impl MultiAssetSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::new(),
            assets: Vec::new(),
            series: Vec::new(),
        }
    }

    /// Capacity given to every per-asset series.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&mut self, asset: &Asset) -> usize {
        if let Some(&slot) = self.index.get(asset) {
            return slot;
        }
        let slot = self.series.len();
        self.series.push(PriceBarSeries::new(self.capacity));
        self.assets.push(asset.clone());
        self.index.insert(asset.clone(), slot);
        slot
    }

    pub fn add(&mut self, bar: &PriceBar) {
        let slot = self.slot(&bar.asset);
        self.series[slot].add(bar);
    }

    /// Route every price bar in `event` to its asset's series. Other
    /// actions are skipped.
    pub fn add_all(&mut self, event: &Event) {
        for action in &event.actions {
            match action {
                Action::PriceBar(bar) => self.add(bar),
                other => tracing::trace!(?other, "skipping non-bar action"),
            }
        }
    }

    /// `false` for an asset that has never been seen.
    pub fn is_full(&self, asset: &Asset) -> bool {
        self.get(asset).is_some_and(PriceBarSeries::is_full)
    }

    pub fn get(&self, asset: &Asset) -> Option<&PriceBarSeries> {
        self.index.get(asset).map(|&slot| &self.series[slot])
    }

    /// Series for `asset`, which must already have been observed.
    pub fn get_value(&self, asset: &Asset) -> Result<&PriceBarSeries> {
        self.get(asset)
            .ok_or_else(|| BackflowError::UnknownAsset(asset.to_string()))
    }

    /// Assets in order of first observation.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Asset, &PriceBarSeries)> {
        self.assets.iter().zip(self.series.iter())
    }

    /// Number of distinct assets tracked.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Clear every series; tracked assets are kept.
    pub fn clear(&mut self) {
        for series in &mut self.series {
            series.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::TradePrice;
    use chrono::{TimeZone, Utc};

    fn bar(symbol: &str, close: f64) -> PriceBar {
        PriceBar::new(Asset::usd(symbol), close, close + 1.0, close - 1.0, close, 100.0)
    }

    #[test]
    fn creates_series_lazily() {
        let mut multi = MultiAssetSeries::new(2);
        assert!(multi.is_empty());
        multi.add(&bar("A", 1.0));
        multi.add(&bar("B", 2.0));
        multi.add(&bar("A", 3.0));
        assert_eq!(multi.len(), 2);
        assert_eq!(multi.assets(), &[Asset::usd("A"), Asset::usd("B")]);
        assert!(multi.is_full(&Asset::usd("A")));
        assert!(!multi.is_full(&Asset::usd("B")));
        assert_eq!(multi.get_value(&Asset::usd("A")).unwrap().close(), vec![1.0, 3.0]);
    }

    #[test]
    fn unseen_asset_is_not_full() {
        let multi = MultiAssetSeries::new(2);
        assert!(!multi.is_full(&Asset::usd("ZZZ")));
    }

    #[test]
    fn unseen_asset_get_value_fails() {
        let multi = MultiAssetSeries::new(2);
        let err = multi.get_value(&Asset::usd("ZZZ")).unwrap_err();
        assert!(matches!(err, BackflowError::UnknownAsset(name) if name == "ZZZ.USD"));
    }

    #[test]
    fn add_all_only_routes_price_bars() {
        let mut multi = MultiAssetSeries::new(5);
        let time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = Event::new(
            time,
            vec![
                bar("A", 10.0).into(),
                TradePrice {
                    asset: Asset::usd("C"),
                    price: 5.0,
                    volume: 1.0,
                }
                .into(),
                Action::Other {
                    kind: "news".into(),
                },
                bar("B", 20.0).into(),
            ],
        );
        multi.add_all(&event);
        assert_eq!(multi.len(), 2);
        assert!(multi.get(&Asset::usd("C")).is_none());
    }

    #[test]
    fn clear_keeps_assets() {
        let mut multi = MultiAssetSeries::new(1);
        multi.add(&bar("A", 1.0));
        multi.clear();
        assert_eq!(multi.len(), 1);
        assert!(!multi.is_full(&Asset::usd("A")));
        assert!(multi.get_value(&Asset::usd("A")).unwrap().is_empty());
    }
}
