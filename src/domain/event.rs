//! Time-stamped batches of market actions.

use crate::domain::action::{Action, PriceBar};
use crate::domain::currency::Asset;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub actions: Vec<Action>,
}

impl Event {
    pub fn new(time: DateTime<Utc>, actions: Vec<Action>) -> Self {
        Self { time, actions }
    }

    pub fn empty(time: DateTime<Utc>) -> Self {
        Self {
            time,
            actions: Vec::new(),
        }
    }

    pub fn price_bars(&self) -> impl Iterator<Item = &PriceBar> {
        self.actions.iter().filter_map(Action::as_price_bar)
    }

    /// Close-equivalent price per asset; the last action wins when an asset
    /// appears more than once.
    pub fn prices(&self) -> HashMap<Asset, f64> {
        let mut prices = HashMap::new();
        for action in &self.actions {
            if let (Some(asset), Some(price)) = (action.asset(), action.price()) {
                prices.insert(asset.clone(), price);
            }
        }
        prices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::TradePrice;
    use chrono::TimeZone;

    #[test]
    fn prices_keeps_last_action_per_asset() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let a = Asset::usd("A");
        let event = Event::new(
            time,
            vec![
                PriceBar::new(a.clone(), 1.0, 2.0, 0.5, 1.5, 10.0).into(),
                TradePrice {
                    asset: a.clone(),
                    price: 1.7,
                    volume: 1.0,
                }
                .into(),
                Action::Other {
                    kind: "news".into(),
                },
            ],
        );
        assert_eq!(event.prices().get(&a), Some(&1.7));
        assert_eq!(event.price_bars().count(), 1);
    }

    #[test]
    fn empty_event_has_no_prices() {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(Event::empty(time).prices().is_empty());
    }
}
