//! In-memory feed over a fixed set of events.

use crate::domain::action::{Action, PriceBar};
use crate::domain::channel::{EventSender, SendOutcome};
use crate::domain::currency::Asset;
use crate::domain::error::Result;
use crate::domain::event::Event;
use crate::domain::timeframe::Timeframe;
use crate::ports::feed_port::Feed;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Time-ordered events held in memory. Actions sharing a timestamp are
/// merged into one event, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct HistoricFeed {
    events: BTreeMap<DateTime<Utc>, Vec<Action>>,
    assets: BTreeSet<Asset>,
}

impl HistoricFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Self {
        let mut feed = Self::new();
        for event in events {
            feed.add_actions(event.time, event.actions);
        }
        feed
    }

    pub fn from_bars(bars: impl IntoIterator<Item = (DateTime<Utc>, PriceBar)>) -> Self {
        let mut feed = Self::new();
        for (time, bar) in bars {
            feed.add(time, bar.into());
        }
        feed
    }

    pub fn add(&mut self, time: DateTime<Utc>, action: Action) {
        self.add_actions(time, vec![action]);
    }

    pub fn add_actions(&mut self, time: DateTime<Utc>, actions: Vec<Action>) {
        for action in &actions {
            if let Some(asset) = action.asset() {
                self.assets.insert(asset.clone());
            }
        }
        self.events.entry(time).or_default().extend(actions);
    }

    /// Number of distinct timestamps.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        self.events
            .iter()
            .map(|(time, actions)| Event::new(*time, actions.clone()))
    }
}

#[async_trait]
impl Feed for HistoricFeed {
    async fn play(&self, sender: EventSender) -> Result<()> {
        let start = sender.timeframe().start;
        for (time, actions) in self.events.range(start..) {
            let event = Event::new(*time, actions.clone());
            if sender.send(event).await == SendOutcome::Closed {
                break;
            }
        }
        Ok(())
    }

    /// From the first event up to just past the last. Empty for an empty
    /// feed.
    fn timeframe(&self) -> Timeframe {
        match (self.events.first_key_value(), self.events.last_key_value()) {
            (Some((&first, _)), Some((&last, _))) => Timeframe {
                start: first,
                end: last + Duration::milliseconds(1),
            },
            _ => Timeframe {
                start: DateTime::<Utc>::UNIX_EPOCH,
                end: DateTime::<Utc>::UNIX_EPOCH,
            },
        }
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{EventChannel, Received};
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn bar(symbol: &str, close: f64) -> PriceBar {
        PriceBar::new(Asset::usd(symbol), close, close, close, close, 1.0)
    }

    #[test]
    fn merges_actions_with_same_time() {
        let feed = HistoricFeed::from_bars([
            (day(2), bar("A", 1.0)),
            (day(1), bar("A", 0.5)),
            (day(2), bar("B", 2.0)),
        ]);
        assert_eq!(feed.len(), 2);
        let events: Vec<Event> = feed.events().collect();
        assert_eq!(events[0].time, day(1));
        assert_eq!(events[1].actions.len(), 2);
        assert_eq!(feed.assets(), vec![Asset::usd("A"), Asset::usd("B")]);
    }

    #[test]
    fn timeframe_covers_all_events() {
        let feed = HistoricFeed::from_bars([(day(3), bar("A", 1.0)), (day(9), bar("A", 1.0))]);
        let tf = feed.timeframe();
        assert_eq!(tf.start, day(3));
        assert!(tf.contains(day(9)));
        assert!(HistoricFeed::new().timeframe().is_empty());
    }

    #[tokio::test]
    async fn plays_only_the_channel_timeframe() {
        let feed = HistoricFeed::from_bars((1..=10).map(|d| (day(d), bar("A", d as f64))));
        let mut channel = EventChannel::new(16, Timeframe::new(day(3), day(6)).unwrap()).unwrap();
        feed.play(channel.sender()).await.unwrap();

        let mut times = Vec::new();
        while let Received::Event(event) = channel.receive().await {
            times.push(event.time);
        }
        assert_eq!(times, vec![day(3), day(4), day(5)]);
    }
}
