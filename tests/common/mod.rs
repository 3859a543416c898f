#![allow(dead_code)]

use async_trait::async_trait;
use backflow::adapters::historic_feed::HistoricFeed;
use backflow::domain::action::PriceBar;
use backflow::domain::channel::Received;
use backflow::domain::currency::Asset;
use backflow::domain::error::{BackflowError, Result};
use backflow::domain::metrics::{MetricSnapshot, ProgressMetric};
use backflow::domain::playback::Playback;
use backflow::domain::search_space::Params;
use backflow::domain::timeframe::Timeframe;
use backflow::domain::trial::Trial;
use backflow::ports::feed_port::Feed;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::io::Write;
use std::sync::Arc;

pub fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

pub fn flat_bar(symbol: &str, price: f64) -> PriceBar {
    PriceBar::new(Asset::usd(symbol), price, price, price, price, 1_000.0)
}

/// One bar a day for `days` days, closing at 100, 101, 102, ...
pub fn daily_feed(symbol: &str, days: i64) -> HistoricFeed {
    HistoricFeed::from_bars((0..days).map(|i| (day(i), flat_bar(symbol, 100.0 + i as f64))))
}

/// Plays the feed and scores itself with its `x` parameter. Fails when
/// `x` equals `fail_on`.
pub struct ScoringTrial {
    x: f64,
    fail_on: Option<f64>,
}

#[async_trait]
impl Trial for ScoringTrial {
    async fn run(&mut self, feed: Arc<dyn Feed>, timeframe: Timeframe) -> Result<MetricSnapshot> {
        let mut playback = Playback::start(feed, timeframe, 4)?;
        let mut progress = ProgressMetric::default();
        while let Received::Event(event) = playback.receive().await {
            progress.record(&event);
        }
        playback.finish().await?;
        if self.fail_on == Some(self.x) {
            return Err(BackflowError::Data {
                reason: format!("x={} refused", self.x),
            });
        }
        let mut snapshot = progress.snapshot();
        snapshot.insert("score", self.x);
        Ok(snapshot)
    }
}

pub fn scoring_builder(fail_on: Option<f64>) -> impl Fn(&Params) -> Result<Box<dyn Trial>> + Send + Sync + 'static {
    move |params: &Params| {
        let x = match params.get("x") {
            Some(_) => params.get_double("x")?,
            None => 0.0,
        };
        Ok(Box::new(ScoringTrial { x, fail_on }) as Box<dyn Trial>)
    }
}

pub fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// `time,symbol,open,high,low,close,volume` for `days` rising daily bars.
pub fn bars_csv(symbol: &str, days: i64) -> String {
    let mut out = String::from("time,symbol,open,high,low,close,volume\n");
    for i in 0..days {
        let price = 100.0 + i as f64;
        out.push_str(&format!(
            "{},{symbol},{price},{},{},{price},1000\n",
            day(i).format("%Y-%m-%d"),
            price + 1.0,
            price - 1.0,
        ));
    }
    out
}
