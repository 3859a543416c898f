//! Seeded random-walk bar generator, for demos and tests.

use crate::domain::action::{Action, PriceBar};
use crate::domain::channel::{EventSender, SendOutcome};
use crate::domain::currency::{Asset, Currency};
use crate::domain::error::{BackflowError, Result};
use crate::domain::event::Event;
use crate::domain::timeframe::{Timeframe, TradingPeriod};
use crate::ports::feed_port::Feed;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Emits one bar per asset every `step`, from `timeframe.start` until
/// `timeframe.end`. The same seed always replays the same prices.
#[derive(Debug, Clone)]
pub struct RandomWalkFeed {
    timeframe: Timeframe,
    assets: Vec<Asset>,
    seed: u64,
    step: TradingPeriod,
    start_price: f64,
    volatility: f64,
}

impl RandomWalkFeed {
    pub fn new(timeframe: Timeframe, n_assets: usize, seed: u64) -> Result<Self> {
        if timeframe.is_infinite() {
            return Err(BackflowError::invalid_argument(
                "random walk needs a finite timeframe",
            ));
        }
        let usd = Currency::new("USD");
        let assets = (1..=n_assets)
            .map(|i| Asset::new(&format!("ASSET{i}"), usd.clone()))
            .collect();
        Ok(Self {
            timeframe,
            assets,
            seed,
            step: TradingPeriod::days(1),
            start_price: 100.0,
            volatility: 0.02,
        })
    }

    pub fn with_step(mut self, step: TradingPeriod) -> Result<Self> {
        if step.is_zero() {
            return Err(BackflowError::invalid_argument("random walk step must be positive"));
        }
        self.step = step;
        Ok(self)
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility.abs();
        self
    }

    fn next_bar(&self, rng: &mut StdRng, asset: &Asset, open: f64) -> PriceBar {
        let v = self.volatility;
        let close = (open * (1.0 + rng.gen_range(-v..=v))).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..=v / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..=v / 2.0));
        let volume = rng.gen_range(1_000.0..10_000.0_f64).round();
        PriceBar::new(asset.clone(), open, high, low, close, volume)
    }
}

#[async_trait]
impl Feed for RandomWalkFeed {
    async fn play(&self, sender: EventSender) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut prices = vec![self.start_price; self.assets.len()];
        let mut time = self.timeframe.start;
        while time < self.timeframe.end {
            let mut actions = Vec::with_capacity(self.assets.len());
            for (asset, price) in self.assets.iter().zip(prices.iter_mut()) {
                let bar = self.next_bar(&mut rng, asset, *price);
                *price = bar.close;
                actions.push(Action::PriceBar(bar));
            }
            if sender.send(Event::new(time, actions)).await == SendOutcome::Closed {
                break;
            }
            let next = self.step.add_to(time);
            if next <= time {
                break;
            }
            time = next;
        }
        Ok(())
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn assets(&self) -> Vec<Asset> {
        self.assets.clone()
    }
}
