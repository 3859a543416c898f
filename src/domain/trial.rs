//! The unit of work an optimizer runs: one parameter point over one window.

use crate::domain::error::Result;
use crate::domain::metrics::MetricSnapshot;
use crate::domain::search_space::Params;
use crate::domain::timeframe::Timeframe;
use crate::ports::feed_port::Feed;
use async_trait::async_trait;
use std::sync::Arc;

/// A configured strategy run. Each trial owns its own state; the optimizer
/// never shares one between sweeps.
#[async_trait]
pub trait Trial: Send {
    /// Replay `feed` over `timeframe` and return the final metrics.
    async fn run(&mut self, feed: Arc<dyn Feed>, timeframe: Timeframe) -> Result<MetricSnapshot>;
}

/// Builds a fresh trial for a parameter point.
pub type RunBuilder = Arc<dyn Fn(&Params) -> Result<Box<dyn Trial>> + Send + Sync>;
