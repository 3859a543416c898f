//! Feed task plus consumer channel, bundled as a scope guard.

use crate::domain::channel::{EventChannel, EventSender, Received};
use crate::domain::error::{BackflowError, Result};
use crate::domain::metrics::{MetricSnapshot, ProgressMetric};
use crate::domain::multi_asset_series::MultiAssetSeries;
use crate::domain::timeframe::Timeframe;
use crate::ports::feed_port::Feed;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A feed replaying into a channel on its own task.
///
/// Dropping the guard closes the channel and aborts the producer, so an
/// early return from the consumer never leaves the feed task running.
pub struct Playback {
    channel: EventChannel,
    producer: Option<JoinHandle<Result<()>>>,
}

impl Playback {
    /// Spawn `feed` on a tokio task, restricted to `timeframe`.
    pub fn start(feed: Arc<dyn Feed>, timeframe: Timeframe, capacity: usize) -> Result<Self> {
        let channel = EventChannel::new(capacity, timeframe)?;
        let sender = channel.sender();
        let producer = tokio::spawn(async move {
            let guard = CloseOnDrop(sender);
            feed.play(guard.0.clone()).await
        });
        Ok(Self {
            channel,
            producer: Some(producer),
        })
    }

    pub async fn receive(&mut self) -> Received {
        self.channel.receive().await
    }

    pub fn timeframe(&self) -> Timeframe {
        self.channel.timeframe()
    }

    /// Close the channel, stop the producer and report its outcome.
    pub async fn finish(mut self) -> Result<()> {
        self.channel.close();
        let Some(producer) = self.producer.take() else {
            return Ok(());
        };
        producer.abort();
        match producer.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(BackflowError::Data {
                reason: format!("feed task failed: {e}"),
            }),
        }
    }
}

/// Closes the channel when the producer future is dropped, whether it
/// returned, panicked or was aborted.
struct CloseOnDrop(EventSender);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.channel.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Play `feed` over `timeframe` into `series`; returns progress counters.
pub async fn replay(
    feed: Arc<dyn Feed>,
    timeframe: Timeframe,
    capacity: usize,
    series: &mut MultiAssetSeries,
) -> Result<MetricSnapshot> {
    let mut playback = Playback::start(feed, timeframe, capacity)?;
    let mut progress = ProgressMetric::default();
    while let Received::Event(event) = playback.receive().await {
        progress.record(&event);
        series.add_all(&event);
    }
    playback.finish().await?;
    tracing::debug!(
        events = progress.events,
        actions = progress.actions,
        %timeframe,
        "replay finished"
    );
    Ok(progress.snapshot())
}
