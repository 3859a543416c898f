//! Market data feed port.

use crate::domain::channel::EventSender;
use crate::domain::currency::Asset;
use crate::domain::error::Result;
use crate::domain::timeframe::Timeframe;
use async_trait::async_trait;

/// A source of time-ordered events.
///
/// `play` pushes events into `sender` in time order and returns once the
/// data is exhausted or a send reports the channel closed. It must not treat
/// a closed channel as an error.
#[async_trait]
pub trait Feed: Send + Sync {
    async fn play(&self, sender: EventSender) -> Result<()>;

    /// Span covered by the feed's data.
    fn timeframe(&self) -> Timeframe;

    fn assets(&self) -> Vec<Asset>;
}
