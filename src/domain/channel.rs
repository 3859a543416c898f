//! Bounded, closable event transport between a feed task and a run loop.
//!
//! The consumer owns an [`EventChannel`] and hands [`EventSender`] handles to
//! the producer. Either side may close; closing wakes every blocked send and
//! receive. Buffered events survive a close and are still delivered.

use crate::domain::error::{BackflowError, Result};
use crate::domain::event::Event;
use crate::domain::timeframe::Timeframe;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Buffer size used when none is configured. Small on purpose: the feed
/// should stay close behind the consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Outcome of [`EventChannel::receive`].
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Event(Event),
    /// Closed and fully drained. Normal end of stream.
    Closed,
}

/// Outcome of [`EventSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// Event predates the timeframe and was dropped.
    Filtered,
    /// Channel is closed; the producer should stop.
    Closed,
}

/// Resolves once the close flag is set.
async fn closed_signal(mut flag: watch::Receiver<bool>) {
    loop {
        let closed = *flag.borrow_and_update();
        if closed || flag.changed().await.is_err() {
            return;
        }
    }
}

pub struct EventChannel {
    receiver: mpsc::Receiver<Event>,
    sender: mpsc::Sender<Event>,
    close_flag: Arc<watch::Sender<bool>>,
    closed: watch::Receiver<bool>,
    timeframe: Timeframe,
    capacity: usize,
}

impl EventChannel {
    pub fn new(capacity: usize, timeframe: Timeframe) -> Result<Self> {
        if capacity == 0 {
            return Err(BackflowError::invalid_argument("channel capacity must be positive"));
        }
        let (sender, receiver) = mpsc::channel(capacity);
        let (close_flag, closed) = watch::channel(false);
        Ok(Self {
            receiver,
            sender,
            close_flag: Arc::new(close_flag),
            closed,
            timeframe,
            capacity,
        })
    }

    /// A producer handle for this channel.
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
            close_flag: Arc::clone(&self.close_flag),
            closed: self.closed.clone(),
            timeframe: self.timeframe,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Next event, or `Closed` once the channel is closed and drained.
    pub async fn receive(&mut self) -> Received {
        tokio::select! {
            biased;
            event = self.receiver.recv() => match event {
                Some(event) => Received::Event(event),
                None => Received::Closed,
            },
            _ = closed_signal(self.closed.clone()) => match self.receiver.try_recv() {
                Ok(event) => Received::Event(event),
                Err(_) => Received::Closed,
            },
        }
    }

    /// Idempotent.
    pub fn close(&mut self) {
        self.close_flag.send_replace(true);
        self.receiver.close();
    }
}

/// Producer side of an [`EventChannel`].
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
    close_flag: Arc<watch::Sender<bool>>,
    closed: watch::Receiver<bool>,
    timeframe: Timeframe,
}

impl EventSender {
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Queue `event`, waiting while the buffer is full.
    ///
    /// Events before the timeframe are filtered. The first event at or past
    /// the timeframe end closes the channel.
    pub async fn send(&self, event: Event) -> SendOutcome {
        if self.is_closed() {
            return SendOutcome::Closed;
        }
        if event.time >= self.timeframe.end {
            self.close();
            return SendOutcome::Closed;
        }
        if event.time < self.timeframe.start {
            return SendOutcome::Filtered;
        }
        tokio::select! {
            biased;
            _ = closed_signal(self.closed.clone()) => SendOutcome::Closed,
            sent = self.sender.send(event) => match sent {
                Ok(()) => SendOutcome::Delivered,
                Err(_) => {
                    self.close();
                    SendOutcome::Closed
                }
            },
        }
    }

    /// Idempotent.
    pub fn close(&self) {
        self.close_flag.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn january() -> Timeframe {
        Timeframe::new(day(5), day(25)).unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(EventChannel::new(0, january()).is_err());
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let mut channel = EventChannel::new(4, january()).unwrap();
        let sender = channel.sender();
        for d in 5..8 {
            assert_eq!(sender.send(Event::empty(day(d))).await, SendOutcome::Delivered);
        }
        sender.close();
        for d in 5..8 {
            assert_eq!(channel.receive().await, Received::Event(Event::empty(day(d))));
        }
        assert_eq!(channel.receive().await, Received::Closed);
    }

    #[tokio::test]
    async fn filters_events_before_timeframe() {
        let mut channel = EventChannel::new(4, january()).unwrap();
        let sender = channel.sender();
        assert_eq!(sender.send(Event::empty(day(1))).await, SendOutcome::Filtered);
        assert_eq!(sender.send(Event::empty(day(6))).await, SendOutcome::Delivered);
        sender.close();
        assert_eq!(channel.receive().await, Received::Event(Event::empty(day(6))));
        assert_eq!(channel.receive().await, Received::Closed);
    }

    #[tokio::test]
    async fn event_at_end_closes_channel() {
        let mut channel = EventChannel::new(4, january()).unwrap();
        let sender = channel.sender();
        assert_eq!(sender.send(Event::empty(day(24))).await, SendOutcome::Delivered);
        assert_eq!(sender.send(Event::empty(day(25))).await, SendOutcome::Closed);
        assert!(channel.is_closed());
        assert_eq!(sender.send(Event::empty(day(10))).await, SendOutcome::Closed);
        assert_eq!(channel.receive().await, Received::Event(Event::empty(day(24))));
        assert_eq!(channel.receive().await, Received::Closed);
    }

    #[tokio::test]
    async fn close_keeps_backlog_and_repeats_closed() {
        let mut channel = EventChannel::new(4, january()).unwrap();
        let sender = channel.sender();
        sender.send(Event::empty(day(5))).await;
        sender.send(Event::empty(day(6))).await;
        channel.close();
        channel.close();
        assert!(matches!(channel.receive().await, Received::Event(_)));
        assert!(matches!(channel.receive().await, Received::Event(_)));
        for _ in 0..3 {
            assert_eq!(channel.receive().await, Received::Closed);
        }
    }

    #[tokio::test]
    async fn full_buffer_blocks_until_drained() {
        let mut channel = EventChannel::new(1, january()).unwrap();
        let sender = channel.sender();
        sender.send(Event::empty(day(5))).await;

        let producer = tokio::spawn(async move { sender.send(Event::empty(day(6))).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert!(matches!(channel.receive().await, Received::Event(_)));
        assert_eq!(producer.await.unwrap(), SendOutcome::Delivered);
        assert!(matches!(channel.receive().await, Received::Event(_)));
    }

    #[tokio::test]
    async fn close_wakes_blocked_sender() {
        let mut channel = EventChannel::new(1, january()).unwrap();
        let sender = channel.sender();
        sender.send(Event::empty(day(5))).await;

        let producer = tokio::spawn(async move { sender.send(Event::empty(day(6))).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.close();
        assert_eq!(producer.await.unwrap(), SendOutcome::Closed);
        assert!(matches!(channel.receive().await, Received::Event(_)));
        assert_eq!(channel.receive().await, Received::Closed);
    }

    #[tokio::test]
    async fn close_wakes_blocked_receiver() {
        let mut channel = EventChannel::new(2, january()).unwrap();
        let sender = channel.sender();
        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            sender.close();
        });
        assert_eq!(channel.receive().await, Received::Closed);
        closer.await.unwrap();
    }
}
