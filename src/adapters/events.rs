//! Posting event sinks

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::traits::EventSink;
use crate::configure::EventSinkKind;
use crate::logging::LogEvent;
use crate::models::PostingEvent;

/// Writes one `POSTING_COMMITTED` JSON line per event
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: PostingEvent) {
        let legs = serde_json::to_value(&event.legs).unwrap_or_default();
        log::info!(
            "{}",
            LogEvent::new("POSTING_COMMITTED")
                .field("event_id", event.event_id.to_string())
                .field("posting", event.posting.as_ref())
                .field("issuer_id", event.issuer_id)
                .field("transaction_date", event.transaction_date.to_string())
                .field("actor", event.actor.clone())
                .field("legs", legs)
                .service("ledger")
                .build()
        );
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Hands events to an in-process consumer over a bounded channel.
///
/// `publish` never waits: when the channel is full or the consumer is gone
/// the event is dropped with a warning.
pub struct ChannelEventSink {
    tx: mpsc::Sender<PostingEvent>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PostingEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: PostingEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                log::warn!("Event channel full, dropping event {}", event.event_id);
            }
            Err(TrySendError::Closed(event)) => {
                log::warn!("Event channel closed, dropping event {}", event.event_id);
            }
        }
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Drain `rx` into `sink` until every sender is dropped. Resolves to the
/// number of events forwarded.
pub fn spawn_forwarder(
    mut rx: mpsc::Receiver<PostingEvent>,
    sink: Arc<dyn EventSink>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut forwarded = 0;
        while let Some(event) = rx.recv().await {
            sink.publish(event);
            forwarded += 1;
        }
        log::debug!("Event forwarder to {} stopped after {} events", sink.name(), forwarded);
        forwarded
    })
}

/// Build the configured sink. The channel sink comes with the task that
/// drains it into the log; await it after the last publisher is dropped.
pub fn sink_from_config(
    kind: EventSinkKind,
    channel_capacity: usize,
) -> (Arc<dyn EventSink>, Option<JoinHandle<usize>>) {
    match kind {
        EventSinkKind::Log => (Arc::new(LogEventSink), None),
        EventSinkKind::Channel => {
            let (sink, rx) = ChannelEventSink::new(channel_capacity);
            let forwarder = spawn_forwarder(rx, Arc::new(LogEventSink));
            (Arc::new(sink), Some(forwarder))
        }
    }
}

pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn publish(&self, _event: PostingEvent) {}

    fn name(&self) -> &str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostingKind, TransactionEntry, TransactionKind};
    use chrono::NaiveDate;

    fn event() -> PostingEvent {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let entry =
            TransactionEntry::new(1, 10, "UNITS", TransactionKind::Deposit, 500, date).unwrap();
        PostingEvent::new(PostingKind::Single, 1, date, &[entry], Some("ops".to_string()))
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (sink, mut rx) = ChannelEventSink::new(4);
        sink.publish(event());
        let received = rx.recv().await.unwrap();
        assert_eq!(received.legs.len(), 1);
        assert_eq!(received.legs[0].signed_quantity, 500);
        assert_eq!(received.actor.as_deref(), Some("ops"));
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelEventSink::new(1);
        let first = event();
        let first_id = first.event_id;
        sink.publish(first);
        sink.publish(event());
        assert_eq!(rx.recv().await.unwrap().event_id, first_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_configured_channel_sink_forwards_until_dropped() {
        let (sink, forwarder) = sink_from_config(EventSinkKind::Channel, 8);
        assert_eq!(sink.name(), "channel");
        sink.publish(event());
        sink.publish(event());
        drop(sink);
        assert_eq!(forwarder.unwrap().await.unwrap(), 2);

        let (sink, forwarder) = sink_from_config(EventSinkKind::Log, 8);
        assert_eq!(sink.name(), "log");
        assert!(forwarder.is_none());
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (sink, rx) = ChannelEventSink::new(1);
        drop(rx);
        sink.publish(event());
        LogEventSink.publish(event());
        NullEventSink.publish(event());
    }
}
