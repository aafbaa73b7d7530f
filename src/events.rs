//! Broadcast of pipeline events to any number of consumers

use crate::types::Event;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Event publisher shared by the orchestrator and every stage task
///
/// Publishing never blocks. With no subscriber the event is dropped; a slow
/// subscriber lags and loses the oldest events rather than stalling a worker.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus keeping up to `capacity` unread events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: Event) {
        tracing::trace!(?event, "publishing event");
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.tx.send(event).ok();
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Events published from now on, as a stream
    ///
    /// Lagged notices surface as `Err` items of the stream.
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.publish(Event::AllSearchDone);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_events() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.stream();

        bus.publish(Event::SearchStarting { plugin_count: 3 });

        assert!(matches!(a.recv().await.unwrap(), Event::SearchStarting { plugin_count: 3 }));
        assert!(matches!(
            b.next().await.unwrap().unwrap(),
            Event::SearchStarting { plugin_count: 3 }
        ));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::AllRetrieveDone);
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
