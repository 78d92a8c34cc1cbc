//! Event-driven communication system for inter-service messaging.

use anyhow::Result;
use log::debug;
use tokio::sync::broadcast;

use crate::entities::{StateUpdate, StateWriter};

/// Application events for inter-service communication.
///
/// Events are published through the EventBus and consumed by interested services.
#[derive(Debug, Clone)]
pub enum Event {
    /// An entity re-rendered after the hub changed its state.
    StateChanged(StateUpdate),
    /// Ask the coordinator for an out-of-schedule poll.
    RefreshRequested,
    SystemShutdown,
}

/// Event bus for publish-subscribe messaging between services.
///
/// # Example
///
/// ```no_run
/// use recomd::event::{Event, EventBus};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::RefreshRequested).unwrap();
///
/// // In async context, receive events:
/// // let event = subscriber.recv().await;
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a new EventBus with default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    #[cfg(test)]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns an error if there are no active subscribers.
    pub fn publish(&self, event: Event) -> Result<()> {
        self.sender.send(event)?;
        Ok(())
    }

    /// Each subscriber receives all events published after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StateWriter for EventBus {
    fn write_state(&self, update: StateUpdate) {
        let entity_id = update.entity_id.clone();
        if self.publish(Event::StateChanged(update)).is_err() {
            debug!("No listeners for state of '{entity_id}'");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityRender;
    use pretty_assertions::assert_eq;
    use tokio::time::{Duration, sleep};

    fn update(value: f64) -> StateUpdate {
        StateUpdate {
            entity_id: "IR_SuRPM".to_string(),
            device: "recom".to_string(),
            render: EntityRender::Sensor {
                name: "Supply Fan Speed".to_string(),
                state: Some(value),
                unit: "rpm".to_string(),
                icon: "mdi:speedometer".to_string(),
            },
        }
    }

    #[test]
    fn clone_shares_channel() {
        let event_bus1 = EventBus::new();
        let event_bus2 = event_bus1.clone();

        let _receiver1 = event_bus1.subscribe();
        let _receiver2 = event_bus2.subscribe();

        assert_eq!(event_bus1.sender.receiver_count(), 2);
    }

    #[tokio::test]
    async fn publish_without_subscribers_returns_error() {
        let event_bus = EventBus::new();
        assert!(event_bus.publish(Event::RefreshRequested).is_err());
    }

    #[tokio::test]
    async fn state_writer_publishes_state_changed() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();

        event_bus.write_state(update(1450.0));

        match receiver.recv().await.unwrap() {
            Event::StateChanged(received) => assert_eq!(received, update(1450.0)),
            other => panic!("Expected StateChanged, got {other:?}"),
        }
    }

    #[test]
    fn state_writer_tolerates_missing_subscribers() {
        let event_bus = EventBus::new();
        event_bus.write_state(update(0.0));
    }

    #[tokio::test]
    async fn sequential_events_received_in_order() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();

        event_bus.publish(Event::RefreshRequested).unwrap();
        event_bus.write_state(update(1.0));
        event_bus.publish(Event::SystemShutdown).unwrap();

        let events = (
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
            receiver.recv().await.unwrap(),
        );
        match events {
            (Event::RefreshRequested, Event::StateChanged(_), Event::SystemShutdown) => {}
            other => panic!("Events out of order: {other:?}"),
        }
    }

    #[tokio::test]
    async fn event_bus_works_across_async_tasks() {
        let event_bus = EventBus::new();
        let mut receiver = event_bus.subscribe();
        let publisher_bus = event_bus.clone();

        let publisher_handle = tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            publisher_bus.publish(Event::SystemShutdown).unwrap();
        });
        let receiver_handle = tokio::spawn(async move { receiver.recv().await.unwrap() });

        publisher_handle.await.unwrap();
        assert!(matches!(
            receiver_handle.await.unwrap(),
            Event::SystemShutdown
        ));
    }

    #[tokio::test]
    async fn small_capacity_reports_lag() {
        let event_bus = EventBus::with_capacity(2);
        let mut receiver = event_bus.subscribe();

        for i in 0..5 {
            event_bus.write_state(update(f64::from(i)));
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
    }
}
