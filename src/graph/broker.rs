use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::WsServerMessage;

const SUBSCRIBER_BACKLOG: usize = 32;

/// Fan-out broker for graph-change events. Subscribers register an
/// outbox and are fed every broadcast; a subscriber whose backlog fills
/// up (it isn't draining fast enough) is dropped rather than allowed to
/// stall the broadcast for everyone else.
#[derive(Clone, Default)]
pub struct GraphBroker {
    subscribers: Arc<DashMap<Uuid, mpsc::Sender<WsServerMessage>>>,
}

pub struct Subscription {
    pub id: Uuid,
    pub rx: mpsc::Receiver<WsServerMessage>,
}

impl GraphBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BACKLOG);
        self.subscribers.insert(id, tx);
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    /// Broadcast to every current subscriber. Iterates a snapshot of the
    /// subscriber map so a slow send never holds up delivery to the
    /// rest; subscribers whose backlog is full are dropped on the spot.
    pub fn broadcast(&self, message: WsServerMessage) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().try_send(message.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let broker = GraphBroker::new();
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();

        broker.broadcast(WsServerMessage::RoomDestroyed {
            room_id: "room-1".to_string(),
        });

        assert!(matches!(
            a.rx.recv().await,
            Some(WsServerMessage::RoomDestroyed { .. })
        ));
        assert!(matches!(
            b.rx.recv().await,
            Some(WsServerMessage::RoomDestroyed { .. })
        ));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let broker = GraphBroker::new();
        let sub = broker.subscribe();
        broker.unsubscribe(sub.id);
        assert_eq!(broker.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn full_backlog_drops_the_subscriber() {
        let broker = GraphBroker::new();
        let sub = broker.subscribe();

        for _ in 0..(SUBSCRIBER_BACKLOG + 4) {
            broker.broadcast(WsServerMessage::EdgeAdded {
                source: "a".to_string(),
                dest: "b".to_string(),
            });
        }

        assert_eq!(broker.subscriber_count(), 0);
        drop(sub);
    }
}
