use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event without waiting; fails when the channel is full or closed
    pub fn try_send(&self, event: Event) -> Result<(), String> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => "event channel is full".to_string(),
            mpsc::error::TrySendError::Closed(_) => "event channel is closed".to_string(),
        })
    }
}

/// Domain events emitted after an order mutation commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    },
    PaymentConfirmed {
        order_id: Uuid,
        payment_id: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        email_sent: bool,
    },
    OrderItemRemoved {
        order_id: Uuid,
        product_id: Uuid,
        new_amount: Decimal,
    },
    OrderDeleted(Uuid),
}

impl Event {
    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderPlaced { order_id, .. }
            | Event::PaymentConfirmed { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::OrderItemRemoved { order_id, .. } => *order_id,
            Event::OrderDeleted(order_id) => *order_id,
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                amount,
            } => info!(%order_id, %user_id, %amount, "order placed"),
            Event::PaymentConfirmed {
                order_id,
                payment_id,
            } => info!(%order_id, payment_id = %payment_id, "payment confirmed"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(%order_id, %old_status, %new_status, "order status changed"),
            Event::OrderCancelled {
                order_id,
                email_sent,
            } => {
                if *email_sent {
                    info!(%order_id, "order cancelled");
                } else {
                    warn!(%order_id, "order cancelled without customer notification");
                }
            }
            Event::OrderItemRemoved {
                order_id,
                product_id,
                new_amount,
            } => info!(%order_id, %product_id, %new_amount, "order item removed"),
            Event::OrderDeleted(order_id) => info!(%order_id, "empty order deleted"),
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender.try_send(Event::OrderDeleted(order_id)).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, Event::OrderDeleted(order_id));
        assert_eq!(received.order_id(), order_id);
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.try_send(Event::OrderDeleted(Uuid::new_v4())).is_err());
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_waiting() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        let first = Uuid::new_v4();

        sender.try_send(Event::OrderDeleted(first)).unwrap();
        let err = sender
            .try_send(Event::OrderDeleted(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err, "event channel is full");

        assert_eq!(rx.recv().await.unwrap(), Event::OrderDeleted(first));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn processing_loop_ends_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .try_send(Event::OrderCancelled {
                order_id: Uuid::new_v4(),
                email_sent: false,
            })
            .unwrap();
        drop(sender);

        tokio::time::timeout(std::time::Duration::from_secs(1), process_events(rx))
            .await
            .expect("loop should finish after channel closes");
    }
}
