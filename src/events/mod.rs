use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events emitted by the cart/order/ticket lifecycle. Consumed in-process
/// by [`process_events`]; the channel keeps side channels (logging, future
/// webhooks) out of the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CartCreated(Uuid),
    CartItemAdded {
        order_id: Uuid,
        product_id: Uuid,
    },
    CartItemRemoved {
        order_id: Uuid,
        item_id: Uuid,
    },
    CartMerged {
        session_order_id: Uuid,
        user_order_id: Uuid,
    },
    PaymentInitiated(Uuid),
    PaymentFailed(Uuid),
    OrderPaid(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    TicketsIssued {
        order_id: Uuid,
        count: usize,
    },
    TicketCheckedIn {
        code: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a full or closed channel is logged and swallowed.
    /// Lifecycle operations must not fail because observers lag.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

/// Drains the event channel. Runs as a background task for the lifetime of
/// the server.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPaid(order_id) => {
                info!(order_id = %order_id, "order confirmed as paid");
            }
            Event::PaymentFailed(order_id) => {
                warn!(order_id = %order_id, "payment failed notification processed");
            }
            Event::TicketsIssued { order_id, count } => {
                info!(order_id = %order_id, count, "event tickets issued");
            }
            other => debug!("event: {:?}", other),
        }
    }
    info!("Event channel closed; processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or error out.
        sender.send_or_log(Event::CartCreated(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let id = Uuid::new_v4();
        sender.send(Event::OrderPaid(id)).await.expect("send");
        match rx.recv().await {
            Some(Event::OrderPaid(got)) => assert_eq!(got, id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
