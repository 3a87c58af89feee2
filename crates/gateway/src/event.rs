//! Store-pushed purchase notifications.
//!
//! Stores deliver some results outside the request/response path of
//! `initiate_purchase`: restored entitlements, purchases completed after the
//! app restarted, and duplicates of already-delivered transactions. Gateways
//! publish them as [`GatewayEvent`]s on an unbounded channel; the session
//! consumes them in arrival order.
//!
//! ## Delivery
//!
//! - **In order**: events are received in the order they were sent.
//! - **At-least-once**: the same completion may arrive more than once; the
//!   consumer must be idempotent.

use tokio::sync::mpsc;

use iapkit_core::{ProductId, Receipt};

/// A notification from the store backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    PurchaseCompleted { product_id: ProductId, receipt: Receipt },
    PurchaseFailed { product_id: ProductId, reason: String },
}

impl GatewayEvent {
    pub fn completed(product_id: ProductId, receipt: Receipt) -> Self {
        Self::PurchaseCompleted { product_id, receipt }
    }

    pub fn failed(product_id: ProductId, reason: impl Into<String>) -> Self {
        Self::PurchaseFailed {
            product_id,
            reason: reason.into(),
        }
    }

    pub fn product_id(&self) -> &ProductId {
        match self {
            GatewayEvent::PurchaseCompleted { product_id, .. }
            | GatewayEvent::PurchaseFailed { product_id, .. } => product_id,
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn gateway_event_channel() -> (GatewayEventSender, GatewayEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (GatewayEventSender { sender: tx }, GatewayEvents { receiver: rx })
}

/// Publishing half, held by the gateway.
#[derive(Debug, Clone)]
pub struct GatewayEventSender {
    sender: mpsc::UnboundedSender<GatewayEvent>,
}

impl GatewayEventSender {
    /// Publish an event. Returns `false` once the receiver is gone.
    pub fn send(&self, event: GatewayEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Receiving half, consumed by a single session.
#[derive(Debug)]
pub struct GatewayEvents {
    receiver: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl GatewayEvents {
    /// Wait for the next event. `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.receiver.recv().await
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<GatewayEvent> {
        self.receiver.try_recv().ok()
    }
}
