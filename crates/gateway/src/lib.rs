//! Store backend boundary.
//!
//! The session core talks to a purchasing backend only through
//! [`StoreGateway`]. Asynchronous store-pushed notifications (restorations,
//! late or duplicate completions) travel over a [`GatewayEvents`] stream.

pub mod event;
pub mod fake;
pub mod gateway;

pub use event::{GatewayEvent, GatewayEventSender, GatewayEvents, gateway_event_channel};
pub use fake::{FakeStoreGateway, ScriptedPurchase};
pub use gateway::{GatewayHandle, StoreGateway};
