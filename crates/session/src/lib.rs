//! Purchase session manager.
//!
//! Owns the session lifecycle ([`SessionState`]), the table of in-flight
//! purchases (at most one per product) and result delivery. Every
//! `buy_product` callback runs exactly once: synchronously on validation
//! failure, after the matching gateway result, or with `Aborted` when the
//! session shuts down.

pub mod manager;
pub mod result;
pub mod state;

pub use manager::{PurchaseSessionManager, RESOLVED_PER_PRODUCT};
pub use result::{PurchaseOutcome, TransactionResult};
pub use state::SessionState;
