//! `iapkit-core` — shared identifiers, receipts and the error model.
//!
//! Pure types only; no IO and no async.

pub mod error;
pub mod id;
pub mod receipt;

pub use error::{CatalogError, CatalogResult, CoreError, GatewayError, SessionError, SessionResult};
pub use id::{ProductId, PurchaseRequestId};
pub use receipt::Receipt;
