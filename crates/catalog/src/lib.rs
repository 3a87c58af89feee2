//! Product catalog (purchasable product definitions).
//!
//! Built once per session initialization and read-only afterward.

pub mod catalog;
pub mod product;

pub use catalog::ProductCatalog;
pub use product::{APPLE_APP_STORE, GOOGLE_PLAY, ProductDefinition, ProductKind};
