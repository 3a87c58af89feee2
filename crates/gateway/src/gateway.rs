use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use iapkit_catalog::{ProductCatalog, ProductDefinition};
use iapkit_core::{GatewayError, Receipt};

/// Resolved connection to a store, returned by a successful initialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHandle {
    pub store: String,
    pub connected_at: DateTime<Utc>,
    /// Products the store confirmed as purchasable.
    pub available_products: usize,
}

impl GatewayHandle {
    pub fn new(store: impl Into<String>, available_products: usize) -> Self {
        Self {
            store: store.into(),
            connected_at: Utc::now(),
            available_products,
        }
    }
}

/// Capability-set interface over a platform purchasing backend.
///
/// Implementations own everything store-specific (protocol, receipt
/// verification, transaction finishing). Callers never branch on platform;
/// optional features are declared through capability queries such as
/// [`StoreGateway::supports_restore`].
///
/// ## Thread Safety
///
/// Gateways are shared behind `Arc` and may be called concurrently for
/// different products.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Store name (e.g. `AppleAppStore`), used for logs and
    /// store-specific product id resolution.
    fn name(&self) -> &str;

    /// Connect to the store and register `catalog`.
    async fn initialize(&self, catalog: &ProductCatalog) -> Result<GatewayHandle, GatewayError>;

    /// Start a purchase and wait for the store's verdict.
    async fn initiate_purchase(&self, product: &ProductDefinition) -> Result<Receipt, GatewayError>;

    /// Whether [`StoreGateway::restore`] is available on this backend.
    fn supports_restore(&self) -> bool;

    /// Ask the store to re-deliver previously granted entitlements.
    ///
    /// Restored entitlements arrive later as
    /// [`GatewayEvent::PurchaseCompleted`](crate::GatewayEvent) events.
    async fn restore(&self) -> Result<(), GatewayError>;
}
