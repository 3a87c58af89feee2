use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use iapkit_core::ProductId;

/// Store name used for Apple App Store overrides.
pub const APPLE_APP_STORE: &str = "AppleAppStore";

/// Store name used for Google Play overrides.
pub const GOOGLE_PLAY: &str = "GooglePlay";

/// Product lifecycle kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// May be purchased repeatedly (coins, lives).
    Consumable,
    /// One-time entitlement (remove ads).
    NonConsumable,
    /// Recurring entitlement.
    Subscription,
}

impl ProductKind {
    /// Entitlements are the kinds a store can restore.
    pub fn is_entitlement(self) -> bool {
        matches!(self, ProductKind::NonConsumable | ProductKind::Subscription)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProductKind::Consumable => "consumable",
            ProductKind::NonConsumable => "non_consumable",
            ProductKind::Subscription => "subscription",
        }
    }
}

impl core::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchasable product.
///
/// `store_identifiers` maps a store name (see [`APPLE_APP_STORE`],
/// [`GOOGLE_PLAY`]) to the id that store knows the product by. Stores without
/// an entry use the product id itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDefinition {
    id: ProductId,
    kind: ProductKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    store_identifiers: BTreeMap<String, String>,
}

impl ProductDefinition {
    pub fn new(id: ProductId, kind: ProductKind) -> Self {
        Self {
            id,
            kind,
            store_identifiers: BTreeMap::new(),
        }
    }

    pub fn consumable(id: ProductId) -> Self {
        Self::new(id, ProductKind::Consumable)
    }

    pub fn non_consumable(id: ProductId) -> Self {
        Self::new(id, ProductKind::NonConsumable)
    }

    pub fn subscription(id: ProductId) -> Self {
        Self::new(id, ProductKind::Subscription)
    }

    /// Register the id this product has in `store`.
    pub fn with_store_id(mut self, store: impl Into<String>, store_id: impl Into<String>) -> Self {
        self.store_identifiers.insert(store.into(), store_id.into());
        self
    }

    pub fn id(&self) -> &ProductId {
        &self.id
    }

    pub fn kind(&self) -> ProductKind {
        self.kind
    }

    pub fn store_identifiers(&self) -> &BTreeMap<String, String> {
        &self.store_identifiers
    }

    /// Id to submit to `store`, falling back to the product id.
    pub fn store_specific_id(&self, store: &str) -> &str {
        self.store_identifiers
            .get(store)
            .map(String::as_str)
            .unwrap_or_else(|| self.id.as_str())
    }
}
