//! Demo configuration (environment driven).

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use iapkit_catalog::{APPLE_APP_STORE, GOOGLE_PLAY, ProductDefinition};
use iapkit_core::ProductId;

#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Gateway name reported by the fake store.
    pub store: String,
    /// Restore capability advertised by the fake store.
    pub supports_restore: bool,
    pub products: Vec<ProductDefinition>,
}

impl DemoConfig {
    /// Fake store with restore support and the built-in demo catalog.
    pub fn builtin() -> anyhow::Result<Self> {
        Ok(Self {
            store: "FakeStore".to_string(),
            supports_restore: true,
            products: default_products()?,
        })
    }

    /// Read `IAPKIT_STORE`, `IAPKIT_RESTORE` and `IAPKIT_CATALOG`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::builtin()?;

        if let Ok(store) = std::env::var("IAPKIT_STORE") {
            config = config.with_store(store);
        }

        match std::env::var("IAPKIT_RESTORE") {
            Ok(v) => {
                let supported = parse_bool(&v)
                    .with_context(|| format!("IAPKIT_RESTORE must be true or false, got {v:?}"))?;
                config = config.with_restore_support(supported);
            }
            Err(_) => info!(supports_restore = config.supports_restore, "IAPKIT_RESTORE not set; using default"),
        }

        match std::env::var("IAPKIT_CATALOG") {
            Ok(path) => config = config.with_products(load_catalog(Path::new(&path))?),
            Err(_) => warn!("IAPKIT_CATALOG not set; using built-in demo catalog"),
        }

        Ok(config)
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    pub fn with_restore_support(mut self, supported: bool) -> Self {
        self.supports_restore = supported;
        self
    }

    pub fn with_products(mut self, products: Vec<ProductDefinition>) -> Self {
        self.products = products;
        self
    }
}

/// Load a JSON array of product definitions.
pub fn load_catalog(path: &Path) -> anyhow::Result<Vec<ProductDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    parse_catalog(&raw).with_context(|| format!("invalid catalog file {}", path.display()))
}

pub fn parse_catalog(raw: &str) -> anyhow::Result<Vec<ProductDefinition>> {
    Ok(serde_json::from_str(raw)?)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn default_products() -> anyhow::Result<Vec<ProductDefinition>> {
    Ok(vec![
        ProductDefinition::consumable(ProductId::new("com.szn.unitysdkutil.10")?),
        ProductDefinition::non_consumable(ProductId::new("com.szn.unitysdkutil.rmads")?),
        ProductDefinition::subscription(ProductId::new("com.szn.unitysdkutil.vip")?)
            .with_store_id(APPLE_APP_STORE, "com.szn.unitysdkutil.vip.monthly")
            .with_store_id(GOOGLE_PLAY, "vip_monthly"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use iapkit_catalog::ProductKind;

    #[test]
    fn default_catalog_has_one_of_each_kind() {
        let config = DemoConfig::builtin().unwrap();
        let kinds: Vec<ProductKind> = config.products.iter().map(|p| p.kind()).collect();
        assert_eq!(
            kinds,
            vec![ProductKind::Consumable, ProductKind::NonConsumable, ProductKind::Subscription]
        );
        assert_eq!(config.products[2].store_specific_id(GOOGLE_PLAY), "vip_monthly");
    }

    #[test]
    fn parses_catalog_json() {
        let products = parse_catalog(
            r#"[
                { "id": "gems", "kind": "consumable" },
                { "id": "pro", "kind": "subscription", "store_identifiers": { "AppleAppStore": "pro.ios" } }
            ]"#,
        )
        .unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[1].store_specific_id(APPLE_APP_STORE), "pro.ios");
    }

    #[test]
    fn rejects_malformed_catalog() {
        assert!(parse_catalog(r#"[{ "id": "gems", "kind": "bundle" }]"#).is_err());
        assert!(load_catalog(Path::new("/nonexistent/iapkit-catalog.json")).is_err());
    }

    #[test]
    fn parses_bool_flags() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
