//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Store-neutral product identifier (e.g. `com.example.coins_100`).
///
/// Always non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(CoreError::invalid_id("ProductId: must not be empty"));
        }
        if trimmed.len() == id.len() {
            Ok(Self(id))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProductId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ProductId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for String {
    fn from(value: ProductId) -> Self {
        value.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier assigned to each accepted purchase request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseRequestId(Uuid);

impl PurchaseRequestId {
    /// Uses UUIDv7 (time-ordered) so log lines sort by submission.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PurchaseRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PurchaseRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PurchaseRequestId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| CoreError::invalid_id(format!("PurchaseRequestId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_rejects_blank() {
        assert!(ProductId::new("").is_err());
        assert!(ProductId::new("   ").is_err());
    }

    #[test]
    fn product_id_trims_whitespace() {
        let id: ProductId = "  com.example.gems ".parse().unwrap();
        assert_eq!(id.as_str(), "com.example.gems");
    }

    #[test]
    fn product_id_deserialization_validates() {
        let ok: ProductId = serde_json::from_str("\"com.example.gems\"").unwrap();
        assert_eq!(ok.to_string(), "com.example.gems");
        assert!(serde_json::from_str::<ProductId>("\"\"").is_err());
    }

    #[test]
    fn request_ids_are_unique_and_parse_back() {
        let a = PurchaseRequestId::new();
        let b = PurchaseRequestId::new();
        assert_ne!(a, b);
        let parsed: PurchaseRequestId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
    }
}
