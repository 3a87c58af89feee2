use serde::{Deserialize, Serialize};

use iapkit_core::{ProductId, Receipt};

/// How a purchase attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum PurchaseOutcome {
    Success,
    Failed(String),
    /// Entitlement re-delivered by the store without a matching request.
    Restored,
}

/// Terminal value delivered for a purchase attempt or restoration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub product_id: ProductId,
    pub outcome: PurchaseOutcome,
    /// Present for `Success` and `Restored`.
    pub receipt: Option<Receipt>,
}

impl TransactionResult {
    pub fn success(product_id: ProductId, receipt: Receipt) -> Self {
        Self {
            product_id,
            outcome: PurchaseOutcome::Success,
            receipt: Some(receipt),
        }
    }

    pub fn failed(product_id: ProductId, reason: impl Into<String>) -> Self {
        Self {
            product_id,
            outcome: PurchaseOutcome::Failed(reason.into()),
            receipt: None,
        }
    }

    pub fn restored(product_id: ProductId, receipt: Receipt) -> Self {
        Self {
            product_id,
            outcome: PurchaseOutcome::Restored,
            receipt: Some(receipt),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PurchaseOutcome::Success
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            PurchaseOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
