//! Opaque proof-of-purchase issued by a store backend.

use serde::{Deserialize, Serialize};

/// Store receipt.
///
/// The payload is never parsed by the core; verification belongs to the
/// gateway or a server. `transaction_id` identifies the store transaction and
/// is the only field the session looks at (duplicate detection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_id: String,
    pub payload: String,
}

impl Receipt {
    pub fn new(transaction_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            payload: payload.into(),
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl core::fmt::Display for Receipt {
    // Payloads can be large store blobs; only the transaction id is printed.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "receipt({})", self.transaction_id)
    }
}
