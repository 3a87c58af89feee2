//! Error taxonomy shared by the catalog, gateway and session crates.

use thiserror::Error;

use crate::id::ProductId;

/// Result type for catalog registration.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type delivered to session callbacks.
pub type SessionResult<T> = Result<T, SessionError>;

/// Identifier-level failures (parsing, validation).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An identifier was invalid (e.g. empty after trimming).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// Catalog registration failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Two definitions in the same registration share an id.
    #[error("duplicate product id: {0}")]
    DuplicateId(ProductId),

    /// No definitions were supplied.
    #[error("catalog must contain at least one product")]
    EmptyCatalog,
}

/// Failure reported by a store backend.
///
/// Reasons are opaque strings produced by the gateway; the core never
/// interprets them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("store initialization failed: {0}")]
    InitFailed(String),

    #[error("purchase failed: {0}")]
    PurchaseFailed(String),

    #[error("restore failed: {0}")]
    RestoreFailed(String),
}

impl GatewayError {
    pub fn init_failed(reason: impl Into<String>) -> Self {
        Self::InitFailed(reason.into())
    }

    pub fn purchase_failed(reason: impl Into<String>) -> Self {
        Self::PurchaseFailed(reason.into())
    }

    pub fn restore_failed(reason: impl Into<String>) -> Self {
        Self::RestoreFailed(reason.into())
    }

    /// The backend-provided reason, without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            GatewayError::InitFailed(r)
            | GatewayError::PurchaseFailed(r)
            | GatewayError::RestoreFailed(r) => r,
        }
    }
}

/// Session-level failure delivered through a caller's callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is already initialized or initializing")]
    AlreadyInitialized,

    #[error("session is not initialized")]
    NotInitialized,

    #[error("unknown product: {0}")]
    UnknownProduct(ProductId),

    #[error("a purchase is already pending for product: {0}")]
    PurchaseAlreadyPending(ProductId),

    /// The active gateway does not declare the requested capability.
    #[error("operation not supported by the active store")]
    UnsupportedPlatform,

    /// The session was torn down, or the caller dropped the request,
    /// before the store answered.
    #[error("request aborted before the store answered")]
    Aborted,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl SessionError {
    /// True for errors raised before any gateway call was made.
    pub fn is_validation(&self) -> bool {
        !matches!(self, SessionError::Gateway(_) | SessionError::Aborted)
    }
}
