//! Session state machine and in-flight purchase table.
//!
//! ## Locking
//!
//! All mutable state sits behind one mutex. It is held only while a
//! transition is computed and is always released before a gateway call is
//! awaited and before any callback runs, so callbacks may re-enter the
//! manager.
//!
//! ## Result routing
//!
//! A purchase result can reach the manager along two paths: the value
//! returned by `StoreGateway::initiate_purchase`, or a store-pushed
//! [`GatewayEvent`]. Whichever arrives first resolves the pending request;
//! later copies find no pending entry. A completion without a pending entry
//! is a restoration unless its transaction was already delivered in this
//! session, in which case it is a stale duplicate and dropped. A store-pushed
//! completion whose transaction was already delivered is dropped even when a
//! newer request for the product is pending. Only the most recent
//! [`RESOLVED_PER_PRODUCT`] transactions are remembered per product.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use iapkit_catalog::{ProductCatalog, ProductDefinition};
use iapkit_core::{ProductId, PurchaseRequestId, Receipt, SessionError, SessionResult};
use iapkit_gateway::{GatewayEvent, GatewayEvents, GatewayHandle, StoreGateway};

use crate::result::TransactionResult;
use crate::state::SessionState;

/// Delivered transactions remembered per product for duplicate detection.
pub const RESOLVED_PER_PRODUCT: usize = 32;

type PurchaseCallback = Box<dyn FnOnce(SessionResult<TransactionResult>) + Send>;
type RestorationHandler = Box<dyn Fn(TransactionResult) + Send + Sync>;

struct PendingPurchase {
    request_id: PurchaseRequestId,
    requested_at: DateTime<Utc>,
    callback: PurchaseCallback,
}

impl core::fmt::Debug for PendingPurchase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingPurchase")
            .field("request_id", &self.request_id)
            .field("requested_at", &self.requested_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Phase {
    Uninitialized,
    Initializing,
    Ready {
        catalog: Arc<ProductCatalog>,
        handle: GatewayHandle,
    },
    FailedInit {
        reason: String,
    },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Uninitialized => SessionState::Uninitialized,
            Phase::Initializing => SessionState::Initializing,
            Phase::Ready { .. } => SessionState::Ready,
            Phase::FailedInit { .. } => SessionState::FailedInit,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    phase: Phase,
    pending: HashMap<ProductId, PendingPurchase>,
    /// Transactions already delivered, newest last, per product.
    resolved: HashMap<ProductId, VecDeque<String>>,
}

impl SessionInner {
    /// Validate a purchase request against the current state.
    fn admit(&self, product_id: &ProductId) -> SessionResult<ProductDefinition> {
        let Phase::Ready { catalog, .. } = &self.phase else {
            return Err(SessionError::NotInitialized);
        };
        let definition = catalog
            .lookup(product_id)
            .ok_or_else(|| SessionError::UnknownProduct(product_id.clone()))?;
        if self.pending.contains_key(product_id) {
            return Err(SessionError::PurchaseAlreadyPending(product_id.clone()));
        }
        Ok(definition.clone())
    }

    fn was_resolved(&self, product_id: &ProductId, transaction_id: &str) -> bool {
        self.resolved
            .get(product_id)
            .is_some_and(|seen| seen.iter().any(|tx| tx == transaction_id))
    }

    fn mark_resolved(&mut self, product_id: &ProductId, transaction_id: &str) {
        let seen = self.resolved.entry(product_id.clone()).or_default();
        if seen.len() == RESOLVED_PER_PRODUCT {
            seen.pop_front();
        }
        seen.push_back(transaction_id.to_string());
    }

    /// Remove the pending entry for `product_id`.
    ///
    /// With `origin` set, only the entry created by that request is taken; a
    /// newer request for the same product is left alone.
    fn take_pending(
        &mut self,
        product_id: &ProductId,
        origin: Option<PurchaseRequestId>,
    ) -> Option<PendingPurchase> {
        let owned = self
            .pending
            .get(product_id)
            .is_some_and(|p| origin.is_none_or(|rid| p.request_id == rid));
        if owned {
            self.pending.remove(product_id)
        } else {
            None
        }
    }
}

enum Completion {
    Request(PendingPurchase),
    Restoration,
    Duplicate,
}

/// Purchase session over an injected [`StoreGateway`].
///
/// Construct one per store connection and pass it explicitly; there is no
/// global accessor. Calls may come from several tasks, but transitions for a
/// product are serialized.
pub struct PurchaseSessionManager<G: ?Sized> {
    gateway: Arc<G>,
    inner: Mutex<SessionInner>,
    restoration_handler: Option<RestorationHandler>,
}

impl<G: ?Sized> core::fmt::Debug for PurchaseSessionManager<G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PurchaseSessionManager")
            .field("inner", &self.inner)
            .field("restoration_handler", &self.restoration_handler.is_some())
            .finish_non_exhaustive()
    }
}

impl<G: StoreGateway + ?Sized> PurchaseSessionManager<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            inner: Mutex::new(SessionInner {
                phase: Phase::Uninitialized,
                pending: HashMap::new(),
                resolved: HashMap::new(),
            }),
            restoration_handler: None,
        }
    }

    /// Receive every restoration event (entitlements re-delivered without a
    /// matching `buy_product` request).
    pub fn with_restoration_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(TransactionResult) + Send + Sync + 'static,
    {
        self.restoration_handler = Some(Box::new(handler));
        self
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn state(&self) -> SessionState {
        self.lock().phase.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn catalog(&self) -> Option<Arc<ProductCatalog>> {
        match &self.lock().phase {
            Phase::Ready { catalog, .. } => Some(Arc::clone(catalog)),
            _ => None,
        }
    }

    pub fn gateway_handle(&self) -> Option<GatewayHandle> {
        match &self.lock().phase {
            Phase::Ready { handle, .. } => Some(handle.clone()),
            _ => None,
        }
    }

    /// Reason recorded by the last failed initialization, if the session is
    /// in `FailedInit`.
    pub fn init_failure(&self) -> Option<String> {
        match &self.lock().phase {
            Phase::FailedInit { reason } => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self, product_id: &ProductId) -> bool {
        self.lock().pending.contains_key(product_id)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Register `products` and connect the gateway.
    ///
    /// `callback` runs exactly once: synchronously with `AlreadyInitialized`
    /// (session ready or initializing) or a catalog error, otherwise with the
    /// gateway's verdict. Allowed again after a failed attempt. If this future
    /// is dropped while the gateway is connecting, the session falls back to
    /// `FailedInit` and `callback` receives `Aborted`.
    pub async fn initialize<I, F>(&self, products: I, callback: F)
    where
        I: IntoIterator<Item = ProductDefinition>,
        F: FnOnce(SessionResult<GatewayHandle>) + Send,
    {
        let started = {
            let mut inner = self.lock();
            let state = inner.phase.state();
            if state.accepts_initialize() {
                match ProductCatalog::register(products) {
                    Ok(catalog) => {
                        inner.phase = Phase::Initializing;
                        Ok((Arc::new(catalog), state))
                    }
                    Err(err) => Err(SessionError::from(err)),
                }
            } else {
                Err(SessionError::AlreadyInitialized)
            }
        };

        let (catalog, previous) = match started {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "initialize rejected");
                callback(Err(err));
                return;
            }
        };

        info!(
            gateway = self.gateway.name(),
            products = catalog.len(),
            retry = previous == SessionState::FailedInit,
            "initializing purchase session"
        );

        let attempt = InitAttempt {
            inner: &self.inner,
            callback: Some(callback),
        };
        let outcome = self.gateway.initialize(&catalog).await;
        let callback = attempt.finish();

        let result = {
            let mut inner = self.lock();
            match outcome {
                Ok(handle) => {
                    inner.phase = Phase::Ready {
                        catalog,
                        handle: handle.clone(),
                    };
                    Ok(handle)
                }
                Err(err) => {
                    inner.phase = Phase::FailedInit {
                        reason: err.reason().to_string(),
                    };
                    Err(SessionError::from(err))
                }
            }
        };

        match &result {
            Ok(handle) => info!(
                gateway = %handle.store,
                available = handle.available_products,
                "purchase session ready"
            ),
            Err(err) => warn!(error = %err, "purchase session initialization failed"),
        }
        if let Some(callback) = callback {
            callback(result);
        }
    }

    /// Buy `product_id`.
    ///
    /// Rejections (`NotInitialized`, `UnknownProduct`,
    /// `PurchaseAlreadyPending`) are delivered before this returns and never
    /// reach the gateway. An accepted request resolves with the first
    /// matching gateway result. If this future is dropped before the gateway
    /// answers, the request stays pending until a matching
    /// [`GatewayEvent`] or [`shutdown`](Self::shutdown).
    pub async fn buy_product<F>(&self, product_id: ProductId, callback: F)
    where
        F: FnOnce(SessionResult<TransactionResult>) + Send + 'static,
    {
        let callback: PurchaseCallback = Box::new(callback);

        let admitted = {
            let mut inner = self.lock();
            match inner.admit(&product_id) {
                Ok(definition) => {
                    let request_id = PurchaseRequestId::new();
                    inner.pending.insert(
                        product_id.clone(),
                        PendingPurchase {
                            request_id,
                            requested_at: Utc::now(),
                            callback,
                        },
                    );
                    Ok((definition, request_id))
                }
                Err(err) => Err((err, callback)),
            }
        };

        let (definition, request_id) = match admitted {
            Ok(v) => v,
            Err((err, callback)) => {
                warn!(product_id = %product_id, error = %err, "purchase rejected");
                callback(Err(err));
                return;
            }
        };

        info!(
            product_id = %product_id,
            request_id = %request_id,
            kind = %definition.kind(),
            store_id = definition.store_specific_id(self.gateway.name()),
            "purchase submitted"
        );

        match self.gateway.initiate_purchase(&definition).await {
            Ok(receipt) => self.complete(product_id, receipt, Some(request_id)),
            Err(err) => self.fail(product_id, err.reason().to_string(), Some(request_id)),
        }
    }

    /// Ask the store to re-deliver entitlements.
    ///
    /// Restored products arrive afterwards as completion events and are
    /// passed to the restoration handler.
    pub async fn restore_purchases<F>(&self, callback: F)
    where
        F: FnOnce(SessionResult<()>) + Send,
    {
        if !self.is_ready() {
            warn!("restore rejected: session not initialized");
            callback(Err(SessionError::NotInitialized));
            return;
        }
        if !self.gateway.supports_restore() {
            warn!(gateway = self.gateway.name(), "restore rejected: not supported by store");
            callback(Err(SessionError::UnsupportedPlatform));
            return;
        }

        info!(gateway = self.gateway.name(), "restoring purchases");
        let result = self.gateway.restore().await.map_err(SessionError::from);
        match &result {
            Ok(()) => info!("restore request accepted by store"),
            Err(err) => warn!(error = %err, "restore failed"),
        }
        callback(result);
    }

    /// Store reported a completed purchase.
    pub fn on_purchase_complete(&self, product_id: ProductId, receipt: Receipt) {
        self.complete(product_id, receipt, None);
    }

    /// Store reported a failed purchase.
    pub fn on_purchase_failed(&self, product_id: ProductId, reason: impl Into<String>) {
        self.fail(product_id, reason.into(), None);
    }

    /// Dispatch one store-pushed event.
    pub fn handle_event(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::PurchaseCompleted { product_id, receipt } => {
                self.on_purchase_complete(product_id, receipt)
            }
            GatewayEvent::PurchaseFailed { product_id, reason } => {
                self.on_purchase_failed(product_id, reason)
            }
        }
    }

    /// Consume `events` in arrival order until the gateway closes the stream.
    pub async fn run_events(&self, mut events: GatewayEvents) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("gateway event stream closed");
    }

    fn complete(&self, product_id: ProductId, receipt: Receipt, origin: Option<PurchaseRequestId>) {
        let completion = {
            let mut inner = self.lock();
            let tx = receipt.transaction_id();
            // A replayed push must not resolve a newer request.
            if origin.is_none() && inner.was_resolved(&product_id, tx) {
                Completion::Duplicate
            } else if let Some(pending) = inner.take_pending(&product_id, origin) {
                inner.mark_resolved(&product_id, tx);
                Completion::Request(pending)
            } else if inner.was_resolved(&product_id, tx) {
                Completion::Duplicate
            } else {
                inner.mark_resolved(&product_id, tx);
                Completion::Restoration
            }
        };

        match completion {
            Completion::Request(pending) => {
                info!(
                    product_id = %product_id,
                    request_id = %pending.request_id,
                    transaction_id = receipt.transaction_id(),
                    elapsed_ms = (Utc::now() - pending.requested_at).num_milliseconds(),
                    "purchase succeeded"
                );
                (pending.callback)(Ok(TransactionResult::success(product_id, receipt)));
            }
            Completion::Duplicate => {
                debug!(
                    product_id = %product_id,
                    transaction_id = receipt.transaction_id(),
                    "duplicate completion ignored"
                );
            }
            Completion::Restoration => {
                info!(
                    product_id = %product_id,
                    transaction_id = receipt.transaction_id(),
                    "purchase restored"
                );
                match &self.restoration_handler {
                    Some(handler) => handler(TransactionResult::restored(product_id, receipt)),
                    None => debug!("no restoration handler registered"),
                }
            }
        }
    }

    fn fail(&self, product_id: ProductId, reason: String, origin: Option<PurchaseRequestId>) {
        let pending = self.lock().take_pending(&product_id, origin);
        match pending {
            Some(pending) => {
                warn!(
                    product_id = %product_id,
                    request_id = %pending.request_id,
                    reason = %reason,
                    "purchase failed"
                );
                (pending.callback)(Ok(TransactionResult::failed(product_id, reason)));
            }
            None => {
                debug!(product_id = %product_id, reason = %reason, "failure without pending request dropped");
            }
        }
    }
}

impl<G: ?Sized> PurchaseSessionManager<G> {
    /// Resolve every pending request with `Aborted`.
    ///
    /// Gateway results that arrive later for those products are treated as
    /// restorations, so granted entitlements still reach the restoration
    /// handler. Also runs on drop.
    pub fn shutdown(&self) {
        let drained: Vec<(ProductId, PendingPurchase)> = self.lock().pending.drain().collect();
        if drained.is_empty() {
            return;
        }
        info!(aborted = drained.len(), "purchase session shutting down");
        for (product_id, pending) in drained {
            debug!(product_id = %product_id, request_id = %pending.request_id, "aborting pending purchase");
            (pending.callback)(Err(SessionError::Aborted));
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An initialization waiting on the gateway. Dropped before [`finish`], it
/// moves the session out of `Initializing` and aborts the callback.
///
/// [`finish`]: InitAttempt::finish
struct InitAttempt<'a, F>
where
    F: FnOnce(SessionResult<GatewayHandle>),
{
    inner: &'a Mutex<SessionInner>,
    callback: Option<F>,
}

impl<F> InitAttempt<'_, F>
where
    F: FnOnce(SessionResult<GatewayHandle>),
{
    fn finish(mut self) -> Option<F> {
        self.callback.take()
    }
}

impl<F> Drop for InitAttempt<'_, F>
where
    F: FnOnce(SessionResult<GatewayHandle>),
{
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        {
            let mut inner = lock_inner(self.inner);
            if matches!(inner.phase, Phase::Initializing) {
                inner.phase = Phase::FailedInit {
                    reason: "initialization aborted".to_string(),
                };
            }
        }
        warn!("purchase session initialization dropped before the store answered");
        callback(Err(SessionError::Aborted));
    }
}

impl<G: ?Sized> Drop for PurchaseSessionManager<G> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
