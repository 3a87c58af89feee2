//! Deterministic in-memory gateway for tests and the demo.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::debug;

use iapkit_catalog::{ProductCatalog, ProductDefinition};
use iapkit_core::{GatewayError, ProductId, Receipt};

use crate::event::{GatewayEvent, GatewayEventSender, GatewayEvents, gateway_event_channel};
use crate::gateway::{GatewayHandle, StoreGateway};

/// Outcome resolved immediately by [`FakeStoreGateway::initiate_purchase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedPurchase {
    Succeed(Receipt),
    Fail(String),
}

type PurchaseReply = oneshot::Sender<Result<Receipt, GatewayError>>;

#[derive(Debug, Default)]
enum InitHold {
    #[default]
    Off,
    Armed,
    Waiting(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct FakeState {
    init_outcomes: VecDeque<Result<(), String>>,
    init_hold: InitHold,
    scripted: HashMap<ProductId, VecDeque<ScriptedPurchase>>,
    deferred: HashMap<ProductId, PurchaseReply>,
    restorable: Vec<(ProductId, Receipt)>,
    restore_failure: Option<String>,
    events: Option<GatewayEvents>,
    initialize_calls: usize,
    purchase_calls: Vec<ProductId>,
    restore_calls: usize,
}

/// Fake store backend.
///
/// - Initialization succeeds unless a failure was queued with
///   [`FakeStoreGateway::fail_next_initialize`]; it can be suspended with
///   [`FakeStoreGateway::hold_next_initialize`].
/// - Purchases with a scripted outcome resolve immediately; all others stay
///   in flight until [`FakeStoreGateway::resolve_purchase`] or
///   [`FakeStoreGateway::fail_purchase`] is called.
/// - `restore` publishes one completion event per restorable receipt.
#[derive(Debug)]
pub struct FakeStoreGateway {
    name: String,
    supports_restore: bool,
    sender: GatewayEventSender,
    state: Mutex<FakeState>,
}

impl FakeStoreGateway {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, events) = gateway_event_channel();
        Self {
            name: name.into(),
            supports_restore: true,
            sender,
            state: Mutex::new(FakeState {
                events: Some(events),
                ..FakeState::default()
            }),
        }
    }

    pub fn with_restore_support(mut self, supported: bool) -> Self {
        self.supports_restore = supported;
        self
    }

    /// Queue a receipt that `restore` will re-deliver.
    pub fn with_restorable(self, product_id: ProductId, receipt: Receipt) -> Self {
        self.lock().restorable.push((product_id, receipt));
        self
    }

    /// Make the next `initialize` call fail with `reason`.
    pub fn fail_next_initialize(&self, reason: impl Into<String>) {
        self.lock().init_outcomes.push_back(Err(reason.into()));
    }

    /// Suspend the next `initialize` call until [`Self::release_initialize`].
    pub fn hold_next_initialize(&self) {
        self.lock().init_hold = InitHold::Armed;
    }

    /// Let a held `initialize` call finish. Returns `false` if none is held.
    pub fn release_initialize(&self) -> bool {
        match std::mem::take(&mut self.lock().init_hold) {
            InitHold::Waiting(tx) => tx.send(()).is_ok(),
            _ => false,
        }
    }

    /// Yield until an `initialize` call is suspended by a hold.
    pub async fn wait_for_initialize(&self) {
        while !matches!(self.lock().init_hold, InitHold::Waiting(_)) {
            tokio::task::yield_now().await;
        }
    }

    /// Make every following `restore` call fail with `reason`.
    pub fn fail_restore(&self, reason: impl Into<String>) {
        self.lock().restore_failure = Some(reason.into());
    }

    /// Queue an immediate outcome for the next purchase of `product_id`.
    pub fn script_purchase(&self, product_id: ProductId, outcome: ScriptedPurchase) {
        self.lock()
            .scripted
            .entry(product_id)
            .or_default()
            .push_back(outcome);
    }

    /// Complete the in-flight purchase of `product_id`.
    ///
    /// Returns `false` if no purchase was in flight.
    pub fn resolve_purchase(&self, product_id: &ProductId, receipt: Receipt) -> bool {
        self.reply(product_id, Ok(receipt))
    }

    /// Fail the in-flight purchase of `product_id`.
    pub fn fail_purchase(&self, product_id: &ProductId, reason: impl Into<String>) -> bool {
        self.reply(product_id, Err(GatewayError::purchase_failed(reason)))
    }

    /// Publish a store-initiated event.
    pub fn emit(&self, event: GatewayEvent) -> bool {
        self.sender.send(event)
    }

    /// Take the event stream. Only the first call returns `Some`.
    pub fn take_events(&self) -> Option<GatewayEvents> {
        self.lock().events.take()
    }

    pub fn is_in_flight(&self, product_id: &ProductId) -> bool {
        self.lock().deferred.contains_key(product_id)
    }

    /// Yield until a purchase of `product_id` is waiting for resolution.
    pub async fn wait_for_purchase(&self, product_id: &ProductId) {
        while !self.is_in_flight(product_id) {
            tokio::task::yield_now().await;
        }
    }

    pub fn initialize_calls(&self) -> usize {
        self.lock().initialize_calls
    }

    /// Products passed to `initiate_purchase`, in call order.
    pub fn purchase_calls(&self) -> Vec<ProductId> {
        self.lock().purchase_calls.clone()
    }

    pub fn restore_calls(&self) -> usize {
        self.lock().restore_calls
    }

    fn reply(&self, product_id: &ProductId, result: Result<Receipt, GatewayError>) -> bool {
        let Some(tx) = self.lock().deferred.remove(product_id) else {
            return false;
        };
        tx.send(result).is_ok()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FakeStoreGateway {
    fn default() -> Self {
        Self::new("FakeStore")
    }
}

#[async_trait]
impl StoreGateway for FakeStoreGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, catalog: &ProductCatalog) -> Result<GatewayHandle, GatewayError> {
        let hold = {
            let mut state = self.lock();
            state.initialize_calls += 1;
            if matches!(state.init_hold, InitHold::Armed) {
                let (tx, rx) = oneshot::channel();
                state.init_hold = InitHold::Waiting(tx);
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = hold {
            let _ = rx.await;
        }

        let mut state = self.lock();
        match state.init_outcomes.pop_front() {
            Some(Err(reason)) => Err(GatewayError::InitFailed(reason)),
            _ => Ok(GatewayHandle::new(self.name.clone(), catalog.len())),
        }
    }

    async fn initiate_purchase(&self, product: &ProductDefinition) -> Result<Receipt, GatewayError> {
        let rx = {
            let mut state = self.lock();
            state.purchase_calls.push(product.id().clone());

            let scripted = state
                .scripted
                .get_mut(product.id())
                .and_then(VecDeque::pop_front);
            match scripted {
                Some(ScriptedPurchase::Succeed(receipt)) => return Ok(receipt),
                Some(ScriptedPurchase::Fail(reason)) => return Err(GatewayError::PurchaseFailed(reason)),
                None => {}
            }

            let (tx, rx) = oneshot::channel();
            state.deferred.insert(product.id().clone(), tx);
            debug!(
                product_id = %product.id(),
                store_id = product.store_specific_id(&self.name),
                "purchase in flight"
            );
            rx
        };

        rx.await
            .unwrap_or_else(|_| Err(GatewayError::purchase_failed("store connection dropped")))
    }

    fn supports_restore(&self) -> bool {
        self.supports_restore
    }

    async fn restore(&self) -> Result<(), GatewayError> {
        let restorable = {
            let mut state = self.lock();
            state.restore_calls += 1;
            if !self.supports_restore {
                return Err(GatewayError::restore_failed("restore not supported"));
            }
            if let Some(reason) = state.restore_failure.clone() {
                return Err(GatewayError::RestoreFailed(reason));
            }
            state.restorable.clone()
        };

        for (product_id, receipt) in restorable {
            self.sender.send(GatewayEvent::completed(product_id, receipt));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::new(s).unwrap()
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::register(vec![
            ProductDefinition::consumable(pid("coins")),
            ProductDefinition::non_consumable(pid("rmads")),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn initialize_uses_queued_failures_then_succeeds() {
        let gateway = FakeStoreGateway::default();
        gateway.fail_next_initialize("network down");

        let err = gateway.initialize(&catalog()).await.unwrap_err();
        assert_eq!(err, GatewayError::init_failed("network down"));

        let handle = gateway.initialize(&catalog()).await.unwrap();
        assert_eq!(handle.store, "FakeStore");
        assert_eq!(handle.available_products, 2);
        assert_eq!(gateway.initialize_calls(), 2);
    }

    #[tokio::test]
    async fn held_initialize_waits_for_release() {
        let gateway = FakeStoreGateway::default();
        assert!(!gateway.release_initialize());
        gateway.hold_next_initialize();

        let catalog = catalog();
        let (result, _) = tokio::join!(gateway.initialize(&catalog), async {
            gateway.wait_for_initialize().await;
            assert!(gateway.release_initialize());
        });
        assert!(result.is_ok());
        assert!(!gateway.release_initialize());
    }

    #[tokio::test]
    async fn scripted_purchase_resolves_immediately() {
        let gateway = FakeStoreGateway::default();
        let coins = ProductDefinition::consumable(pid("coins"));
        gateway.script_purchase(pid("coins"), ScriptedPurchase::Succeed(Receipt::new("t1", "r1")));
        gateway.script_purchase(pid("coins"), ScriptedPurchase::Fail("declined".into()));

        assert_eq!(gateway.initiate_purchase(&coins).await.unwrap().transaction_id(), "t1");
        assert_eq!(
            gateway.initiate_purchase(&coins).await.unwrap_err(),
            GatewayError::purchase_failed("declined")
        );
        assert_eq!(gateway.purchase_calls(), vec![pid("coins"), pid("coins")]);
    }

    #[tokio::test]
    async fn deferred_purchase_waits_for_resolution() {
        let gateway = FakeStoreGateway::default();
        let coins = ProductDefinition::consumable(pid("coins"));

        assert!(!gateway.resolve_purchase(&pid("coins"), Receipt::new("t0", "")));

        let (result, _) = tokio::join!(gateway.initiate_purchase(&coins), async {
            gateway.wait_for_purchase(&pid("coins")).await;
            assert!(gateway.resolve_purchase(&pid("coins"), Receipt::new("t9", "r9")));
        });
        assert_eq!(result.unwrap().transaction_id(), "t9");
        assert!(!gateway.is_in_flight(&pid("coins")));
    }

    #[tokio::test]
    async fn restore_publishes_restorable_receipts() {
        let gateway = FakeStoreGateway::default()
            .with_restorable(pid("rmads"), Receipt::new("t-old", "r-old"));
        let mut events = gateway.take_events().unwrap();
        assert!(gateway.take_events().is_none());

        gateway.restore().await.unwrap();
        assert_eq!(
            events.try_recv(),
            Some(GatewayEvent::completed(pid("rmads"), Receipt::new("t-old", "r-old")))
        );
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn restore_reports_configured_failure() {
        let gateway = FakeStoreGateway::default();
        gateway.fail_restore("account signed out");
        assert_eq!(
            gateway.restore().await.unwrap_err(),
            GatewayError::restore_failed("account signed out")
        );
        assert_eq!(gateway.restore_calls(), 1);
    }
}
