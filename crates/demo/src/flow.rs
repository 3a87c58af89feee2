//! End-to-end purchase flow against the fake store.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::info;

use iapkit_core::{ProductId, Receipt, SessionResult};
use iapkit_gateway::{FakeStoreGateway, ScriptedPurchase};
use iapkit_session::{PurchaseSessionManager, SessionState, TransactionResult};

use crate::config::DemoConfig;

/// What the flow observed, in callback order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowReport {
    pub state: Option<SessionState>,
    pub purchases: Vec<TransactionResult>,
    pub rejected: Vec<String>,
    pub restored: Vec<TransactionResult>,
    pub restore_error: Option<String>,
}

/// Initialize, buy every catalog product once, attempt an unknown product,
/// then restore entitlements.
pub async fn run_flow(config: DemoConfig) -> anyhow::Result<FlowReport> {
    let mut gateway = FakeStoreGateway::new(config.store.clone()).with_restore_support(config.supports_restore);
    for (n, product) in config.products.iter().enumerate() {
        let receipt = Receipt::new(format!("{}-{n}", config.store), format!("receipt:{}", product.id()));
        gateway.script_purchase(product.id().clone(), ScriptedPurchase::Succeed(receipt));
        if product.kind().is_entitlement() {
            gateway = gateway.with_restorable(product.id().clone(), Receipt::new(format!("prior-{n}"), "restored"));
        }
    }
    let gateway = Arc::new(gateway);
    let mut events = gateway
        .take_events()
        .ok_or_else(|| anyhow::anyhow!("gateway event stream already taken"))?;

    let report = Arc::new(Mutex::new(FlowReport::default()));
    let restored_sink = Arc::clone(&report);
    let manager = PurchaseSessionManager::new(Arc::clone(&gateway)).with_restoration_handler(move |result| {
        lock(&restored_sink).restored.push(result);
    });

    let init: Arc<Mutex<Option<SessionResult<()>>>> = Arc::default();
    let init_sink = Arc::clone(&init);
    manager
        .initialize(config.products.clone(), move |r| {
            *lock(&init_sink) = Some(r.map(|_| ()));
        })
        .await;
    if let Some(Err(err)) = lock(&init).take() {
        anyhow::bail!("session initialization failed: {err}");
    }

    let mut targets: Vec<ProductId> = config.products.iter().map(|p| p.id().clone()).collect();
    targets.push(ProductId::new("com.example.not_in_catalog")?);

    for product_id in targets {
        let sink = Arc::clone(&report);
        manager
            .buy_product(product_id, move |result| record_purchase(&sink, result))
            .await;
    }

    let restore_sink = Arc::clone(&report);
    manager
        .restore_purchases(move |r| {
            if let Err(err) = r {
                lock(&restore_sink).restore_error = Some(err.to_string());
            }
        })
        .await;

    // The fake publishes restorations synchronously; drain what is buffered.
    while let Some(event) = events.try_recv() {
        manager.handle_event(event);
    }

    manager.shutdown();
    let mut report = lock(&report).clone();
    report.state = Some(manager.state());
    info!(
        purchases = report.purchases.len(),
        rejected = report.rejected.len(),
        restored = report.restored.len(),
        "demo flow finished"
    );
    Ok(report)
}

fn record_purchase(report: &Mutex<FlowReport>, result: SessionResult<TransactionResult>) {
    let mut report = lock(report);
    match result {
        Ok(tx) => report.purchases.push(tx),
        Err(err) => report.rejected.push(err.to_string()),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
