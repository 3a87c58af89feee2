//! Property: every `buy_product` callback runs exactly once, whatever order
//! and multiplicity the store uses for its results, and a delivered
//! transaction never reaches a second caller.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tokio::runtime::Runtime;

use iapkit_catalog::ProductDefinition;
use iapkit_core::{ProductId, Receipt, SessionResult};
use iapkit_gateway::FakeStoreGateway;
use iapkit_session::{PurchaseOutcome, PurchaseSessionManager, RESOLVED_PER_PRODUCT, TransactionResult};

type Log = Arc<Mutex<Vec<SessionResult<TransactionResult>>>>;

const PRODUCTS: [&str; 3] = ["coins", "rmads", "vip"];

#[derive(Debug, Clone)]
enum Op {
    /// Index 3 is a product missing from the catalog.
    Buy(usize),
    /// The gateway answers with a transaction id it never used before.
    GatewayResolve(usize),
    GatewayFail(usize),
    PushComplete(usize, u8),
    PushFail(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..4usize).prop_map(Op::Buy),
        2 => (0..3usize).prop_map(Op::GatewayResolve),
        1 => (0..3usize).prop_map(Op::GatewayFail),
        2 => (0..3usize, 0..4u8).prop_map(|(p, t)| Op::PushComplete(p, t)),
        1 => (0..3usize).prop_map(Op::PushFail),
    ]
}

fn product(idx: usize) -> ProductId {
    let name = PRODUCTS.get(idx).copied().unwrap_or("unlisted");
    ProductId::new(name).unwrap()
}

fn receipt(tx: u8) -> Receipt {
    Receipt::new(format!("tx-{tx}"), "payload")
}

/// Every successful delivery so far; fails if a transaction was handed to
/// two callers or was never issued by the store.
fn check_deliveries(
    logs: &[Log],
    issued: &HashSet<(ProductId, String)>,
) -> Result<(), TestCaseError> {
    let mut delivered = HashSet::new();
    for log in logs {
        let log = log.lock().unwrap();
        prop_assert!(log.len() <= 1);
        if let Some(Ok(tx)) = log.first() {
            if tx.outcome == PurchaseOutcome::Success {
                let receipt = tx.receipt.as_ref().unwrap();
                let key = (tx.product_id.clone(), receipt.transaction_id().to_string());
                prop_assert!(issued.contains(&key), "unissued transaction {:?}", key);
                prop_assert!(delivered.insert(key.clone()), "transaction delivered twice: {:?}", key);
            }
        }
    }
    Ok(())
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

/// Let spawned purchase tasks run until they block on the store.
fn settle(rt: &Runtime) {
    rt.block_on(async {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    });
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        ..ProptestConfig::default()
    })]

    #[test]
    fn every_purchase_callback_runs_exactly_once(
        ops in proptest::collection::vec(op(), 1..RESOLVED_PER_PRODUCT)
    ) {
        let rt = runtime();
        let gateway = Arc::new(FakeStoreGateway::default());
        let manager = Arc::new(PurchaseSessionManager::new(Arc::clone(&gateway)));
        rt.block_on(manager.initialize(
            PRODUCTS.iter().map(|p| ProductDefinition::consumable(ProductId::new(*p).unwrap())),
            |r| assert!(r.is_ok()),
        ));

        let mut logs: Vec<Log> = Vec::new();
        let mut issued: HashSet<(ProductId, String)> = HashSet::new();
        let mut next_tx = 0usize;

        for op in ops {
            match op {
                Op::Buy(idx) => {
                    let log: Log = Arc::default();
                    logs.push(Arc::clone(&log));
                    let m = Arc::clone(&manager);
                    rt.spawn(async move {
                        m.buy_product(product(idx), move |r| log.lock().unwrap().push(r))
                            .await;
                    });
                }
                Op::GatewayResolve(idx) => {
                    next_tx += 1;
                    let receipt = Receipt::new(format!("gw-{next_tx}"), "payload");
                    issued.insert((product(idx), receipt.transaction_id().to_string()));
                    gateway.resolve_purchase(&product(idx), receipt);
                }
                Op::GatewayFail(idx) => {
                    gateway.fail_purchase(&product(idx), "declined");
                }
                Op::PushComplete(idx, tx) => {
                    let pushed = receipt(tx);
                    issued.insert((product(idx), pushed.transaction_id().to_string()));
                    manager.on_purchase_complete(product(idx), pushed);
                }
                Op::PushFail(idx) => manager.on_purchase_failed(product(idx), "declined"),
            }
            settle(&rt);

            // Never more than one delivery, at any point.
            check_deliveries(&logs, &issued)?;
            prop_assert!(manager.pending_count() <= PRODUCTS.len());
        }

        manager.shutdown();
        settle(&rt);

        prop_assert_eq!(manager.pending_count(), 0);
        check_deliveries(&logs, &issued)?;
        for log in &logs {
            prop_assert_eq!(log.lock().unwrap().len(), 1);
        }
    }
}
