//! Property-based tests for BillingEngine.

use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use visadesk_shared::types::Currency;

use super::engine::{BillingEngine, EngineSettings};
use super::memory::MemoryStores;
use super::records::{Account, NewAccount};
use super::status::InvoiceStatus;
use super::store::{InvoiceStore, LedgerStore};
use super::types::{
    AccountKind, CollectionDraft, CollectionRef, InvoiceTerms, LineItem, NewInvoice, PaymentMethod,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn cents() -> impl Strategy<Value = Decimal> {
    (0i64..5_000_000).prop_map(|c| Decimal::new(c, 2))
}

fn status() -> impl Strategy<Value = InvoiceStatus> {
    prop_oneof![
        Just(InvoiceStatus::Draft),
        Just(InvoiceStatus::Sent),
        Just(InvoiceStatus::Paid),
        Just(InvoiceStatus::Cancelled),
    ]
}

async fn setup() -> (MemoryStores, BillingEngine, CollectionDraft, Account) {
    let stores = MemoryStores::new();
    let engine = BillingEngine::new(stores.engine_stores(), EngineSettings::default());
    let till = engine
        .register_account(NewAccount {
            name: "Ankara office till".to_string(),
            kind: AccountKind::CashRegister,
            initial_amounts: BTreeMap::new(),
        })
        .await
        .unwrap();
    let collection = CollectionRef {
        account_kind: AccountKind::CashRegister,
        account_id: till.id,
        payment_method: PaymentMethod::Cash,
    }
    .into();
    (stores, engine, collection, till)
}

fn new_invoice(price: Decimal) -> NewInvoice {
    NewInvoice {
        number: None,
        client_id: None,
        line_items: vec![LineItem::new("Residence permit file", Decimal::ONE, price)],
        terms: InvoiceTerms::plain(Currency::Try),
        issue_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
        due_date: None,
        notes: None,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// *For any* walk through the status machine, the account movement
    /// equals the grand total exactly when the invoice ends up paid, and
    /// a ledger transaction exists exactly then.
    #[test]
    fn prop_balance_tracks_paid_status(
        price in cents(),
        walk in prop::collection::vec(status(), 1..12),
    ) {
        runtime().block_on(async {
            let (stores, engine, collection, till) = setup().await;
            let invoice = engine.create_invoice(new_invoice(price)).await.unwrap();

            for target in walk {
                // Invalid moves are rejected without side effects.
                let _ = engine.transition(invoice.id, target, collection).await;
            }

            let stored = stores.invoices.get(invoice.id).await.unwrap().unwrap();
            let movement = engine.account(till.id).await.unwrap().movement(Currency::Try);
            let tx = stores.ledger.find_by_invoice(invoice.id).await.unwrap();

            if stored.status == InvoiceStatus::Paid {
                prop_assert_eq!(movement, invoice.totals.grand_total);
                prop_assert_eq!(tx.map(|t| t.id), stored.ledger_transaction_id);
                prop_assert!(stored.collection.is_some());
            } else {
                prop_assert_eq!(movement, Decimal::ZERO);
                prop_assert!(tx.is_none());
                prop_assert!(stored.collection.is_none());
                prop_assert!(stored.ledger_transaction_id.is_none());
            }
            prop_assert!(stores.ledger.len() <= 1);
            Ok(())
        })?;
    }

    /// *For any* number of repeated mark-as-paid requests, one transaction
    /// and one credit result.
    #[test]
    fn prop_mark_paid_is_idempotent(price in cents(), repeats in 1usize..6) {
        runtime().block_on(async {
            let (stores, engine, collection, till) = setup().await;
            let invoice = engine.create_invoice(new_invoice(price)).await.unwrap();

            for _ in 0..repeats {
                engine
                    .transition(invoice.id, InvoiceStatus::Paid, collection)
                    .await
                    .unwrap();
            }

            let movement = engine.account(till.id).await.unwrap().movement(Currency::Try);
            prop_assert_eq!(stores.ledger.len(), 1);
            prop_assert_eq!(movement, invoice.totals.grand_total);
            Ok(())
        })?;
    }

    /// *For any* set of invoices in any statuses, reconciling a consistent
    /// store changes nothing.
    #[test]
    fn prop_reconcile_is_noop_on_consistent_store(
        invoices in prop::collection::vec((cents(), status()), 1..6),
    ) {
        runtime().block_on(async {
            let (stores, engine, collection, till) = setup().await;
            for (price, target) in invoices {
                let invoice = engine.create_invoice(new_invoice(price)).await.unwrap();
                engine.transition(invoice.id, target, collection).await.unwrap();
            }
            let before = engine.account(till.id).await.unwrap();
            let ledger_before = stores.ledger.len();

            let report = engine.reconcile().await.unwrap();

            prop_assert!(report.is_clean());
            prop_assert_eq!(engine.account(till.id).await.unwrap(), before);
            prop_assert_eq!(stores.ledger.len(), ledger_before);
            Ok(())
        })?;
    }
}
