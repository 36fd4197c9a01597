//! End-to-end tests of the ledger pipeline.
//!
//! Tests: Caller → Engine → LedgerStore (commit) → Notifier → Hub / Dashboard
//!
//! Verifies:
//! - Payment sequences settle exactly and never over-pay
//! - Branch scoping of writes and reads
//! - Concurrent payments on one invoice serialize at the store
//! - Exactly one notification per committed operation, none on failure

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use serde_json::json;

    use posledger_auth::{Caller, Role};
    use posledger_catalog::{NewBranch, NewProduct, NewProductCategory};
    use posledger_core::{BranchId, InvoiceId, Money, ProductId, UserId};
    use posledger_events::{
        ChangeEvent, ChangeHub, ChangeKind, EntityKind, GroupName, Notifier, PushEventType, Scope,
        Topic,
    };
    use posledger_invoicing::{ItemRequest, PaymentRequest, PaymentStatus};

    use crate::engine::{CreateInvoice, EngineConfig, EngineError, InvoiceEngine, InvoiceQuery};
    use crate::ledger_store::{InMemoryLedgerStore, InvoiceFilter, LedgerStore};
    use crate::projections::{compute_snapshot, DashboardSnapshot};

    #[derive(Debug, Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<ChangeEvent>>,
    }

    impl RecordingNotifier {
        fn changes(&self) -> Vec<(EntityKind, ChangeKind)> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|c| (c.entity, c.change))
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, change: &ChangeEvent) {
            self.seen.lock().unwrap().push(change.clone());
        }
    }

    struct Fixture<N> {
        engine: Arc<InvoiceEngine<InMemoryLedgerStore, N>>,
        b1: BranchId,
        b2: BranchId,
        burger: ProductId,
        tea: ProductId,
        noodles: ProductId,
    }

    async fn fixture_with<N: Notifier>(notifier: N, config: EngineConfig) -> Fixture<N> {
        let store = InMemoryLedgerStore::new();
        let b1 = store.create_branch(NewBranch::new("Downtown")).await.unwrap().id;
        let b2 = store.create_branch(NewBranch::new("Airport")).await.unwrap().id;
        let food = store
            .create_category(NewProductCategory {
                branch_id: b1,
                name: "Food".into(),
            })
            .await
            .unwrap();
        let drinks = store
            .create_category(NewProductCategory {
                branch_id: b1,
                name: "Drinks".into(),
            })
            .await
            .unwrap();
        let other = store
            .create_category(NewProductCategory {
                branch_id: b2,
                name: "Food".into(),
            })
            .await
            .unwrap();
        let product = |category, name: &str, major| NewProduct {
            category_id: category,
            name: name.into(),
            price: Money::from_major(major),
            is_available: true,
        };
        let burger = store.create_product(product(food.id, "Burger", 100)).await.unwrap().id;
        let tea = store.create_product(product(drinks.id, "Tea", 10)).await.unwrap().id;
        let noodles = store.create_product(product(other.id, "Noodles", 50)).await.unwrap().id;

        Fixture {
            engine: Arc::new(InvoiceEngine::with_config(store, notifier, config)),
            b1,
            b2,
            burger,
            tea,
            noodles,
        }
    }

    async fn fixture() -> Fixture<Arc<RecordingNotifier>> {
        fixture_with(Arc::new(RecordingNotifier::default()), EngineConfig::default()).await
    }

    fn staff(id: i64, role: Role, branch: Option<BranchId>) -> Caller {
        Caller::new(UserId::new(id), role, branch)
    }

    fn admin() -> Caller {
        staff(1, Role::Admin, None)
    }

    fn one(product: ProductId, quantity: u32) -> Vec<ItemRequest> {
        vec![ItemRequest {
            product_id: product,
            quantity,
        }]
    }

    fn pay(major: i64) -> PaymentRequest {
        PaymentRequest::new(Money::from_major(major))
    }

    async fn open_hundred<N: Notifier>(fx: &Fixture<N>) -> InvoiceId {
        let counter = staff(3, Role::Counter, Some(fx.b1));
        fx.engine
            .create_invoice(&counter, CreateInvoice::new(one(fx.burger, 1)))
            .await
            .unwrap()
            .invoice
            .id_typed()
    }

    #[tokio::test]
    async fn payments_settle_exactly_and_never_overpay() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let id = open_hundred(&fx).await;

        let first = fx.engine.add_payment(&counter, id, pay(60)).await.unwrap();
        assert_eq!(first.invoice.paid_amount(), Money::from_major(60));
        assert_eq!(first.invoice.payment_status(), PaymentStatus::Partial);

        let second = fx.engine.add_payment(&counter, id, pay(40)).await.unwrap();
        assert_eq!(second.invoice.payment_status(), PaymentStatus::Paid);
        assert_eq!(second.invoice.due_amount(), Money::ZERO);

        let err = fx.engine.add_payment(&counter, id, pay(1)).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::StateConflict("invoice is already fully paid".into())
        );

        let detail = fx.engine.get_invoice(&counter, id).await.unwrap();
        let recorded: Money = detail.payments.iter().map(|p| p.amount).sum();
        assert_eq!(recorded, detail.invoice.paid_amount());
        assert_eq!(detail.payments.len(), 2);
    }

    #[tokio::test]
    async fn overpayment_and_non_positive_amounts_are_rejected() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let id = open_hundred(&fx).await;

        let err = fx.engine.add_payment(&counter, id, pay(150)).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(ref m) if m.contains("exceeds due amount")));

        let err = fx.engine.add_payment(&counter, id, pay(0)).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "amount"));

        let detail = fx.engine.get_invoice(&counter, id).await.unwrap();
        assert_eq!(detail.invoice.paid_amount(), Money::ZERO);
        assert!(detail.payments.is_empty());
    }

    #[tokio::test]
    async fn creation_computes_totals_and_generates_numbers() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let mut cmd = CreateInvoice::new(vec![
            ItemRequest {
                product_id: fx.burger,
                quantity: 2,
            },
            ItemRequest {
                product_id: fx.tea,
                quantity: 3,
            },
        ]);
        cmd.notes = Some("table 4".into());

        let detail = fx.engine.create_invoice(&counter, cmd).await.unwrap();
        assert_eq!(detail.invoice.branch_id(), fx.b1);
        assert_eq!(detail.invoice.subtotal(), Money::from_major(230));
        assert_eq!(detail.invoice.total_amount(), Money::from_major(230));
        assert_eq!(detail.invoice.payment_status(), PaymentStatus::Unpaid);
        assert!(detail.invoice.invoice_number().starts_with("INV-"));
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.invoice.created_by(), Some(UserId::new(3)));
    }

    #[tokio::test]
    async fn creation_validates_branch_items_and_numbers() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));

        let err = fx
            .engine
            .create_invoice(&counter, CreateInvoice::new(Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "items"));

        // Product of another branch.
        let err = fx
            .engine
            .create_invoice(&counter, CreateInvoice::new(one(fx.noodles, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "product"));

        let err = fx
            .engine
            .create_invoice(&counter, CreateInvoice::new(one(fx.burger, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "quantity"));

        // Global callers must say where.
        let err = fx
            .engine
            .create_invoice(&admin(), CreateInvoice::new(one(fx.burger, 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "branch_id"));

        let mut numbered = CreateInvoice::new(one(fx.burger, 1));
        numbered.invoice_number = Some("T-001".into());
        fx.engine.create_invoice(&counter, numbered.clone()).await.unwrap();
        let err = fx.engine.create_invoice(&counter, numbered).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "invoice_number"));

        assert!(
            fx.engine
                .list_invoices(&admin(), &InvoiceQuery::default())
                .await
                .unwrap()
                .len()
                == 1
        );
    }

    #[tokio::test]
    async fn managers_cannot_write_into_other_branches() {
        let fx = fixture().await;
        let manager_b2 = staff(4, Role::BranchManager, Some(fx.b2));

        let err = fx
            .engine
            .create_invoice(&manager_b2, CreateInvoice::new(one(fx.burger, 1)).in_branch(fx.b1))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));

        let id = open_hundred(&fx).await;
        let err = fx.engine.add_payment(&manager_b2, id, pay(10)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        let err = fx.engine.get_invoice(&manager_b2, id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let admin_sees = fx.engine.get_invoice(&admin(), id).await.unwrap();
        assert_eq!(admin_sees.invoice.paid_amount(), Money::ZERO);
    }

    #[tokio::test]
    async fn kitchen_staff_cannot_query_the_ledger() {
        let fx = fixture().await;
        let id = open_hundred(&fx).await;
        let kitchen = staff(9, Role::Kitchen, Some(fx.b1));

        let err = fx.engine.get_invoice(&kitchen, id).await.unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
        let err = fx
            .engine
            .list_invoices(&kitchen, &InvoiceQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));
    }

    #[tokio::test]
    async fn paid_invoices_cannot_be_deleted_and_deletes_cascade() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let manager = staff(4, Role::BranchManager, Some(fx.b1));

        let paid = open_hundred(&fx).await;
        fx.engine.add_payment(&counter, paid, pay(100)).await.unwrap();
        let err = fx.engine.delete_invoice(&admin(), paid).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::StateConflict("cannot delete a paid invoice".into())
        );

        let partial = open_hundred(&fx).await;
        fx.engine.add_payment(&counter, partial, pay(30)).await.unwrap();

        let err = fx.engine.delete_invoice(&manager, partial).await.unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));

        fx.engine.delete_invoice(&admin(), partial).await.unwrap();
        let err = fx.engine.get_invoice(&admin(), partial).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let lines = fx
            .engine
            .store()
            .sales_lines(&InvoiceFilter::all())
            .await
            .unwrap();
        assert!(lines.iter().all(|l| l.invoice_id != partial));
        let err = fx.engine.delete_invoice(&admin(), partial).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn patches_respect_allow_list_and_pricing_rights() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let manager = staff(4, Role::BranchManager, Some(fx.b1));
        let id = open_hundred(&fx).await;

        let notes = json!({"notes": "no onions", "order_status": "PREPARING"});
        let err = fx
            .engine
            .patch_invoice(&counter, id, notes.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));

        let patched = fx
            .engine
            .patch_invoice(&manager, id, notes.as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(patched.notes(), Some("no onions"));

        let pricing = json!({"discount": 20});
        let err = fx
            .engine
            .patch_invoice(&manager, id, pricing.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));

        let unknown = json!({"total_amount": 1});
        let err = fx
            .engine
            .patch_invoice(&manager, id, unknown.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "total_amount"));

        fx.engine.add_payment(&counter, id, pay(50)).await.unwrap();
        let repriced = fx
            .engine
            .patch_invoice(&admin(), id, json!({"discount": 50}).as_object().unwrap())
            .await
            .unwrap();
        assert_eq!(repriced.total_amount(), Money::from_major(50));
        assert_eq!(repriced.payment_status(), PaymentStatus::Paid);

        let err = fx
            .engine
            .patch_invoice(&manager, id, notes.as_object().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[tokio::test]
    async fn cancelled_invoices_refuse_payments() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let manager = staff(4, Role::BranchManager, Some(fx.b1));
        let id = open_hundred(&fx).await;

        let err = fx.engine.cancel_invoice(&counter, id).await.unwrap_err();
        assert!(matches!(err, EngineError::Authorization(_)));

        let cancelled = fx.engine.cancel_invoice(&manager, id).await.unwrap();
        assert_eq!(cancelled.payment_status(), PaymentStatus::Cancelled);

        let err = fx.engine.add_payment(&counter, id, pay(10)).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::StateConflict("cannot register payment on a cancelled invoice".into())
        );
        let err = fx.engine.cancel_invoice(&manager, id).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));
    }

    #[tokio::test]
    async fn item_changes_reprice_the_invoice() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let manager = staff(4, Role::BranchManager, Some(fx.b1));
        let id = open_hundred(&fx).await;

        let detail = fx.engine.add_items(&counter, id, one(fx.tea, 2)).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.invoice.total_amount(), Money::from_major(120));

        fx.engine.add_payment(&counter, id, pay(60)).await.unwrap();

        let tea_line = detail
            .items
            .iter()
            .find(|i| i.product_id == fx.tea)
            .unwrap()
            .id;
        let burger_line = detail
            .items
            .iter()
            .find(|i| i.product_id == fx.burger)
            .unwrap()
            .id;

        let invoice = fx.engine.remove_item(&manager, id, tea_line).await.unwrap();
        assert_eq!(invoice.total_amount(), Money::from_major(100));
        assert_eq!(invoice.payment_status(), PaymentStatus::Partial);

        // Removing the burger would leave a total of 0 under 60 already paid.
        let err = fx.engine.remove_item(&manager, id, burger_line).await.unwrap_err();
        assert!(matches!(err, EngineError::StateConflict(_)));

        let err = fx.engine.remove_item(&manager, id, tea_line).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn out_of_range_subtotals_are_rejected_without_side_effects() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let store = fx.engine.store();
        let premium = store
            .create_category(NewProductCategory {
                branch_id: fx.b1,
                name: "Premium".into(),
            })
            .await
            .unwrap();
        let pricey = store
            .create_product(NewProduct {
                category_id: premium.id,
                name: "Gold Platter".into(),
                price: Money::from_major(10_000_000),
                is_available: true,
            })
            .await
            .unwrap()
            .id;
        let huge = vec![
            ItemRequest {
                product_id: pricey,
                quantity: u32::MAX,
            };
            3
        ];

        let err = fx
            .engine
            .create_invoice(&counter, CreateInvoice::new(huge.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "items"));
        assert!(store.list_invoices(&InvoiceFilter::all()).await.unwrap().is_empty());

        let id = open_hundred(&fx).await;
        let err = fx.engine.add_items(&counter, id, huge).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "items"));
        let detail = fx.engine.get_invoice(&counter, id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.invoice.total_amount(), Money::from_major(100));
    }

    #[tokio::test]
    async fn one_notification_per_committed_operation() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fx = fixture_with(Arc::clone(&notifier), EngineConfig::default()).await;
        let counter = staff(3, Role::Counter, Some(fx.b1));

        let id = open_hundred(&fx).await;
        fx.engine.add_payment(&counter, id, pay(100)).await.unwrap();
        // Rejected: nothing committed, nothing announced.
        fx.engine.add_payment(&counter, id, pay(1)).await.unwrap_err();
        fx.engine.delete_invoice(&admin(), id).await.unwrap_err();

        assert_eq!(
            notifier.changes(),
            vec![
                (EntityKind::Invoice, ChangeKind::Created),
                (EntityKind::Payment, ChangeKind::Created),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_full_payments_admit_exactly_one() {
        let fx = fixture().await;
        let id = open_hundred(&fx).await;

        let attempts: Vec<_> = (0..2)
            .map(|n| {
                let engine = Arc::clone(&fx.engine);
                let caller = staff(10 + n, Role::Counter, Some(fx.b1));
                tokio::spawn(async move { engine.add_payment(&caller, id, pay(100)).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => ok += 1,
                Err(EngineError::StateConflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((ok, conflicts), (1, 1));

        let detail = fx.engine.get_invoice(&admin(), id).await.unwrap();
        assert_eq!(detail.invoice.paid_amount(), Money::from_major(100));
        assert_eq!(detail.payments.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn settling_payment_racing_a_small_one_admits_exactly_one() {
        let fx = fixture().await;

        for round in 0..25 {
            let id = open_hundred(&fx).await;
            let attempts: Vec<_> = [100, 1]
                .into_iter()
                .enumerate()
                .map(|(n, amount)| {
                    let engine = Arc::clone(&fx.engine);
                    let caller = staff(30 + n as i64, Role::Counter, Some(fx.b1));
                    tokio::spawn(async move { engine.add_payment(&caller, id, pay(amount)).await })
                })
                .collect();

            let mut ok = 0;
            for attempt in attempts {
                match attempt.await.unwrap() {
                    Ok(_) => ok += 1,
                    Err(EngineError::StateConflict(message)) => assert!(
                        message.contains("exceeds due amount")
                            || message.contains("already fully paid"),
                        "round {round}: {message}"
                    ),
                    Err(other) => panic!("round {round}: unexpected error: {other:?}"),
                }
            }
            assert_eq!(ok, 1, "round {round}");

            let detail = fx.engine.get_invoice(&admin(), id).await.unwrap();
            let recorded: Money = detail.payments.iter().map(|p| p.amount).sum();
            assert_eq!(detail.payments.len(), 1, "round {round}");
            assert_eq!(recorded, detail.invoice.paid_amount(), "round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_partial_payments_all_land() {
        let config = EngineConfig {
            max_conflict_retries: 100,
        };
        let fx = fixture_with(Arc::new(RecordingNotifier::default()), config).await;
        let id = open_hundred(&fx).await;

        let attempts: Vec<_> = (0..10)
            .map(|n| {
                let engine = Arc::clone(&fx.engine);
                let caller = staff(20 + n, Role::Waiter, Some(fx.b1));
                tokio::spawn(async move { engine.add_payment(&caller, id, pay(10)).await })
            })
            .collect();
        for attempt in attempts {
            attempt.await.unwrap().unwrap();
        }

        let detail = fx.engine.get_invoice(&admin(), id).await.unwrap();
        assert_eq!(detail.invoice.paid_amount(), Money::from_major(100));
        assert_eq!(detail.invoice.payment_status(), PaymentStatus::Paid);
        assert_eq!(detail.payments.len(), 10);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_callers_branch() {
        let fx = fixture().await;
        open_hundred(&fx).await;
        let manager_b2 = staff(4, Role::BranchManager, Some(fx.b2));
        fx.engine
            .create_invoice(&manager_b2, CreateInvoice::new(one(fx.noodles, 1)))
            .await
            .unwrap();

        let all = fx
            .engine
            .list_invoices(&admin(), &InvoiceQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let mine = fx
            .engine
            .list_invoices(&manager_b2, &InvoiceQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].branch_id(), fx.b2);

        let waiter = staff(5, Role::Waiter, Some(fx.b1));
        let today = fx
            .engine
            .list_invoices(&waiter, &InvoiceQuery::default())
            .await
            .unwrap();
        assert_eq!(today.len(), 1);

        let paid_only = InvoiceQuery {
            status: Some(PaymentStatus::Paid),
            ..InvoiceQuery::default()
        };
        assert!(fx.engine.list_invoices(&admin(), &paid_only).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hub_pushes_committed_changes_to_matching_groups() {
        let hub = ChangeHub::new(16);
        let fx = fixture_with(hub.clone(), EngineConfig::default()).await;
        let counter = staff(3, Role::Counter, Some(fx.b1));

        let mut kitchen_b1 = hub.subscribe(&[GroupName::new(Topic::KitchenOrders, Scope::Branch(fx.b1))]);
        let mut orders_all = hub.subscribe(&[GroupName::new(Topic::Orders, Scope::Global)]);
        let mut kitchen_b2 = hub.subscribe(&[GroupName::new(Topic::KitchenOrders, Scope::Branch(fx.b2))]);

        let id = open_hundred(&fx).await;
        fx.engine.add_payment(&counter, id, pay(60)).await.unwrap();

        for session in [&mut kitchen_b1, &mut orders_all] {
            let created = session.recv().await.unwrap();
            assert_eq!(created.event_type, PushEventType::InvoiceCreated);
            assert_eq!(created.invoice_id, id);
            assert_eq!(created.status, None);

            let paid = session.recv().await.unwrap();
            assert_eq!(paid.event_type, PushEventType::InvoiceUpdated);
            assert_eq!(paid.status.as_deref(), Some("PARTIAL"));
        }
        assert!(kitchen_b2.try_recv().is_none());
    }

    #[tokio::test]
    async fn watermarks_detect_changes_in_their_scope_only() {
        let hub = ChangeHub::default();
        let fx = fixture_with(hub.clone(), EngineConfig::default()).await;

        let mut global = hub.watermark(Scope::Global);
        let mut branch1 = hub.watermark(Scope::Branch(fx.b1));
        let branch2 = hub.watermark(Scope::Branch(fx.b2));

        open_hundred(&fx).await;

        let observed = global.pending(hub.version(Scope::Global)).unwrap();
        global.advance(observed);
        assert!(global.pending(hub.version(Scope::Global)).is_none());

        assert!(branch1.pending(hub.version(Scope::Branch(fx.b1))).is_some());
        branch1.advance(hub.version(Scope::Branch(fx.b1)));
        assert!(branch2.pending(hub.version(Scope::Branch(fx.b2))).is_none());

        // Failed operations leave every counter alone.
        let counter = staff(3, Role::Counter, Some(fx.b1));
        fx.engine
            .add_payment(&counter, InvoiceId::new(999), pay(1))
            .await
            .unwrap_err();
        assert!(branch1.pending(hub.version(Scope::Branch(fx.b1))).is_none());
    }

    #[tokio::test]
    async fn dashboard_reflects_committed_sales() {
        let fx = fixture().await;
        let counter = staff(3, Role::Counter, Some(fx.b1));
        let manager = staff(4, Role::BranchManager, Some(fx.b1));

        let paid = open_hundred(&fx).await;
        fx.engine.add_payment(&counter, paid, pay(60)).await.unwrap();
        let cancelled = open_hundred(&fx).await;
        fx.engine.cancel_invoice(&manager, cancelled).await.unwrap();

        let snapshot = compute_snapshot(fx.engine.store(), Scope::Branch(fx.b1), Utc::now())
            .await
            .unwrap();
        let DashboardSnapshot::Branch(branch) = snapshot else {
            panic!("expected a branch snapshot");
        };
        assert_eq!(branch.today_sales, Money::from_major(100));
        assert_eq!(branch.today_collected, Money::from_major(60));
        assert_eq!(branch.total_orders, 1);
        assert_eq!(branch.top_selling_items[0].product_name, "Burger");
        assert_eq!(branch.sales_by_category[0].category_name, "Food");
        assert_eq!(branch.peak_hours.len(), 1);

        let snapshot = compute_snapshot(fx.engine.store(), Scope::Global, Utc::now())
            .await
            .unwrap();
        let DashboardSnapshot::Global(global) = snapshot else {
            panic!("expected a global snapshot");
        };
        assert_eq!(global.total_sales, Money::from_major(100));
        assert_eq!(global.total_branch, 2);
        assert_eq!(global.total_count_order, 1);
        assert_eq!(global.average_order_value, Money::from_major(100));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn any_payment_sequence_keeps_paid_within_total(amounts in prop::collection::vec(1i64..80, 1..8)) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                rt.block_on(async {
                    let fx = fixture().await;
                    let counter = staff(3, Role::Counter, Some(fx.b1));
                    let id = open_hundred(&fx).await;

                    let mut expected = Money::ZERO;
                    for major in amounts {
                        let amount = Money::from_major(major);
                        match fx.engine.add_payment(&counter, id, PaymentRequest::new(amount)).await {
                            Ok(_) => expected += amount,
                            Err(EngineError::StateConflict(_)) => {
                                assert!(expected + amount > Money::from_major(100));
                            }
                            Err(other) => panic!("unexpected error: {other:?}"),
                        }
                    }

                    let detail = fx.engine.get_invoice(&counter, id).await.unwrap();
                    assert_eq!(detail.invoice.paid_amount(), expected);
                    assert!(detail.invoice.paid_amount() <= detail.invoice.total_amount());
                    assert_eq!(
                        detail.invoice.payment_status(),
                        PaymentStatus::derive(expected, detail.invoice.total_amount())
                    );
                });
            }
        }
    }
}
