//! Integration tests against a live Postgres.
//!
//! These need a reachable database and are ignored by default.
//! Run with: DATABASE_URL=postgres://... cargo test --test postgres_test -- --ignored

use chrono::Duration as ChronoDuration;
use fulfillment_backend::database::order_repository::{
    Order, OrderItem, OrderPaymentStatus, OrderStatus, PaymentMethod,
};
use fulfillment_backend::database::payment_repository::{Payment, PaymentStatus};
use fulfillment_backend::database::repository::TransactionManager;
use fulfillment_backend::database::transaction::PgTransactionManager;
use fulfillment_backend::database::{init_pool, run_migrations, PoolConfig};
use fulfillment_backend::error::{AppError, AppResult};
use fulfillment_backend::orders::{Caller, OrderService};
use fulfillment_backend::payments::coordinator::{direct_canonical, INVALID_SIGNATURE_REASON};
use fulfillment_backend::payments::signature::{self, OrderSecret};
use fulfillment_backend::payments::{
    CompletionNotice, CompletionOutcome, TransitionCoordinator, Verification,
};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const ORDER_SECRET: &str = "order-verification-secret";

async fn setup_store() -> Arc<PgTransactionManager> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = init_pool(&database_url, Some(PoolConfig::default()))
        .await
        .expect("Failed to init DB pool");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Arc::new(PgTransactionManager::new(pool, Duration::from_secs(5)))
}

fn fresh_provider_order_id() -> String {
    format!("order_{}", Uuid::new_v4().simple())
}

/// Record a CREATED online order of 600 with its PENDING payment
async fn checkout(orders: &OrderService, provider_order_id: &str) -> AppResult<Order> {
    let order = Order::new(
        Uuid::new_v4(),
        vec![
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 2,
                unit_price: 250,
                size: "L".to_string(),
                color: "black".to_string(),
            },
            OrderItem {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: 100,
                size: "S".to_string(),
                color: "white".to_string(),
            },
        ],
        PaymentMethod::Online,
    );
    let payment = Payment::pending(
        order.id,
        provider_order_id,
        order.total_amount,
        "INR",
        Some(format!("rcpt_{}", order.id)),
    );
    orders.record_checkout(order, Some(payment)).await
}

fn notice(provider_order_id: &str, provider_payment_id: &str) -> CompletionNotice {
    CompletionNotice {
        provider_order_id: provider_order_id.to_string(),
        provider_payment_id: provider_payment_id.to_string(),
        signature: signature::sign(
            &signature::direct_canonical_message(provider_order_id, provider_payment_id),
            ORDER_SECRET.as_bytes(),
        ),
    }
}

fn owner(order: &Order) -> Caller {
    Caller {
        user_id: order.user_id,
        is_admin: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_completions_apply_exactly_once() {
    let store = setup_store().await;
    let orders = OrderService::new(store.clone(), Duration::from_secs(5));
    let coordinator = Arc::new(TransitionCoordinator::new(
        store.clone(),
        Duration::from_secs(5),
    ));
    let provider_order_id = fresh_provider_order_id();
    let order = checkout(&orders, &provider_order_id).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let coordinator = coordinator.clone();
        let notice = notice(&provider_order_id, &format!("pay_{}", i));
        handles.push(tokio::spawn(async move {
            let secret = OrderSecret::new(SecretString::new(ORDER_SECRET.to_string()));
            coordinator
                .apply_completion(
                    &notice,
                    Verification::Signed {
                        secret: &secret,
                        canonical: direct_canonical,
                    },
                )
                .await
        }));
    }

    let mut completed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            CompletionOutcome::Completed(_) => completed += 1,
            CompletionOutcome::AlreadyCompleted(settlement) => {
                assert_eq!(settlement.order_id, order.id)
            }
        }
    }
    assert_eq!(completed, 1);

    let details = orders.get_order(order.id, &owner(&order)).await.unwrap();
    let payment = details.payment.unwrap();
    let paid_at = details.order.paid_at.unwrap();

    assert_eq!(details.order.items, order.items);
    assert_eq!(details.order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(details.order.order_status, OrderStatus::Processing);
    assert_eq!(
        details.order.deliver_at,
        Some(paid_at + ChronoDuration::days(7))
    );
    assert_eq!(payment.status, PaymentStatus::Success);
    assert!(payment.is_verified);
    assert_eq!(payment.paid_at, Some(paid_at));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn test_signature_mismatch_commits_failed_payment_only() {
    let store = setup_store().await;
    let orders = OrderService::new(store.clone(), Duration::from_secs(5));
    let coordinator = TransitionCoordinator::new(store.clone(), Duration::from_secs(5));
    let secret = OrderSecret::new(SecretString::new(ORDER_SECRET.to_string()));
    let provider_order_id = fresh_provider_order_id();
    let order = checkout(&orders, &provider_order_id).await.unwrap();
    let tampered = CompletionNotice {
        signature: "00".to_string(),
        ..notice(&provider_order_id, "pay_1")
    };

    let err = coordinator
        .apply_completion(
            &tampered,
            Verification::Signed {
                secret: &secret,
                canonical: direct_canonical,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VerificationFailed));

    let mut uow = store.begin().await.unwrap();
    let payment = uow
        .lock_payment_by_provider_order_id(&provider_order_id)
        .await
        .unwrap()
        .unwrap();
    let stored = uow.find_order(order.id).await.unwrap().unwrap();
    uow.rollback().await.unwrap();

    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.failure_reason.as_deref(), Some(INVALID_SIGNATURE_REASON));
    assert_eq!(stored.payment_status, OrderPaymentStatus::Pending);
    assert_eq!(stored.order_status, OrderStatus::Created);
    assert!(stored.paid_at.is_none());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore]
async fn test_duplicate_provider_order_id_is_conflict() {
    let store = setup_store().await;
    let orders = OrderService::new(store.clone(), Duration::from_secs(5));
    let provider_order_id = fresh_provider_order_id();
    checkout(&orders, &provider_order_id).await.unwrap();

    let err = checkout(&orders, &provider_order_id).await.unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
}
