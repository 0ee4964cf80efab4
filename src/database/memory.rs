//! In-memory store with serializable units of work.
//!
//! A unit of work holds the single store lock for its whole lifetime and
//! mutates a staged copy of the tables. `commit` swaps the staged copy in;
//! anything else leaves the committed tables untouched.

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order_repository::Order;
use crate::database::payment_repository::Payment;
use crate::database::repository::{TransactionManager, UnitOfWork};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct Tables {
    payments: HashMap<Uuid, Payment>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    committed_writes: Arc<AtomicU64>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of row writes made durable by committed units of work
    pub fn committed_writes(&self) -> u64 {
        self.committed_writes.load(Ordering::SeqCst)
    }

    /// Make the next commit fail with a retryable transaction error
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed snapshot of a payment
    pub async fn payment(&self, provider_order_id: &str) -> Option<Payment> {
        self.tables
            .lock()
            .await
            .payments
            .values()
            .find(|p| p.provider_order_id == provider_order_id)
            .cloned()
    }

    /// Committed snapshot of an order
    pub async fn order(&self, order_id: Uuid) -> Option<Order> {
        self.tables.lock().await.orders.get(&order_id).cloned()
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    writes: u64,
    committed_writes: Arc<AtomicU64>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryUnitOfWork {
    fn write(&mut self) {
        self.writes += 1;
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_payment_by_provider_order_id(
        &mut self,
        provider_order_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .staged
            .payments
            .values()
            .find(|p| p.provider_order_id == provider_order_id)
            .cloned())
    }

    async fn find_payment_by_order_id(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .staged
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    // the store lock already serializes units of work, so reads and locks coincide
    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.staged.orders.get(&order_id).cloned())
    }

    async fn find_orders_by_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, DatabaseError> {
        let mut orders: Vec<Order> = self
            .staged
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_orders(&mut self, limit: i64, offset: i64) -> Result<Vec<Order>, DatabaseError> {
        let mut orders: Vec<Order> = self.staged.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), DatabaseError> {
        if self.staged.orders.contains_key(&order.id) {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueConstraintViolation {
                column: "id".to_string(),
                value: order.id.to_string(),
            }));
        }
        self.staged.orders.insert(order.id, order.clone());
        self.write();
        Ok(())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError> {
        let duplicate = self
            .staged
            .payments
            .values()
            .any(|p| p.id == payment.id || p.provider_order_id == payment.provider_order_id);
        if duplicate {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueConstraintViolation {
                column: "provider_order_id".to_string(),
                value: payment.provider_order_id.clone(),
            }));
        }
        if !self.staged.orders.contains_key(&payment.order_id) {
            return Err(DatabaseError::new(DatabaseErrorKind::ForeignKeyViolation {
                table: "payments".to_string(),
                column: "order_id".to_string(),
            }));
        }
        self.staged.payments.insert(payment.id, payment.clone());
        self.write();
        Ok(())
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError> {
        let row = self
            .staged
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| {
                DatabaseError::not_found("Payment", payment.id).with_context("update matched no rows")
            })?;
        *row = Payment {
            updated_at: Utc::now(),
            ..payment.clone()
        };
        self.write();
        Ok(())
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), DatabaseError> {
        let row = self
            .staged
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| {
                DatabaseError::not_found("Order", order.id).with_context("update matched no rows")
            })?;
        *row = Order {
            updated_at: Utc::now(),
            ..order.clone()
        };
        self.write();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = *self;
        if this.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::TransactionError {
                message: "injected commit failure".to_string(),
            }));
        }
        *this.guard = this.staged;
        this.committed_writes.fetch_add(this.writes, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionManager for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            writes: 0,
            committed_writes: self.committed_writes.clone(),
            fail_next_commit: self.fail_next_commit.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::order_repository::PaymentMethod;

    #[tokio::test]
    async fn test_uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::CashOnDelivery);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();
        drop(uow);

        assert!(store.order(order.id).await.is_none());
        assert_eq!(store.committed_writes(), 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::Online);
        let payment = Payment::pending(order.id, "order_M1", 0, "INR", None);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();
        uow.insert_payment(&payment).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(store.payment("order_M1").await.unwrap().order_id, order.id);
        assert_eq!(store.committed_writes(), 2);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_rolls_back() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::CashOnDelivery);
        store.fail_next_commit();

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();
        let err = uow.commit().await.unwrap_err();

        assert!(err.is_retryable());
        assert!(store.order(order.id).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_provider_order_id_is_rejected() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::Online);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();
        uow.insert_payment(&Payment::pending(order.id, "order_D1", 0, "INR", None))
            .await
            .unwrap();
        let err = uow
            .insert_payment(&Payment::pending(order.id, "order_D1", 0, "INR", None))
            .await
            .unwrap_err();

        assert!(err.is_constraint_violation());
    }

    #[tokio::test]
    async fn test_saving_unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::Online);

        let mut uow = store.begin().await.unwrap();
        let err = uow.save_order(&order).await.unwrap_err();

        assert!(matches!(err.kind, DatabaseErrorKind::NotFound { .. }));
        assert_eq!(err.context.as_deref(), Some("update matched no rows"));
    }

    #[tokio::test]
    async fn test_find_order_sees_staged_writes() {
        let store = MemoryStore::new();
        let order = Order::new(Uuid::new_v4(), vec![], PaymentMethod::Online);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order).await.unwrap();

        assert_eq!(uow.find_order(order.id).await.unwrap(), Some(order.clone()));
        assert_eq!(uow.find_order(Uuid::new_v4()).await.unwrap(), None);
    }
}
