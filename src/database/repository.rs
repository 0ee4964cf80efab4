use crate::database::error::DatabaseError;
use crate::database::order_repository::Order;
use crate::database::payment_repository::Payment;
use async_trait::async_trait;
use uuid::Uuid;

/// A single atomic unit of work over payments and orders.
///
/// Rows read through the `lock_*` methods stay locked until `commit` or
/// `rollback`. Dropping a unit of work without committing discards every
/// write made through it.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Load a payment by its provider order id, locking it for this unit of work
    async fn lock_payment_by_provider_order_id(
        &mut self,
        provider_order_id: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Find the payment attached to an order
    async fn find_payment_by_order_id(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Load an order by id, locking it for this unit of work
    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError>;

    /// Read an order by id without taking a row lock
    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError>;

    /// Orders owned by a user, newest first
    async fn find_orders_by_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, DatabaseError>;

    /// All orders, newest first
    async fn find_orders(&mut self, limit: i64, offset: i64) -> Result<Vec<Order>, DatabaseError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), DatabaseError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError>;

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError>;

    async fn save_order(&mut self, order: &Order) -> Result<(), DatabaseError>;

    /// Make every write of this unit of work durable and visible
    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    /// Discard every write of this unit of work
    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}

/// Opens units of work against a backing store
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError>;

    /// Check that the backing store is reachable
    async fn ping(&self) -> Result<(), DatabaseError>;
}
