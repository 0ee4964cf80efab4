use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::order_repository::{Order, OrderRepository};
use crate::database::payment_repository::{Payment, PaymentRepository};
use crate::database::repository::{TransactionManager, UnitOfWork};
use async_trait::async_trait;
use sqlx::Transaction as SqlxTransaction;
use sqlx::{PgConnection, PgPool, Postgres};
use std::time::Duration;
use tracing::{debug, error as log_error};
use uuid::Uuid;

/// Database transaction wrapper for atomic operations
/// Rolls back automatically when dropped before `commit`
pub struct DatabaseTransaction {
    transaction: Option<SqlxTransaction<'static, Postgres>>,
}

impl DatabaseTransaction {
    /// Begin a new transaction with a bounded statement timeout
    pub async fn begin(pool: &PgPool, statement_timeout: Duration) -> Result<Self, DatabaseError> {
        debug!("Beginning database transaction");

        let mut transaction = pool.begin().await.map_err(|e| {
            log_error!("Failed to begin transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(format!("{}ms", statement_timeout.as_millis()))
            .execute(&mut *transaction)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(Self {
            transaction: Some(transaction),
        })
    }

    /// Get the underlying connection for executing queries
    fn conn(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        match self.transaction.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(completed()),
        }
    }
}

fn completed() -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::TransactionError {
        message: "Transaction already completed".to_string(),
    })
}

#[async_trait]
impl UnitOfWork for DatabaseTransaction {
    async fn lock_payment_by_provider_order_id(
        &mut self,
        provider_order_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        PaymentRepository::lock_by_provider_order_id(self.conn()?, provider_order_id).await
    }

    async fn find_payment_by_order_id(
        &mut self,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        PaymentRepository::find_by_order_id(self.conn()?, order_id).await
    }

    async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        OrderRepository::lock_by_id(self.conn()?, order_id).await
    }

    async fn find_order(&mut self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        OrderRepository::find_by_id(self.conn()?, order_id).await
    }

    async fn find_orders_by_user(&mut self, user_id: Uuid) -> Result<Vec<Order>, DatabaseError> {
        OrderRepository::find_by_user_id(self.conn()?, user_id).await
    }

    async fn find_orders(&mut self, limit: i64, offset: i64) -> Result<Vec<Order>, DatabaseError> {
        OrderRepository::find_all(self.conn()?, limit, offset).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), DatabaseError> {
        OrderRepository::insert(self.conn()?, order).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError> {
        PaymentRepository::insert(self.conn()?, payment).await
    }

    async fn save_payment(&mut self, payment: &Payment) -> Result<(), DatabaseError> {
        PaymentRepository::update(self.conn()?, payment).await
    }

    async fn save_order(&mut self, order: &Order) -> Result<(), DatabaseError> {
        OrderRepository::update(self.conn()?, order).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        let tx = this.transaction.take().ok_or_else(completed)?;
        debug!("Committing transaction");

        tx.commit().await.map_err(|e| {
            log_error!("Failed to commit transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut this = self;
        let tx = this.transaction.take().ok_or_else(completed)?;
        debug!("Rolling back transaction");

        tx.rollback().await.map_err(|e| {
            log_error!("Failed to rollback transaction: {}", e);
            DatabaseError::from_sqlx(e)
        })
    }
}

/// Postgres-backed transaction manager
#[derive(Clone)]
pub struct PgTransactionManager {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgTransactionManager {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, DatabaseError> {
        let tx = DatabaseTransaction::begin(&self.pool, self.statement_timeout).await?;
        Ok(Box::new(tx))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        super::health_check(&self.pool).await
    }
}
