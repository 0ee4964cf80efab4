use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

/// Payment status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

/// Payment entity for an online order
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub provider_order_id: String,
    pub provider_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub provider_signature: Option<String>,
    /// Amount in the smallest currency unit
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub is_verified: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub receipt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Build a PENDING payment as produced by checkout
    pub fn pending(
        order_id: Uuid,
        provider_order_id: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        receipt: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider_order_id: provider_order_id.into(),
            provider_payment_id: None,
            provider_signature: None,
            amount,
            currency: currency.into(),
            status: PaymentStatus::Pending,
            failure_reason: None,
            is_verified: false,
            paid_at: None,
            receipt,
            created_at: now,
            updated_at: now,
        }
    }
}

const PAYMENT_COLUMNS: &str = "id, order_id, provider_order_id, provider_payment_id, provider_signature, \
     amount, currency, status, failure_reason, is_verified, paid_at, receipt, created_at, updated_at";

/// Repository for payment rows. Every query runs on the caller's connection so
/// it can take part in an open transaction.
pub struct PaymentRepository;

impl PaymentRepository {
    /// Load a payment by provider order id and lock the row until the transaction ends
    pub async fn lock_by_provider_order_id(
        conn: &mut PgConnection,
        provider_order_id: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE provider_order_id = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(provider_order_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Find the payment belonging to an order
    pub async fn find_by_order_id(
        conn: &mut PgConnection,
        order_id: Uuid,
    ) -> Result<Option<Payment>, DatabaseError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {} FROM payments WHERE order_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn insert(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO payments
             (id, order_id, provider_order_id, provider_payment_id, provider_signature, amount, currency,
              status, failure_reason, is_verified, paid_at, receipt, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(&payment.provider_order_id)
        .bind(&payment.provider_payment_id)
        .bind(&payment.provider_signature)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status)
        .bind(&payment.failure_reason)
        .bind(payment.is_verified)
        .bind(payment.paid_at)
        .bind(&payment.receipt)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Persist the mutable fields of a payment. Amount, currency, order and
    /// provider order id are immutable and never written here.
    pub async fn update(conn: &mut PgConnection, payment: &Payment) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE payments
             SET provider_payment_id = $1, provider_signature = $2, status = $3, failure_reason = $4,
                 is_verified = $5, paid_at = $6, updated_at = NOW()
             WHERE id = $7",
        )
        .bind(&payment.provider_payment_id)
        .bind(&payment.provider_signature)
        .bind(payment.status)
        .bind(&payment.failure_reason)
        .bind(payment.is_verified)
        .bind(payment.paid_at)
        .bind(payment.id)
        .execute(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(
                DatabaseError::not_found("Payment", payment.id).with_context("update matched no rows")
            );
        }
        Ok(())
    }
}
