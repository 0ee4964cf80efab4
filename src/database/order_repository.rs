use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};
use std::fmt;
use uuid::Uuid;

/// How the customer pays for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CashOnDelivery,
    Online,
}

/// Payment state as seen from the order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// Fulfillment state of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Processing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refund flag raised when a paid online order is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Pending,
    Processed,
}

/// Line item captured at checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    /// Unit price in the smallest currency unit
    pub unit_price: i64,
    pub size: String,
    pub color: String,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// Order entity
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(json)]
    pub items: Vec<OrderItem>,
    pub total_amount: i64,
    pub payment_method: PaymentMethod,
    pub payment_status: OrderPaymentStatus,
    pub order_status: OrderStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub deliver_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub refund_status: Option<RefundStatus>,
    pub is_refund_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Build a freshly created order; the total is computed from the items
    pub fn new(user_id: Uuid, items: Vec<OrderItem>, payment_method: PaymentMethod) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: Uuid::new_v4(),
            user_id,
            items,
            total_amount,
            payment_method,
            payment_status: OrderPaymentStatus::Pending,
            order_status: OrderStatus::Created,
            paid_at: None,
            deliver_at: None,
            canceled_at: None,
            refund_status: None,
            is_refund_requested: false,
            created_at: now,
            updated_at: now,
        }
    }
}

const ORDER_COLUMNS: &str = "id, user_id, items, total_amount, payment_method, payment_status, order_status, \
     paid_at, deliver_at, canceled_at, refund_status, is_refund_requested, created_at, updated_at";

/// Repository for order rows, always executed on the caller's connection
pub struct OrderRepository;

impl OrderRepository {
    /// Load an order and lock the row until the transaction ends
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = $1 FOR UPDATE",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Orders placed by a user, newest first
    pub async fn find_by_user_id(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn find_all(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ORDER_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    pub async fn insert(conn: &mut PgConnection, order: &Order) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO orders
             (id, user_id, items, total_amount, payment_method, payment_status, order_status, paid_at,
              deliver_at, canceled_at, refund_status, is_refund_requested, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(sqlx::types::Json(&order.items))
        .bind(order.total_amount)
        .bind(order.payment_method)
        .bind(order.payment_status)
        .bind(order.order_status)
        .bind(order.paid_at)
        .bind(order.deliver_at)
        .bind(order.canceled_at)
        .bind(order.refund_status)
        .bind(order.is_refund_requested)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Persist the status and timestamp fields of an order. Items, owner,
    /// total and payment method are immutable after creation.
    pub async fn update(conn: &mut PgConnection, order: &Order) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders
             SET payment_status = $1, order_status = $2, paid_at = $3, deliver_at = $4,
                 canceled_at = $5, refund_status = $6, is_refund_requested = $7, updated_at = NOW()
             WHERE id = $8",
        )
        .bind(order.payment_status)
        .bind(order.order_status)
        .bind(order.paid_at)
        .bind(order.deliver_at)
        .bind(order.canceled_at)
        .bind(order.refund_status)
        .bind(order.is_refund_requested)
        .bind(order.id)
        .execute(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(
                DatabaseError::not_found("Order", order.id).with_context("update matched no rows")
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, unit_price: i64) -> OrderItem {
        OrderItem {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price,
            size: "M".to_string(),
            color: "black".to_string(),
        }
    }

    #[test]
    fn test_new_order_totals_items() {
        let order = Order::new(
            Uuid::new_v4(),
            vec![item(2, 150), item(1, 200)],
            PaymentMethod::Online,
        );

        assert_eq!(order.total_amount, 500);
        assert_eq!(order.order_status, OrderStatus::Created);
        assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
        assert!(!order.is_refund_requested);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(OrderStatus::OutForDelivery).unwrap(),
            "OUT_FOR_DELIVERY"
        );
        assert_eq!(
            serde_json::from_value::<PaymentMethod>("CASH_ON_DELIVERY".into()).unwrap(),
            PaymentMethod::CashOnDelivery
        );
        assert_eq!(OrderStatus::Cancelled.to_string(), "CANCELLED");
    }
}
