//! Order-side operations that live next to payment completion: checkout
//! persistence, lookups, customer cancellation and admin status changes.

pub mod service;
pub mod transitions;

pub use service::{OrderDetails, OrderService};

use crate::database::order_repository::Order;
use crate::error::{AppError, AppResult};
use uuid::Uuid;

/// The authenticated principal acting on orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
    pub is_admin: bool,
}

impl Caller {
    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("administrator role required".to_string()))
        }
    }

    /// Owners and administrators may act on an order
    pub fn authorize(&self, order: &Order) -> AppResult<()> {
        if self.is_admin || order.user_id == self.user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "order {} belongs to another user",
                order.id
            )))
        }
    }
}
