use crate::database::order_repository::{Order, OrderStatus, PaymentMethod};
use crate::database::payment_repository::{Payment, PaymentStatus};
use crate::database::repository::{TransactionManager, UnitOfWork};
use crate::error::{AppError, AppResult};
use crate::orders::transitions;
use crate::orders::Caller;
use crate::payments::coordinator::{discard, with_deadline};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// An order together with its payment, if it was paid online
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
}

pub struct OrderService {
    store: Arc<dyn TransactionManager>,
    storage_timeout: Duration,
}

impl OrderService {
    pub fn new(store: Arc<dyn TransactionManager>, storage_timeout: Duration) -> Self {
        Self {
            store,
            storage_timeout,
        }
    }

    /// Persist a checkout: the order and, for online orders, its PENDING payment
    pub async fn record_checkout(&self, order: Order, payment: Option<Payment>) -> AppResult<Order> {
        validate_checkout(&order, payment.as_ref())?;

        with_deadline(self.storage_timeout, async {
            let mut uow = self.store.begin().await?;
            let written = async {
                uow.insert_order(&order).await?;
                if let Some(payment) = &payment {
                    uow.insert_payment(payment).await?;
                }
                Ok::<_, AppError>(())
            }
            .await;
            match written {
                Ok(()) => uow.commit().await?,
                Err(e) => {
                    discard(uow).await;
                    return Err(e);
                }
            }
            Ok::<_, AppError>(())
        })
        .await?;

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total_amount = order.total_amount,
            "Order recorded"
        );
        Ok(order)
    }

    /// Fetch one order. Only its owner or an administrator may see it.
    pub async fn get_order(&self, order_id: Uuid, caller: &Caller) -> AppResult<OrderDetails> {
        self.read(|mut uow| async move {
            let order = uow.find_order(order_id).await?;
            let payment = match &order {
                Some(_) => uow.find_payment_by_order_id(order_id).await?,
                None => None,
            };
            Ok::<_, AppError>((uow, order.map(|order| OrderDetails { order, payment })))
        })
        .await?
        .ok_or_else(|| AppError::not_found("Order", order_id))
        .and_then(|details| {
            caller.authorize(&details.order)?;
            Ok(details)
        })
    }

    /// Orders placed by the caller, newest first
    pub async fn list_for_user(&self, caller: &Caller) -> AppResult<Vec<Order>> {
        let user_id = caller.user_id;
        self.read(|mut uow| async move {
            let orders = uow.find_orders_by_user(user_id).await?;
            Ok::<_, AppError>((uow, orders))
        })
        .await
    }

    /// Every order, newest first; administrators only
    pub async fn list_all(&self, caller: &Caller, limit: i64, offset: i64) -> AppResult<Vec<Order>> {
        caller.require_admin()?;
        if limit <= 0 || offset < 0 {
            return Err(AppError::invalid_request("limit must be positive and offset non-negative"));
        }
        self.read(|mut uow| async move {
            let orders = uow.find_orders(limit, offset).await?;
            Ok::<_, AppError>((uow, orders))
        })
        .await
    }

    /// Cancel an order on behalf of its owner or an administrator
    pub async fn cancel(&self, order_id: Uuid, caller: &Caller) -> AppResult<Order> {
        let order = self
            .modify(order_id, caller, |order| transitions::cancel(order, Utc::now()))
            .await?;

        info!(
            order_id = %order.id,
            refund_requested = order.is_refund_requested,
            "Order cancelled"
        );
        Ok(order)
    }

    /// Move an order one fulfillment step forward; administrators only
    pub async fn update_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        caller: &Caller,
    ) -> AppResult<Order> {
        caller.require_admin()?;
        let order = self
            .modify(order_id, caller, |order| transitions::advance(order, to))
            .await?;

        info!(order_id = %order.id, status = %order.order_status, "Order status updated");
        Ok(order)
    }

    /// Lock an order, apply `change` and save it, all in one unit of work
    async fn modify<F>(&self, order_id: Uuid, caller: &Caller, change: F) -> AppResult<Order>
    where
        F: FnOnce(&mut Order) -> AppResult<()> + Send,
    {
        with_deadline(self.storage_timeout, async {
            let mut uow = self.store.begin().await?;
            let result = async {
                let mut order = uow
                    .lock_order(order_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Order", order_id))?;
                caller.authorize(&order)?;
                change(&mut order)?;
                uow.save_order(&order).await?;
                Ok::<_, AppError>(order)
            }
            .await;

            match result {
                Ok(order) => {
                    uow.commit().await?;
                    Ok(order)
                }
                Err(e) => {
                    discard(uow).await;
                    Err(e)
                }
            }
        })
        .await
    }

    /// Run a read-only query in its own unit of work, rolled back afterwards
    async fn read<T, F, Fut>(&self, query: F) -> AppResult<T>
    where
        F: FnOnce(Box<dyn UnitOfWork>) -> Fut,
        Fut: std::future::Future<Output = AppResult<(Box<dyn UnitOfWork>, T)>>,
    {
        with_deadline(self.storage_timeout, async {
            let uow = self.store.begin().await?;
            let (uow, value) = query(uow).await?;
            discard(uow).await;
            Ok::<_, AppError>(value)
        })
        .await
    }
}

fn validate_checkout(order: &Order, payment: Option<&Payment>) -> AppResult<()> {
    if order.items.is_empty() {
        return Err(AppError::invalid_request("order has no items"));
    }
    if order.items.iter().any(|item| item.quantity == 0 || item.unit_price < 0) {
        return Err(AppError::invalid_request("order items need a positive quantity and price"));
    }
    let computed: i64 = order.items.iter().map(|item| item.line_total()).sum();
    if computed != order.total_amount {
        return Err(AppError::invalid_request(format!(
            "order total {} does not match items total {}",
            order.total_amount, computed
        )));
    }

    match (order.payment_method, payment) {
        (PaymentMethod::CashOnDelivery, None) => Ok(()),
        (PaymentMethod::CashOnDelivery, Some(_)) => Err(AppError::invalid_request(
            "cash on delivery orders do not take an online payment",
        )),
        (PaymentMethod::Online, None) => {
            Err(AppError::invalid_request("online orders need a payment"))
        }
        (PaymentMethod::Online, Some(payment)) => {
            if payment.order_id != order.id {
                return Err(AppError::invalid_request("payment belongs to another order"));
            }
            if payment.amount != order.total_amount {
                return Err(AppError::invalid_request(format!(
                    "payment amount {} does not match order total {}",
                    payment.amount, order.total_amount
                )));
            }
            if payment.status != PaymentStatus::Pending {
                return Err(AppError::invalid_request("new payments start PENDING"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::order_repository::{OrderItem, OrderPaymentStatus, RefundStatus};

    fn items() -> Vec<OrderItem> {
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
        ]
    }

    fn service(store: &MemoryStore) -> OrderService {
        OrderService::new(Arc::new(store.clone()), Duration::from_secs(5))
    }

    fn owner(order: &Order) -> Caller {
        Caller {
            user_id: order.user_id,
            is_admin: false,
        }
    }

    fn admin() -> Caller {
        Caller {
            user_id: Uuid::new_v4(),
            is_admin: true,
        }
    }

    async fn online_checkout(service: &OrderService, provider_order_id: &str) -> Order {
        let order = Order::new(Uuid::new_v4(), items(), PaymentMethod::Online);
        let payment = Payment::pending(order.id, provider_order_id, order.total_amount, "INR", None);
        service.record_checkout(order, Some(payment)).await.unwrap()
    }

    #[tokio::test]
    async fn test_record_checkout_writes_order_and_payment() {
        let store = MemoryStore::new();
        let service = service(&store);

        let order = online_checkout(&service, "order_C1").await;

        assert_eq!(order.total_amount, 600);
        assert_eq!(store.order(order.id).await.unwrap(), order);
        assert_eq!(store.payment("order_C1").await.unwrap().amount, 600);
    }

    #[tokio::test]
    async fn test_checkout_invariants_are_enforced() {
        let store = MemoryStore::new();
        let service = service(&store);

        let online = Order::new(Uuid::new_v4(), items(), PaymentMethod::Online);
        let err = service.record_checkout(online.clone(), None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let short = Payment::pending(online.id, "order_C2", 1, "INR", None);
        let err = service.record_checkout(online, Some(short)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let cod = Order::new(Uuid::new_v4(), items(), PaymentMethod::CashOnDelivery);
        let payment = Payment::pending(cod.id, "order_C3", cod.total_amount, "INR", None);
        let err = service.record_checkout(cod, Some(payment)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        assert_eq!(store.committed_writes(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_provider_order_id_is_conflict() {
        let store = MemoryStore::new();
        let service = service(&store);
        online_checkout(&service, "order_D1").await;

        let order = Order::new(Uuid::new_v4(), items(), PaymentMethod::Online);
        let payment = Payment::pending(order.id, "order_D1", order.total_amount, "INR", None);
        let order_id = order.id;
        let err = service.record_checkout(order, Some(payment)).await.unwrap_err();

        assert!(matches!(err, AppError::Conflict(_)));
        assert!(store.order(order_id).await.is_none());
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_order() {
        let store = MemoryStore::new();
        let service = service(&store);
        let order = online_checkout(&service, "order_V1").await;
        let stranger = Caller {
            user_id: Uuid::new_v4(),
            is_admin: false,
        };

        let err = service.get_order(order.id, &stranger).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = service.cancel(order.id, &stranger).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let details = service.get_order(order.id, &owner(&order)).await.unwrap();
        assert_eq!(details.order.id, order.id);
        assert_eq!(details.payment.unwrap().provider_order_id, "order_V1");
        assert!(service.get_order(order.id, &admin()).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_all_requires_admin() {
        let store = MemoryStore::new();
        let service = service(&store);
        let order = online_checkout(&service, "order_L1").await;

        let err = service.list_all(&owner(&order), 10, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(service.list_all(&admin(), 10, 0).await.unwrap().len(), 1);
        assert_eq!(service.list_for_user(&owner(&order)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_paid_order_flags_refund() {
        let store = MemoryStore::new();
        let service = service(&store);
        let order = online_checkout(&service, "order_X1").await;

        let mut uow = store.begin().await.unwrap();
        let mut paid = uow.lock_order(order.id).await.unwrap().unwrap();
        paid.payment_status = OrderPaymentStatus::Paid;
        uow.save_order(&paid).await.unwrap();
        uow.commit().await.unwrap();

        let cancelled = service.cancel(order.id, &owner(&order)).await.unwrap();

        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.refund_status, Some(RefundStatus::Pending));
        let stored = store.order(order.id).await.unwrap();
        assert_eq!(stored.order_status, OrderStatus::Cancelled);
        assert!(stored.is_refund_requested);
        assert_eq!(stored.canceled_at, cancelled.canceled_at);
    }

    #[tokio::test]
    async fn test_rejected_cancel_writes_nothing() {
        let store = MemoryStore::new();
        let service = service(&store);
        let order = Order::new(Uuid::new_v4(), items(), PaymentMethod::CashOnDelivery);
        let order = service.record_checkout(order, None).await.unwrap();
        for step in [
            OrderStatus::Processing,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            service.update_status(order.id, step, &admin()).await.unwrap();
        }
        let writes = store.committed_writes();

        let err = service.cancel(order.id, &owner(&order)).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(store.committed_writes(), writes);
        assert_eq!(
            store.order(order.id).await.unwrap().order_status,
            OrderStatus::Delivered
        );
    }

    #[tokio::test]
    async fn test_update_status_requires_admin() {
        let store = MemoryStore::new();
        let service = service(&store);
        let order = service
            .record_checkout(
                Order::new(Uuid::new_v4(), items(), PaymentMethod::CashOnDelivery),
                None,
            )
            .await
            .unwrap();

        let err = service
            .update_status(order.id, OrderStatus::Processing, &owner(&order))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
