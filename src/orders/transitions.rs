use crate::database::order_repository::{
    Order, OrderPaymentStatus, OrderStatus, PaymentMethod, RefundStatus,
};
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};

/// Statuses from which an order can no longer be cancelled
pub fn is_cancellable(status: OrderStatus) -> bool {
    !matches!(
        status,
        OrderStatus::OutForDelivery | OrderStatus::Delivered | OrderStatus::Cancelled
    )
}

/// The single forward step an administrator may apply from `status`
fn next_fulfillment_step(status: OrderStatus) -> Option<OrderStatus> {
    match status {
        OrderStatus::Created => Some(OrderStatus::Processing),
        OrderStatus::Processing => Some(OrderStatus::OutForDelivery),
        OrderStatus::OutForDelivery => Some(OrderStatus::Delivered),
        OrderStatus::Delivered | OrderStatus::Cancelled => None,
    }
}

/// Cancel an order in place. Paid online orders get a refund request flag;
/// the refund itself is executed elsewhere.
pub fn cancel(order: &mut Order, now: DateTime<Utc>) -> AppResult<()> {
    if !is_cancellable(order.order_status) {
        return Err(AppError::InvalidTransition {
            from: order.order_status,
            to: OrderStatus::Cancelled,
        });
    }

    order.order_status = OrderStatus::Cancelled;
    order.canceled_at = Some(now);
    if order.payment_method == PaymentMethod::Online
        && order.payment_status == OrderPaymentStatus::Paid
    {
        order.refund_status = Some(RefundStatus::Pending);
        order.is_refund_requested = true;
    }
    Ok(())
}

/// Apply an administrative fulfillment status change in place
pub fn advance(order: &mut Order, to: OrderStatus) -> AppResult<()> {
    let from = order.order_status;
    if next_fulfillment_step(from) != Some(to) {
        return Err(AppError::InvalidTransition { from, to });
    }
    if order.payment_method == PaymentMethod::Online
        && order.payment_status != OrderPaymentStatus::Paid
    {
        return Err(AppError::Conflict(format!(
            "online order {} has not been paid",
            order.id
        )));
    }

    order.order_status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn order(method: PaymentMethod, status: OrderStatus, paid: bool) -> Order {
        let mut order = Order::new(Uuid::new_v4(), vec![], method);
        order.order_status = status;
        if paid {
            order.payment_status = OrderPaymentStatus::Paid;
        }
        order
    }

    #[test]
    fn test_cancel_rejected_once_shipped() {
        for status in [
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let mut o = order(PaymentMethod::Online, status, true);
            let before = o.clone();
            let err = cancel(&mut o, Utc::now()).unwrap_err();
            assert!(matches!(err, AppError::InvalidTransition { .. }));
            assert_eq!(o, before);
        }
    }

    #[test]
    fn test_cancel_paid_online_order_requests_refund() {
        let mut o = order(PaymentMethod::Online, OrderStatus::Processing, true);
        let now = Utc::now();

        cancel(&mut o, now).unwrap();

        assert_eq!(o.order_status, OrderStatus::Cancelled);
        assert_eq!(o.canceled_at, Some(now));
        assert_eq!(o.refund_status, Some(RefundStatus::Pending));
        assert!(o.is_refund_requested);
    }

    #[test]
    fn test_cancel_unpaid_or_cod_order_has_no_refund() {
        let mut unpaid = order(PaymentMethod::Online, OrderStatus::Created, false);
        let mut cod = order(PaymentMethod::CashOnDelivery, OrderStatus::Processing, false);

        cancel(&mut unpaid, Utc::now()).unwrap();
        cancel(&mut cod, Utc::now()).unwrap();

        assert_eq!(unpaid.order_status, OrderStatus::Cancelled);
        assert!(!unpaid.is_refund_requested && unpaid.refund_status.is_none());
        assert!(!cod.is_refund_requested && cod.refund_status.is_none());
    }

    #[test]
    fn test_advance_is_single_forward_step() {
        let mut o = order(PaymentMethod::CashOnDelivery, OrderStatus::Created, false);
        advance(&mut o, OrderStatus::Processing).unwrap();
        advance(&mut o, OrderStatus::OutForDelivery).unwrap();
        advance(&mut o, OrderStatus::Delivered).unwrap();
        assert_eq!(o.order_status, OrderStatus::Delivered);

        let mut skip = order(PaymentMethod::CashOnDelivery, OrderStatus::Created, false);
        assert!(advance(&mut skip, OrderStatus::Delivered).is_err());
        assert!(advance(&mut skip, OrderStatus::Cancelled).is_err());
        assert!(advance(&mut o, OrderStatus::Processing).is_err());
    }

    #[test]
    fn test_unpaid_online_order_cannot_advance() {
        let mut o = order(PaymentMethod::Online, OrderStatus::Created, false);
        let err = advance(&mut o, OrderStatus::Processing).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(o.order_status, OrderStatus::Created);
    }
}
