//! Direct verification: the paying client relays the checkout result after
//! returning from the provider's UI.

use crate::error::{AppError, AppResult};
use crate::orders::Caller;
use crate::payments::coordinator::{
    direct_canonical, CompletionNotice, TransitionCoordinator, Verification,
};
use crate::payments::signature::OrderSecret;
use crate::payments::types::{PaymentInfo, VerifyPaymentRequest, VerifyPaymentResponse};
use std::sync::Arc;

impl TryFrom<VerifyPaymentRequest> for CompletionNotice {
    type Error = AppError;

    fn try_from(request: VerifyPaymentRequest) -> Result<Self, Self::Error> {
        let PaymentInfo {
            provider_order_id,
            provider_payment_id,
            signature,
        } = request
            .payment_info
            .ok_or_else(|| AppError::invalid_request("paymentInfo is required"))?;

        Ok(CompletionNotice {
            provider_order_id: required("providerOrderId", provider_order_id)?,
            provider_payment_id: required("providerPaymentId", provider_payment_id)?,
            signature: required("signature", signature)?,
        })
    }
}

fn required(field: &str, value: Option<String>) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::invalid_request(format!("{} is required", field))),
    }
}

pub struct DirectVerifier {
    coordinator: Arc<TransitionCoordinator>,
    secret: OrderSecret,
}

impl DirectVerifier {
    pub fn new(coordinator: Arc<TransitionCoordinator>, secret: OrderSecret) -> Self {
        Self {
            coordinator,
            secret,
        }
    }

    /// Verify the relayed signature and complete the payment on behalf of the
    /// order's owner. Duplicate calls for an already-completed payment return
    /// the same receipt.
    pub async fn verify(
        &self,
        request: VerifyPaymentRequest,
        caller: &Caller,
    ) -> AppResult<VerifyPaymentResponse> {
        let notice = CompletionNotice::try_from(request)?;

        let outcome = self
            .coordinator
            .apply_completion_for(
                &notice,
                Verification::Signed {
                    secret: &self.secret,
                    canonical: direct_canonical,
                },
                caller,
            )
            .await?;

        let settlement = outcome.settlement();
        Ok(VerifyPaymentResponse {
            order_id: settlement.order_id,
            receipt: settlement.receipt.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(order: Option<&str>, payment: Option<&str>, signature: Option<&str>) -> VerifyPaymentRequest {
        VerifyPaymentRequest {
            payment_info: Some(PaymentInfo {
                provider_order_id: order.map(str::to_string),
                provider_payment_id: payment.map(str::to_string),
                signature: signature.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_complete_request_converts() {
        let notice = CompletionNotice::try_from(request(Some("order_A1"), Some("pay_1"), Some("ab")))
            .unwrap();
        assert_eq!(notice.provider_order_id, "order_A1");
        assert_eq!(notice.provider_payment_id, "pay_1");
        assert_eq!(notice.signature, "ab");
    }

    #[test]
    fn test_missing_fields_are_invalid_requests() {
        for req in [
            VerifyPaymentRequest::default(),
            request(None, Some("pay_1"), Some("ab")),
            request(Some("order_A1"), None, Some("ab")),
            request(Some("order_A1"), Some("pay_1"), None),
            request(Some("order_A1"), Some("  "), Some("ab")),
        ] {
            let err = CompletionNotice::try_from(req).unwrap_err();
            assert!(matches!(err, AppError::InvalidRequest(_)));
        }
    }
}
