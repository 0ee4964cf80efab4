//! Wire types for the two payment ingress paths.
//!
//! Request bodies are deserialized leniently (every field optional) and then
//! validated into strongly-typed values, so a missing field becomes an
//! `InvalidRequest` rather than a framework rejection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of the direct verification call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyPaymentRequest {
    #[serde(rename = "paymentInfo", alias = "payment_info")]
    pub payment_info: Option<PaymentInfo>,
}

/// Checkout result relayed by the client. Accepts the provider's native
/// field names as well.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(alias = "razorpay_order_id")]
    pub provider_order_id: Option<String>,
    #[serde(alias = "razorpay_payment_id")]
    pub provider_payment_id: Option<String>,
    #[serde(alias = "razorpay_signature")]
    pub signature: Option<String>,
}

/// Successful direct verification response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub order_id: Uuid,
    pub receipt: Option<String>,
}

/// Public checkout key handed to the client widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutKeyResponse {
    pub key_id: String,
}

/// Webhook event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<PaymentEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEnvelope {
    pub entity: PaymentEntity,
}

/// Provider payment object embedded in webhook events
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEntity {
    /// Provider payment id
    pub id: Option<String>,
    pub order_id: Option<String>,
    pub error_description: Option<String>,
}

/// Webhook event types the service reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    PaymentCaptured,
    PaymentFailed,
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(event: &str) -> Self {
        match event {
            "payment.captured" => WebhookEventType::PaymentCaptured,
            "payment.failed" => WebhookEventType::PaymentFailed,
            other => WebhookEventType::Unknown(other.to_string()),
        }
    }
}

impl WebhookEnvelope {
    pub fn event_type(&self) -> WebhookEventType {
        WebhookEventType::from(self.event.as_str())
    }

    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }
}
