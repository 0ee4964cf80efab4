//! Provider webhook ingress.
//!
//! The signature covers the raw body bytes exactly as received, so the body
//! is verified before it is parsed. A bad signature never touches storage.
//! Anything the service decides not to act on is acknowledged so the
//! provider stops redelivering it; only transient failures are surfaced.

use crate::error::{AppError, AppResult};
use crate::payments::coordinator::{
    CompletionNotice, CompletionOutcome, FailureOutcome, TransitionCoordinator, Verification,
};
use crate::payments::signature::{self, WebhookSecret};
use crate::payments::types::{WebhookEnvelope, WebhookEventType};
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the webhook body signature
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

const DEFAULT_FAILURE_REASON: &str = "payment failed at provider";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State changed as a result of this delivery
    Processed,
    /// Redelivery of something already applied
    Duplicate,
    /// Acknowledged without any state change
    Ignored(&'static str),
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored(_) => "ignored",
        }
    }
}

pub struct WebhookProcessor {
    coordinator: Arc<TransitionCoordinator>,
    secret: WebhookSecret,
}

impl WebhookProcessor {
    pub fn new(coordinator: Arc<TransitionCoordinator>, secret: WebhookSecret) -> Self {
        Self {
            coordinator,
            secret,
        }
    }

    /// Authenticate and apply one webhook delivery.
    ///
    /// Errors are either `VerificationFailed` (reject, do not retry) or a
    /// retryable infrastructure failure.
    pub async fn handle(&self, raw_body: &[u8], signature: Option<&str>) -> AppResult<WebhookOutcome> {
        let signature = match signature {
            Some(s) if signature::verify(raw_body, self.secret.key(), s) => s,
            _ => {
                warn!("Webhook signature missing or invalid, delivery rejected");
                return Err(AppError::VerificationFailed);
            }
        };

        let envelope: WebhookEnvelope = match serde_json::from_slice(raw_body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Authenticated webhook body is not a valid event");
                return Ok(WebhookOutcome::Ignored("malformed event"));
            }
        };

        match envelope.event_type() {
            WebhookEventType::PaymentCaptured => self.payment_captured(&envelope, signature).await,
            WebhookEventType::PaymentFailed => self.payment_failed(&envelope).await,
            WebhookEventType::Unknown(event) => {
                info!(event = %event, "Unhandled webhook event acknowledged");
                Ok(WebhookOutcome::Ignored("unhandled event"))
            }
        }
    }

    async fn payment_captured(
        &self,
        envelope: &WebhookEnvelope,
        signature: &str,
    ) -> AppResult<WebhookOutcome> {
        let entity = envelope.payment();
        let (provider_order_id, provider_payment_id) = match entity
            .and_then(|e| e.order_id.clone().zip(e.id.clone()))
        {
            Some(ids) => ids,
            None => {
                warn!(event = %envelope.event, "Captured event without order or payment id");
                return Ok(WebhookOutcome::Ignored("missing identifiers"));
            }
        };

        let notice = CompletionNotice {
            provider_order_id,
            provider_payment_id,
            signature: signature.to_string(),
        };

        match self
            .coordinator
            .apply_completion(&notice, Verification::Preauthenticated)
            .await
        {
            Ok(CompletionOutcome::Completed(_)) => Ok(WebhookOutcome::Processed),
            Ok(CompletionOutcome::AlreadyCompleted(_)) => Ok(WebhookOutcome::Duplicate),
            Err(e) => acknowledge_permanent(e),
        }
    }

    async fn payment_failed(&self, envelope: &WebhookEnvelope) -> AppResult<WebhookOutcome> {
        let entity = match envelope.payment() {
            Some(entity) => entity,
            None => return Ok(WebhookOutcome::Ignored("missing identifiers")),
        };
        let provider_order_id = match entity.order_id.as_deref() {
            Some(id) => id,
            None => return Ok(WebhookOutcome::Ignored("missing identifiers")),
        };
        let reason = entity
            .error_description
            .as_deref()
            .unwrap_or(DEFAULT_FAILURE_REASON);

        match self.coordinator.record_failure(provider_order_id, reason).await {
            Ok(FailureOutcome::Recorded) => Ok(WebhookOutcome::Processed),
            Ok(FailureOutcome::AlreadyTerminal(_)) => Ok(WebhookOutcome::Duplicate),
            Err(e) => acknowledge_permanent(e),
        }
    }
}

/// Business failures are acknowledged; storage failures propagate so the
/// provider redelivers
fn acknowledge_permanent(e: AppError) -> AppResult<WebhookOutcome> {
    match e {
        AppError::NotFound { .. } => Ok(WebhookOutcome::Ignored("unknown order")),
        AppError::Conflict(_) => Ok(WebhookOutcome::Ignored("order not payable")),
        e @ (AppError::Timeout(_) | AppError::Database(_)) => Err(e),
        other => {
            warn!(error = %other, "Webhook delivery could not be applied");
            Ok(WebhookOutcome::Ignored("not applicable"))
        }
    }
}
