//! Transition coordinator: moves a Payment and its Order out of PENDING
//! exactly once, no matter how many completion notifications arrive.
//!
//! Every transition runs inside one unit of work. The payment row is locked
//! before its status is inspected, so two racing deliveries for the same
//! provider order serialize: the second one sees SUCCESS and short-circuits.

use crate::database::order_repository::{Order, OrderPaymentStatus, OrderStatus};
use crate::database::payment_repository::{Payment, PaymentStatus};
use crate::database::repository::{TransactionManager, UnitOfWork};
use crate::error::{AppError, AppResult};
use crate::orders::Caller;
use crate::payments::signature::{self, OrderSecret};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Delivery is promised this many days after payment
pub const DELIVERY_WINDOW_DAYS: i64 = 7;

pub const INVALID_SIGNATURE_REASON: &str = "invalid signature";

/// A claimed payment completion, as relayed by the client or the provider
#[derive(Debug, Clone)]
pub struct CompletionNotice {
    pub provider_order_id: String,
    pub provider_payment_id: String,
    pub signature: String,
}

/// Builds the canonical message a notice was signed over
pub type CanonicalBuilder = fn(&CompletionNotice) -> Vec<u8>;

/// Canonical builder for the direct verification path
pub fn direct_canonical(notice: &CompletionNotice) -> Vec<u8> {
    signature::direct_canonical_message(&notice.provider_order_id, &notice.provider_payment_id)
}

/// How the coordinator should authenticate a notice
#[derive(Clone, Copy)]
pub enum Verification<'a> {
    /// Check the notice signature against `canonical(notice)` under `secret`
    Signed {
        secret: &'a OrderSecret,
        canonical: CanonicalBuilder,
    },
    /// The whole notice was already authenticated upstream (webhook body signature)
    Preauthenticated,
}

/// What the client needs to display after a successful payment
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub order_id: Uuid,
    pub receipt: Option<String>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    /// This call performed the PENDING/FAILED -> SUCCESS transition
    Completed(Settlement),
    /// The payment was already SUCCESS; nothing was written
    AlreadyCompleted(Settlement),
}

impl CompletionOutcome {
    pub fn settlement(&self) -> &Settlement {
        match self {
            CompletionOutcome::Completed(s) | CompletionOutcome::AlreadyCompleted(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The payment moved from PENDING to FAILED
    Recorded,
    /// The payment was already terminal and was left untouched
    AlreadyTerminal(PaymentStatus),
}

enum Transition {
    Completed(Settlement),
    Duplicate(Settlement),
    Rejected,
}

pub struct TransitionCoordinator {
    store: Arc<dyn TransactionManager>,
    storage_timeout: Duration,
}

impl TransitionCoordinator {
    pub fn new(store: Arc<dyn TransactionManager>, storage_timeout: Duration) -> Self {
        Self {
            store,
            storage_timeout,
        }
    }

    /// Apply a completion notice to the payment identified by its provider order id.
    ///
    /// Returns `AlreadyCompleted` without writing when the payment is already
    /// SUCCESS. A signature mismatch marks the payment FAILED, commits, and
    /// returns `VerificationFailed`; the order is not touched. On a match the
    /// payment and its order are updated together or not at all.
    pub async fn apply_completion(
        &self,
        notice: &CompletionNotice,
        verification: Verification<'_>,
    ) -> AppResult<CompletionOutcome> {
        self.apply(notice, verification, None).await
    }

    /// Like `apply_completion`, on behalf of an authenticated caller.
    ///
    /// The caller must own the linked order or be an administrator. The check
    /// runs under the payment lock, before anything is written or a receipt is
    /// returned; a stranger gets `Forbidden` and the payment is left as it was.
    pub async fn apply_completion_for(
        &self,
        notice: &CompletionNotice,
        verification: Verification<'_>,
        caller: &Caller,
    ) -> AppResult<CompletionOutcome> {
        self.apply(notice, verification, Some(caller)).await
    }

    async fn apply(
        &self,
        notice: &CompletionNotice,
        verification: Verification<'_>,
        caller: Option<&Caller>,
    ) -> AppResult<CompletionOutcome> {
        let result = self
            .with_deadline(async {
                let mut uow = self.store.begin().await?;
                let transition = complete(uow.as_mut(), notice, verification, caller).await;
                finish(uow, transition).await
            })
            .await;

        match result {
            Ok(Transition::Completed(settlement)) => {
                info!(
                    provider_order_id = %notice.provider_order_id,
                    order_id = %settlement.order_id,
                    "Payment completed"
                );
                Ok(CompletionOutcome::Completed(settlement))
            }
            Ok(Transition::Duplicate(settlement)) => {
                info!(
                    provider_order_id = %notice.provider_order_id,
                    order_id = %settlement.order_id,
                    "Payment already completed, duplicate notification ignored"
                );
                Ok(CompletionOutcome::AlreadyCompleted(settlement))
            }
            Ok(Transition::Rejected) => {
                warn!(
                    provider_order_id = %notice.provider_order_id,
                    "Payment signature mismatch, payment marked failed"
                );
                Err(AppError::VerificationFailed)
            }
            Err(e) => {
                log_failure(&notice.provider_order_id, &e);
                Err(e)
            }
        }
    }

    /// Record a provider-reported payment failure. Only a PENDING payment
    /// changes; terminal payments are left as they are.
    pub async fn record_failure(
        &self,
        provider_order_id: &str,
        reason: &str,
    ) -> AppResult<FailureOutcome> {
        let result = self
            .with_deadline(async {
                let mut uow = self.store.begin().await?;
                let outcome = fail(uow.as_mut(), provider_order_id, reason).await;
                match outcome {
                    Ok(FailureOutcome::Recorded) => {
                        uow.commit().await?;
                        Ok(FailureOutcome::Recorded)
                    }
                    other => {
                        discard(uow).await;
                        other
                    }
                }
            })
            .await;

        match &result {
            Ok(FailureOutcome::Recorded) => {
                info!(provider_order_id, reason, "Payment failure recorded")
            }
            Ok(FailureOutcome::AlreadyTerminal(status)) => info!(
                provider_order_id,
                status = status.as_str(),
                "Payment already terminal, failure notification ignored"
            ),
            Err(e) => log_failure(provider_order_id, e),
        }
        result
    }

    async fn with_deadline<T, F>(&self, work: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        with_deadline(self.storage_timeout, work).await
    }
}

/// Run storage work under a deadline; an elapsed deadline is a retryable `Timeout`
pub(crate) async fn with_deadline<T, F>(limit: Duration, work: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(limit)),
    }
}

async fn complete(
    uow: &mut dyn UnitOfWork,
    notice: &CompletionNotice,
    verification: Verification<'_>,
    caller: Option<&Caller>,
) -> AppResult<Transition> {
    let mut payment = uow
        .lock_payment_by_provider_order_id(&notice.provider_order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment", &notice.provider_order_id))?;

    if let Some(caller) = caller {
        // ownership never changes, so a plain read is enough here
        let order = uow
            .find_order(payment.order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Order", payment.order_id))?;
        caller.authorize(&order)?;
    }

    if payment.status == PaymentStatus::Success {
        return Ok(Transition::Duplicate(settlement_of(&payment)?));
    }

    if let Verification::Signed { secret, canonical } = verification {
        if !signature::verify(&canonical(notice), secret.key(), &notice.signature) {
            payment.status = PaymentStatus::Failed;
            payment.failure_reason = Some(INVALID_SIGNATURE_REASON.to_string());
            payment.is_verified = false;
            uow.save_payment(&payment).await?;
            return Ok(Transition::Rejected);
        }
    }

    let mut order = uow
        .lock_order(payment.order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Order", payment.order_id))?;

    if order.order_status == OrderStatus::Cancelled {
        return Err(AppError::Conflict(format!(
            "order {} was cancelled before payment {} completed",
            order.id, notice.provider_order_id
        )));
    }

    let paid_at = Utc::now();
    mark_paid(&mut payment, notice, paid_at);
    mark_order_paid(&mut order, paid_at);

    uow.save_payment(&payment).await?;
    uow.save_order(&order).await?;

    Ok(Transition::Completed(Settlement {
        order_id: order.id,
        receipt: payment.receipt.clone(),
        paid_at,
    }))
}

async fn fail(
    uow: &mut dyn UnitOfWork,
    provider_order_id: &str,
    reason: &str,
) -> AppResult<FailureOutcome> {
    let mut payment = uow
        .lock_payment_by_provider_order_id(provider_order_id)
        .await?
        .ok_or_else(|| AppError::not_found("Payment", provider_order_id))?;

    if payment.status != PaymentStatus::Pending {
        return Ok(FailureOutcome::AlreadyTerminal(payment.status));
    }

    payment.status = PaymentStatus::Failed;
    payment.failure_reason = Some(reason.to_string());
    uow.save_payment(&payment).await?;
    Ok(FailureOutcome::Recorded)
}

/// Commit or discard the unit of work according to the transition result
async fn finish(
    uow: Box<dyn UnitOfWork>,
    transition: AppResult<Transition>,
) -> AppResult<Transition> {
    match transition {
        Ok(Transition::Duplicate(settlement)) => {
            discard(uow).await;
            Ok(Transition::Duplicate(settlement))
        }
        Ok(transition) => {
            uow.commit().await?;
            Ok(transition)
        }
        Err(e) => {
            discard(uow).await;
            Err(e)
        }
    }
}

/// Roll back, logging instead of failing when the rollback itself errors
pub(crate) async fn discard(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        warn!("Rollback failed, transaction will be dropped: {}", e);
    }
}

fn mark_paid(payment: &mut Payment, notice: &CompletionNotice, paid_at: DateTime<Utc>) {
    payment.status = PaymentStatus::Success;
    payment.provider_payment_id = Some(notice.provider_payment_id.clone());
    payment.provider_signature = Some(notice.signature.clone());
    payment.failure_reason = None;
    payment.is_verified = true;
    payment.paid_at = Some(paid_at);
}

fn mark_order_paid(order: &mut Order, paid_at: DateTime<Utc>) {
    order.payment_status = OrderPaymentStatus::Paid;
    order.paid_at = Some(paid_at);
    order.deliver_at = Some(paid_at + ChronoDuration::days(DELIVERY_WINDOW_DAYS));
    // never downgrade an order that has already moved on
    if order.order_status == OrderStatus::Created {
        order.order_status = OrderStatus::Processing;
    }
}

fn settlement_of(payment: &Payment) -> AppResult<Settlement> {
    let paid_at = payment.paid_at.ok_or_else(|| {
        AppError::Conflict(format!(
            "payment {} is SUCCESS without a paid_at timestamp",
            payment.provider_order_id
        ))
    })?;
    Ok(Settlement {
        order_id: payment.order_id,
        receipt: payment.receipt.clone(),
        paid_at,
    })
}

fn log_failure(provider_order_id: &str, e: &AppError) {
    match e {
        AppError::NotFound { .. } => warn!(provider_order_id, "No payment for provider order"),
        AppError::Conflict(reason) => error!(provider_order_id, %reason, "Payment transition refused"),
        AppError::Forbidden(reason) => {
            warn!(provider_order_id, %reason, "Caller may not settle this payment")
        }
        e if e.is_retryable() => {
            warn!(provider_order_id, error = %e, "Transient failure applying payment transition")
        }
        e => error!(provider_order_id, error = %e, "Payment transition failed"),
    }
}
