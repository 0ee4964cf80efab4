//! Payment verification and order fulfillment
//!
//! Verifies that a payment-completion claim really comes from the provider and
//! moves the Payment and its Order out of PENDING exactly once, whether the
//! claim arrives through the client's direct verification call or the
//! provider's webhook.

pub mod coordinator;
pub mod signature;
pub mod types;
pub mod verification;
pub mod webhook;

pub use coordinator::{CompletionNotice, CompletionOutcome, TransitionCoordinator, Verification};
pub use signature::{OrderSecret, WebhookSecret};
pub use verification::DirectVerifier;
pub use webhook::{WebhookOutcome, WebhookProcessor};
