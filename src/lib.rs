//! Payment verification and order fulfillment backend.
//!
//! Payments move from PENDING to SUCCESS exactly once, together with their
//! order, whichever of the client relay or the provider webhook gets there
//! first.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod orders;
pub mod payments;
