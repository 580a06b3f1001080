//! Application layer orchestrating the order lifecycle.
//!
//! [`engine::OrderLifecycle`] owns checkout initiation and payment
//! verification. [`reconciliation::Reconciler`] settles orders whose callback
//! never arrived. Both funnel terminal transitions through the same
//! conditional repository write.

pub mod engine;
pub mod reconciliation;
