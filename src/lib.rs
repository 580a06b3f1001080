//! Order lifecycle and payment reconciliation for a storefront checkout.
//!
//! Orders move `pending -> completed | failed` exactly once. The gateway's
//! completion callback drives the common path; a periodic reconciliation
//! sweep settles orders whose callback never arrived.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
