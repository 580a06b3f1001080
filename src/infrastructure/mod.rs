//! Adapters for the domain ports: order stores, payment gateways and audit sinks.

pub mod audit;
pub mod in_memory;
pub mod razorpay;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signature;
pub mod simulated_gateway;
