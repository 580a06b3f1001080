//! Domain layer: value types, the order entity and its status rules, and the
//! ports the lifecycle engine talks through.

pub mod address;
pub mod audit;
pub mod money;
pub mod order;
pub mod ports;
