//! Driving adapters: event log input, report output and the replay loop.

pub mod csv;
pub mod jsonl;
pub mod replay;
