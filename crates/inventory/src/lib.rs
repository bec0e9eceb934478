//! Inventory monitoring rules.
//!
//! This crate decides *whether* a stock observation warrants action: threshold
//! configuration, priority classification and breach/recovery evaluation. It is
//! deterministic domain logic (no IO, no storage) and never creates Alerts.

pub mod monitor;
pub mod priority;
pub mod threshold;

pub use monitor::{
    BreachSignal, MonitorSignal, RecoverySignal, StockObservation, evaluate, order_by_urgency,
};
pub use priority::{Priority, classify};
pub use threshold::{ThresholdConfig, ThresholdPolicy};
