//! Alert lifecycle.
//!
//! An [`Alert`] records one shortage incident for a product. This crate owns
//! the state machine only; the one-active-alert-per-product invariant is
//! enforced where Alerts are stored.

pub mod alert;

pub use alert::{Alert, AlertError, AlertStatus, AlertType};
