//! `replenish-core`: shared building blocks for the replenishment engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AlertId, CompanyId, ExecutionId, ProductId};
