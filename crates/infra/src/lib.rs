//! Infrastructure layer: ledger stores, collaborators, providers and the
//! async runtime pieces (orchestrator, monitor loop, engine facade).

pub mod alert_manager;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod monitor_runner;
pub mod orchestrator;
pub mod providers;

pub use alert_manager::AlertManager;
pub use collaborators::{
    CollaboratorError, HistoryReader, InMemoryProductStore, ProductSnapshot, ProductStore,
};
pub use config::{ConfigError, EngineConfig, ProviderEndpoint, ProviderTarget};
pub use engine::ReplenishmentEngine;
pub use error::EngineError;
pub use ledger::{
    AlertFilter, EngineStatus, ExecutionFilter, InMemoryLedger, Ledger, LedgerBackend,
    LedgerError, LedgerQuery, Page, Pagination, PostgresLedger,
};
pub use monitor_runner::{MonitorHandle, MonitorRunner, PollReport, PollTarget};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use providers::ProviderRegistry;
