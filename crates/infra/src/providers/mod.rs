//! Capability provider implementations and the registry the Orchestrator
//! fans out to.
//!
//! - [`WebhookProvider`]: JSON POST to an HTTP endpoint.
//! - [`DryRunProvider`]: logs the call and succeeds.
//! - [`testing::ScriptedProvider`]: scripted outcomes for tests.

pub mod dry_run;
pub mod registry;
pub mod testing;
pub mod webhook;

pub use dry_run::DryRunProvider;
pub use registry::ProviderRegistry;
pub use webhook::WebhookProvider;
