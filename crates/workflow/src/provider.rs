//! Capability provider contract.

use core::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use replenish_core::DomainError;

/// Operations an external integration can perform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityAction {
    SendNotification,
    CreateTask,
    LogRow,
    ScheduleEvent,
    CreateIssue,
}

impl CapabilityAction {
    pub const ALL: [CapabilityAction; 5] = [
        CapabilityAction::SendNotification,
        CapabilityAction::CreateTask,
        CapabilityAction::LogRow,
        CapabilityAction::ScheduleEvent,
        CapabilityAction::CreateIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityAction::SendNotification => "send_notification",
            CapabilityAction::CreateTask => "create_task",
            CapabilityAction::LogRow => "log_row",
            CapabilityAction::ScheduleEvent => "schedule_event",
            CapabilityAction::CreateIssue => "create_issue",
        }
    }
}

impl core::fmt::Display for CapabilityAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown capability action: {s}")))
    }
}

/// Successful provider result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub data: JsonValue,
}

impl ProviderResponse {
    pub fn new(data: JsonValue) -> Self {
        Self { data }
    }
}

/// Provider failure, classified for the retry decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Worth retrying: rate limit, 5xx, connection reset.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Retrying cannot help: bad request, auth, rejected payload.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// An external integration (messaging, task tracking, spreadsheet, calendar,
/// issue tracker).
///
/// Implementations must tolerate being called again with the same payload
/// after a timeout or transient error; the caller owns the per-call timeout.
#[async_trait]
pub trait CapabilityProvider: Send + Sync + 'static {
    /// Stable name used in step names and logs.
    fn name(&self) -> &str;

    /// The action the workflow requests from this provider.
    fn action(&self) -> CapabilityAction;

    async fn execute(
        &self,
        action: CapabilityAction,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError>;
}
