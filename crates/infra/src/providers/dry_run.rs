use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tracing::info;

use replenish_workflow::{CapabilityAction, CapabilityProvider, ProviderError, ProviderResponse};

/// Provider that only logs what it would have done.
#[derive(Debug, Clone)]
pub struct DryRunProvider {
    name: String,
    action: CapabilityAction,
}

impl DryRunProvider {
    pub fn new(name: impl Into<String>, action: CapabilityAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

#[async_trait]
impl CapabilityProvider for DryRunProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self) -> CapabilityAction {
        self.action
    }

    async fn execute(
        &self,
        action: CapabilityAction,
        payload: &JsonValue,
    ) -> Result<ProviderResponse, ProviderError> {
        info!(provider = %self.name, action = %action, payload = %payload, "dry-run provider call");
        Ok(ProviderResponse::new(json!({ "dry_run": true, "action": action.as_str() })))
    }
}
