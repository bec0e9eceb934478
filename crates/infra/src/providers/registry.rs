use std::sync::Arc;
use std::time::Duration;

use replenish_workflow::{CapabilityProvider, ProviderError};

use crate::config::{ProviderEndpoint, ProviderTarget};
use crate::providers::{DryRunProvider, WebhookProvider};

/// Providers dispatched to in stage 3, in registration order.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.providers.push(provider);
    }

    /// Build providers from configured endpoints, sharing one HTTP client.
    pub fn from_endpoints(
        endpoints: &[ProviderEndpoint],
        connect_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let mut client = None;
        let mut registry = Self::new();
        for endpoint in endpoints {
            let provider: Arc<dyn CapabilityProvider> = match &endpoint.target {
                ProviderTarget::DryRun => {
                    Arc::new(DryRunProvider::new(&endpoint.name, endpoint.action))
                }
                ProviderTarget::Webhook(url) => {
                    let client = match &client {
                        Some(c) => reqwest::Client::clone(c),
                        None => {
                            let c = WebhookProvider::client(connect_timeout)?;
                            client = Some(c.clone());
                            c
                        }
                    };
                    Arc::new(WebhookProvider::new(&endpoint.name, endpoint.action, url, client))
                }
            };
            registry.register(provider);
        }
        Ok(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CapabilityProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| format!("{}:{}", p.action(), p.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replenish_workflow::CapabilityAction;

    #[test]
    fn builds_providers_in_configured_order() {
        let endpoints: Vec<ProviderEndpoint> = [
            "chat:send_notification@dry-run",
            "tracker:create_task@http://127.0.0.1:9/hook",
        ]
        .iter()
        .map(|s| s.parse().unwrap())
        .collect();

        let registry = ProviderRegistry::from_endpoints(&endpoints, Duration::from_secs(1)).unwrap();
        let names: Vec<(&str, CapabilityAction)> =
            registry.iter().map(|p| (p.name(), p.action())).collect();
        assert_eq!(
            names,
            vec![
                ("chat", CapabilityAction::SendNotification),
                ("tracker", CapabilityAction::CreateTask)
            ]
        );
    }
}
