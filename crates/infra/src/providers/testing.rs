//! Scripted provider for tests and local demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use tokio::sync::Notify;

use replenish_workflow::{CapabilityAction, CapabilityProvider, ProviderError, ProviderResponse};

/// What one call to a [`ScriptedProvider`] does.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeed,
    Transient(String),
    Permanent(String),
    /// Sleep, then succeed. Used to trip the caller's timeout.
    Hang(Duration),
}

impl Outcome {
    pub fn transient() -> Self {
        Self::Transient("scripted transient failure".to_string())
    }

    pub fn permanent() -> Self {
        Self::Permanent("scripted permanent failure".to_string())
    }
}

#[derive(Debug, Default)]
struct Script {
    outcomes: VecDeque<Outcome>,
    /// Repeated once the script runs out.
    fallback: Option<Outcome>,
    payloads: Vec<JsonValue>,
}

/// Provider that plays back a fixed list of outcomes and records every call.
#[derive(Debug, Clone)]
pub struct ScriptedProvider {
    name: String,
    action: CapabilityAction,
    script: Arc<Mutex<Script>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, action: CapabilityAction) -> Self {
        Self {
            name: name.into(),
            action,
            script: Arc::new(Mutex::new(Script::default())),
            gate: None,
        }
    }

    /// Outcomes for the next calls, in order.
    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.lock().outcomes.extend(outcomes);
        self
    }

    /// Outcome for every call once the script is exhausted (default: succeed).
    pub fn with_fallback(self, outcome: Outcome) -> Self {
        self.lock().fallback = Some(outcome);
        self
    }

    /// Make every call wait for a permit on `gate` first.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn always_failing(name: impl Into<String>, action: CapabilityAction) -> Self {
        Self::new(name, action).with_fallback(Outcome::permanent())
    }

    pub fn calls(&self) -> usize {
        self.lock().payloads.len()
    }

    pub fn payloads(&self) -> Vec<JsonValue> {
        self.lock().payloads.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CapabilityProvider for ScriptedProvider {
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
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let (outcome, call) = {
            let mut script = self.lock();
            script.payloads.push(payload.clone());
            let outcome = script
                .outcomes
                .pop_front()
                .or_else(|| script.fallback.clone())
                .unwrap_or(Outcome::Succeed);
            (outcome, script.payloads.len())
        };

        match outcome {
            Outcome::Succeed => Ok(ProviderResponse::new(
                json!({ "provider": self.name, "action": action.as_str(), "call": call }),
            )),
            Outcome::Transient(msg) => Err(ProviderError::Transient(msg)),
            Outcome::Permanent(msg) => Err(ProviderError::Permanent(msg)),
            Outcome::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(ProviderResponse::new(json!({ "provider": self.name, "late": true })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plays_script_then_fallback() {
        let provider = ScriptedProvider::new("s", CapabilityAction::LogRow)
            .with_outcomes([Outcome::transient(), Outcome::Succeed])
            .with_fallback(Outcome::permanent());

        let payload = json!({"n": 1});
        assert!(provider.execute(CapabilityAction::LogRow, &payload).await.unwrap_err().is_transient());
        assert!(provider.execute(CapabilityAction::LogRow, &payload).await.is_ok());
        assert!(!provider.execute(CapabilityAction::LogRow, &payload).await.unwrap_err().is_transient());
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.payloads()[0], payload);
    }
}
