use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replenish_core::{AlertId, CompanyId, DomainError, ProductId};
use replenish_inventory::{BreachSignal, Priority};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    LowInventory,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::LowInventory => "low_inventory",
        }
    }
}

/// Alert status.
///
/// Transitions:
/// - `detected → analyzing` when a workflow starts
/// - `detected → ignored` by an operator
/// - `detected | analyzing | ignored → resolved` on stock recovery
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Detected,
    Analyzing,
    Resolved,
    Ignored,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Detected => "detected",
            AlertStatus::Analyzing => "analyzing",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Ignored => "ignored",
        }
    }

    /// Non-resolved Alerts count towards the one-per-product limit.
    pub fn is_active(&self) -> bool {
        !matches!(self, AlertStatus::Resolved)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (Detected, Analyzing)
                | (Detected, Ignored)
                | (Detected, Resolved)
                | (Analyzing, Resolved)
                | (Ignored, Resolved)
        )
    }
}

impl core::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detected" => Ok(AlertStatus::Detected),
            "analyzing" => Ok(AlertStatus::Analyzing),
            "resolved" => Ok(AlertStatus::Resolved),
            "ignored" => Ok(AlertStatus::Ignored),
            other => Err(DomainError::validation(format!("unknown alert status: {other}"))),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlertError {
    #[error("alert {alert_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        alert_id: AlertId,
        from: AlertStatus,
        to: AlertStatus,
    },
}

/// One shortage incident for a product. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub alert_type: AlertType,
    pub priority: Priority,
    pub status: AlertStatus,
    pub current_inventory: i64,
    pub threshold: i64,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn from_breach(id: AlertId, signal: &BreachSignal, detected_at: DateTime<Utc>) -> Self {
        Self {
            id,
            product_id: signal.product_id,
            company_id: signal.company_id,
            alert_type: AlertType::LowInventory,
            priority: signal.priority,
            status: AlertStatus::Detected,
            current_inventory: signal.available_quantity,
            threshold: signal.threshold,
            detected_at,
            resolved_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn start_analysis(&mut self) -> Result<(), AlertError> {
        self.transition(AlertStatus::Analyzing)
    }

    pub fn ignore(&mut self) -> Result<(), AlertError> {
        self.transition(AlertStatus::Ignored)
    }

    pub fn resolve(&mut self, at: DateTime<Utc>) -> Result<(), AlertError> {
        self.transition(AlertStatus::Resolved)?;
        self.resolved_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, next: AlertStatus) -> Result<(), AlertError> {
        if !self.status.can_transition_to(next) {
            return Err(AlertError::InvalidTransition {
                alert_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_alert() -> Alert {
        let signal = BreachSignal {
            product_id: ProductId::new(),
            company_id: CompanyId::new(),
            available_quantity: 8,
            threshold: 10,
            priority: Priority::Critical,
        };
        Alert::from_breach(AlertId::new(), &signal, Utc::now())
    }

    #[test]
    fn breach_creates_detected_alert() {
        let alert = new_alert();
        assert_eq!(alert.status, AlertStatus::Detected);
        assert_eq!(alert.alert_type, AlertType::LowInventory);
        assert_eq!(alert.current_inventory, 8);
        assert!(alert.is_active());
    }

    #[test]
    fn analyzing_then_resolved() {
        let mut alert = new_alert();
        alert.start_analysis().unwrap();
        let at = Utc::now();
        alert.resolve(at).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_at, Some(at));
        assert!(!alert.is_active());
    }

    #[test]
    fn analyzing_twice_is_invalid() {
        let mut alert = new_alert();
        alert.start_analysis().unwrap();
        let err = alert.start_analysis().unwrap_err();
        assert_eq!(
            err,
            AlertError::InvalidTransition {
                alert_id: alert.id,
                from: AlertStatus::Analyzing,
                to: AlertStatus::Analyzing,
            }
        );
    }

    #[test]
    fn ignored_alert_cannot_start_analysis_but_can_resolve() {
        let mut alert = new_alert();
        alert.ignore().unwrap();
        assert!(alert.start_analysis().is_err());
        assert!(alert.is_active());
        alert.resolve(Utc::now()).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn resolved_is_terminal() {
        let mut alert = new_alert();
        alert.resolve(Utc::now()).unwrap();
        assert!(alert.start_analysis().is_err());
        assert!(alert.ignore().is_err());
        assert!(alert.resolve(Utc::now()).is_err());
    }

    #[test]
    fn status_names_round_trip() {
        for status in [
            AlertStatus::Detected,
            AlertStatus::Analyzing,
            AlertStatus::Resolved,
            AlertStatus::Ignored,
        ] {
            assert_eq!(status.to_string().parse::<AlertStatus>().unwrap(), status);
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 128,
                ..ProptestConfig::default()
            })]

            #[test]
            fn resolved_alerts_stay_resolved(ops in proptest::collection::vec(0u8..3, 0..20)) {
                let mut alert = new_alert();
                let mut resolved = false;
                for op in ops {
                    let result = match op {
                        0 => alert.start_analysis(),
                        1 => alert.ignore(),
                        _ => alert.resolve(Utc::now()),
                    };
                    if resolved {
                        prop_assert!(result.is_err());
                    }
                    resolved = alert.status == AlertStatus::Resolved;
                    prop_assert_eq!(alert.resolved_at.is_some(), resolved);
                }
            }
        }
    }
}
