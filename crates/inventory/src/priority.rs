use core::str::FromStr;

use serde::{Deserialize, Serialize};

use replenish_core::DomainError;

use crate::threshold::ThresholdConfig;

/// Alert priority. Ordered from least to most urgent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(DomainError::validation(format!("unknown priority: {other}"))),
        }
    }
}

/// Classify an observed quantity.
///
/// - `critical` at or below `critical_level`.
/// - Warning-level breaches (only when `alert_on_warning`) are graded by how
///   much of the deficit to `warning_level` is already covered by pending
///   replenishment: none covered → `high`, partly → `medium`, fully → `low`.
///
/// Returns `None` when the quantity is above the alerting level.
pub fn classify(
    available_quantity: i64,
    pending_replenishment: i64,
    config: &ThresholdConfig,
) -> Option<Priority> {
    if available_quantity <= config.critical_level {
        return Some(Priority::Critical);
    }
    if !config.alert_on_warning || available_quantity > config.warning_level {
        return None;
    }

    let deficit = config.warning_level.saturating_sub(available_quantity);
    let pending = pending_replenishment.max(0);
    let priority = if pending == 0 {
        Priority::High
    } else if pending < deficit {
        Priority::Medium
    } else {
        Priority::Low
    };
    Some(priority)
}
