use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use replenish_core::{DomainError, DomainResult, ProductId};

pub const MIN_CHECK_INTERVAL_SECS: u64 = 5;
pub const MAX_CHECK_INTERVAL_SECS: u64 = 60;

/// Threshold configuration for one product (or a company-wide default).
///
/// Read-only for the engine: it is supplied by the product/threshold store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub critical_level: i64,
    pub warning_level: i64,
    pub auto_resolution_enabled: bool,
    pub require_approval: bool,
    pub check_interval_seconds: u64,
    pub notification_targets: Vec<String>,
    /// Emit breaches for quantities between `critical_level` and `warning_level`.
    pub alert_on_warning: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            critical_level: 10,
            warning_level: 20,
            auto_resolution_enabled: true,
            require_approval: false,
            check_interval_seconds: 30,
            notification_targets: Vec::new(),
            alert_on_warning: false,
        }
    }
}

impl ThresholdConfig {
    pub fn with_levels(mut self, critical_level: i64, warning_level: i64) -> Self {
        self.critical_level = critical_level;
        self.warning_level = warning_level;
        self
    }

    pub fn with_alert_on_warning(mut self, enabled: bool) -> Self {
        self.alert_on_warning = enabled;
        self
    }

    pub fn with_require_approval(mut self, required: bool) -> Self {
        self.require_approval = required;
        self
    }

    pub fn with_auto_resolution(mut self, enabled: bool) -> Self {
        self.auto_resolution_enabled = enabled;
        self
    }

    pub fn with_notification_targets(mut self, targets: Vec<String>) -> Self {
        self.notification_targets = targets;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.critical_level < 0 || self.warning_level < 0 {
            return Err(DomainError::validation("threshold levels cannot be negative"));
        }
        if self.critical_level > self.warning_level {
            return Err(DomainError::validation(
                "critical_level must not exceed warning_level",
            ));
        }
        if !(MIN_CHECK_INTERVAL_SECS..=MAX_CHECK_INTERVAL_SECS).contains(&self.check_interval_seconds)
        {
            return Err(DomainError::validation(format!(
                "check_interval_seconds must be within {MIN_CHECK_INTERVAL_SECS}..={MAX_CHECK_INTERVAL_SECS}"
            )));
        }
        Ok(())
    }

    /// The level at or below which a breach is emitted.
    pub fn alert_level(&self) -> i64 {
        if self.alert_on_warning {
            self.warning_level
        } else {
            self.critical_level
        }
    }

    /// New Alerts wait for an operator instead of starting a workflow.
    pub fn requires_manual_approval(&self) -> bool {
        !self.auto_resolution_enabled || self.require_approval
    }
}

/// Company default plus per-product overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    default: ThresholdConfig,
    overrides: HashMap<ProductId, ThresholdConfig>,
}

impl ThresholdPolicy {
    pub fn new(default: ThresholdConfig) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, product_id: ProductId, config: ThresholdConfig) -> Self {
        self.overrides.insert(product_id, config);
        self
    }

    pub fn set_override(&mut self, product_id: ProductId, config: ThresholdConfig) {
        self.overrides.insert(product_id, config);
    }

    pub fn default_config(&self) -> &ThresholdConfig {
        &self.default
    }

    pub fn for_product(&self, product_id: &ProductId) -> &ThresholdConfig {
        self.overrides.get(product_id).unwrap_or(&self.default)
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.default.validate()?;
        for config in self.overrides.values() {
            config.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ThresholdConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alert_level(), 10);
        assert!(!config.requires_manual_approval());
    }

    #[test]
    fn critical_above_warning_is_rejected() {
        let config = ThresholdConfig::default().with_levels(30, 20);
        assert!(matches!(config.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn interval_outside_bounds_is_rejected() {
        let mut config = ThresholdConfig::default();
        config.check_interval_seconds = 4;
        assert!(config.validate().is_err());
        config.check_interval_seconds = 61;
        assert!(config.validate().is_err());
        config.check_interval_seconds = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn warning_alerts_raise_the_alert_level() {
        let config = ThresholdConfig::default().with_alert_on_warning(true);
        assert_eq!(config.alert_level(), 20);
    }

    #[test]
    fn disabled_auto_resolution_requires_approval() {
        assert!(
            ThresholdConfig::default()
                .with_auto_resolution(false)
                .requires_manual_approval()
        );
        assert!(
            ThresholdConfig::default()
                .with_require_approval(true)
                .requires_manual_approval()
        );
    }

    #[test]
    fn product_override_wins_over_company_default() {
        let product = ProductId::new();
        let other = ProductId::new();
        let policy = ThresholdPolicy::default()
            .with_override(product, ThresholdConfig::default().with_levels(3, 5));

        assert_eq!(policy.for_product(&product).critical_level, 3);
        assert_eq!(policy.for_product(&other).critical_level, 10);
    }
}
