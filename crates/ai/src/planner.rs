use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use replenish_alerts::Alert;
use replenish_core::CompanyId;
use replenish_inventory::Priority;

use crate::diagnosis::{Diagnosis, RootCause};
use crate::error::AiError;
use crate::job::AiJob;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ExistingSupplier,
    AlternativeSupplier,
    SpotMarket,
    InternalTransfer,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::ExistingSupplier => "existing_supplier",
            SourceKind::AlternativeSupplier => "alternative_supplier",
            SourceKind::SpotMarket => "spot_market",
            SourceKind::InternalTransfer => "internal_transfer",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethod {
    Standard,
    Expedited,
    Express,
}

impl ShippingMethod {
    /// Days saved relative to the source's base lead time.
    pub fn days_saved(&self) -> u32 {
        match self {
            ShippingMethod::Standard => 0,
            ShippingMethod::Expedited => 2,
            ShippingMethod::Express => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcingSplit {
    pub source: SourceKind,
    pub quantity: u64,
    pub shipping: ShippingMethod,
    pub lead_time_days: u32,
    pub expected_delivery: NaiveDate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PlaceReplenishmentOrder,
    PlaceBackupOrder,
    CoordinateLogistics,
    UpdateForecast,
    MonitorStock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub kind: ActionKind,
    pub description: String,
    pub quantity: Option<u64>,
    pub source: Option<SourceKind>,
    pub due_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentPlan {
    pub planned_on: NaiveDate,
    pub required_level: u64,
    pub safety_stock_adjustment: u64,
    /// `max(0, required_level - current_inventory) + safety_stock_adjustment`.
    pub total_quantity: u64,
    pub sourcing_splits: Vec<SourcingSplit>,
    pub expected_delivery: NaiveDate,
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub horizon_days_critical: u32,
    pub horizon_days_high: u32,
    pub horizon_days_medium: u32,
    pub horizon_days_low: u32,
    pub safety_stock: u64,
    /// Orders above this quantity are split across two suppliers.
    pub bulk_order_quantity: u64,
    pub lead_time_existing: u32,
    pub lead_time_alternative: u32,
    pub lead_time_spot_market: u32,
    pub lead_time_internal_transfer: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            horizon_days_critical: 14,
            horizon_days_high: 21,
            horizon_days_medium: 30,
            horizon_days_low: 45,
            safety_stock: 5,
            bulk_order_quantity: 1000,
            lead_time_existing: 7,
            lead_time_alternative: 10,
            lead_time_spot_market: 3,
            lead_time_internal_transfer: 2,
        }
    }
}

impl PlannerConfig {
    pub fn horizon_days(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Critical => self.horizon_days_critical,
            Priority::High => self.horizon_days_high,
            Priority::Medium => self.horizon_days_medium,
            Priority::Low => self.horizon_days_low,
        }
    }

    /// Lead time for a source and shipping method, never below one day.
    pub fn lead_time(&self, source: SourceKind, shipping: ShippingMethod) -> u32 {
        let base = match source {
            SourceKind::ExistingSupplier => self.lead_time_existing,
            SourceKind::AlternativeSupplier => self.lead_time_alternative,
            SourceKind::SpotMarket => self.lead_time_spot_market,
            SourceKind::InternalTransfer => self.lead_time_internal_transfer,
        };
        base.saturating_sub(shipping.days_saved()).max(1)
    }
}

/// Input snapshot of a [`PlanningJob`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningInput {
    pub alert: Alert,
    pub diagnosis: Diagnosis,
}

#[derive(Debug, Clone)]
pub struct PlanningJob {
    input: PlanningInput,
    config: PlannerConfig,
}

impl PlanningJob {
    pub fn new(alert: Alert, diagnosis: Diagnosis) -> Self {
        Self {
            input: PlanningInput { alert, diagnosis },
            config: PlannerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }
}

impl AiJob for PlanningJob {
    type Input = PlanningInput;
    type Output = ReplenishmentPlan;

    fn company_id(&self) -> CompanyId {
        self.input.alert.company_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<ReplenishmentPlan, AiError> {
        Ok(plan(&self.input.alert, &self.input.diagnosis, &self.config))
    }
}

/// Build a replenishment plan. Never fails: unusable inputs degrade to a
/// single standard order from the existing supplier.
pub fn plan(alert: &Alert, diagnosis: &Diagnosis, config: &PlannerConfig) -> ReplenishmentPlan {
    let planned_on = alert.detected_at.date_naive();
    let confidence = finite_or_zero(diagnosis.confidence).clamp(0.0, 1.0);

    let horizon = f64::from(config.horizon_days(alert.priority));
    let coverage = to_units(finite_or_zero(diagnosis.daily_rate()) * horizon);
    let required_level = coverage.max(alert.threshold.max(0) as u64);

    let deficit = if alert.current_inventory < 0 {
        required_level.saturating_add(alert.current_inventory.unsigned_abs())
    } else {
        required_level.saturating_sub(alert.current_inventory as u64)
    };

    // Safety stock multiplier in percent.
    let confidence_pct = (confidence * 100.0).round() as u64;
    let multiplier_pct = match diagnosis.root_cause {
        RootCause::DemandSurge => 100 + confidence_pct,
        RootCause::SupplierDelay => 130,
        RootCause::ForecastMiss => 140,
        RootCause::Unknown => confidence_pct,
    };
    let safety_stock_adjustment = u64::try_from(
        (u128::from(config.safety_stock) * u128::from(multiplier_pct)).div_ceil(100),
    )
    .unwrap_or(u64::MAX);
    let total_quantity = deficit.saturating_add(safety_stock_adjustment);

    let sourcing_splits: Vec<SourcingSplit> =
        split_quantities(total_quantity, &sourcing_shares(alert, diagnosis, confidence, total_quantity, config))
            .into_iter()
            .map(|(source, quantity, shipping)| {
                let lead_time_days = config.lead_time(source, shipping);
                SourcingSplit {
                    source,
                    quantity,
                    shipping,
                    lead_time_days,
                    expected_delivery: add_days(planned_on, lead_time_days),
                }
            })
            .collect();

    let expected_delivery = sourcing_splits
        .iter()
        .map(|s| s.expected_delivery)
        .max()
        .unwrap_or(planned_on);

    let action_items = action_items(
        diagnosis.root_cause,
        &sourcing_splits,
        planned_on,
        expected_delivery,
    );

    ReplenishmentPlan {
        planned_on,
        required_level,
        safety_stock_adjustment,
        total_quantity,
        sourcing_splits,
        expected_delivery,
        action_items,
    }
}

/// `(source, percent, shipping)` in order; percentages sum to 100.
fn sourcing_shares(
    alert: &Alert,
    diagnosis: &Diagnosis,
    confidence: f64,
    total: u64,
    config: &PlannerConfig,
) -> Vec<(SourceKind, u64, ShippingMethod)> {
    use ShippingMethod::*;
    use SourceKind::*;

    if total == 0 {
        return Vec::new();
    }
    if confidence <= 0.0 {
        return vec![(ExistingSupplier, 100, Standard)];
    }

    let supplier_delay = diagnosis.root_cause == RootCause::SupplierDelay;
    if alert.priority == Priority::Critical {
        let primary = if supplier_delay {
            AlternativeSupplier
        } else {
            ExistingSupplier
        };
        return vec![
            (primary, 60, Express),
            (SpotMarket, 25, Standard),
            (InternalTransfer, 15, Standard),
        ];
    }
    if supplier_delay {
        return vec![(AlternativeSupplier, 100, Expedited)];
    }
    if alert.priority == Priority::High || total > config.bulk_order_quantity {
        return vec![
            (ExistingSupplier, 70, Standard),
            (AlternativeSupplier, 30, Standard),
        ];
    }
    vec![(ExistingSupplier, 100, Standard)]
}

/// The last share takes the remainder so quantities always sum to `total`.
fn split_quantities(
    total: u64,
    shares: &[(SourceKind, u64, ShippingMethod)],
) -> Vec<(SourceKind, u64, ShippingMethod)> {
    let mut remaining = total;
    let mut out = Vec::with_capacity(shares.len());
    for (i, (source, percent, shipping)) in shares.iter().enumerate() {
        let quantity = if i + 1 == shares.len() {
            remaining
        } else {
            let q = (u128::from(total) * u128::from(*percent) / 100) as u64;
            q.min(remaining)
        };
        remaining -= quantity;
        if quantity > 0 {
            out.push((*source, quantity, *shipping));
        }
    }
    out
}

fn action_items(
    root_cause: RootCause,
    splits: &[SourcingSplit],
    planned_on: NaiveDate,
    expected_delivery: NaiveDate,
) -> Vec<ActionItem> {
    let mut items = Vec::new();

    for (i, split) in splits.iter().enumerate() {
        let (kind, label) = if i == 0 {
            (ActionKind::PlaceReplenishmentOrder, "Place replenishment order")
        } else {
            (ActionKind::PlaceBackupOrder, "Place backup order")
        };
        items.push(ActionItem {
            kind,
            description: format!(
                "{label} for {} units via {} ({:?} shipping)",
                split.quantity,
                split.source.as_str(),
                split.shipping
            ),
            quantity: Some(split.quantity),
            source: Some(split.source),
            due_on: planned_on,
        });
    }

    if splits.len() > 1 || splits.iter().any(|s| s.shipping != ShippingMethod::Standard) {
        items.push(ActionItem {
            kind: ActionKind::CoordinateLogistics,
            description: "Coordinate inbound logistics across sources".to_string(),
            quantity: None,
            source: None,
            due_on: add_days(planned_on, 1),
        });
    }

    if matches!(root_cause, RootCause::DemandSurge | RootCause::ForecastMiss) {
        items.push(ActionItem {
            kind: ActionKind::UpdateForecast,
            description: "Update the demand forecast with recent consumption".to_string(),
            quantity: None,
            source: None,
            due_on: add_days(planned_on, 2),
        });
    }

    items.push(ActionItem {
        kind: ActionKind::MonitorStock,
        description: "Monitor stock until the replenishment arrives".to_string(),
        quantity: None,
        source: None,
        due_on: expected_delivery,
    });

    items
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Round up to whole units; negatives become zero and huge values saturate.
fn to_units(x: f64) -> u64 {
    if x.is_nan() || x <= 0.0 {
        return 0;
    }
    let up = x.ceil();
    if up >= u64::MAX as f64 {
        u64::MAX
    } else {
        up as u64
    }
}

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}
