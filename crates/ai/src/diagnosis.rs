use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use replenish_alerts::Alert;
use replenish_core::CompanyId;

use crate::error::AiError;
use crate::history::ConsumptionHistory;
use crate::job::AiJob;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCause {
    DemandSurge,
    SupplierDelay,
    ForecastMiss,
    Unknown,
}

impl RootCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootCause::DemandSurge => "demand_surge",
            RootCause::SupplierDelay => "supplier_delay",
            RootCause::ForecastMiss => "forecast_miss",
            RootCause::Unknown => "unknown",
        }
    }

    pub fn recommendations(&self) -> Vec<String> {
        let items: &[&str] = match self {
            RootCause::DemandSurge => &[
                "Increase safety stock levels for this product",
                "Review the demand forecasting model against recent sales",
                "Consider expedited replenishment",
            ],
            RootCause::SupplierDelay => &[
                "Contact the supplier for a delivery update",
                "Activate an alternative supplier for this order",
                "Review supplier lead-time performance",
            ],
            RootCause::ForecastMiss => &[
                "Recalibrate the forecast with recent consumption",
                "Shorten the forecast review cycle",
            ],
            RootCause::Unknown => &[
                "Investigate inventory records for discrepancies",
                "Review reorder point settings",
            ],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

impl core::fmt::Display for RootCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multipliers applied to each signal's raw score before the causes compete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticWeights {
    pub demand_surge: f64,
    pub supplier_delay: f64,
    pub forecast_miss: f64,
}

impl Default for DiagnosticWeights {
    fn default() -> Self {
        Self {
            demand_surge: 1.0,
            supplier_delay: 1.0,
            forecast_miss: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticConfig {
    /// Days (ending on the alert date) compared against the older baseline.
    pub recent_days: u32,
    /// Minimum number of distinct days with data.
    pub min_history_days: usize,
    /// Relative consumption increase counted as a strong surge.
    pub strong_surge: f64,
    /// Relative consumption increase counted as a moderate surge.
    pub moderate_surge: f64,
    /// Relative under-forecast counted as a miss.
    pub forecast_tolerance: f64,
    /// Confidence reported when history is sufficient but no signal fires.
    pub no_signal_confidence: f64,
    pub weights: DiagnosticWeights,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            recent_days: 7,
            min_history_days: 10,
            strong_surge: 0.5,
            moderate_surge: 0.2,
            forecast_tolerance: 0.2,
            no_signal_confidence: 0.4,
            weights: DiagnosticWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportingMetrics {
    pub history_days: usize,
    pub recent_daily_average: f64,
    pub baseline_daily_average: f64,
    /// `(recent - baseline) / baseline`.
    pub consumption_change: f64,
    /// `(consumed - forecast) / forecast` over the recent window, when forecasts exist.
    pub forecast_deviation: Option<f64>,
    pub delayed_orders: usize,
    /// Weighted score per candidate cause, keyed by cause name.
    pub scores: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub root_cause: RootCause,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub supporting_metrics: SupportingMetrics,
    pub recommendations: Vec<String>,
}

impl Diagnosis {
    /// Result used when there is not enough data to score causes.
    pub fn unknown(metrics: SupportingMetrics) -> Self {
        Self {
            root_cause: RootCause::Unknown,
            confidence: 0.0,
            supporting_metrics: metrics,
            recommendations: RootCause::Unknown.recommendations(),
        }
    }

    /// Unknown diagnosis for an Alert whose history is too short to score.
    pub fn insufficient_history(alert: &Alert, history: &ConsumptionHistory) -> Self {
        Self::unknown(SupportingMetrics {
            history_days: history.daily(alert.detected_at.date_naive()).len(),
            ..SupportingMetrics::default()
        })
    }

    /// Daily consumption rate the planner should cover.
    pub fn daily_rate(&self) -> f64 {
        let m = &self.supporting_metrics;
        m.recent_daily_average.max(m.baseline_daily_average).max(0.0)
    }
}

/// Input snapshot of a [`DiagnosticJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisInput {
    pub alert: Alert,
    pub history: ConsumptionHistory,
}

/// Scored root-cause assessment for one Alert.
///
/// Model:
/// - Compare the recent daily consumption average with the older baseline.
/// - Compare recent consumption with its forecast.
/// - Count pending orders already past their expected date.
///
/// Each signal yields a raw score that is weighted and clamped to `[0, 1]`; the
/// highest score wins, ties going to the cause listed first in [`RootCause`].
#[derive(Debug, Clone)]
pub struct DiagnosticJob {
    input: DiagnosisInput,
    config: DiagnosticConfig,
}

impl DiagnosticJob {
    pub fn new(alert: Alert, history: ConsumptionHistory) -> Self {
        Self {
            input: DiagnosisInput { alert, history },
            config: DiagnosticConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DiagnosticConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_weights(mut self, weights: DiagnosticWeights) -> Self {
        self.config.weights = weights;
        self
    }
}

impl AiJob for DiagnosticJob {
    type Input = DiagnosisInput;
    type Output = Diagnosis;

    fn company_id(&self) -> CompanyId {
        self.input.alert.company_id
    }

    fn input(&self) -> &Self::Input {
        &self.input
    }

    fn run(&self) -> Result<Diagnosis, AiError> {
        analyze(&self.input.alert, &self.input.history, &self.config)
    }
}

/// Diagnose an Alert, absorbing insufficient data into `unknown` with zero confidence.
pub fn diagnose(alert: &Alert, history: &ConsumptionHistory, config: &DiagnosticConfig) -> Diagnosis {
    match analyze(alert, history, config) {
        Ok(diagnosis) => diagnosis,
        Err(_) => Diagnosis::insufficient_history(alert, history),
    }
}

fn analyze(
    alert: &Alert,
    history: &ConsumptionHistory,
    config: &DiagnosticConfig,
) -> Result<Diagnosis, AiError> {
    if config.recent_days == 0 {
        return Err(AiError::InvalidInput("recent_days must be >= 1".to_string()));
    }

    let as_of = alert.detected_at.date_naive();
    let daily = history.daily(as_of);
    if daily.len() < config.min_history_days {
        return Err(AiError::InsufficientData(format!(
            "{} day(s) of history, need {}",
            daily.len(),
            config.min_history_days
        )));
    }

    let recent_start = as_of - Duration::days(i64::from(config.recent_days) - 1);
    let earliest = match daily.keys().next() {
        Some(d) if *d < recent_start => *d,
        _ => {
            return Err(AiError::InsufficientData(
                "no history older than the recent window".to_string(),
            ));
        }
    };

    let (recent_total, baseline_total) = daily.iter().fold((0i64, 0i64), |(r, b), (date, (consumed, _))| {
        if *date >= recent_start {
            (r.saturating_add(*consumed), b)
        } else {
            (r, b.saturating_add(*consumed))
        }
    });

    let baseline_span = (recent_start - earliest).num_days().max(1) as f64;
    let recent_avg = recent_total as f64 / f64::from(config.recent_days);
    let baseline_avg = baseline_total as f64 / baseline_span;
    let change = relative_change(recent_avg, baseline_avg);
    let forecast_deviation = forecast_deviation(daily.range(recent_start..=as_of).map(|(_, v)| *v));
    let delayed_orders = history
        .pending_orders
        .iter()
        .filter(|o| o.is_overdue(as_of))
        .count();

    let surge_raw = if change > config.strong_surge {
        0.8
    } else if change > config.moderate_surge {
        0.5
    } else {
        0.0
    };
    let forecast_raw = match forecast_deviation {
        Some(d) if d > 2.0 * config.forecast_tolerance => 0.6,
        Some(d) if d > config.forecast_tolerance => 0.4,
        _ => 0.0,
    };
    let delay_raw = if delayed_orders > 0 {
        (0.7 + 0.1 * (delayed_orders - 1) as f64).min(0.9)
    } else {
        0.0
    };

    let w = &config.weights;
    let candidates = [
        (RootCause::DemandSurge, weighted(surge_raw, w.demand_surge)),
        (RootCause::SupplierDelay, weighted(delay_raw, w.supplier_delay)),
        (RootCause::ForecastMiss, weighted(forecast_raw, w.forecast_miss)),
    ];

    let mut best = (RootCause::Unknown, 0.0);
    for (cause, score) in candidates {
        if score > best.1 {
            best = (cause, score);
        }
    }
    let (root_cause, confidence) = if best.1 > 0.0 {
        best
    } else {
        (RootCause::Unknown, config.no_signal_confidence.clamp(0.0, 1.0))
    };

    let scores = candidates
        .iter()
        .map(|(cause, score)| (cause.as_str().to_string(), *score))
        .collect();

    Ok(Diagnosis {
        root_cause,
        confidence,
        supporting_metrics: SupportingMetrics {
            history_days: daily.len(),
            recent_daily_average: recent_avg,
            baseline_daily_average: baseline_avg,
            consumption_change: change,
            forecast_deviation,
            delayed_orders,
            scores,
        },
        recommendations: root_cause.recommendations(),
    })
}

fn weighted(raw: f64, weight: f64) -> f64 {
    if !weight.is_finite() {
        return 0.0;
    }
    (raw * weight).clamp(0.0, 1.0)
}

fn relative_change(recent: f64, baseline: f64) -> f64 {
    if baseline > 0.0 {
        (recent - baseline) / baseline
    } else if recent > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn forecast_deviation(days: impl Iterator<Item = (i64, Option<i64>)>) -> Option<f64> {
    let (consumed, forecast) = days
        .filter_map(|(consumed, forecast)| forecast.map(|f| (consumed, f)))
        .fold((0i64, 0i64), |(c, f), (consumed, forecast)| {
            (c.saturating_add(consumed), f.saturating_add(forecast))
        });
    if forecast <= 0 {
        return None;
    }
    Some(consumed.saturating_sub(forecast) as f64 / forecast as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ConsumptionRecord, PendingOrder};
    use chrono::{NaiveDate, TimeZone, Utc};
    use replenish_core::{AlertId, ProductId};
    use replenish_inventory::{BreachSignal, Priority};

    fn alert_on(date: NaiveDate) -> Alert {
        let signal = BreachSignal {
            product_id: ProductId::new(),
            company_id: CompanyId::new(),
            available_quantity: 8,
            threshold: 10,
            priority: Priority::Critical,
        };
        let at = Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap());
        Alert::from_breach(AlertId::new(), &signal, at)
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    /// 30 days: 23 baseline days at `baseline`, 7 recent days at `recent`.
    fn history(baseline: i64, recent: i64) -> ConsumptionHistory {
        let records = (0..30)
            .map(|i| {
                let date = as_of() - Duration::days(29 - i);
                let consumed = if i >= 23 { recent } else { baseline };
                ConsumptionRecord::new(date, consumed)
            })
            .collect();
        ConsumptionHistory::new(records)
    }

    #[test]
    fn strong_increase_is_a_demand_surge() {
        let d = diagnose(&alert_on(as_of()), &history(10, 20), &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::DemandSurge);
        assert!((d.confidence - 0.8).abs() < 1e-9);
        assert!((d.supporting_metrics.recent_daily_average - 20.0).abs() < 1e-9);
        assert!((d.supporting_metrics.baseline_daily_average - 10.0).abs() < 1e-9);
        assert!(!d.recommendations.is_empty());
    }

    #[test]
    fn moderate_increase_scores_lower() {
        let d = diagnose(&alert_on(as_of()), &history(10, 13), &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::DemandSurge);
        assert!((d.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn overdue_order_outranks_moderate_surge() {
        let h = history(10, 13).with_pending_orders(vec![PendingOrder {
            quantity: 50,
            ordered_on: as_of() - Duration::days(20),
            expected_by: as_of() - Duration::days(3),
        }]);
        let d = diagnose(&alert_on(as_of()), &h, &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::SupplierDelay);
        assert_eq!(d.supporting_metrics.delayed_orders, 1);
    }

    #[test]
    fn under_forecast_is_a_forecast_miss() {
        let records = (0..30)
            .map(|i| {
                let date = as_of() - Duration::days(29 - i);
                ConsumptionRecord::new(date, 10).with_forecast(6)
            })
            .collect();
        let d = diagnose(
            &alert_on(as_of()),
            &ConsumptionHistory::new(records),
            &DiagnosticConfig::default(),
        );
        assert_eq!(d.root_cause, RootCause::ForecastMiss);
        assert!(d.supporting_metrics.forecast_deviation.unwrap() > 0.4);
    }

    #[test]
    fn steady_consumption_is_unknown_with_fallback_confidence() {
        let d = diagnose(&alert_on(as_of()), &history(10, 10), &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::Unknown);
        assert!((d.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn insufficient_history_is_unknown_with_zero_confidence() {
        let short = ConsumptionHistory::new(vec![ConsumptionRecord::new(as_of(), 5)]);
        let d = diagnose(&alert_on(as_of()), &short, &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::Unknown);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.supporting_metrics.history_days, 1);
    }

    #[test]
    fn insufficient_history_counts_days_up_to_the_alert() {
        let h = ConsumptionHistory::new(vec![
            ConsumptionRecord::new(as_of() - Duration::days(1), 5),
            ConsumptionRecord::new(as_of(), 3),
            ConsumptionRecord::new(as_of() + Duration::days(2), 9),
        ]);
        let d = Diagnosis::insufficient_history(&alert_on(as_of()), &h);
        assert_eq!(d.root_cause, RootCause::Unknown);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.supporting_metrics.history_days, 2);
        assert_eq!(d, diagnose(&alert_on(as_of()), &h, &DiagnosticConfig::default()));
    }

    #[test]
    fn job_reports_insufficient_data() {
        let job = DiagnosticJob::new(alert_on(as_of()), ConsumptionHistory::default());
        assert!(matches!(job.run(), Err(AiError::InsufficientData(_))));
    }

    #[test]
    fn zero_weight_silences_a_signal() {
        let job = DiagnosticJob::new(alert_on(as_of()), history(10, 20)).with_weights(
            DiagnosticWeights {
                demand_surge: 0.0,
                ..DiagnosticWeights::default()
            },
        );
        assert_eq!(job.run().unwrap().root_cause, RootCause::Unknown);
    }

    #[test]
    fn records_after_the_alert_date_are_ignored() {
        let mut h = history(10, 10);
        h.records
            .push(ConsumptionRecord::new(as_of() + Duration::days(1), 10_000));
        let d = diagnose(&alert_on(as_of()), &h, &DiagnosticConfig::default());
        assert_eq!(d.root_cause, RootCause::Unknown);
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
            fn diagnosis_is_deterministic(
                consumed in proptest::collection::vec((0i64..40, 0u32..60, proptest::option::of(0i64..40)), 0..80),
                overdue in 0usize..3,
            ) {
                let records: Vec<ConsumptionRecord> = consumed
                    .into_iter()
                    .map(|(c, back, f)| ConsumptionRecord {
                        date: as_of() - Duration::days(i64::from(back)),
                        consumed: c,
                        forecast: f,
                    })
                    .collect();
                let orders = (0..overdue)
                    .map(|_| PendingOrder {
                        quantity: 5,
                        ordered_on: as_of() - Duration::days(30),
                        expected_by: as_of() - Duration::days(1),
                    })
                    .collect();
                let h = ConsumptionHistory::new(records).with_pending_orders(orders);
                let alert = alert_on(as_of());
                let config = DiagnosticConfig::default();

                let first = diagnose(&alert, &h, &config);
                let mut reversed = h.clone();
                reversed.records.reverse();
                let second = diagnose(&alert, &reversed, &config);

                prop_assert_eq!(&first, &second);
                prop_assert!((0.0..=1.0).contains(&first.confidence));
            }
        }
    }
}
