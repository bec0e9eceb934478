use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Units consumed on one day, with the forecast for that day if one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionRecord {
    pub date: NaiveDate,
    pub consumed: i64,
    pub forecast: Option<i64>,
}

impl ConsumptionRecord {
    pub fn new(date: NaiveDate, consumed: i64) -> Self {
        Self {
            date,
            consumed,
            forecast: None,
        }
    }

    pub fn with_forecast(mut self, forecast: i64) -> Self {
        self.forecast = Some(forecast);
        self
    }
}

/// A purchase order placed but not yet received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub quantity: i64,
    pub ordered_on: NaiveDate,
    pub expected_by: NaiveDate,
}

impl PendingOrder {
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.expected_by < as_of
    }
}

/// Input of the Diagnostic Engine: the history window read for one Alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionHistory {
    pub records: Vec<ConsumptionRecord>,
    #[serde(default)]
    pub pending_orders: Vec<PendingOrder>,
}

impl ConsumptionHistory {
    pub fn new(records: Vec<ConsumptionRecord>) -> Self {
        Self {
            records,
            pending_orders: Vec::new(),
        }
    }

    pub fn with_pending_orders(mut self, pending_orders: Vec<PendingOrder>) -> Self {
        self.pending_orders = pending_orders;
        self
    }

    /// Records merged per day, ordered by date, up to and including `as_of`.
    ///
    /// Several records for the same day are summed; a day's forecast is the sum
    /// of the forecasts present.
    pub fn daily(&self, as_of: NaiveDate) -> BTreeMap<NaiveDate, (i64, Option<i64>)> {
        let mut days: BTreeMap<NaiveDate, (i64, Option<i64>)> = BTreeMap::new();
        for record in self.records.iter().filter(|r| r.date <= as_of) {
            let entry = days.entry(record.date).or_insert((0, None));
            entry.0 = entry.0.saturating_add(record.consumed.max(0));
            if let Some(forecast) = record.forecast {
                entry.1 = Some(entry.1.unwrap_or(0).saturating_add(forecast.max(0)));
            }
        }
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn daily_merges_and_orders_records() {
        let history = ConsumptionHistory::new(vec![
            ConsumptionRecord::new(day(3), 4),
            ConsumptionRecord::new(day(1), 2).with_forecast(3),
            ConsumptionRecord::new(day(3), 1).with_forecast(2),
            ConsumptionRecord::new(day(9), 100),
        ]);

        let daily = history.daily(day(5));
        let entries: Vec<_> = daily.into_iter().collect();
        assert_eq!(entries, vec![(day(1), (2, Some(3))), (day(3), (5, Some(2)))]);
    }

    #[test]
    fn overdue_is_strictly_after_expected_date() {
        let order = PendingOrder {
            quantity: 10,
            ordered_on: day(1),
            expected_by: day(5),
        };
        assert!(!order.is_overdue(day(5)));
        assert!(order.is_overdue(day(6)));
    }
}
