//! Narrow interfaces to the systems the engine consumes but does not own:
//! the product/threshold store and the historical consumption reader.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use replenish_ai::{ConsumptionHistory, ConsumptionRecord, PendingOrder};
use replenish_core::{CompanyId, ProductId};
use replenish_inventory::{StockObservation, ThresholdConfig, ThresholdPolicy};

/// Read-only view of a product as the engine needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub company_id: CompanyId,
    pub name: String,
    pub available_quantity: i64,
    #[serde(default)]
    pub pending_replenishment: i64,
    pub thresholds: ThresholdConfig,
}

impl ProductSnapshot {
    pub fn to_observation(&self) -> StockObservation {
        StockObservation::new(self.product_id, self.company_id, self.available_quantity)
            .with_pending(self.pending_replenishment)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("invalid data from collaborator: {0}")]
    InvalidData(String),
}

/// Product and threshold store (read-only for the engine).
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<ProductSnapshot>, CollaboratorError>;

    /// Every product the monitor should poll.
    async fn list_products(&self) -> Result<Vec<ProductSnapshot>, CollaboratorError>;
}

/// Historical consumption reader.
#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Daily consumption in `(as_of - window_days, as_of]`, plus open orders.
    async fn read_history(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<ConsumptionHistory, CollaboratorError>;
}

#[derive(Debug, Clone)]
struct ProductEntry {
    name: String,
    available_quantity: i64,
    pending_replenishment: i64,
}

#[derive(Debug, Default)]
struct StoreState {
    products: BTreeMap<(CompanyId, ProductId), ProductEntry>,
    policies: HashMap<CompanyId, ThresholdPolicy>,
    consumption: HashMap<(CompanyId, ProductId), BTreeMap<NaiveDate, i64>>,
    forecasts: HashMap<(CompanyId, ProductId), BTreeMap<NaiveDate, i64>>,
    pending_orders: HashMap<(CompanyId, ProductId), Vec<PendingOrder>>,
    /// Used for companies without a policy.
    fallback: ThresholdConfig,
}

/// In-memory product store for tests and self-contained deployments.
///
/// Stock decreases seen through [`InMemoryProductStore::apply_observation`]
/// are recorded as consumption on the observation's date, so the store can
/// also serve as the [`HistoryReader`].
#[derive(Debug, Default)]
pub struct InMemoryProductStore {
    inner: RwLock<StoreState>,
}

impl InMemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thresholds for companies that have no policy of their own.
    pub fn with_default_thresholds(self, thresholds: ThresholdConfig) -> Self {
        if let Ok(mut state) = self.inner.write() {
            state.fallback = thresholds;
        }
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, CollaboratorError> {
        self.inner
            .read()
            .map_err(|_| CollaboratorError::Unavailable("product store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, CollaboratorError> {
        self.inner
            .write()
            .map_err(|_| CollaboratorError::Unavailable("product store lock poisoned".to_string()))
    }

    pub fn upsert_product(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        name: impl Into<String>,
        available_quantity: i64,
    ) -> Result<(), CollaboratorError> {
        let mut state = self.write()?;
        let entry = state
            .products
            .entry((company_id, product_id))
            .or_insert_with(|| ProductEntry {
                name: String::new(),
                available_quantity,
                pending_replenishment: 0,
            });
        entry.name = name.into();
        entry.available_quantity = available_quantity;
        Ok(())
    }

    /// Replace a company's threshold policy.
    pub fn set_policy(
        &self,
        company_id: CompanyId,
        policy: ThresholdPolicy,
    ) -> Result<(), CollaboratorError> {
        policy
            .validate()
            .map_err(|e| CollaboratorError::InvalidData(e.to_string()))?;
        self.write()?.policies.insert(company_id, policy);
        Ok(())
    }

    /// Apply a stock reading, creating the product if it is new.
    pub fn apply_observation(&self, observation: &StockObservation) -> Result<(), CollaboratorError> {
        let key = (observation.company_id, observation.product_id);
        let mut state = self.write()?;

        let previous = state.products.get(&key).map(|p| p.available_quantity);
        let entry = state.products.entry(key).or_insert_with(|| ProductEntry {
            name: observation.product_id.to_string(),
            available_quantity: observation.available_quantity,
            pending_replenishment: 0,
        });
        entry.available_quantity = observation.available_quantity;
        entry.pending_replenishment = observation.pending_replenishment;

        if let Some(previous) = previous {
            let consumed = previous.saturating_sub(observation.available_quantity);
            if consumed > 0 {
                let day = state
                    .consumption
                    .entry(key)
                    .or_default()
                    .entry(observation.observed_at.date_naive())
                    .or_insert(0);
                *day = day.saturating_add(consumed);
            }
        }
        Ok(())
    }

    pub fn record_consumption(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        date: NaiveDate,
        consumed: i64,
        forecast: Option<i64>,
    ) -> Result<(), CollaboratorError> {
        let key = (company_id, product_id);
        let mut state = self.write()?;
        let day = state.consumption.entry(key).or_default().entry(date).or_insert(0);
        *day = day.saturating_add(consumed);
        if let Some(forecast) = forecast {
            state.forecasts.entry(key).or_default().insert(date, forecast);
        }
        Ok(())
    }

    pub fn add_pending_order(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        order: PendingOrder,
    ) -> Result<(), CollaboratorError> {
        self.write()?
            .pending_orders
            .entry((company_id, product_id))
            .or_default()
            .push(order);
        Ok(())
    }

    fn snapshot(
        state: &StoreState,
        key: (CompanyId, ProductId),
        entry: &ProductEntry,
    ) -> ProductSnapshot {
        let thresholds = state
            .policies
            .get(&key.0)
            .map(|p| p.for_product(&key.1).clone())
            .unwrap_or_else(|| state.fallback.clone());
        ProductSnapshot {
            product_id: key.1,
            company_id: key.0,
            name: entry.name.clone(),
            available_quantity: entry.available_quantity,
            pending_replenishment: entry.pending_replenishment,
            thresholds,
        }
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get_product(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
    ) -> Result<Option<ProductSnapshot>, CollaboratorError> {
        let state = self.read()?;
        let key = (company_id, product_id);
        Ok(state
            .products
            .get(&key)
            .map(|entry| Self::snapshot(&state, key, entry)))
    }

    async fn list_products(&self) -> Result<Vec<ProductSnapshot>, CollaboratorError> {
        let state = self.read()?;
        Ok(state
            .products
            .iter()
            .map(|(key, entry)| Self::snapshot(&state, *key, entry))
            .collect())
    }
}

#[async_trait]
impl HistoryReader for InMemoryProductStore {
    async fn read_history(
        &self,
        company_id: CompanyId,
        product_id: ProductId,
        window_days: u32,
        as_of: NaiveDate,
    ) -> Result<ConsumptionHistory, CollaboratorError> {
        let key = (company_id, product_id);
        let state = self.read()?;
        let start = as_of - ChronoDuration::days(i64::from(window_days));
        let forecasts = state.forecasts.get(&key);

        let records = state
            .consumption
            .get(&key)
            .map(|days| {
                days.range(start.succ_opt().unwrap_or(start)..=as_of)
                    .map(|(date, consumed)| {
                        let record = ConsumptionRecord::new(*date, *consumed);
                        match forecasts.and_then(|f| f.get(date)) {
                            Some(forecast) => record.with_forecast(*forecast),
                            None => record,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let pending_orders = state.pending_orders.get(&key).cloned().unwrap_or_default();
        Ok(ConsumptionHistory::new(records).with_pending_orders(pending_orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn observations_create_products_and_record_decreases() {
        let store = InMemoryProductStore::new();
        let (c, p) = (CompanyId::new(), ProductId::new());
        let at = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();

        store
            .apply_observation(&StockObservation::new(p, c, 50).at(at(1)))
            .unwrap();
        store
            .apply_observation(&StockObservation::new(p, c, 42).at(at(2)))
            .unwrap();
        // Restock is not consumption.
        store
            .apply_observation(&StockObservation::new(p, c, 90).at(at(3)))
            .unwrap();

        let product = store.get_product(c, p).await.unwrap().unwrap();
        assert_eq!(product.available_quantity, 90);
        assert_eq!(product.thresholds, ThresholdConfig::default());

        let history = store.read_history(c, p, 30, day(3)).await.unwrap();
        assert_eq!(history.records, vec![ConsumptionRecord::new(day(2), 8)]);
    }

    #[tokio::test]
    async fn extreme_readings_saturate_instead_of_poisoning_the_store() {
        let store = InMemoryProductStore::new();
        let (c, p) = (CompanyId::new(), ProductId::new());
        let at = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();

        store
            .apply_observation(&StockObservation::new(p, c, i64::MAX).at(at))
            .unwrap();
        store
            .apply_observation(&StockObservation::new(p, c, -1).at(at))
            .unwrap();
        store
            .apply_observation(&StockObservation::new(p, c, i64::MAX).at(at))
            .unwrap();
        store
            .apply_observation(&StockObservation::new(p, c, i64::MIN).at(at))
            .unwrap();

        let product = store.get_product(c, p).await.unwrap().unwrap();
        assert_eq!(product.available_quantity, i64::MIN);
        let history = store.read_history(c, p, 30, day(4)).await.unwrap();
        assert_eq!(history.records, vec![ConsumptionRecord::new(day(4), i64::MAX)]);
    }

    #[tokio::test]
    async fn history_window_excludes_older_days_and_other_companies() {
        let store = InMemoryProductStore::new();
        let (c, p) = (CompanyId::new(), ProductId::new());
        store.record_consumption(c, p, day(1), 5, None).unwrap();
        store.record_consumption(c, p, day(5), 7, Some(6)).unwrap();
        store
            .record_consumption(CompanyId::new(), p, day(5), 100, None)
            .unwrap();

        let history = store.read_history(c, p, 3, day(5)).await.unwrap();
        assert_eq!(
            history.records,
            vec![ConsumptionRecord::new(day(5), 7).with_forecast(6)]
        );
    }

    #[tokio::test]
    async fn product_override_wins_over_company_default() {
        let store = InMemoryProductStore::new();
        let (c, p) = (CompanyId::new(), ProductId::new());
        store.upsert_product(c, p, "widget", 100).unwrap();
        let policy = ThresholdPolicy::new(ThresholdConfig::default())
            .with_override(p, ThresholdConfig::default().with_levels(3, 6));
        store.set_policy(c, policy).unwrap();

        let product = store.get_product(c, p).await.unwrap().unwrap();
        assert_eq!(product.thresholds.critical_level, 3);
        assert_eq!(product.name, "widget");
    }

    #[test]
    fn invalid_policy_is_rejected() {
        let store = InMemoryProductStore::new();
        let policy = ThresholdPolicy::new(ThresholdConfig::default().with_levels(30, 10));
        assert!(store.set_policy(CompanyId::new(), policy).is_err());
    }
}
