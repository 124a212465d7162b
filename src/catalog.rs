//! # Recipe Catalog Module
//!
//! Client for the TheMealDB JSON API: category listing, meals of a category
//! and meal details by id.
//!
//! The [`RecipeCatalog`] trait is what the discovery state machine talks to;
//! [`MealDbClient`] is the HTTP implementation and [`TimeBoxedCatalog`] puts a
//! deadline on every call of any implementation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::RecoveryConfig;
use crate::errors::CatalogError;

/// Number of ingredient/measure slots in a catalog meal record
pub const INGREDIENT_SLOTS: usize = 20;

/// Detail lookups kept in flight by [`RecipeCatalog::get_meal_details`]
pub const MAX_CONCURRENT_LOOKUPS: usize = 4;

/// Catalog identifier of a meal
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(String);

impl MealId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MealId {
    fn from(id: &str) -> Self {
        MealId(id.to_string())
    }
}

impl From<String> for MealId {
    fn from(id: String) -> Self {
        MealId(id)
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A meal as listed inside a category
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealSummary {
    #[serde(rename = "idMeal")]
    pub id: MealId,
    #[serde(rename = "strMeal")]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub measure: String,
}

/// Full recipe of one meal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealDetail {
    pub id: MealId,
    pub name: String,
    pub category: String,
    pub instructions: String,
    pub ingredients: Vec<Ingredient>,
    pub area: Option<String>,
    pub thumbnail: Option<String>,
    pub youtube: Option<String>,
    pub source: Option<String>,
}

impl MealDetail {
    /// Build a detail from one raw catalog meal record
    ///
    /// Ingredient slots whose name is empty or blank are skipped; measures are
    /// trimmed and may be empty.
    pub fn from_record(record: &Map<String, Value>) -> Result<Self, CatalogError> {
        let text = |key: &str| -> Option<String> {
            match record.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            }
        };

        let id = text("idMeal")
            .ok_or_else(|| CatalogError::Malformed("meal record without idMeal".to_string()))?;
        let name = text("strMeal")
            .ok_or_else(|| CatalogError::Malformed(format!("meal {id} without strMeal")))?;

        let ingredients = (1..=INGREDIENT_SLOTS)
            .filter_map(|slot| {
                let name = text(&format!("strIngredient{slot}"))?;
                let measure = text(&format!("strMeasure{slot}")).unwrap_or_default();
                Some(Ingredient { name, measure })
            })
            .collect();

        Ok(Self {
            id: MealId(id),
            name,
            category: text("strCategory").unwrap_or_default(),
            instructions: text("strInstructions").unwrap_or_default(),
            ingredients,
            area: text("strArea"),
            thumbnail: text("strMealThumb"),
            youtube: text("strYoutube"),
            source: text("strSource"),
        })
    }
}

/// Recipe catalog operations used by the discovery flow
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<String>, CatalogError>;

    /// Meals of a category; empty when the category has none
    async fn list_meals_in_category(&self, category: &str) -> Result<Vec<MealSummary>, CatalogError>;

    /// Meal detail, `None` when the id is unknown
    async fn get_meal_detail(&self, id: &MealId) -> Result<Option<MealDetail>, CatalogError>;

    /// Fetch several details, at most [`MAX_CONCURRENT_LOOKUPS`] at a time
    ///
    /// The result is parallel to `ids`. Every position resolves on its own: a
    /// failed lookup becomes `None` and never affects the other positions.
    async fn get_meal_details(&self, ids: &[MealId]) -> Vec<Option<MealDetail>> {
        let lookups: futures::stream::BoxStream<'_, Option<MealDetail>> = stream::iter(ids)
            .map(|id| async move {
                match self.get_meal_detail(id).await {
                    Ok(detail) => detail,
                    Err(e) => {
                        warn!(meal_id = %id, error = %e, "Meal lookup failed, skipping");
                        None
                    }
                }
            })
            .buffered(MAX_CONCURRENT_LOOKUPS)
            .boxed();
        lookups.collect().await
    }
}

/// Read the `meals`/`categories` array of a catalog response
///
/// A missing or null key means no results. The catalog answers some invalid
/// queries with a string instead of an array; that is also no results.
fn records<'a>(body: &'a Value, key: &str) -> Result<Vec<&'a Map<String, Value>>, CatalogError> {
    match body.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_object()
                    .ok_or_else(|| CatalogError::Malformed(format!("non-object entry in '{key}'")))
            })
            .collect(),
        Some(other) => Err(CatalogError::Malformed(format!(
            "unexpected '{key}' value: {other}"
        ))),
    }
}

fn parse_body(body: &str) -> Result<Value, CatalogError> {
    let value: Value = serde_json::from_str(body).map_err(|e| CatalogError::Malformed(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(CatalogError::Malformed("response is not a JSON object".to_string()))
    }
}

/// Parse a category listing, accepting both the `categories` and `meals` shapes
pub fn parse_categories(body: &str) -> Result<Vec<String>, CatalogError> {
    let value = parse_body(body)?;
    let mut entries = records(&value, "categories")?;
    if entries.is_empty() {
        entries = records(&value, "meals")?;
    }

    Ok(entries
        .into_iter()
        .filter_map(|entry| entry.get("strCategory").and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect())
}

/// Parse the meals of a category
pub fn parse_meal_list(body: &str) -> Result<Vec<MealSummary>, CatalogError> {
    let value = parse_body(body)?;
    records(&value, "meals")?
        .into_iter()
        .map(|entry| {
            serde_json::from_value::<MealSummary>(Value::Object(entry.clone()))
                .map_err(|e| CatalogError::Malformed(e.to_string()))
        })
        .collect()
}

/// Parse a meal lookup; the first record is the result
pub fn parse_meal_detail(body: &str) -> Result<Option<MealDetail>, CatalogError> {
    let value = parse_body(body)?;
    records(&value, "meals")?
        .first()
        .map(|record| MealDetail::from_record(record))
        .transpose()
}

/// TheMealDB HTTP client
pub struct MealDbClient {
    client: Client,
    base_url: String,
    circuit_breaker: CircuitBreaker,
}

impl MealDbClient {
    /// Create a client for the API rooted at `base_url` (with trailing slash)
    pub fn new(base_url: &str, recovery: RecoveryConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(recovery.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            circuit_breaker: CircuitBreaker::new(recovery),
        })
    }

    async fn get_text(&self, endpoint: &str, query: &[(&str, &str)]) -> reqwest::Result<String> {
        self.client
            .get(format!("{}{}", self.base_url, endpoint))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }

    /// GET an endpoint through the circuit breaker and return the raw body
    async fn fetch(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String, CatalogError> {
        if self.circuit_breaker.is_open() {
            warn!(endpoint, "Circuit breaker open, skipping catalog request");
            return Err(CatalogError::Unavailable("circuit breaker open".to_string()));
        }

        debug!(endpoint, ?query, "Requesting catalog");
        match self.get_text(endpoint, query).await {
            Ok(body) => {
                self.circuit_breaker.record_success();
                Ok(body)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                warn!(
                    endpoint,
                    error = %e,
                    failures = self.circuit_breaker.failure_count(),
                    "Catalog request failed"
                );
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl RecipeCatalog for MealDbClient {
    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        let body = self.fetch("list.php", &[("c", "list")]).await?;
        parse_categories(&body)
    }

    async fn list_meals_in_category(&self, category: &str) -> Result<Vec<MealSummary>, CatalogError> {
        let body = self.fetch("filter.php", &[("c", category)]).await?;
        parse_meal_list(&body)
    }

    async fn get_meal_detail(&self, id: &MealId) -> Result<Option<MealDetail>, CatalogError> {
        let body = self.fetch("lookup.php", &[("i", id.as_str())]).await?;
        parse_meal_detail(&body)
    }
}

/// Catalog decorator that bounds every call by a deadline
///
/// An elapsed deadline is reported as [`CatalogError::Unavailable`]. Batch
/// lookups go through `get_meal_detail`, so each position gets its own
/// deadline.
pub struct TimeBoxedCatalog {
    inner: Arc<dyn RecipeCatalog>,
    limit: Duration,
}

impl TimeBoxedCatalog {
    pub fn new(inner: Arc<dyn RecipeCatalog>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl RecipeCatalog for TimeBoxedCatalog {
    async fn list_categories(&self) -> Result<Vec<String>, CatalogError> {
        tokio::time::timeout(self.limit, self.inner.list_categories())
            .await
            .unwrap_or_else(|_| Err(CatalogError::timed_out("list_categories", self.limit)))
    }

    async fn list_meals_in_category(&self, category: &str) -> Result<Vec<MealSummary>, CatalogError> {
        tokio::time::timeout(self.limit, self.inner.list_meals_in_category(category))
            .await
            .unwrap_or_else(|_| Err(CatalogError::timed_out("list_meals_in_category", self.limit)))
    }

    async fn get_meal_detail(&self, id: &MealId) -> Result<Option<MealDetail>, CatalogError> {
        tokio::time::timeout(self.limit, self.inner.get_meal_detail(id))
            .await
            .unwrap_or_else(|_| Err(CatalogError::timed_out("get_meal_detail", self.limit)))
    }
}
