//! Structured workout records.
//!
//! The same flat record shape is used for workouts bundled as JSON files and
//! for rows returned by a remote catalog. Intervals arrive unordered and are
//! sorted by their `order_index`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, ScriptError};
use crate::import::WorkoutSource;
use crate::models::{Interval, IntervalType, Metric, PowerTarget, Workout};

/// Catalog ids are numeric, bundled files use slugs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub name: String,
    pub duration: f64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, rename = "type")]
    pub interval_type: Option<String>,
    #[serde(default)]
    pub power_lower: Option<f64>,
    #[serde(default)]
    pub power_upper: Option<f64>,
    #[serde(default, alias = "powerTarget")]
    pub power_target: Option<PowerTarget>,
    #[serde(default)]
    pub order_index: Option<i64>,
}

impl IntervalRecord {
    fn power_target(&self) -> Option<PowerTarget> {
        if self.power_lower.is_some() || self.power_upper.is_some() {
            return Some(PowerTarget::new(self.power_lower, self.power_upper));
        }
        self.power_target
    }

    fn into_interval(self) -> Interval {
        let interval_type = self
            .interval_type
            .as_deref()
            .and_then(IntervalType::from_tag)
            .unwrap_or(IntervalType::SteadyState);
        let power_target = self.power_target();

        Interval::new(self.duration, self.name, interval_type)
            .with_message(self.message)
            .with_power_target(power_target)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub intervals: Option<Vec<IntervalRecord>>,
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
    #[serde(default, alias = "finishedMetrics")]
    pub finished_metrics: Option<Vec<String>>,
}

fn map_metrics(names: Option<Vec<String>>) -> Option<Vec<Metric>> {
    names.map(|names| {
        names
            .iter()
            .filter_map(|name| Metric::from_name(name))
            .collect()
    })
}

impl WorkoutRecord {
    pub fn into_workout(self) -> Workout {
        let mut records = self.intervals.unwrap_or_default();
        // Stable: equal or missing indices keep their source order
        records.sort_by_key(|record| record.order_index.unwrap_or(i64::MAX));

        let intervals: Vec<Interval> = records
            .into_iter()
            .filter(|record| {
                let keep = record.duration > 0.0;
                if !keep {
                    debug!(name = %record.name, "Dropping zero-duration interval record");
                }
                keep
            })
            .map(IntervalRecord::into_interval)
            .collect();

        Workout {
            id: self.id.to_string(),
            name: self.name,
            description: self.description,
            intervals,
            duration_secs: self.duration.filter(|d| *d > 0.0),
            metrics: map_metrics(self.metrics),
            finished_metrics: map_metrics(self.finished_metrics),
        }
    }
}

/// A single workout record held as bytes
#[derive(Debug, Clone)]
pub struct JsonSource {
    data: Vec<u8>,
}

impl JsonSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl WorkoutSource for JsonSource {
    fn load_workout(&self) -> Result<Workout> {
        let record: WorkoutRecord = serde_json::from_slice(&self.data)?;
        Ok(record.into_workout())
    }
}

/// Short listing entry for a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkoutSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// In-memory set of workout records, keyed by id
#[derive(Debug, Clone, Default)]
pub struct WorkoutCatalog {
    records: BTreeMap<String, WorkoutRecord>,
}

impl WorkoutCatalog {
    pub fn new(records: Vec<WorkoutRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.id.to_string(), record))
            .collect();
        Self { records }
    }

    /// Parse a JSON array of records
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let records: Vec<WorkoutRecord> = serde_json::from_slice(data)?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summaries(&self) -> Vec<WorkoutSummary> {
        self.records
            .values()
            .map(|record| WorkoutSummary {
                id: record.id.to_string(),
                name: record.name.clone(),
                description: record.description.clone(),
            })
            .collect()
    }

    pub fn workout(&self, id: &str) -> std::result::Result<Workout, ScriptError> {
        self.records
            .get(id)
            .cloned()
            .map(WorkoutRecord::into_workout)
            .ok_or_else(|| ScriptError::NotFound { id: id.to_string() })
    }
}

/// One entry of a shared catalog
#[derive(Debug, Clone)]
pub struct CatalogSource {
    catalog: Arc<WorkoutCatalog>,
    id: String,
}

impl CatalogSource {
    pub fn new(catalog: Arc<WorkoutCatalog>, id: impl Into<String>) -> Self {
        Self {
            catalog,
            id: id.into(),
        }
    }
}

impl WorkoutSource for CatalogSource {
    fn load_workout(&self) -> Result<Workout> {
        Ok(self.catalog.workout(&self.id)?)
    }
}
