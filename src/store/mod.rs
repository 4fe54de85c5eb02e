//! Feature-store abstraction.
//!
//! [`FeatureStore`] looks a group up by name and version, creating it on first
//! use. [`FeatureGroup`] upserts a [`Table`] into that group, keyed by the
//! group's primary-key columns. [`LocalFeatureStore`] keeps groups as CSV files
//! in a directory; the binary adds an S3-backed store.

mod local;
mod table;

pub use local::{LocalFeatureGroup, LocalFeatureStore};
pub use table::Table;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const FEATURE_GROUP_NAME: &str = "citibike_hourly_features";
pub const PREDICTION_GROUP_NAME: &str = "citibike_hourly_predictions";

/// Identity and schema of a feature group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub name: String,
    pub version: u32,
    pub description: String,
    pub primary_key: Vec<String>,
    pub event_time: String,
}

impl GroupSpec {
    /// Lag-feature rows, keyed by (location_id, pickup_hour).
    pub fn hourly_features() -> Self {
        Self {
            name: FEATURE_GROUP_NAME.to_string(),
            version: 1,
            description: "Hourly lag features for Citi Bike demand".to_string(),
            primary_key: vec!["location_id".to_string(), "pickup_hour".to_string()],
            event_time: "pickup_hour".to_string(),
        }
    }

    /// Model predictions, keyed by (location_id, prediction_time).
    pub fn hourly_predictions() -> Self {
        Self {
            name: PREDICTION_GROUP_NAME.to_string(),
            version: 1,
            description: "Hourly predicted Citi Bike rides".to_string(),
            primary_key: vec!["location_id".to_string(), "prediction_time".to_string()],
            event_time: "prediction_time".to_string(),
        }
    }

    /// `<name>_v<version>`.
    pub fn qualified_name(&self) -> String {
        format!("{}_v{}", self.name, self.version)
    }

    /// An existing group may be reused only if it is keyed the same way.
    pub fn ensure_compatible(&self, existing: &GroupSpec) -> Result<()> {
        if existing.primary_key != self.primary_key || existing.event_time != self.event_time {
            anyhow::bail!(
                "feature group '{}' exists with primary key {:?} / event time '{}', requested {:?} / '{}'",
                self.qualified_name(),
                existing.primary_key,
                existing.event_time,
                self.primary_key,
                self.event_time
            );
        }
        Ok(())
    }
}

/// Outcome of [`FeatureStore::get_or_create`].
#[derive(Debug)]
pub enum GetOrCreate<G> {
    Existing(G),
    Created(G),
}

impl<G> GetOrCreate<G> {
    pub fn was_created(&self) -> bool {
        matches!(self, GetOrCreate::Created(_))
    }

    pub fn into_inner(self) -> G {
        match self {
            GetOrCreate::Existing(g) | GetOrCreate::Created(g) => g,
        }
    }
}

/// A writable feature group.
#[async_trait::async_trait]
pub trait FeatureGroup: Send + Sync {
    fn spec(&self) -> &GroupSpec;

    /// Durably upserts `table`. Returns the number of rows written.
    async fn write(&self, table: &Table) -> Result<usize>;
}

/// Resolves feature groups, creating missing ones.
#[async_trait::async_trait]
pub trait FeatureStore: Send + Sync {
    type Group: FeatureGroup;

    async fn get_or_create(&self, spec: &GroupSpec) -> Result<GetOrCreate<Self::Group>>;
}
