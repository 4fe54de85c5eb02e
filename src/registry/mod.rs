//! Model-registry abstraction and the model artifacts it serves.
//!
//! Training happens elsewhere; this crate only loads a published model and
//! feeds it feature rows in the fixed [`crate::features::model_columns`] order.

mod linear;
mod local;

pub use linear::LinearModel;
pub use local::LocalModelRegistry;

use anyhow::Result;

use crate::features::{LagRow, model_columns};

pub const DEFAULT_MODEL_NAME: &str = "citibike_linear";
pub const DEFAULT_MODEL_VERSION: u32 = 1;
pub const MODEL_FILE: &str = "model.json";

/// Relative location of a model artifact: `<name>/v<version>/model.json`.
pub fn artifact_path(name: &str, version: u32) -> String {
    format!("{name}/v{version}/{MODEL_FILE}")
}

/// Model input: one row per [`LagRow`], columns in model order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Builds the matrix from rows cut with `window_size`. Targets are never
    /// part of the input.
    pub fn from_rows(window_size: usize, rows: &[LagRow]) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.window_size() != window_size) {
            anyhow::bail!(
                "row for location {} has {} lag features, expected {window_size}",
                bad.location_id,
                bad.window_size()
            );
        }
        Ok(Self {
            columns: model_columns(window_size),
            rows: rows.iter().map(LagRow::model_input).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A loaded regression model.
pub trait Model: Send + Sync {
    /// Input columns the model was trained on, in order.
    fn columns(&self) -> &[String];

    /// One prediction per matrix row, in row order.
    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Looks up published models by name and version.
#[async_trait::async_trait]
pub trait ModelRegistry: Send + Sync {
    async fn get_model(&self, name: &str, version: u32) -> Result<Box<dyn Model>>;
}
