//! Turning inference rows into stored demand predictions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cleaner::LocationId;
use crate::error::PipelineError;
use crate::features::LagRow;
use crate::pipeline::FeatureRun;
use crate::registry::{FeatureMatrix, Model, ModelRegistry};

/// Predicted rides for one location in the hour starting at `prediction_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub location_id: LocationId,
    pub predicted_rides: i64,
    pub prediction_time: DateTime<Utc>,
}

/// Rounds a raw model output to a ride count, clamped at zero.
pub fn to_ride_count(raw: f64) -> i64 {
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    raw.round().min(i64::MAX as f64) as i64
}

/// Runs `model` over `rows` and pairs each output with its row.
///
/// The model's input columns must match the pipeline's column order exactly.
/// `prediction_time` is the row's `pickup_hour`, the hour being predicted.
pub fn predict_rows(
    model: &dyn Model,
    window_size: usize,
    rows: &[LagRow],
) -> Result<Vec<PredictionRow>, PipelineError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let matrix = FeatureMatrix::from_rows(window_size, rows)
        .map_err(|e| PipelineError::Prediction(format!("{e:#}")))?;
    if model.columns() != matrix.columns.as_slice() {
        return Err(PipelineError::Prediction(format!(
            "model expects columns {:?}, pipeline produces {:?}",
            model.columns(),
            matrix.columns
        )));
    }
    let outputs = model
        .predict(&matrix)
        .map_err(|e| PipelineError::Prediction(format!("{e:#}")))?;
    if outputs.len() != rows.len() {
        return Err(PipelineError::Prediction(format!(
            "model returned {} predictions for {} rows",
            outputs.len(),
            rows.len()
        )));
    }

    Ok(rows
        .iter()
        .zip(outputs)
        .map(|(row, raw)| PredictionRow {
            location_id: row.location_id,
            predicted_rides: to_ride_count(raw),
            prediction_time: row.pickup_hour,
        })
        .collect())
}

/// Fetches the model from the registry and predicts every row of an inference run.
pub async fn predict_run<R: ModelRegistry + ?Sized>(
    registry: &R,
    model_name: &str,
    model_version: u32,
    run: &FeatureRun,
) -> Result<Vec<PredictionRow>, PipelineError> {
    if run.is_empty() {
        warn!("No inference rows, skipping model load");
        return Ok(Vec::new());
    }

    let model = registry
        .get_model(model_name, model_version)
        .await
        .map_err(PipelineError::registry)?;
    let predictions = predict_rows(model.as_ref(), run.window_size, &run.rows)?;

    for p in &predictions {
        info!(
            location_id = p.location_id,
            predicted_rides = p.predicted_rides,
            prediction_time = %p.prediction_time,
            "Prediction"
        );
    }
    Ok(predictions)
}
