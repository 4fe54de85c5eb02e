//! Handing pipeline output to a feature store.

use tracing::info;

use crate::error::PipelineError;
use crate::output::{lag_table, prediction_table};
use crate::pipeline::FeatureRun;
use crate::predict::PredictionRow;
use crate::store::{FeatureGroup, FeatureStore, GroupSpec, Table};

async fn write_group<S: FeatureStore + ?Sized>(
    store: &S,
    spec: &GroupSpec,
    table: &Table,
) -> Result<usize, PipelineError> {
    let group = store
        .get_or_create(spec)
        .await
        .map_err(PipelineError::store)?;
    if group.was_created() {
        info!(group = %spec.qualified_name(), "Feature group created on first use");
    }

    group
        .into_inner()
        .write(table)
        .await
        .map_err(PipelineError::store)
}

/// Writes a training run's rows to the hourly feature group.
///
/// An empty run writes nothing and creates no group.
pub async fn publish_features<S: FeatureStore + ?Sized>(
    store: &S,
    run: &FeatureRun,
) -> Result<usize, PipelineError> {
    if run.is_empty() {
        info!("No feature rows to publish");
        return Ok(0);
    }

    let table = lag_table(run.window_size, &run.rows).map_err(PipelineError::store)?;
    let written = write_group(store, &GroupSpec::hourly_features(), &table).await?;
    info!(rows = written, "Features published");
    Ok(written)
}

/// Writes predictions to the hourly prediction group.
pub async fn publish_predictions<S: FeatureStore + ?Sized>(
    store: &S,
    predictions: &[PredictionRow],
) -> Result<usize, PipelineError> {
    if predictions.is_empty() {
        info!("No predictions to publish");
        return Ok(0);
    }

    let table = prediction_table(predictions);
    let written = write_group(store, &GroupSpec::hourly_predictions(), &table).await?;
    info!(rows = written, "Predictions published");
    Ok(written)
}
