//! Sliding-window lag features.
//!
//! Training rows and inference rows are both cut by [`WindowExtractor::row_at`],
//! so a model sees the same column layout in both runs.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::cleaner::{LocationId, truncate_to_hour};
use crate::config::PipelineConfig;
use crate::grid::LocationSeries;

/// One feature vector: `window_size` hourly ride counts (oldest first) that
/// precede `pickup_hour`'s calendar slot, plus calendar covariates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagRow {
    pub features: Vec<i32>,
    pub hour_of_day: u32,
    /// Monday = 0.
    pub day_of_week: u32,
    pub location_id: LocationId,
    /// Rides in the predicted hour. Only training and backtest rows carry it.
    pub target: Option<i32>,
    pub pickup_hour: DateTime<Utc>,
}

impl LagRow {
    pub fn window_size(&self) -> usize {
        self.features.len()
    }

    /// Model input in [`model_columns`] order.
    pub fn model_input(&self) -> Vec<f64> {
        let mut input = Vec::with_capacity(self.features.len() + 3);
        input.extend(self.features.iter().map(|&v| f64::from(v)));
        input.push(f64::from(self.hour_of_day));
        input.push(f64::from(self.day_of_week));
        input.push(self.location_id as f64);
        input
    }
}

/// Column order of the model input matrix.
pub fn model_columns(window_size: usize) -> Vec<String> {
    let mut columns: Vec<String> = (1..=window_size).map(|i| format!("feature_{i}")).collect();
    columns.extend(["hour_of_day", "day_of_week", "location_id"].map(String::from));
    columns
}

/// Whether an inference row keeps the observed value of its landmark hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Live inference: the target is unknown to the model.
    Omit,
    /// Backtesting: keep the observed value to score the prediction later.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowExtractor {
    pub window_size: usize,
    pub step_size: usize,
}

impl Default for WindowExtractor {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for WindowExtractor {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            window_size: config.window_size,
            step_size: config.step_size.max(1),
        }
    }
}

impl WindowExtractor {
    pub fn new(window_size: usize, step_size: usize) -> Self {
        Self {
            window_size,
            step_size: step_size.max(1),
        }
    }

    /// The row whose target sits at offset `idx`: window `values[idx-W..idx]`,
    /// calendar fields from the hour at `idx`.
    pub fn row_at(&self, series: &LocationSeries<'_>, idx: usize) -> Option<LagRow> {
        if idx < self.window_size || idx >= series.len() {
            return None;
        }

        let hour = series.hour_at(idx);
        let features = series.values[idx - self.window_size..idx]
            .iter()
            .map(|&v| saturate(v))
            .collect();

        Some(LagRow {
            features,
            hour_of_day: hour.hour(),
            day_of_week: hour.weekday().num_days_from_monday(),
            location_id: series.location_id,
            target: Some(saturate(series.values[idx])),
            pickup_hour: hour,
        })
    }

    /// Every complete window of the series, stepping by `step_size`.
    ///
    /// A series with `window_size` hours or fewer yields nothing.
    pub fn historical(&self, series: &LocationSeries<'_>) -> Vec<LagRow> {
        if series.len() <= self.window_size {
            return Vec::new();
        }

        (self.window_size..series.len())
            .step_by(self.step_size)
            .filter_map(|idx| self.row_at(series, idx))
            .collect()
    }

    /// The row anchored at the landmark hour, one hour before `now`.
    ///
    /// Empty when the landmark is not in the series or has fewer than
    /// `window_size` hours before it. `pickup_hour` is `now` truncated.
    pub fn latest(
        &self,
        series: &LocationSeries<'_>,
        now: DateTime<Utc>,
        policy: TargetPolicy,
    ) -> Option<LagRow> {
        let current_hour = truncate_to_hour(now);
        let idx = series.offset_of(current_hour - Duration::hours(1))?;
        if idx < self.window_size {
            return None;
        }

        let mut row = self.row_at(series, idx)?;
        if policy == TargetPolicy::Omit {
            row.target = None;
        }
        row.pickup_hour = current_hour;
        Some(row)
    }
}

fn saturate(rides: u32) -> i32 {
    i32::try_from(rides).unwrap_or(i32::MAX)
}
