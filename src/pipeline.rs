//! The two end-to-end flows: training-table build and inference-row build.
//!
//! Both are pure functions of the raw rows and the config. They share every
//! stage up to extraction, so the training and inference layouts cannot drift.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::cleaner::{RawTrip, clean_trips, truncate_to_hour};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::{LagRow, TargetPolicy, WindowExtractor};
use crate::grid::{DenseGrid, build_dense_grid};
use crate::rank::{RankedLocation, top_locations};
use crate::stats::{RunMode, RunStats};

/// Where an inference run anchors its "current hour".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsOf {
    /// A wall-clock instant, truncated to the hour.
    Clock(DateTime<Utc>),
    /// The hour after the last hour of data, so the landmark is the last
    /// observed hour.
    DataEnd,
}

impl AsOf {
    pub fn current_hour(&self, grid: &DenseGrid) -> Option<DateTime<Utc>> {
        match self {
            AsOf::Clock(now) => Some(truncate_to_hour(*now)),
            AsOf::DataEnd => grid.end().map(|end| end + Duration::hours(1)),
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRun {
    pub window_size: usize,
    /// Selected locations, busiest first.
    pub locations: Vec<RankedLocation>,
    /// Rows grouped by location in ranked order, hour-ascending within a location.
    pub rows: Vec<LagRow>,
    /// Inference runs only.
    pub current_hour: Option<DateTime<Utc>>,
    pub stats: RunStats,
}

impl FeatureRun {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

struct Prepared {
    grid: DenseGrid,
    locations: Vec<RankedLocation>,
    stats: RunStats,
}

fn prepare(
    raw: &[RawTrip],
    config: &PipelineConfig,
    mode: RunMode,
) -> Result<Prepared, PipelineError> {
    if raw.is_empty() {
        return Err(PipelineError::Retrieval(
            "no parseable trip rows were retrieved".to_string(),
        ));
    }

    let events = clean_trips(raw, config.max_trip_duration());
    let grid = build_dense_grid(&events);
    let locations = top_locations(&grid, config.top_k);

    let mut stats = RunStats::new(mode, raw.len(), events.len());
    stats.grid_hours = grid.hour_count();
    stats.grid_locations = grid.locations().len();
    stats.first_hour = grid.start();
    stats.last_hour = grid.end();
    stats.selected_locations = locations.len();

    if stats.no_data {
        warn!(raw_rows = raw.len(), "No valid trips after cleaning");
    } else {
        info!(
            raw_rows = stats.raw_rows,
            cleaned_rows = stats.cleaned_rows,
            kept_pct = stats.kept_pct(),
            grid_hours = stats.grid_hours,
            grid_locations = stats.grid_locations,
            "Hourly grid built"
        );
    }

    for location in &locations {
        debug!(
            location_id = location.location_id,
            total_rides = location.total_rides,
            "Location selected"
        );
    }

    Ok(Prepared {
        grid,
        locations,
        stats,
    })
}

/// Builds the training table: every complete window of every selected
/// location, targets included.
pub fn build_training_table(
    raw: &[RawTrip],
    config: &PipelineConfig,
) -> Result<FeatureRun, PipelineError> {
    let Prepared {
        grid,
        locations,
        mut stats,
    } = prepare(raw, config, RunMode::Training)?;
    let extractor = WindowExtractor::from(config);

    let mut rows = Vec::new();
    for location in &locations {
        let Some(series) = grid.series(location.location_id) else {
            continue;
        };
        let location_rows = extractor.historical(&series);
        if location_rows.is_empty() {
            stats.insufficient_history += 1;
            warn!(
                location_id = location.location_id,
                hours = series.len(),
                window_size = extractor.window_size,
                "Not enough history for a training window"
            );
        }
        rows.extend(location_rows);
    }

    stats.rows_emitted = rows.len();
    info!(
        locations = locations.len(),
        rows = rows.len(),
        "Training table built"
    );

    Ok(FeatureRun {
        window_size: extractor.window_size,
        locations,
        rows,
        current_hour: None,
        stats,
    })
}

/// Builds one inference row per selected location, anchored at `as_of`.
///
/// Locations whose landmark hour is missing or lacks leading history are
/// skipped and counted in `stats.insufficient_history`.
pub fn build_inference_rows(
    raw: &[RawTrip],
    config: &PipelineConfig,
    as_of: AsOf,
    policy: TargetPolicy,
) -> Result<FeatureRun, PipelineError> {
    let Prepared {
        grid,
        locations,
        mut stats,
    } = prepare(raw, config, RunMode::Inference)?;
    let extractor = WindowExtractor::from(config);
    let current_hour = as_of.current_hour(&grid);

    let mut rows = Vec::new();
    if let Some(now) = current_hour {
        for location in &locations {
            let row = grid
                .series(location.location_id)
                .and_then(|series| extractor.latest(&series, now, policy));
            match row {
                Some(row) => rows.push(row),
                None => {
                    stats.insufficient_history += 1;
                    warn!(
                        location_id = location.location_id,
                        current_hour = %now,
                        "Landmark hour missing or too little history"
                    );
                }
            }
        }
    }

    stats.rows_emitted = rows.len();
    info!(
        locations = locations.len(),
        rows = rows.len(),
        current_hour = ?current_hour,
        "Inference rows built"
    );

    Ok(FeatureRun {
        window_size: extractor.window_size,
        locations,
        rows,
        current_hour,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn trip(h: i64, station: &str) -> RawTrip {
        let start = base() + Duration::hours(h) + Duration::minutes(5);
        let end = start + Duration::minutes(20);
        RawTrip::new(
            &start.format("%Y-%m-%d %H:%M:%S").to_string(),
            &end.format("%Y-%m-%d %H:%M:%S").to_string(),
            station,
        )
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            window_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_raw_input_is_retrieval_error() {
        let err = build_training_table(&[], &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
    }

    #[test]
    fn test_all_rows_invalid_is_empty_result() {
        let raw = vec![RawTrip::new("bad", "worse", "x")];
        let run = build_training_table(&raw, &PipelineConfig::default()).unwrap();

        assert!(run.is_empty());
        assert!(run.stats.no_data);
        assert_eq!(run.stats.dropped_rows, 1);
        assert!(run.locations.is_empty());
    }

    #[test]
    fn test_training_rows_follow_ranked_order() {
        let mut raw = Vec::new();
        for h in 0..6 {
            raw.push(trip(h, "2"));
            raw.push(trip(h, "1"));
            raw.push(trip(h, "1"));
        }
        let run = build_training_table(&raw, &small_config()).unwrap();

        let ids: Vec<i64> = run.locations.iter().map(|l| l.location_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(run.rows.len(), 6);
        assert!(run.rows[..3].iter().all(|r| r.location_id == 1));
        assert!(run.rows[3..].iter().all(|r| r.location_id == 2));
        assert_eq!(run.rows[0].features, vec![2, 2, 2]);
        assert!(run.rows.iter().all(|r| r.target.is_some()));
    }

    #[test]
    fn test_short_location_counted_as_insufficient() {
        let mut raw: Vec<RawTrip> = (0..10).map(|h| trip(h, "1")).collect();
        raw.push(trip(0, "2"));
        // Location 2 still spans the full grid, zero-filled, so it gets windows too.
        let run = build_training_table(&raw, &small_config()).unwrap();
        assert_eq!(run.stats.insufficient_history, 0);
        assert_eq!(run.rows.len(), 14);

        let short: Vec<RawTrip> = (0..3).map(|h| trip(h, "1")).collect();
        let run = build_training_table(&short, &small_config()).unwrap();
        assert!(run.is_empty());
        assert_eq!(run.stats.insufficient_history, 1);
    }

    #[test]
    fn test_inference_data_end_uses_last_hour() {
        let raw: Vec<RawTrip> = (0..8)
            .flat_map(|h| std::iter::repeat_n(trip(h, "4"), h as usize + 1))
            .collect();
        let run =
            build_inference_rows(&raw, &small_config(), AsOf::DataEnd, TargetPolicy::Omit).unwrap();

        assert_eq!(run.current_hour, Some(base() + Duration::hours(8)));
        assert_eq!(run.rows.len(), 1);
        let row = &run.rows[0];
        assert_eq!(row.features, vec![5, 6, 7]);
        assert_eq!(row.target, None);
        assert_eq!(row.pickup_hour, base() + Duration::hours(8));
        assert_eq!(row.hour_of_day, 7);
    }

    #[test]
    fn test_inference_clock_without_landmark_yields_nothing() {
        let raw: Vec<RawTrip> = (0..8).map(|h| trip(h, "4")).collect();
        let far_future = AsOf::Clock(base() + Duration::days(30));
        let run =
            build_inference_rows(&raw, &small_config(), far_future, TargetPolicy::Omit).unwrap();

        assert!(run.is_empty());
        assert_eq!(run.stats.insufficient_history, 1);
        assert_eq!(run.stats.selected_locations, 1);
    }
}
