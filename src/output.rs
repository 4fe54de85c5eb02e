//! Output formatting and persistence for pipeline results.
//!
//! Converts lag rows and predictions into [`Table`]s with a fixed column
//! order, and appends run statistics to a CSV run log.

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::features::{LagRow, model_columns};
use crate::predict::PredictionRow;
use crate::stats::RunStats;
use crate::store::Table;

/// RFC 3339 with a `Z` suffix, whole seconds.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Lag rows as a table: model columns, then `target` when any row has one,
/// then `pickup_hour`.
pub fn lag_table(window_size: usize, rows: &[LagRow]) -> Result<Table> {
    let with_target = rows.iter().any(|r| r.target.is_some());

    let mut columns = model_columns(window_size);
    if with_target {
        columns.push("target".to_string());
    }
    columns.push("pickup_hour".to_string());

    let mut table = Table::new(columns);
    for row in rows {
        let mut cells: Vec<String> = row.features.iter().map(i32::to_string).collect();
        cells.push(row.hour_of_day.to_string());
        cells.push(row.day_of_week.to_string());
        cells.push(row.location_id.to_string());
        if with_target {
            cells.push(row.target.map(|t| t.to_string()).unwrap_or_default());
        }
        cells.push(format_timestamp(row.pickup_hour));
        table.push(cells)?;
    }
    Ok(table)
}

pub fn prediction_table(rows: &[PredictionRow]) -> Table {
    let mut table = Table::new(["location_id", "predicted_rides", "prediction_time"]);
    table.rows = rows
        .iter()
        .map(|p| {
            vec![
                p.location_id.to_string(),
                p.predicted_rides.to_string(),
                format_timestamp(p.prediction_time),
            ]
        })
        .collect();
    table
}

/// Writes a table to a CSV file, replacing any previous content.
pub fn write_table(path: impl AsRef<Path>, table: &Table) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, table.to_csv_bytes()?)?;
    info!(path = %path.display(), rows = table.len(), "CSV written");
    Ok(())
}

/// Logs run statistics as pretty-printed JSON.
pub fn print_json(stats: &RunStats) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(stats)?);
    Ok(())
}

/// Appends one run's counts to the `--run-log` CSV, so dropped-row rates and
/// insufficient-history counts can be compared across scheduled runs.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, stats: &RunStats) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending run log record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(stats)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::RunMode;
    use chrono::TimeZone;
    use std::fs;

    fn hour() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn lag_row(target: Option<i32>) -> LagRow {
        LagRow {
            features: vec![3, 0],
            hour_of_day: 8,
            day_of_week: 2,
            location_id: 6140,
            target,
            pickup_hour: hour(),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(hour()), "2024-05-01T08:00:00Z");
    }

    #[test]
    fn test_lag_table_training_layout() {
        let table = lag_table(2, &[lag_row(Some(5))]).unwrap();
        assert_eq!(
            table.columns,
            vec![
                "feature_1",
                "feature_2",
                "hour_of_day",
                "day_of_week",
                "location_id",
                "target",
                "pickup_hour"
            ]
        );
        assert_eq!(
            table.rows[0],
            vec!["3", "0", "8", "2", "6140", "5", "2024-05-01T08:00:00Z"]
        );
    }

    #[test]
    fn test_lag_table_inference_layout_has_no_target() {
        let table = lag_table(2, &[lag_row(None)]).unwrap();
        assert!(table.column_index("target").is_none());
        assert_eq!(table.columns.len(), 6);
    }

    #[test]
    fn test_lag_table_rejects_wrong_width() {
        assert!(lag_table(3, &[lag_row(Some(1))]).is_err());
    }

    #[test]
    fn test_prediction_table() {
        let table = prediction_table(&[PredictionRow {
            location_id: 1,
            predicted_rides: 4,
            prediction_time: hour(),
        }]);
        assert_eq!(table.rows[0], vec!["1", "4", "2024-05-01T08:00:00Z"]);
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&RunStats::default()).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.csv");
        let path = path.to_str().unwrap();

        let stats = RunStats::new(RunMode::Training, 10, 8);
        append_record(path, &stats).unwrap();
        append_record(path, &stats).unwrap();

        let content = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines.iter().filter(|l| l.starts_with("timestamp")).count(),
            1
        );
        assert!(lines[1].contains(",training,10,8,2,"));
    }

    #[test]
    fn test_write_table_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/features.csv");
        write_table(&path, &lag_table(2, &[lag_row(Some(5))]).unwrap()).unwrap();
        assert!(path.exists());
    }
}
