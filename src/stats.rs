use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pipeline flow produced a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Training,
    Inference,
}

/// Counts describing one pipeline run. Flat so it can be appended to a CSV run log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub timestamp: DateTime<Utc>,
    pub mode: RunMode,

    // cleaning
    pub raw_rows: usize,
    pub cleaned_rows: usize,
    pub dropped_rows: usize,

    // grid
    pub grid_hours: usize,
    pub grid_locations: usize,
    pub first_hour: Option<DateTime<Utc>>,
    pub last_hour: Option<DateTime<Utc>>,

    // extraction
    pub selected_locations: usize,
    pub rows_emitted: usize,
    pub insufficient_history: usize,

    /// No trip survived cleaning.
    pub no_data: bool,
}

impl RunStats {
    pub fn new(mode: RunMode, raw_rows: usize, cleaned_rows: usize) -> Self {
        RunStats {
            timestamp: Utc::now(),
            mode,
            raw_rows,
            cleaned_rows,
            dropped_rows: raw_rows.saturating_sub(cleaned_rows),
            no_data: cleaned_rows == 0,
            ..Default::default()
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn kept_pct(&self) -> f64 {
        Self::pct(self.cleaned_rows, self.raw_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_with_zero_total() {
        assert_eq!(RunStats::pct(10, 0), 0.0);
    }

    #[test]
    fn test_pct_normal_values() {
        assert_eq!(RunStats::pct(50, 100), 50.0);
        assert_eq!(RunStats::pct(1, 4), 25.0);
    }

    #[test]
    fn test_new_counts_dropped_rows() {
        let stats = RunStats::new(RunMode::Training, 10, 7);
        assert_eq!(stats.dropped_rows, 3);
        assert!(!stats.no_data);
        assert!((stats.kept_pct() - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_flags_no_data() {
        let stats = RunStats::new(RunMode::Inference, 4, 0);
        assert!(stats.no_data);
        assert_eq!(stats.dropped_rows, 4);
    }
}
