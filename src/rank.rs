//! Busiest-location selection.

use crate::cleaner::LocationId;
use crate::grid::DenseGrid;

/// A location and its total rides over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedLocation {
    pub location_id: LocationId,
    pub total_rides: u64,
}

/// Ranks every location by total rides, busiest first, ties by ascending id.
pub fn rank_locations(grid: &DenseGrid) -> Vec<RankedLocation> {
    let mut ranked: Vec<RankedLocation> = grid
        .totals()
        .into_iter()
        .map(|(location_id, total_rides)| RankedLocation {
            location_id,
            total_rides,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_rides
            .cmp(&a.total_rides)
            .then(a.location_id.cmp(&b.location_id))
    });
    ranked
}

/// The `k` busiest locations, or all of them when fewer exist.
pub fn top_locations(grid: &DenseGrid, k: usize) -> Vec<RankedLocation> {
    let mut ranked = rank_locations(grid);
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HourlyCount;
    use chrono::{Duration, TimeZone, Utc};

    fn grid(counts: &[(i64, LocationId, u32)]) -> DenseGrid {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let counts: Vec<HourlyCount> = counts
            .iter()
            .map(|&(h, location_id, rides)| HourlyCount {
                hour: base + Duration::hours(h),
                location_id,
                rides,
            })
            .collect();
        DenseGrid::from_counts(&counts)
    }

    fn ids(ranked: &[RankedLocation]) -> Vec<LocationId> {
        ranked.iter().map(|r| r.location_id).collect()
    }

    #[test]
    fn test_orders_by_total_descending() {
        let g = grid(&[(0, 1, 2), (1, 2, 9), (2, 3, 5), (3, 1, 1)]);
        let ranked = top_locations(&g, 3);
        assert_eq!(ids(&ranked), vec![2, 3, 1]);
        assert_eq!(ranked[0].total_rides, 9);
        assert_eq!(ranked[2].total_rides, 3);
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let g = grid(&[(0, 30, 4), (0, 10, 4), (1, 20, 4), (1, 5, 1)]);
        assert_eq!(ids(&top_locations(&g, 3)), vec![10, 20, 30]);
    }

    #[test]
    fn test_exactly_k_when_enough() {
        let g = grid(&[(0, 1, 1), (0, 2, 2), (0, 3, 3), (0, 4, 4), (0, 5, 5)]);
        assert_eq!(ids(&top_locations(&g, 3)), vec![5, 4, 3]);
    }

    #[test]
    fn test_all_when_fewer_than_k() {
        let g = grid(&[(0, 8, 1), (0, 2, 1)]);
        assert_eq!(ids(&top_locations(&g, 3)), vec![2, 8]);
    }

    #[test]
    fn test_empty_grid() {
        assert!(top_locations(&DenseGrid::default(), 3).is_empty());
    }
}
