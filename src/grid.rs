//! Hourly aggregation and gap filling.
//!
//! Trips are counted per (hour, location) and then spread over a dense grid
//! covering every hour between the first and last observed hour for every
//! observed location. Hours without trips hold zero, so a lag window over the
//! grid always spans contiguous hours.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::cleaner::{LocationId, TripEvent};

/// Number of trips starting at one location within one hour. Only hours with
/// at least one trip appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub location_id: LocationId,
    pub rides: u32,
}

/// One (hour, location) cell of a [`DenseGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub hour: DateTime<Utc>,
    pub location_id: LocationId,
    pub rides: u32,
}

/// Counts trips per (pickup hour, location), sorted by hour then location.
pub fn hourly_counts(events: &[TripEvent]) -> Vec<HourlyCount> {
    let mut counts: BTreeMap<(DateTime<Utc>, LocationId), u32> = BTreeMap::new();
    for event in events {
        *counts
            .entry((event.pickup_hour, event.location_id))
            .or_default() += 1;
    }

    counts
        .into_iter()
        .map(|((hour, location_id), rides)| HourlyCount {
            hour,
            location_id,
            rides,
        })
        .collect()
}

/// Aggregates cleaned trips straight into a gap-free grid.
pub fn build_dense_grid(events: &[TripEvent]) -> DenseGrid {
    DenseGrid::from_counts(&hourly_counts(events))
}

/// Hour × location ride counts with no missing cells.
///
/// Stored location-major so each location's series is one contiguous slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseGrid {
    start: Option<DateTime<Utc>>,
    hours: usize,
    locations: Vec<LocationId>,
    rides: Vec<u32>,
}

impl DenseGrid {
    /// Builds the full grid from sparse counts. Count hours must already be
    /// truncated to the hour.
    pub fn from_counts(counts: &[HourlyCount]) -> Self {
        let (Some(min_hour), Some(max_hour)) = (
            counts.iter().map(|c| c.hour).min(),
            counts.iter().map(|c| c.hour).max(),
        ) else {
            return Self::default();
        };

        let hours = (max_hour - min_hour).num_hours() as usize + 1;
        let locations: Vec<LocationId> = counts
            .iter()
            .map(|c| c.location_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut rides = vec![0u32; hours * locations.len()];
        for count in counts {
            debug_assert_eq!(crate::cleaner::truncate_to_hour(count.hour), count.hour);
            // Locations were collected from these very counts.
            let Ok(loc_idx) = locations.binary_search(&count.location_id) else {
                continue;
            };
            let offset = (count.hour - min_hour).num_hours() as usize;
            rides[loc_idx * hours + offset] += count.rides;
        }

        Self {
            start: Some(min_hour),
            hours,
            locations,
            rides,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    /// Number of hours covered, first and last inclusive.
    pub fn hour_count(&self) -> usize {
        self.hours
    }

    /// Observed locations, ascending.
    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start
    }

    /// The last hour of the grid.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.hour_at(self.hours.checked_sub(1)?)
    }

    pub fn hour_at(&self, offset: usize) -> Option<DateTime<Utc>> {
        if offset >= self.hours {
            return None;
        }
        Some(self.start? + Duration::hours(offset as i64))
    }

    /// Position of `hour` in the grid, if it falls exactly on a grid hour.
    pub fn offset_of(&self, hour: DateTime<Utc>) -> Option<usize> {
        offset_from(self.start?, self.hours, hour)
    }

    pub fn series(&self, location_id: LocationId) -> Option<LocationSeries<'_>> {
        let loc_idx = self.locations.binary_search(&location_id).ok()?;
        let start = self.start?;
        let values = &self.rides[loc_idx * self.hours..(loc_idx + 1) * self.hours];
        Some(LocationSeries {
            location_id,
            start,
            values,
        })
    }

    pub fn get(&self, hour: DateTime<Utc>, location_id: LocationId) -> Option<u32> {
        let series = self.series(location_id)?;
        series.values.get(self.offset_of(hour)?).copied()
    }

    /// Every cell, ordered by hour then location.
    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        (0..self.hours).flat_map(move |offset| {
            self.locations
                .iter()
                .enumerate()
                .filter_map(move |(loc_idx, &location_id)| {
                    Some(GridCell {
                        hour: self.hour_at(offset)?,
                        location_id,
                        rides: self.rides[loc_idx * self.hours + offset],
                    })
                })
        })
    }

    /// Total rides per location over the whole grid, in location order.
    pub fn totals(&self) -> Vec<(LocationId, u64)> {
        self.locations
            .iter()
            .enumerate()
            .map(|(loc_idx, &location_id)| {
                let slice = &self.rides[loc_idx * self.hours..(loc_idx + 1) * self.hours];
                (location_id, slice.iter().map(|&r| u64::from(r)).sum())
            })
            .collect()
    }
}

fn offset_from(start: DateTime<Utc>, len: usize, hour: DateTime<Utc>) -> Option<usize> {
    let delta = hour - start;
    if delta < Duration::zero() || delta.num_seconds() % 3600 != 0 || delta.subsec_nanos() != 0 {
        return None;
    }
    let offset = delta.num_hours() as usize;
    (offset < len).then_some(offset)
}

/// One location's contiguous hourly ride counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationSeries<'a> {
    pub location_id: LocationId,
    pub start: DateTime<Utc>,
    pub values: &'a [u32],
}

impl<'a> LocationSeries<'a> {
    pub fn new(location_id: LocationId, start: DateTime<Utc>, values: &'a [u32]) -> Self {
        Self {
            location_id,
            start,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn hour_at(&self, offset: usize) -> DateTime<Utc> {
        self.start + Duration::hours(offset as i64)
    }

    pub fn offset_of(&self, hour: DateTime<Utc>) -> Option<usize> {
        offset_from(self.start, self.values.len(), hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn event(h: i64, location_id: LocationId) -> TripEvent {
        let start_time = hour(h) + Duration::minutes(10);
        TripEvent {
            start_time,
            end_time: start_time + Duration::minutes(15),
            location_id,
            pickup_hour: hour(h),
        }
    }

    #[test]
    fn test_hourly_counts_groups_and_sorts() {
        let events = vec![event(2, 5), event(0, 9), event(2, 5), event(0, 1)];
        let counts = hourly_counts(&events);

        let triples: Vec<_> = counts
            .iter()
            .map(|c| (c.hour, c.location_id, c.rides))
            .collect();
        assert_eq!(
            triples,
            vec![(hour(0), 1, 1), (hour(0), 9, 1), (hour(2), 5, 2)]
        );
    }

    #[test]
    fn test_empty_grid() {
        let grid = build_dense_grid(&[]);
        assert!(grid.is_empty());
        assert_eq!(grid.hour_count(), 0);
        assert_eq!(grid.cells().count(), 0);
        assert!(grid.end().is_none());
    }

    #[test]
    fn test_single_cell_grid() {
        let grid = build_dense_grid(&[event(3, 42)]);
        assert_eq!(grid.hour_count(), 1);
        assert_eq!(grid.locations(), &[42]);
        assert_eq!(grid.get(hour(3), 42), Some(1));
        assert_eq!(grid.start(), grid.end());
    }

    #[test]
    fn test_gaps_are_zero_filled() {
        let events = vec![event(0, 1), event(5, 1), event(2, 7)];
        let grid = build_dense_grid(&events);

        assert_eq!(grid.hour_count(), 6);
        assert_eq!(grid.series(1).unwrap().values, &[1, 0, 0, 0, 0, 1]);
        assert_eq!(grid.series(7).unwrap().values, &[0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_grid_completeness() {
        let events = vec![
            event(0, 3),
            event(7, 1),
            event(7, 1),
            event(4, 2),
            event(11, 3),
        ];
        let grid = build_dense_grid(&events);

        let cells: Vec<GridCell> = grid.cells().collect();
        assert_eq!(cells.len(), 12 * 3);

        let mut seen = BTreeSet::new();
        for cell in &cells {
            assert!(seen.insert((cell.hour, cell.location_id)), "duplicate cell");
        }
        for h in 0..12 {
            for loc in [1, 2, 3] {
                assert!(seen.contains(&(hour(h), loc)), "missing cell {h} {loc}");
            }
        }

        let total: u32 = cells.iter().map(|c| c.rides).sum();
        assert_eq!(total, events.len() as u32);
    }

    #[test]
    fn test_cells_are_hour_major() {
        let grid = build_dense_grid(&[event(0, 2), event(1, 1)]);
        let order: Vec<(i64, LocationId)> = grid
            .cells()
            .map(|c| ((c.hour - hour(0)).num_hours(), c.location_id))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 2), (1, 1), (1, 2)]);
    }

    #[test]
    fn test_offsets() {
        let grid = build_dense_grid(&[event(0, 1), event(3, 1)]);
        assert_eq!(grid.offset_of(hour(3)), Some(3));
        assert_eq!(grid.offset_of(hour(4)), None);
        assert_eq!(grid.offset_of(hour(-1)), None);
        assert_eq!(grid.offset_of(hour(1) + Duration::minutes(30)), None);
        assert_eq!(grid.hour_at(2), Some(hour(2)));
        assert_eq!(grid.hour_at(4), None);
    }

    #[test]
    fn test_totals() {
        let grid = build_dense_grid(&[event(0, 1), event(1, 1), event(1, 2)]);
        assert_eq!(grid.totals(), vec![(1, 2), (2, 1)]);
    }
}
