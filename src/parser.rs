//! Decoding of trip archives: ZIP files holding one or more CSVs, or bare CSV.

use anyhow::{Context, Result};
use std::io::{Cursor, Read};
use tracing::debug;
use zip::ZipArchive;

use crate::cleaner::RawTrip;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Decodes a downloaded or local trip file, picking ZIP or CSV by content.
pub fn parse_trip_archive(bytes: &[u8]) -> Result<Vec<RawTrip>> {
    if is_zip(bytes) {
        parse_trip_zip(bytes)
    } else {
        parse_trip_csv(bytes)
    }
}

/// Reads every CSV entry of a ZIP archive, in archive order.
///
/// Directory entries, `__MACOSX/` resource forks and non-CSV files are skipped.
pub fn parse_trip_zip(bytes: &[u8]) -> Result<Vec<RawTrip>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).context("opening trip ZIP archive")?;
    let mut trips = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("reading ZIP entry {i}"))?;
        let name = entry.name().to_string();
        if entry.is_dir() || name.starts_with("__MACOSX/") || !name.to_lowercase().ends_with(".csv")
        {
            continue;
        }

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .with_context(|| format!("decompressing ZIP entry '{name}'"))?;
        let rows = parse_trip_csv(&content).with_context(|| format!("parsing '{name}'"))?;
        debug!(entry = %name, rows = rows.len(), "ZIP entry parsed");
        trips.extend(rows);
    }

    Ok(trips)
}

/// Reads trip rows from CSV with a header line.
///
/// Rows that fail to deserialize are skipped; a header that cannot be read is
/// an error.
pub fn parse_trip_csv(bytes: &[u8]) -> Result<Vec<RawTrip>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);
    rdr.headers().context("reading CSV header")?;

    let mut trips = Vec::new();
    let mut skipped = 0usize;
    for result in rdr.deserialize::<RawTrip>() {
        match result {
            Ok(trip) => trips.push(trip),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!(skipped, "Unreadable CSV rows skipped");
    }
    Ok(trips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    const CURRENT: &str = "ride_id,rideable_type,started_at,ended_at,start_station_name,start_station_id\n\
        A1,classic_bike,2024-05-01 08:15:00.123,2024-05-01 08:30:00.456,W 21 St,6140.05\n\
        A2,electric_bike,2024-05-01 09:01:00,2024-05-01 09:20:00,Broadway,\n";

    const LEGACY: &str = "tripduration,starttime,stoptime,start station id\n\
        600,2016-01-01 00:00:41,2016-01-01 00:10:41,268\n";

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_parse_current_columns() {
        let trips = parse_trip_csv(CURRENT.as_bytes()).unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(
            trips[0].started_at.as_deref(),
            Some("2024-05-01 08:15:00.123")
        );
        assert_eq!(trips[0].start_station_id.as_deref(), Some("6140.05"));
        assert!(trips[1].start_station_id.is_none());
    }

    #[test]
    fn test_parse_legacy_columns() {
        let trips = parse_trip_csv(LEGACY.as_bytes()).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].ended_at.as_deref(), Some("2016-01-01 00:10:41"));
        assert_eq!(trips[0].start_station_id.as_deref(), Some("268"));
    }

    #[test]
    fn test_parse_missing_columns_gives_none() {
        let trips = parse_trip_csv(b"ride_id,started_at\nX,2024-05-01 08:00:00\n").unwrap();
        assert_eq!(trips.len(), 1);
        assert!(trips[0].ended_at.is_none());
        assert!(trips[0].start_station_id.is_none());
    }

    #[test]
    fn test_parse_zip_reads_all_csv_entries() {
        let bytes = zip_of(&[
            ("202405-citibike-tripdata_1.csv", CURRENT),
            ("__MACOSX/._202405-citibike-tripdata_1.csv", "junk"),
            ("README.txt", "not a csv"),
            ("202405-citibike-tripdata_2.csv", CURRENT),
        ]);
        assert!(is_zip(&bytes));

        let trips = parse_trip_archive(&bytes).unwrap();
        assert_eq!(trips.len(), 4);
    }

    #[test]
    fn test_parse_archive_falls_back_to_csv() {
        let trips = parse_trip_archive(LEGACY.as_bytes()).unwrap();
        assert_eq!(trips.len(), 1);
    }

    #[test]
    fn test_truncated_zip_is_error() {
        let mut bytes = zip_of(&[("a.csv", CURRENT)]);
        bytes.truncate(bytes.len() / 2);
        assert!(parse_trip_archive(&bytes).is_err());
    }
}
