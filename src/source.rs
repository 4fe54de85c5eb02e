//! Raw trip retrieval, addressed by calendar month.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::cleaner::RawTrip;
use crate::error::PipelineError;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::parser::parse_trip_archive;

pub const DEFAULT_TRIPDATA_BASE_URL: &str = "https://s3.amazonaws.com/tripdata";

/// A calendar month, the unit in which trip archives are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("month must be in 1..=12, got {month}");
        }
        Ok(Self { year, month })
    }

    /// The last month that has fully ended before `today`.
    pub fn previous_full_month(today: NaiveDate) -> Self {
        Self {
            year: today.year(),
            month: today.month(),
        }
        .pred()
    }

    pub fn pred(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Every month from `from` to `to`, both inclusive. Empty if `to < from`.
    pub fn range(from: Self, to: Self) -> Vec<Self> {
        let mut months = Vec::new();
        let mut current = from;
        while current <= to {
            months.push(current);
            current = current.succ();
        }
        months
    }

    /// `YYYYMM`, as used in archive file names.
    pub fn compact(&self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = anyhow::Error;

    /// Accepts `YYYY-MM` and `YYYYMM`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (year, month) = match s.split_once('-') {
            Some(parts) => parts,
            None if s.len() == 6 => s.split_at(4),
            None => bail!("expected YYYY-MM or YYYYMM, got '{s}'"),
        };
        let year: i32 = year.parse().map_err(|_| anyhow!("invalid year in '{s}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| anyhow!("invalid month in '{s}'"))?;
        Self::new(year, month)
    }
}

/// Anything that can hand back the raw trips of one month.
#[async_trait]
pub trait TripSource: Send + Sync {
    async fn fetch_month(&self, month: YearMonth) -> Result<Vec<RawTrip>>;
}

/// Downloads `{base_url}/{YYYYMM}-citibike-tripdata.zip`.
pub struct TripDataClient<C> {
    client: C,
    base_url: String,
}

impl<C: HttpClient> TripDataClient<C> {
    pub fn new(client: C) -> Self {
        Self::with_base_url(client, DEFAULT_TRIPDATA_BASE_URL)
    }

    pub fn with_base_url(client: C, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn archive_url(&self, month: YearMonth) -> String {
        format!(
            "{}/{}-citibike-tripdata.zip",
            self.base_url,
            month.compact()
        )
    }
}

#[async_trait]
impl<C: HttpClient> TripSource for TripDataClient<C> {
    #[tracing::instrument(skip(self), fields(month = %month))]
    async fn fetch_month(&self, month: YearMonth) -> Result<Vec<RawTrip>> {
        let url = self.archive_url(month);
        let bytes = fetch_bytes(&self.client, &url)
            .await
            .with_context(|| format!("downloading {url}"))?;
        info!(bytes = bytes.len(), "Trip archive downloaded");
        parse_trip_archive(&bytes).with_context(|| format!("decoding {url}"))
    }
}

/// Fetches several months, skipping the ones that fail.
///
/// Fails only when no month produced a single row.
pub async fn fetch_months<S: TripSource + ?Sized>(
    source: &S,
    months: &[YearMonth],
) -> Result<Vec<RawTrip>, PipelineError> {
    let mut trips = Vec::new();
    let mut failed = Vec::new();

    for &month in months {
        match source.fetch_month(month).await {
            Ok(rows) => {
                info!(month = %month, rows = rows.len(), "Month retrieved");
                trips.extend(rows);
            }
            Err(e) => {
                warn!(month = %month, error = %format!("{e:#}"), "Skipping month");
                failed.push(month.to_string());
            }
        }
    }

    if trips.is_empty() {
        let detail = if failed.is_empty() {
            "no trip rows in any requested month".to_string()
        } else {
            format!(
                "no trip rows retrieved; failed months: {}",
                failed.join(", ")
            )
        };
        return Err(PipelineError::Retrieval(detail));
    }
    Ok(trips)
}

/// Loads trips from a local `.zip`/`.csv` path or an `http(s)` URL.
#[tracing::instrument(skip(client), fields(source = %source))]
pub async fn load_trips<C: HttpClient + ?Sized>(client: &C, source: &str) -> Result<Vec<RawTrip>> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_bytes(client, source).await?
    } else {
        let path = Path::new(source);
        tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?
    };
    parse_trip_archive(&bytes).with_context(|| format!("decoding {source}"))
}
