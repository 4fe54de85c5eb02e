use anyhow::{Context, Result, bail};
use csv::WriterBuilder;
use std::io::Read;

/// Named columns of text cells, the unit handed to a feature group.
///
/// Cells are already formatted; column order is the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            );
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Positions of `names`, failing on the first missing column.
    pub fn column_indices(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .with_context(|| format!("table has no column '{name}'"))
            })
            .collect()
    }

    /// Serializes with a header line.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flushing CSV buffer: {}", e.error()))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let columns = rdr
            .headers()
            .context("reading CSV header")?
            .iter()
            .map(String::from)
            .collect();

        let mut table = Table {
            columns,
            rows: Vec::new(),
        };
        for record in rdr.records() {
            let record = record?;
            table.push(record.iter().map(String::from).collect())?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        let mut table = Table::new(["location_id", "pickup_hour", "rides"]);
        table
            .push(vec!["1".into(), "2024-05-01T08:00:00Z".into(), "4".into()])
            .unwrap();
        table
            .push(vec!["2".into(), "2024-05-01T08:00:00Z".into(), "0".into()])
            .unwrap();
        table
    }

    #[test]
    fn test_push_checks_width() {
        let mut table = Table::new(["a", "b"]);
        assert!(table.push(vec!["1".into()]).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_csv_round_trip() {
        let table = sample();
        let bytes = table.to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with("location_id,pickup_hour,rides\n"));

        assert_eq!(Table::from_csv_reader(bytes.as_slice()).unwrap(), table);
    }

    #[test]
    fn test_column_indices() {
        let table = sample();
        let key = vec!["pickup_hour".to_string(), "location_id".to_string()];
        assert_eq!(table.column_indices(&key).unwrap(), vec![1, 0]);
        assert!(table.column_indices(&["nope".to_string()]).is_err());
    }
}
