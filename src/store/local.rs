use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{FeatureGroup, FeatureStore, GetOrCreate, GroupSpec, Table};

const METADATA_FILE: &str = "group.json";
const DATA_FILE: &str = "data.csv";

/// Feature groups kept on local disk:
///
/// ```text
/// <root>/<name>_v<version>/group.json   group spec
/// <root>/<name>_v<version>/data.csv     rows, sorted by primary key
/// ```
pub struct LocalFeatureStore {
    root: PathBuf,
}

impl LocalFeatureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FeatureStore for LocalFeatureStore {
    type Group = LocalFeatureGroup;

    #[tracing::instrument(skip(self, spec), fields(group = %spec.qualified_name()))]
    async fn get_or_create(&self, spec: &GroupSpec) -> Result<GetOrCreate<LocalFeatureGroup>> {
        let dir = self.root.join(spec.qualified_name());
        let metadata_path = dir.join(METADATA_FILE);

        if tokio::fs::try_exists(&metadata_path).await? {
            let content = tokio::fs::read_to_string(&metadata_path)
                .await
                .with_context(|| format!("reading {}", metadata_path.display()))?;
            let existing: GroupSpec = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", metadata_path.display()))?;
            spec.ensure_compatible(&existing)?;

            debug!("Using existing feature group");
            return Ok(GetOrCreate::Existing(LocalFeatureGroup {
                dir,
                spec: existing,
            }));
        }

        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        tokio::fs::write(&metadata_path, serde_json::to_vec_pretty(spec)?)
            .await
            .with_context(|| format!("writing {}", metadata_path.display()))?;

        info!("Created feature group");
        Ok(GetOrCreate::Created(LocalFeatureGroup {
            dir,
            spec: spec.clone(),
        }))
    }
}

pub struct LocalFeatureGroup {
    dir: PathBuf,
    spec: GroupSpec,
}

impl LocalFeatureGroup {
    pub fn data_path(&self) -> PathBuf {
        self.dir.join(DATA_FILE)
    }

    /// Everything stored so far.
    pub async fn read(&self) -> Result<Table> {
        let path = self.data_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Table::default());
        }
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Table::from_csv_reader(bytes.as_slice())
    }
}

#[async_trait]
impl FeatureGroup for LocalFeatureGroup {
    fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    /// Rewrites `data.csv` with the new rows merged in. A row whose key is
    /// already stored replaces the stored row.
    #[tracing::instrument(skip(self, table), fields(group = %self.spec.qualified_name(), rows = table.len()))]
    async fn write(&self, table: &Table) -> Result<usize> {
        let existing = self.read().await?;
        if !existing.columns.is_empty() && existing.columns != table.columns {
            bail!(
                "column mismatch for '{}': stored {:?}, writing {:?}",
                self.spec.qualified_name(),
                existing.columns,
                table.columns
            );
        }

        let key_indices = table.column_indices(&self.spec.primary_key)?;
        let key_of = |row: &Vec<String>| -> Vec<String> {
            key_indices.iter().map(|&i| row[i].clone()).collect()
        };

        let mut merged: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
        for row in existing.rows.into_iter().chain(table.rows.iter().cloned()) {
            merged.insert(key_of(&row), row);
        }

        let mut out = Table::new(table.columns.iter().cloned());
        for row in merged.into_values() {
            out.push(row)?;
        }

        let path = self.data_path();
        let tmp = self.dir.join(format!("{DATA_FILE}.tmp"));
        tokio::fs::write(&tmp, out.to_csv_bytes()?)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;

        info!(stored_rows = out.len(), "Feature group written");
        Ok(table.len())
    }
}
