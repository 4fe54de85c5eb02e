use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

use super::{LinearModel, Model, ModelRegistry, artifact_path};

/// Models published under `<root>/<name>/v<version>/model.json`.
pub struct LocalModelRegistry {
    root: PathBuf,
}

impl LocalModelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ModelRegistry for LocalModelRegistry {
    #[tracing::instrument(skip(self))]
    async fn get_model(&self, name: &str, version: u32) -> Result<Box<dyn Model>> {
        let path = self.root.join(artifact_path(name, version));
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading model artifact {}", path.display()))?;
        let model = LinearModel::from_json(&bytes)?;

        info!(path = %path.display(), columns = model.columns.len(), "Model loaded");
        Ok(Box::new(model))
    }
}
