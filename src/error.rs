//! Run-level failures of the pipeline.
//!
//! Dropped trip rows and locations with too little history are not errors;
//! they only show up as smaller counts in [`crate::stats::RunStats`].

use thiserror::Error;

/// A failed run, naming the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The raw trip source produced no parseable rows at all.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("feature store failed: {0}")]
    Store(String),

    #[error("model registry failed: {0}")]
    Registry(String),

    /// The model returned a prediction vector that does not line up with its input.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl PipelineError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }

    pub fn registry(err: anyhow::Error) -> Self {
        Self::Registry(format!("{err:#}"))
    }

    /// Short stage label used in logs.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Retrieval(_) => "retrieval",
            PipelineError::Store(_) => "feature_store",
            PipelineError::Registry(_) => "model_registry",
            PipelineError::Prediction(_) => "prediction",
        }
    }
}
