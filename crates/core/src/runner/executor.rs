//! The stage executor seam.
//!
//! Document generation itself lives outside this subsystem; the runner only
//! needs something that can execute one stage for one pipeline. Tests plug in
//! mock executors.

use async_trait::async_trait;
use dp_protocol::{PassthroughPipeline, PipelineStage};
use thiserror::Error;

/// A stage execution failure, carried into the stage's structured error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutorError {
    /// Human-readable failure description.
    pub message: String,

    /// Categorization code recorded on the stage.
    pub code: String,
}

impl ExecutorError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Executes a single pipeline stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(
        &self,
        pipeline: &PassthroughPipeline,
        stage: &PipelineStage,
    ) -> Result<(), ExecutorError>;
}
