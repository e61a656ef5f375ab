//! Stage execution loop.
//!
//! The runner drives a started pipeline through its stages, persisting every
//! step through the store. Cancellation and pausing are cooperative: the
//! record is reloaded between stages and a paused or cancelled status stops
//! the loop. There is no preemptive cancellation of an in-flight stage.

pub mod executor;

pub use executor::{ExecutorError, StageExecutor};

use crate::store::{PipelineStore, StoreError};
use dp_protocol::{PassthroughPipeline, PipelineStatus, StageError, StageStatus};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Failures of the runner itself. Stage failures are not errors here; they
/// are recorded on the pipeline and the final record is returned.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Pipeline not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives pipelines through their stage sequence.
pub struct PipelineRunner {
    store: PipelineStore,
    executor: Arc<dyn StageExecutor>,
    max_stage_retries: u32,
}

impl PipelineRunner {
    pub fn new(store: PipelineStore, executor: Arc<dyn StageExecutor>, max_stage_retries: u32) -> Self {
        Self {
            store,
            executor,
            max_stage_retries,
        }
    }

    /// Run a started pipeline until it completes, fails, or is paused or
    /// cancelled from outside. Returns the final record as persisted.
    pub async fn run(&self, pipeline_id: Uuid) -> Result<PassthroughPipeline, RunnerError> {
        loop {
            // Reload between stages so pause/cancel requested while a stage
            // was executing take effect before the next one starts.
            let pipeline = self
                .store
                .get_by_id(&pipeline_id)
                .await?
                .ok_or(RunnerError::NotFound(pipeline_id))?;

            match pipeline.status {
                PipelineStatus::Paused => {
                    info!(pipeline_id = %pipeline_id, "pipeline paused, stopping runner");
                    return Ok(pipeline);
                }
                PipelineStatus::Cancelled => {
                    info!(pipeline_id = %pipeline_id, "pipeline cancelled, stopping runner");
                    return Ok(pipeline);
                }
                PipelineStatus::Completed | PipelineStatus::Failed => return Ok(pipeline),
                PipelineStatus::Pending | PipelineStatus::Running => {}
            }

            let Some(stage) = pipeline
                .stages
                .iter()
                .find(|s| matches!(s.status, StageStatus::Pending | StageStatus::Running))
                .cloned()
            else {
                // Every stage is completed or skipped.
                let done = self
                    .store
                    .update_status(&pipeline_id, PipelineStatus::Completed, None)
                    .await?
                    .ok_or(RunnerError::NotFound(pipeline_id))?;
                info!(pipeline_id = %pipeline_id, "pipeline completed");
                return Ok(done);
            };

            self.store
                .update_status(&pipeline_id, PipelineStatus::Running, Some(stage.name))
                .await?
                .ok_or(RunnerError::NotFound(pipeline_id))?;
            self.store
                .update_stage_progress(&pipeline_id, &stage.id, 0, StageStatus::Running, None)
                .await?
                .ok_or(RunnerError::NotFound(pipeline_id))?;

            info!(pipeline_id = %pipeline_id, stage = %stage.name, "executing stage");

            let mut attempt: u32 = 0;
            loop {
                match self.executor.execute(&pipeline, &stage).await {
                    Ok(()) => {
                        self.store
                            .update_stage_progress(
                                &pipeline_id,
                                &stage.id,
                                100,
                                StageStatus::Running,
                                None,
                            )
                            .await?
                            .ok_or(RunnerError::NotFound(pipeline_id))?;
                        break;
                    }
                    Err(err) if attempt < self.max_stage_retries => {
                        attempt += 1;
                        warn!(pipeline_id = %pipeline_id, stage = %stage.name,
                            attempt, error = %err, "stage attempt failed, retrying");
                    }
                    Err(err) => {
                        let stage_error = StageError {
                            message: err.message.clone(),
                            code: err.code.clone(),
                            retry_count: Some(attempt),
                        };
                        self.store
                            .update_stage_progress(
                                &pipeline_id,
                                &stage.id,
                                stage.progress,
                                StageStatus::Failed,
                                Some(stage_error),
                            )
                            .await?
                            .ok_or(RunnerError::NotFound(pipeline_id))?;

                        // Keep current_stage pointing at the failure so a
                        // retry knows where to resume.
                        let failed = self
                            .store
                            .update_status(&pipeline_id, PipelineStatus::Failed, Some(stage.name))
                            .await?
                            .ok_or(RunnerError::NotFound(pipeline_id))?;
                        warn!(pipeline_id = %pipeline_id, stage = %stage.name,
                            "stage failed, pipeline marked failed");
                        return Ok(failed);
                    }
                }
            }
        }
    }
}
