//! Pipeline controller: the operation surface over pipeline records.
//!
//! The controller validates external preconditions (task existence, Q&A
//! completion, no conflicting active pipeline), consults the transition
//! rules, persists through the store, and is the single layer translating
//! internal failures into wire-level error responses.
//!
//! Mutating operations on the same task serialize on a per-task lock, so two
//! racing calls cannot both read the same pre-mutation state. `get_status`
//! takes no lock and is safe to poll at high frequency.

use crate::state::transition;
use crate::store::{PipelineStore, StoreError, TaskGate};
use chrono::Utc;
use dp_protocol::{
    ApiError, ErrorCode, Operation, PassthroughPipeline, PipelineResponse, PipelineStatus,
    PipelineStage, RetryRequest, StageName, StageStatus, StartRequest,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

/// Failures surfaced by controller operations.
///
/// Each variant maps to exactly one [`ErrorCode`]; the conversion in
/// [`ControllerError::to_api_error`] is the only place internal failures
/// become wire-level responses.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Q&A session must be completed before starting passthrough")]
    QaNotCompleted,

    #[error("Pipeline is already running")]
    PipelineAlreadyRunning,

    #[error("Invalid pipeline stage: {stage}")]
    InvalidPipelineStage { stage: String },

    #[error("Pipeline not found for task: {task_id}")]
    PipelineNotFound { task_id: String },

    #[error("Operation '{operation}' is not allowed when pipeline status is '{status}'")]
    OperationNotAllowed {
        operation: Operation,
        status: PipelineStatus,
    },

    #[error("{field} is required")]
    MissingRequiredField { field: &'static str },

    #[error("Pipeline operation failed: {message}")]
    Internal { message: String },
}

impl From<StoreError> for ControllerError {
    fn from(err: StoreError) -> Self {
        ControllerError::Internal {
            message: err.to_string(),
        }
    }
}

impl ControllerError {
    /// The machine-readable code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::TaskNotFound { .. } => ErrorCode::TaskNotFound,
            ControllerError::QaNotCompleted => ErrorCode::QaNotCompleted,
            ControllerError::PipelineAlreadyRunning => ErrorCode::PipelineAlreadyRunning,
            ControllerError::InvalidPipelineStage { .. } => ErrorCode::InvalidPipelineStage,
            ControllerError::PipelineNotFound { .. } => ErrorCode::PipelineNotFound,
            ControllerError::OperationNotAllowed { .. } => ErrorCode::OperationNotAllowed,
            ControllerError::MissingRequiredField { .. } => ErrorCode::MissingRequiredField,
            ControllerError::Internal { .. } => ErrorCode::PipelineError,
        }
    }

    /// Translate into the structured wire-level error.
    pub fn to_api_error(&self) -> ApiError {
        match self {
            ControllerError::TaskNotFound { task_id } => ApiError::task_not_found(task_id),
            ControllerError::QaNotCompleted => ApiError::qa_not_completed(),
            ControllerError::PipelineAlreadyRunning => ApiError::pipeline_already_running(),
            ControllerError::InvalidPipelineStage { stage } => {
                ApiError::invalid_pipeline_stage(stage)
            }
            ControllerError::PipelineNotFound { task_id } => ApiError::pipeline_not_found(task_id),
            ControllerError::OperationNotAllowed { operation, status } => {
                ApiError::operation_not_allowed(*operation, *status)
            }
            ControllerError::MissingRequiredField { field } => {
                ApiError::missing_required_field(field)
            }
            ControllerError::Internal { message } => ApiError::pipeline_error(message),
        }
    }
}

/// Type alias for Result with ControllerError.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// The operation surface over a task's passthrough pipeline.
pub struct PipelineController {
    store: PipelineStore,
    tasks: Arc<dyn TaskGate>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineController {
    pub fn new(store: PipelineStore, tasks: Arc<dyn TaskGate>) -> Self {
        Self {
            store,
            tasks,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying record store, for administrative operations.
    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    /// Serialize mutating operations per task.
    async fn lock_task(&self, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(task_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Start a new pipeline run for a task.
    ///
    /// Every successful start creates a fresh record superseding any prior
    /// terminal or failed one. When `resume_from_stage` is given, earlier
    /// stages are marked skipped and execution picks up at that stage.
    pub async fn start(
        &self,
        task_id: &str,
        request: &StartRequest,
    ) -> ControllerResult<PipelineResponse> {
        let _guard = self.lock_task(task_id).await;

        let task = self
            .tasks
            .lookup(task_id)
            .await?
            .ok_or_else(|| ControllerError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;

        if !task.qa_completed() {
            return Err(ControllerError::QaNotCompleted);
        }

        if let Some(existing) = self.store.get_by_task_id(task_id).await? {
            if existing.status.is_active() {
                warn!(task_id, pipeline_id = %existing.id, status = %existing.status,
                    "refusing to start over an active pipeline");
                return Err(ControllerError::PipelineAlreadyRunning);
            }
        }

        let resume_from = match &request.resume_from_stage {
            Some(raw) => Some(StageName::parse(raw).ok_or_else(|| {
                ControllerError::InvalidPipelineStage { stage: raw.clone() }
            })?),
            None => None,
        };

        let mut stages = PipelineStage::initial_stages();
        if let Some(resume) = resume_from {
            for stage in stages.iter_mut().take(resume.position()) {
                stage.status = StageStatus::Skipped;
            }
        }

        let qa_session_id = task.qa_session_id().unwrap_or_default();
        let pipeline = self.store.create(task_id, qa_session_id, stages).await?;

        let first_stage = resume_from.or_else(|| transition::first_pending_stage(&pipeline));
        let pipeline = self
            .store
            .update_status(&pipeline.id, PipelineStatus::Running, first_stage)
            .await?
            .ok_or_else(|| ControllerError::Internal {
                message: "pipeline record vanished during start".to_string(),
            })?;

        info!(task_id, pipeline_id = %pipeline.id, stage = ?pipeline.current_stage,
            "pipeline started");
        Ok(PipelineResponse {
            pipeline,
            message: "Pipeline started successfully".to_string(),
        })
    }

    /// Pause a running pipeline.
    pub async fn pause(&self, task_id: &str) -> ControllerResult<PipelineResponse> {
        self.apply_operation(task_id, Operation::Pause, PipelineStatus::Paused, "Pipeline paused")
            .await
    }

    /// Resume a paused pipeline.
    pub async fn resume(&self, task_id: &str) -> ControllerResult<PipelineResponse> {
        self.apply_operation(
            task_id,
            Operation::Resume,
            PipelineStatus::Running,
            "Pipeline resumed",
        )
        .await
    }

    /// Cancel a running or paused pipeline. This marks the record; an
    /// in-flight stage runner observes the status and stops cooperatively.
    pub async fn cancel(&self, task_id: &str) -> ControllerResult<PipelineResponse> {
        self.apply_operation(
            task_id,
            Operation::Cancel,
            PipelineStatus::Cancelled,
            "Pipeline cancelled",
        )
        .await
    }

    /// Retry a failed pipeline at the given stage.
    pub async fn retry(
        &self,
        task_id: &str,
        request: &RetryRequest,
    ) -> ControllerResult<PipelineResponse> {
        let raw = request
            .stage
            .as_deref()
            .ok_or(ControllerError::MissingRequiredField { field: "stage" })?;
        let stage = StageName::parse(raw).ok_or_else(|| ControllerError::InvalidPipelineStage {
            stage: raw.to_string(),
        })?;

        let _guard = self.lock_task(task_id).await;

        let mut pipeline = self.load_pipeline(task_id).await?;
        if !transition::is_operation_allowed(Operation::Retry, pipeline.status) {
            return Err(ControllerError::OperationNotAllowed {
                operation: Operation::Retry,
                status: pipeline.status,
            });
        }

        transition::reset_stage_for_retry(&mut pipeline, stage);
        transition::apply_status(&mut pipeline, PipelineStatus::Running, Some(stage), Utc::now());
        self.store.save(&mut pipeline).await?;

        info!(task_id, pipeline_id = %pipeline.id, stage = %stage, "stage retry initiated");
        Ok(PipelineResponse {
            pipeline,
            message: "Stage retry initiated".to_string(),
        })
    }

    /// Current state of the task's pipeline, verbatim. Read-only and
    /// lock-free.
    pub async fn get_status(&self, task_id: &str) -> ControllerResult<PassthroughPipeline> {
        self.load_pipeline(task_id).await
    }

    async fn load_pipeline(&self, task_id: &str) -> ControllerResult<PassthroughPipeline> {
        self.store
            .get_by_task_id(task_id)
            .await?
            .ok_or_else(|| ControllerError::PipelineNotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Shared path for pause/resume/cancel: load, check the transition
    /// table, apply, persist.
    async fn apply_operation(
        &self,
        task_id: &str,
        operation: Operation,
        new_status: PipelineStatus,
        message: &str,
    ) -> ControllerResult<PipelineResponse> {
        let _guard = self.lock_task(task_id).await;

        let pipeline = self.load_pipeline(task_id).await?;
        if !transition::is_operation_allowed(operation, pipeline.status) {
            return Err(ControllerError::OperationNotAllowed {
                operation,
                status: pipeline.status,
            });
        }

        let pipeline = self
            .store
            .update_status(&pipeline.id, new_status, None)
            .await?
            .ok_or_else(|| ControllerError::Internal {
                message: format!("pipeline record vanished during {operation}"),
            })?;

        info!(task_id, pipeline_id = %pipeline.id, operation = %operation,
            status = %pipeline.status, "pipeline transition applied");
        Ok(PipelineResponse {
            pipeline,
            message: message.to_string(),
        })
    }
}
