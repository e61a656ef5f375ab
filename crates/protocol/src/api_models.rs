//! Operation vocabulary, error codes, and the API response envelope.
//!
//! The controller exposes a fixed set of operations; every response is
//! wrapped in a success/failure envelope, and every failure carries a
//! machine-readable code with a fixed numeric severity tier plus actionable
//! guidance text. The code-to-tier mapping is part of the contract.

use crate::pipeline_models::{PassthroughPipeline, PipelineStatus};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Operations a caller may request against a task's pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Start,
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Pause => "pause",
            Operation::Resume => "resume",
            Operation::Cancel => "cancel",
            Operation::Retry => "retry",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body for the start operation.
///
/// `resume_from_stage` is carried as a raw string: validation against the
/// stage catalogue happens once at the controller boundary and produces
/// `INVALID_PIPELINE_STAGE` rather than a deserialization failure.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    /// Optional stage to resume from; earlier stages are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from_stage: Option<String>,
}

/// Request body for the retry operation.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    /// Stage to retry. Required; its absence is `MISSING_REQUIRED_FIELD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Machine-readable error codes.
///
/// Every code maps to exactly one numeric severity tier (see
/// [`ErrorCode::severity`]); the mapping is part of the contract.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TaskNotFound,
    QaNotCompleted,
    PipelineAlreadyRunning,
    InvalidPipelineStage,
    PipelineNotFound,
    OperationNotAllowed,
    MissingRequiredField,
    PipelineError,
}

impl ErrorCode {
    /// The fixed HTTP-status-like severity tier for this code.
    pub fn severity(&self) -> u16 {
        match self {
            ErrorCode::TaskNotFound | ErrorCode::PipelineNotFound => 404,
            ErrorCode::QaNotCompleted
            | ErrorCode::InvalidPipelineStage
            | ErrorCode::MissingRequiredField => 400,
            ErrorCode::PipelineAlreadyRunning => 409,
            ErrorCode::OperationNotAllowed => 405,
            ErrorCode::PipelineError => 500,
        }
    }
}

/// Structured context attached to an error response, so a client can render
/// it without lookup tables.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// The input field the error refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// The offending value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// The operation that was attempted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// The pipeline status at the time of the attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<PipelineStatus>,

    /// A client action that would fix the precondition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Actionable remediation text for end users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

/// A structured error response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,

    /// Machine-readable code.
    pub error_code: ErrorCode,

    /// Optional structured context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl ApiError {
    /// The numeric severity tier, derived from the code.
    pub fn status(&self) -> u16 {
        self.error_code.severity()
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self {
            error: "Task not found".to_string(),
            error_code: ErrorCode::TaskNotFound,
            details: Some(ErrorDetails {
                field: Some("taskId".to_string()),
                value: Some(task_id.to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn qa_not_completed() -> Self {
        Self {
            error: "Q&A session must be completed before starting passthrough".to_string(),
            error_code: ErrorCode::QaNotCompleted,
            details: Some(ErrorDetails {
                field: Some("qaStatus".to_string()),
                action: Some("complete_qa".to_string()),
                guidance: Some(
                    "Complete the Q&A session first before starting the automatic document \
                     generation pipeline."
                        .to_string(),
                ),
                ..Default::default()
            }),
        }
    }

    pub fn pipeline_already_running() -> Self {
        Self {
            error: "Pipeline is already running".to_string(),
            error_code: ErrorCode::PipelineAlreadyRunning,
            details: Some(ErrorDetails {
                guidance: Some(
                    "A pipeline is already in progress. Pause or cancel it before starting a \
                     new one."
                        .to_string(),
                ),
                ..Default::default()
            }),
        }
    }

    pub fn invalid_pipeline_stage(stage: &str) -> Self {
        Self {
            error: format!("Invalid pipeline stage: {stage}"),
            error_code: ErrorCode::InvalidPipelineStage,
            details: Some(ErrorDetails {
                value: Some(stage.to_string()),
                guidance: Some("Valid stages are: design_doc, prd, prototype".to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn pipeline_not_found(task_id: &str) -> Self {
        Self {
            error: "Pipeline not found".to_string(),
            error_code: ErrorCode::PipelineNotFound,
            details: Some(ErrorDetails {
                field: Some("taskId".to_string()),
                value: Some(task_id.to_string()),
                guidance: Some(
                    "No passthrough pipeline found for this task. Start a new pipeline."
                        .to_string(),
                ),
                ..Default::default()
            }),
        }
    }

    pub fn operation_not_allowed(operation: Operation, current_status: PipelineStatus) -> Self {
        Self {
            error: format!(
                "Operation '{operation}' is not allowed when pipeline status is '{current_status}'"
            ),
            error_code: ErrorCode::OperationNotAllowed,
            details: Some(ErrorDetails {
                operation: Some(operation.to_string()),
                current_status: Some(current_status),
                guidance: Some(
                    "Check the pipeline status and try a valid operation for this state."
                        .to_string(),
                ),
                ..Default::default()
            }),
        }
    }

    pub fn missing_required_field(field: &str) -> Self {
        let mut label = field.to_string();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }

        Self {
            error: format!("{label} is required"),
            error_code: ErrorCode::MissingRequiredField,
            details: Some(ErrorDetails {
                field: Some(field.to_string()),
                ..Default::default()
            }),
        }
    }

    pub fn pipeline_error(message: &str) -> Self {
        Self {
            error: message.to_string(),
            error_code: ErrorCode::PipelineError,
            details: None,
        }
    }
}

/// Success payload for mutating pipeline operations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    /// The created or updated pipeline record.
    pub pipeline: PassthroughPipeline,

    /// Human-readable confirmation message.
    pub message: String,
}

/// The success/failure envelope wrapping every response.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: serde::Deserialize<'de>"))]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}
