//! Integration tests for the pipeline controller operation surface.

mod common;

use common::{gated_task, test_harness, ungated_task};
use dp_core::state::ControllerError;
use dp_protocol::{
    ErrorCode, PipelineStatus, RetryRequest, StageName, StageStatus, StartRequest,
};

#[tokio::test]
async fn test_start_creates_running_pipeline() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let response = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start");

    assert_eq!(response.message, "Pipeline started successfully");

    let pipeline = response.pipeline;
    assert_eq!(pipeline.task_id, "task-1");
    assert_eq!(pipeline.qa_session_id, "qa-session-1");
    assert_eq!(pipeline.status, PipelineStatus::Running);
    assert_eq!(pipeline.current_stage, Some(StageName::DesignDoc));
    assert_eq!(pipeline.stages.len(), 3);
    assert!(pipeline.started_at.is_some());
    assert!(pipeline.completed_at.is_none());
}

#[tokio::test]
async fn test_start_unknown_task() {
    let harness = test_harness();

    let err = harness
        .controller
        .start("ghost", &StartRequest::default())
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::TaskNotFound { .. }));
    assert_eq!(err.to_api_error().status(), 404);
}

#[tokio::test]
async fn test_start_with_incomplete_qa_creates_no_record() {
    let harness = test_harness();
    harness.tasks.insert(ungated_task("task-1", "qa-session-1"));

    let err = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::QaNotCompleted));
    assert_eq!(err.code(), ErrorCode::QaNotCompleted);
    assert_eq!(err.to_api_error().status(), 400);

    // No record was created by the failed start.
    let existing = harness
        .store
        .get_by_task_id("task-1")
        .await
        .expect("lookup");
    assert!(existing.is_none());
}

#[tokio::test]
async fn test_start_conflicts_with_active_pipeline() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("first start");

    let err = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect_err("second start should conflict");
    assert!(matches!(err, ControllerError::PipelineAlreadyRunning));
    assert_eq!(err.to_api_error().status(), 409);

    // A paused pipeline still occupies the active slot.
    harness.controller.pause("task-1").await.expect("pause");
    let err = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect_err("start over paused should conflict");
    assert!(matches!(err, ControllerError::PipelineAlreadyRunning));
}

#[tokio::test]
async fn test_start_supersedes_terminal_pipeline() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let first = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start")
        .pipeline;
    harness.controller.cancel("task-1").await.expect("cancel");

    let second = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("restart")
        .pipeline;

    assert_ne!(first.id, second.id);

    // The new record is the one the task resolves to; the old one survives
    // as history.
    let current = harness
        .controller
        .get_status("task-1")
        .await
        .expect("status");
    assert_eq!(current.id, second.id);

    let all = harness.store.list(Some("task-1"), None).await.expect("list");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_start_resume_from_stage_skips_earlier_stages() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let pipeline = harness
        .controller
        .start(
            "task-1",
            &StartRequest {
                resume_from_stage: Some("prd".to_string()),
            },
        )
        .await
        .expect("start")
        .pipeline;

    assert_eq!(pipeline.current_stage, Some(StageName::Prd));
    assert_eq!(
        pipeline.stage(StageName::DesignDoc).expect("stage").status,
        StageStatus::Skipped
    );
    assert_eq!(
        pipeline.stage(StageName::Prd).expect("stage").status,
        StageStatus::Pending
    );
}

#[tokio::test]
async fn test_start_rejects_unknown_resume_stage() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let err = harness
        .controller
        .start(
            "task-1",
            &StartRequest {
                resume_from_stage: Some("deploy".to_string()),
            },
        )
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::InvalidPipelineStage { .. }));
    let api_error = err.to_api_error();
    assert_eq!(api_error.status(), 400);
    assert_eq!(
        api_error.details.expect("details").value.as_deref(),
        Some("deploy")
    );
}

#[tokio::test]
async fn test_pause_resume_cancel_walk() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start");

    let paused = harness.controller.pause("task-1").await.expect("pause");
    assert_eq!(paused.message, "Pipeline paused");
    assert_eq!(paused.pipeline.status, PipelineStatus::Paused);
    assert_eq!(paused.pipeline.current_stage, Some(StageName::DesignDoc));

    let resumed = harness.controller.resume("task-1").await.expect("resume");
    assert_eq!(resumed.message, "Pipeline resumed");
    assert_eq!(resumed.pipeline.status, PipelineStatus::Running);
    assert_eq!(resumed.pipeline.current_stage, Some(StageName::DesignDoc));

    let cancelled = harness.controller.cancel("task-1").await.expect("cancel");
    assert_eq!(cancelled.message, "Pipeline cancelled");
    assert_eq!(cancelled.pipeline.status, PipelineStatus::Cancelled);
    assert!(cancelled.pipeline.current_stage.is_none());
}

#[tokio::test]
async fn test_pause_without_pipeline() {
    let harness = test_harness();

    let err = harness
        .controller
        .pause("task-1")
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::PipelineNotFound { .. }));
    assert_eq!(err.to_api_error().status(), 404);
}

#[tokio::test]
async fn test_pause_from_paused_is_not_allowed() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start");
    harness.controller.pause("task-1").await.expect("pause");

    let err = harness
        .controller
        .pause("task-1")
        .await
        .expect_err("second pause should fail");

    let api_error = err.to_api_error();
    assert_eq!(api_error.error_code, ErrorCode::OperationNotAllowed);
    assert_eq!(api_error.status(), 405);

    let details = api_error.details.expect("details");
    assert_eq!(details.operation.as_deref(), Some("pause"));
    assert_eq!(details.current_status, Some(PipelineStatus::Paused));
}

#[tokio::test]
async fn test_retry_requires_stage_field() {
    let harness = test_harness();

    let err = harness
        .controller
        .retry("task-1", &RetryRequest::default())
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::MissingRequiredField { .. }));
    let api_error = err.to_api_error();
    assert_eq!(api_error.status(), 400);
    assert_eq!(api_error.error, "Stage is required");
}

#[tokio::test]
async fn test_retry_rejects_unknown_stage() {
    let harness = test_harness();

    let err = harness
        .controller
        .retry(
            "task-1",
            &RetryRequest {
                stage: Some("deploy".to_string()),
            },
        )
        .await
        .expect_err("should fail");

    assert!(matches!(err, ControllerError::InvalidPipelineStage { .. }));
}

#[tokio::test]
async fn test_retry_from_running_is_not_allowed() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start");

    let err = harness
        .controller
        .retry(
            "task-1",
            &RetryRequest {
                stage: Some("prd".to_string()),
            },
        )
        .await
        .expect_err("retry from running should fail");

    let api_error = err.to_api_error();
    assert_eq!(api_error.error_code, ErrorCode::OperationNotAllowed);

    let details = api_error.details.expect("details");
    assert_eq!(details.operation.as_deref(), Some("retry"));
    assert_eq!(details.current_status, Some(PipelineStatus::Running));
}

#[tokio::test]
async fn test_retry_from_failed_resumes_at_stage() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let pipeline = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start")
        .pipeline;

    // Simulate the runner marking the prd stage (and the pipeline) failed.
    harness
        .store
        .update_stage_progress(
            &pipeline.id,
            "stage-prd",
            30,
            dp_protocol::StageStatus::Failed,
            Some(dp_protocol::StageError {
                message: "generation failed".to_string(),
                code: "LLM_ERROR".to_string(),
                retry_count: Some(3),
            }),
        )
        .await
        .expect("stage update")
        .expect("pipeline exists");
    harness
        .store
        .update_status(&pipeline.id, PipelineStatus::Failed, Some(StageName::Prd))
        .await
        .expect("status update")
        .expect("pipeline exists");

    let response = harness
        .controller
        .retry(
            "task-1",
            &RetryRequest {
                stage: Some("prd".to_string()),
            },
        )
        .await
        .expect("retry");

    assert_eq!(response.message, "Stage retry initiated");
    assert_eq!(response.pipeline.status, PipelineStatus::Running);
    assert_eq!(response.pipeline.current_stage, Some(StageName::Prd));

    let stage = response.pipeline.stage(StageName::Prd).expect("stage");
    assert_eq!(stage.status, StageStatus::Pending);
    assert_eq!(stage.progress, 0);
    assert!(stage.error.is_none());
}

#[tokio::test]
async fn test_get_status_returns_record_verbatim() {
    let harness = test_harness();
    harness.tasks.insert(gated_task("task-1", "qa-session-1"));

    let started = harness
        .controller
        .start("task-1", &StartRequest::default())
        .await
        .expect("start")
        .pipeline;

    let status = harness
        .controller
        .get_status("task-1")
        .await
        .expect("status");
    assert_eq!(status, started);

    let err = harness
        .controller
        .get_status("other-task")
        .await
        .expect_err("no pipeline for other task");
    assert!(matches!(err, ControllerError::PipelineNotFound { .. }));
}
