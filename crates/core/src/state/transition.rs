//! Pure transition rules for the pipeline state machine.
//!
//! Every function here is free of I/O and clock reads; timestamps are passed
//! in. The store and the controller both apply mutations exclusively through
//! these rules, so the legal-transition table lives in exactly one place.

use chrono::{DateTime, Utc};
use dp_protocol::{
    Operation, PassthroughPipeline, PipelineStatus, StageError, StageName, StageStatus,
};

/// Decide whether an operation is legal from the given status.
///
/// A pure function of its two arguments: same inputs, same answer, regardless
/// of call order or time.
///
/// `start` is special-cased at the task level rather than the record level:
/// it is legal whenever the task has no *active* (running or paused) record,
/// which from a single record's perspective means any non-active status. The
/// no-record-at-all case never reaches this table.
pub fn is_operation_allowed(operation: Operation, status: PipelineStatus) -> bool {
    match operation {
        Operation::Start => !status.is_active(),
        Operation::Pause => status == PipelineStatus::Running,
        Operation::Resume => status == PipelineStatus::Paused,
        Operation::Cancel => status.is_active(),
        Operation::Retry => status == PipelineStatus::Failed,
    }
}

/// Apply a status transition and its side effects to the record.
///
/// - the first transition into running sets `started_at`
/// - `completed` sets `completed_at` (once) and clears `current_stage`
/// - `cancelled` clears `current_stage`
/// - otherwise an explicitly supplied stage replaces `current_stage`
/// - `updated_at` is always refreshed
pub fn apply_status(
    pipeline: &mut PassthroughPipeline,
    status: PipelineStatus,
    current_stage: Option<StageName>,
    now: DateTime<Utc>,
) {
    if status == PipelineStatus::Running && pipeline.started_at.is_none() {
        pipeline.started_at = Some(now);
    }

    match status {
        PipelineStatus::Completed => {
            if pipeline.completed_at.is_none() {
                pipeline.completed_at = Some(now);
            }
            pipeline.current_stage = None;
        }
        PipelineStatus::Cancelled => {
            pipeline.current_stage = None;
        }
        _ => {
            if let Some(stage) = current_stage {
                pipeline.current_stage = Some(stage);
            }
        }
    }

    pipeline.status = status;
    pipeline.updated_at = now;
}

/// Apply a progress update to a stage, located by id. Returns false if the
/// stage is not present in the pipeline.
///
/// - progress is non-decreasing while the stage is running
/// - the first run sets the stage's `started_at`
/// - progress 100 with a non-failed status forces the stage to completed
/// - a failed status attaches the structured error
/// - the pipeline's `updated_at` is always refreshed
pub fn apply_stage_progress(
    pipeline: &mut PassthroughPipeline,
    stage_id: &str,
    progress: u8,
    status: StageStatus,
    error: Option<StageError>,
    now: DateTime<Utc>,
) -> bool {
    let Some(stage) = pipeline.stage_by_id_mut(stage_id) else {
        return false;
    };

    let progress = if stage.status == StageStatus::Running {
        progress.max(stage.progress)
    } else {
        progress
    };

    stage.progress = progress.min(100);
    stage.status = status;

    if status == StageStatus::Running && stage.started_at.is_none() {
        stage.started_at = Some(now);
    }

    if stage.progress == 100 && status != StageStatus::Failed {
        stage.status = StageStatus::Completed;
        if stage.completed_at.is_none() {
            stage.completed_at = Some(now);
        }
    }

    if status == StageStatus::Completed {
        stage.progress = 100;
        if stage.completed_at.is_none() {
            stage.completed_at = Some(now);
        }
    }

    if let Some(error) = error {
        stage.error = Some(error);
    }

    pipeline.updated_at = now;
    true
}

/// Prepare a stage for re-execution after a failure: clear its error and
/// return it to pending at zero progress. Timestamps are set-once and
/// therefore retained. Returns false if the stage is not in the pipeline.
pub fn reset_stage_for_retry(pipeline: &mut PassthroughPipeline, stage: StageName) -> bool {
    let Some(stage) = pipeline.stage_mut(stage) else {
        return false;
    };

    stage.status = StageStatus::Pending;
    stage.error = None;
    stage.progress = 0;
    true
}

/// The first stage still waiting to run, in catalogue order.
pub fn first_pending_stage(pipeline: &PassthroughPipeline) -> Option<StageName> {
    pipeline
        .stages
        .iter()
        .find(|s| s.status == StageStatus::Pending)
        .map(|s| s.name)
}
