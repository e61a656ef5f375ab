//! Passthrough pipeline record and status lifecycle.
//!
//! A pipeline record is one run of the full stage sequence for a task. Records
//! are persisted as self-contained JSON documents; every field here is part of
//! the on-disk format.

use crate::stage_models::{PipelineStage, StageName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle status of a pipeline record.
///
/// Normal progression: Pending -> Running -> Completed
///
/// Special states:
/// - Paused: manually paused, resumable
/// - Failed: a stage failed; `retry` is the one way out
/// - Cancelled: terminal, like Completed
///
/// `pending` is the canonical "not started" value; `idle` is accepted as an
/// input alias for compatibility with older clients and never produced.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Record created but not started yet.
    #[serde(alias = "idle")]
    Pending,

    /// Pipeline is actively executing.
    Running,

    /// Manually paused by the user.
    Paused,

    /// All stages finished successfully. Terminal.
    Completed,

    /// A stage failed. Only `retry` may move out of this state.
    Failed,

    /// Cancelled by the user. Terminal.
    Cancelled,
}

impl PipelineStatus {
    /// The snake_case wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Paused => "paused",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
            PipelineStatus::Cancelled => "cancelled",
        }
    }

    /// Parse a wire name, accepting the `idle` alias for Pending.
    pub fn parse(value: &str) -> Option<PipelineStatus> {
        match value {
            "pending" | "idle" => Some(PipelineStatus::Pending),
            "running" => Some(PipelineStatus::Running),
            "paused" => Some(PipelineStatus::Paused),
            "completed" => Some(PipelineStatus::Completed),
            "failed" => Some(PipelineStatus::Failed),
            "cancelled" => Some(PipelineStatus::Cancelled),
            _ => None,
        }
    }

    /// Active means the pipeline occupies the task's one-active-run slot:
    /// running or paused. At most one active pipeline may exist per task.
    pub fn is_active(&self) -> bool {
        matches!(self, PipelineStatus::Running | PipelineStatus::Paused)
    }

    /// Terminal means no further operations are meaningful: completed or
    /// cancelled. Failed is not terminal; `retry` may move out of it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Cancelled)
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of the full stage sequence for a task. The aggregate root of the
/// pipeline subsystem and the unit of persistence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PassthroughPipeline {
    /// Unique identifier, generated at creation, immutable.
    #[ts(type = "string")]
    pub id: Uuid,

    /// Owning task. A task may have many historical records but at most one
    /// active (running or paused) pipeline at a time.
    pub task_id: String,

    /// The Q&A session that gated pipeline entry.
    pub qa_session_id: String,

    /// Current lifecycle status.
    pub status: PipelineStatus,

    /// Stage currently being executed. Cleared when the pipeline completes
    /// or is cancelled; retained on pause and failure so a later resume or
    /// retry knows where to pick up.
    pub current_stage: Option<StageName>,

    /// Per-stage execution state, in catalogue order.
    pub stages: Vec<PipelineStage>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,

    /// When the pipeline first transitioned into running. Set exactly once.
    pub started_at: Option<DateTime<Utc>>,

    /// When the pipeline completed. Set exactly once.
    pub completed_at: Option<DateTime<Utc>>,
}

impl PassthroughPipeline {
    /// Look up a stage by catalogue name.
    pub fn stage(&self, name: StageName) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Look up a stage by its unique id.
    pub fn stage_by_id(&self, stage_id: &str) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Mutable lookup by stage id.
    pub fn stage_by_id_mut(&mut self, stage_id: &str) -> Option<&mut PipelineStage> {
        self.stages.iter_mut().find(|s| s.id == stage_id)
    }

    /// Mutable lookup by catalogue name.
    pub fn stage_mut(&mut self, name: StageName) -> Option<&mut PipelineStage> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    /// Check this record's data integrity, returning the violated rules.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.status == PipelineStatus::Completed {
            if self.completed_at.is_none() {
                errors.push("Completed pipeline must have completedAt timestamp".to_string());
            }
            if self.current_stage.is_some() {
                errors.push("Completed pipeline must not have a current stage".to_string());
            }
        }

        if self.status.is_active() && self.started_at.is_none() {
            errors.push("Running or paused pipeline must have startedAt timestamp".to_string());
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if stage.name.position() != i {
                errors.push(format!("Stage \"{}\" is in wrong position", stage.name));
            }
            for err in stage.validate() {
                errors.push(format!("Stage \"{}\": {err}", stage.name));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage_models::StageStatus;

    fn sample_pipeline() -> PassthroughPipeline {
        let now = Utc::now();
        PassthroughPipeline {
            id: Uuid::new_v4(),
            task_id: "task-1".to_string(),
            qa_session_id: "qa-session-1".to_string(),
            status: PipelineStatus::Pending,
            current_stage: None,
            stages: PipelineStage::initial_stages(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(PipelineStatus::Running.is_active());
        assert!(PipelineStatus::Paused.is_active());
        assert!(!PipelineStatus::Pending.is_active());
        assert!(!PipelineStatus::Failed.is_active());

        assert!(PipelineStatus::Completed.is_terminal());
        assert!(PipelineStatus::Cancelled.is_terminal());
        assert!(!PipelineStatus::Failed.is_terminal());
        assert!(!PipelineStatus::Paused.is_terminal());
    }

    #[test]
    fn test_idle_alias_deserializes_to_pending() {
        let status: PipelineStatus = serde_json::from_str("\"idle\"").expect("deserialize idle");
        assert_eq!(status, PipelineStatus::Pending);

        // Canonical form is always written back as "pending"
        let json = serde_json::to_value(status).expect("serialize");
        assert_eq!(json, "pending");

        assert_eq!(PipelineStatus::parse("idle"), Some(PipelineStatus::Pending));
        assert_eq!(PipelineStatus::parse("bogus"), None);
    }

    #[test]
    fn test_stage_lookup() {
        let pipeline = sample_pipeline();
        assert!(pipeline.stage(StageName::Prd).is_some());
        assert!(pipeline.stage_by_id("stage-prd").is_some());
        assert!(pipeline.stage_by_id("stage-unknown").is_none());
    }

    #[test]
    fn test_validate_completed_pipeline() {
        let mut pipeline = sample_pipeline();
        pipeline.status = PipelineStatus::Completed;
        pipeline.current_stage = Some(StageName::Prototype);

        let errors = pipeline.validate();
        assert!(errors.iter().any(|e| e.contains("completedAt")));
        assert!(errors.iter().any(|e| e.contains("current stage")));
    }

    #[test]
    fn test_validate_stage_order() {
        let mut pipeline = sample_pipeline();
        pipeline.stages.swap(0, 1);

        let errors = pipeline.validate();
        assert!(errors.iter().any(|e| e.contains("wrong position")));
    }

    #[test]
    fn test_record_round_trip() {
        let mut pipeline = sample_pipeline();
        pipeline.status = PipelineStatus::Running;
        pipeline.current_stage = Some(StageName::DesignDoc);
        pipeline.started_at = Some(Utc::now());
        if let Some(stage) = pipeline.stage_mut(StageName::DesignDoc) {
            stage.status = StageStatus::Running;
            stage.started_at = Some(Utc::now());
            stage.progress = 40;
        }

        let json = serde_json::to_string(&pipeline).expect("serialize");
        let back: PassthroughPipeline = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, pipeline);

        // Wire format uses camelCase keys
        assert!(json.contains("\"taskId\""));
        assert!(json.contains("\"qaSessionId\""));
        assert!(json.contains("\"currentStage\""));
    }
}
