//! Stage catalogue and per-stage execution state.
//!
//! The passthrough pipeline advances a task through a fixed, ordered sequence
//! of document-generation stages: design_doc -> prd -> prototype. This module
//! defines the catalogue and the per-stage state tracked inside a pipeline
//! record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// The fixed catalogue of pipeline stages, in execution order.
///
/// Wire names are snake_case (`design_doc`, `prd`, `prototype`) to match the
/// persisted record format.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Design document generation.
    DesignDoc,

    /// Product requirements document generation.
    Prd,

    /// Prototype generation.
    Prototype,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 3] = [StageName::DesignDoc, StageName::Prd, StageName::Prototype];

    /// The snake_case wire name of this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::DesignDoc => "design_doc",
            StageName::Prd => "prd",
            StageName::Prototype => "prototype",
        }
    }

    /// Human-readable label shown in clients.
    pub fn display_name(&self) -> &'static str {
        match self {
            StageName::DesignDoc => "Design Document",
            StageName::Prd => "Product Requirements Document",
            StageName::Prototype => "Prototype",
        }
    }

    /// Parse a wire name into a stage, rejecting anything outside the
    /// catalogue. This is the validity check for stage inputs.
    pub fn parse(value: &str) -> Option<StageName> {
        match value {
            "design_doc" => Some(StageName::DesignDoc),
            "prd" => Some(StageName::Prd),
            "prototype" => Some(StageName::Prototype),
            _ => None,
        }
    }

    /// Zero-based position of this stage in the catalogue.
    pub fn position(&self) -> usize {
        match self {
            StageName::DesignDoc => 0,
            StageName::Prd => 1,
            StageName::Prototype => 2,
        }
    }

    /// The stage that follows this one, or None for the last stage.
    pub fn next(&self) -> Option<StageName> {
        StageName::ALL.get(self.position() + 1).copied()
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a single stage within a pipeline.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not run yet.
    Pending,

    /// Stage is currently executing.
    Running,

    /// Stage finished successfully.
    Completed,

    /// Stage execution failed; `PipelineStage::error` carries the details.
    Failed,

    /// Stage was skipped, e.g. when a run resumes from a later stage.
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Structured error recorded on a failed stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    /// Error message.
    pub message: String,

    /// Error code for categorization.
    pub code: String,

    /// Number of retry attempts made before giving up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Execution state of a single stage inside a pipeline record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    /// Unique stage identifier within the pipeline.
    pub id: String,

    /// Catalogue name of this stage.
    pub name: StageName,

    /// Human-readable label for clients.
    pub display_name: String,

    /// Current status of this stage.
    pub status: StageStatus,

    /// When the stage first started running. Set exactly once.
    pub started_at: Option<DateTime<Utc>>,

    /// When the stage completed. Set exactly once.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error details, present only when the stage failed.
    pub error: Option<StageError>,

    /// Progress percentage, 0-100. Non-decreasing while running.
    pub progress: u8,
}

impl PipelineStage {
    /// A fresh pending stage for the given catalogue entry.
    pub fn pending(name: StageName) -> Self {
        Self {
            id: format!("stage-{name}"),
            name,
            display_name: name.display_name().to_string(),
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            progress: 0,
        }
    }

    /// Pre-materialize one pending stage per catalogue entry, in order.
    pub fn initial_stages() -> Vec<PipelineStage> {
        StageName::ALL.into_iter().map(PipelineStage::pending).collect()
    }

    /// Check this stage's data integrity, returning the violated rules.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.progress > 100 {
            errors.push("Progress must be between 0 and 100".to_string());
        }

        match self.status {
            StageStatus::Completed => {
                if self.started_at.is_none() {
                    errors.push("Completed stage must have startedAt timestamp".to_string());
                }
                if self.completed_at.is_none() {
                    errors.push("Completed stage must have completedAt timestamp".to_string());
                }
                if self.progress != 100 {
                    errors.push("Completed stage must have 100% progress".to_string());
                }
            }
            StageStatus::Failed => {
                if self.error.is_none() {
                    errors.push("Failed stage must have an error".to_string());
                }
            }
            StageStatus::Running => {
                if self.started_at.is_none() {
                    errors.push("Running stage must have startedAt timestamp".to_string());
                }
            }
            StageStatus::Pending | StageStatus::Skipped => {}
        }

        errors
    }
}
