//! The task gate: the controller's seam to the external task storage.
//!
//! Task CRUD lives outside this subsystem; the pipeline only needs to know
//! whether a task exists and whether its Q&A session is complete. The trait
//! keeps that dependency mockable; the file-backed implementation reads the
//! task documents the rest of the system maintains.

use crate::store::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The slice of a Q&A session the pipeline consults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QaSessionRef {
    pub id: String,

    #[serde(default)]
    pub is_completed: bool,
}

/// The slice of a task record the pipeline consults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_session: Option<QaSessionRef>,
}

impl TaskRef {
    /// Whether the Q&A gate is satisfied for this task.
    pub fn qa_completed(&self) -> bool {
        self.qa_session.as_ref().is_some_and(|qa| qa.is_completed)
    }

    /// The gating Q&A session id, if any.
    pub fn qa_session_id(&self) -> Option<&str> {
        self.qa_session.as_ref().map(|qa| qa.id.as_str())
    }
}

/// Lookup seam for task existence and Q&A completion.
#[async_trait]
pub trait TaskGate: Send + Sync {
    /// Load the task, or None if it does not exist.
    async fn lookup(&self, task_id: &str) -> StoreResult<Option<TaskRef>>;
}

/// Task gate reading `<dir>/<taskId>.json` documents.
#[derive(Debug, Clone)]
pub struct FileTaskGate {
    dir: PathBuf,
}

impl FileTaskGate {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TaskGate for FileTaskGate {
    async fn lookup(&self, task_id: &str) -> StoreResult<Option<TaskRef>> {
        let path = self.dir.join(format!("{task_id}.json"));

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::FileRead { path, source }),
        };

        let task = serde_json::from_str(&content)
            .map_err(|source| StoreError::RecordParse { path, source })?;

        Ok(Some(task))
    }
}
