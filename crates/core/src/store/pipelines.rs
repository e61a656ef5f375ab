//! File-backed storage for pipeline records.
//!
//! Each record is a self-contained `<uuid>.json` document. An auxiliary
//! `task-<taskId>.json` index maps a task to its most recently created
//! pipeline id; the index is written on create only, so a late save of a
//! superseded record cannot steal the most-recent slot, and it can always be
//! recomputed by a full directory scan.
//!
//! All writes go through a temp file in the target directory followed by an
//! atomic rename, so a crash mid-write never corrupts an existing record.

use crate::state::transition;
use crate::store::error::{StoreError, StoreResult};
use chrono::Utc;
use dp_protocol::{PassthroughPipeline, PipelineStage, PipelineStatus, StageError, StageName, StageStatus};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Index document mapping a task to its most recently created pipeline.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct TaskIndexEntry {
    pipeline_id: Uuid,
}

/// Durable store for [`PassthroughPipeline`] records.
#[derive(Debug, Clone)]
pub struct PipelineStore {
    dir: PathBuf,
}

impl PipelineStore {
    /// Create a store over the given pipelines directory. The directory is
    /// created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store persists into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn index_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("task-{task_id}.json"))
    }

    fn ensure_dir(&self) -> StoreResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }

    /// Write a JSON document via temp-file-then-rename.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value)?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|source| StoreError::FileWrite {
                path: path.to_path_buf(),
                source,
            })?;
        tmp.write_all(&json).map_err(|source| StoreError::FileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        tmp.persist(path).map_err(|e| StoreError::FileWrite {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        Ok(())
    }

    /// Read and parse a JSON document. Missing file is `Ok(None)`; a file
    /// that exists but cannot be read or parsed is an error.
    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> StoreResult<Option<T>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::FileRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let value = serde_json::from_str(&content).map_err(|source| StoreError::RecordParse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Some(value))
    }

    /// Create and immediately persist a new pipeline record.
    ///
    /// The record starts in the canonical initial status (`pending`) with no
    /// current stage; `started_at`/`completed_at` are unset until the
    /// corresponding transitions happen.
    pub async fn create(
        &self,
        task_id: &str,
        qa_session_id: &str,
        initial_stages: Vec<PipelineStage>,
    ) -> StoreResult<PassthroughPipeline> {
        self.ensure_dir()?;

        let now = Utc::now();
        let pipeline = PassthroughPipeline {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            qa_session_id: qa_session_id.to_string(),
            status: PipelineStatus::Pending,
            current_stage: None,
            stages: initial_stages,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        };

        self.write_json(&self.record_path(&pipeline.id), &pipeline)?;
        self.write_json(
            &self.index_path(task_id),
            &TaskIndexEntry {
                pipeline_id: pipeline.id,
            },
        )?;

        debug!(pipeline_id = %pipeline.id, task_id, "created pipeline record");
        Ok(pipeline)
    }

    /// Persist the full record, refreshing `updated_at`. Idempotent full
    /// overwrite by id; does not touch the task index.
    pub async fn save(&self, pipeline: &mut PassthroughPipeline) -> StoreResult<()> {
        self.ensure_dir()?;
        pipeline.updated_at = Utc::now();
        self.write_json(&self.record_path(&pipeline.id), pipeline)
    }

    /// Load a record by id.
    pub async fn get_by_id(&self, id: &Uuid) -> StoreResult<Option<PassthroughPipeline>> {
        Self::read_json(&self.record_path(id))
    }

    /// Load the most recently created record for a task.
    ///
    /// Resolves through the task index; if the index is missing, corrupt, or
    /// dangling, falls back to a full scan picking the highest `created_at`
    /// and rewrites the index.
    pub async fn get_by_task_id(&self, task_id: &str) -> StoreResult<Option<PassthroughPipeline>> {
        let index_path = self.index_path(task_id);
        match Self::read_json::<TaskIndexEntry>(&index_path) {
            Ok(Some(entry)) => {
                if let Some(pipeline) = self.get_by_id(&entry.pipeline_id).await? {
                    return Ok(Some(pipeline));
                }
                warn!(task_id, pipeline_id = %entry.pipeline_id, "task index is dangling, rescanning");
            }
            Ok(None) => {}
            Err(err) => {
                warn!(task_id, error = %err, "task index unreadable, rescanning");
            }
        }

        let latest = self
            .scan(Some(task_id), None)?
            .into_iter()
            .max_by_key(|p| p.created_at);

        if let Some(pipeline) = &latest {
            self.ensure_dir()?;
            self.write_json(
                &index_path,
                &TaskIndexEntry {
                    pipeline_id: pipeline.id,
                },
            )?;
        }

        Ok(latest)
    }

    /// List records, optionally filtered by task and/or status, newest first.
    pub async fn list(
        &self,
        task_id: Option<&str>,
        status: Option<PipelineStatus>,
    ) -> StoreResult<Vec<PassthroughPipeline>> {
        let mut pipelines = self.scan(task_id, status)?;
        pipelines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(pipelines)
    }

    /// Remove a record. Returns true if it existed. The task index is
    /// removed only when it points at the deleted record.
    pub async fn delete(&self, id: &Uuid) -> StoreResult<bool> {
        let Some(pipeline) = self.get_by_id(id).await? else {
            return Ok(false);
        };

        let record_path = self.record_path(id);
        std::fs::remove_file(&record_path).map_err(|source| StoreError::FileRemove {
            path: record_path,
            source,
        })?;

        let index_path = self.index_path(&pipeline.task_id);
        if let Ok(Some(entry)) = Self::read_json::<TaskIndexEntry>(&index_path) {
            if entry.pipeline_id == *id {
                if let Err(source) = std::fs::remove_file(&index_path) {
                    if source.kind() != std::io::ErrorKind::NotFound {
                        return Err(StoreError::FileRemove {
                            path: index_path,
                            source,
                        });
                    }
                }
            }
        }

        Ok(true)
    }

    /// Load, apply a status transition, and re-save. Returns the updated
    /// record, or None if the id does not exist.
    pub async fn update_status(
        &self,
        id: &Uuid,
        status: PipelineStatus,
        current_stage: Option<StageName>,
    ) -> StoreResult<Option<PassthroughPipeline>> {
        let Some(mut pipeline) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        transition::apply_status(&mut pipeline, status, current_stage, Utc::now());
        self.save(&mut pipeline).await?;
        Ok(Some(pipeline))
    }

    /// Load, apply a stage progress update, and re-save. Returns None if the
    /// pipeline or the stage does not exist.
    pub async fn update_stage_progress(
        &self,
        id: &Uuid,
        stage_id: &str,
        progress: u8,
        status: StageStatus,
        error: Option<StageError>,
    ) -> StoreResult<Option<PassthroughPipeline>> {
        let Some(mut pipeline) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if !transition::apply_stage_progress(
            &mut pipeline,
            stage_id,
            progress,
            status,
            error,
            Utc::now(),
        ) {
            return Ok(None);
        }

        self.save(&mut pipeline).await?;
        Ok(Some(pipeline))
    }

    /// Scan the directory for record files, skipping index files and
    /// anything that does not parse.
    fn scan(
        &self,
        task_id: Option<&str>,
        status: Option<PipelineStatus>,
    ) -> StoreResult<Vec<PassthroughPipeline>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut pipelines = Vec::new();

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|source| StoreError::DirectoryWalk {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                continue;
            };
            if file_name.starts_with("task-") {
                continue;
            }

            let pipeline: PassthroughPipeline = match Self::read_json(path) {
                Ok(Some(pipeline)) => pipeline,
                Ok(None) => continue,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable pipeline record");
                    continue;
                }
            };

            if let Some(task_id) = task_id {
                if pipeline.task_id != task_id {
                    continue;
                }
            }
            if let Some(status) = status {
                if pipeline.status != status {
                    continue;
                }
            }

            pipelines.push(pipeline);
        }

        Ok(pipelines)
    }
}
