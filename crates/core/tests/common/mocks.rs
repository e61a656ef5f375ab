//! Mock task gates and stage executors for integration tests.

use async_trait::async_trait;
use dp_core::runner::{ExecutorError, StageExecutor};
use dp_core::store::{PipelineStore, StoreResult, TaskGate, TaskRef};
use dp_protocol::{PassthroughPipeline, PipelineStage, PipelineStatus, StageName};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Task gate backed by an in-memory map.
#[derive(Default)]
pub struct InMemoryTaskGate {
    tasks: Mutex<HashMap<String, TaskRef>>,
}

impl InMemoryTaskGate {
    pub fn insert(&self, task: TaskRef) {
        self.tasks
            .lock()
            .expect("task gate lock poisoned")
            .insert(task.id.clone(), task);
    }
}

#[async_trait]
impl TaskGate for InMemoryTaskGate {
    async fn lookup(&self, task_id: &str) -> StoreResult<Option<TaskRef>> {
        Ok(self
            .tasks
            .lock()
            .expect("task gate lock poisoned")
            .get(task_id)
            .cloned())
    }
}

/// Executor that succeeds on every stage and counts invocations.
#[derive(Default)]
pub struct SucceedingExecutor {
    pub calls: AtomicU32,
}

#[async_trait]
impl StageExecutor for SucceedingExecutor {
    async fn execute(
        &self,
        _pipeline: &PassthroughPipeline,
        _stage: &PipelineStage,
    ) -> Result<(), ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Executor that always fails a specific stage.
pub struct FailingExecutor {
    pub fail_stage: StageName,
    pub calls: AtomicU32,
}

impl FailingExecutor {
    pub fn new(fail_stage: StageName) -> Self {
        Self {
            fail_stage,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn execute(
        &self,
        _pipeline: &PassthroughPipeline,
        stage: &PipelineStage,
    ) -> Result<(), ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if stage.name == self.fail_stage {
            Err(ExecutorError::new("generation failed", "LLM_ERROR"))
        } else {
            Ok(())
        }
    }
}

/// Executor that requests a status transition on the record after finishing
/// a given stage, simulating a user pausing or cancelling mid-run.
pub struct InterruptingExecutor {
    store: PipelineStore,
    after_stage: StageName,
    new_status: PipelineStatus,
}

impl InterruptingExecutor {
    pub fn new(store: PipelineStore, after_stage: StageName, new_status: PipelineStatus) -> Self {
        Self {
            store,
            after_stage,
            new_status,
        }
    }
}

#[async_trait]
impl StageExecutor for InterruptingExecutor {
    async fn execute(
        &self,
        pipeline: &PassthroughPipeline,
        stage: &PipelineStage,
    ) -> Result<(), ExecutorError> {
        if stage.name == self.after_stage {
            self.store
                .update_status(&pipeline.id, self.new_status, None)
                .await
                .expect("status update failed")
                .expect("pipeline missing");
        }
        Ok(())
    }
}
