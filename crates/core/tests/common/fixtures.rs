//! Test fixtures for building controllers and stores over temp directories.

use dp_core::state::PipelineController;
use dp_core::store::{PipelineStore, QaSessionRef, TaskRef};
use std::sync::Arc;
use tempfile::TempDir;

use crate::common::mocks::InMemoryTaskGate;

/// A controller over a fresh temp directory, plus handles for assertions.
///
/// The TempDir must be kept alive for the test duration.
pub struct TestHarness {
    pub controller: PipelineController,
    pub store: PipelineStore,
    pub tasks: Arc<InMemoryTaskGate>,
    _temp_dir: TempDir,
}

/// Build a controller with an in-memory task gate over a temp store.
pub fn test_harness() -> TestHarness {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = PipelineStore::new(temp_dir.path().join("passthrough-pipelines"));
    let tasks = Arc::new(InMemoryTaskGate::default());
    let controller = PipelineController::new(store.clone(), tasks.clone());

    TestHarness {
        controller,
        store,
        tasks,
        _temp_dir: temp_dir,
    }
}

/// A task whose Q&A gate is satisfied.
pub fn gated_task(task_id: &str, qa_session_id: &str) -> TaskRef {
    TaskRef {
        id: task_id.to_string(),
        title: Some(format!("Task {task_id}")),
        qa_session: Some(QaSessionRef {
            id: qa_session_id.to_string(),
            is_completed: true,
        }),
    }
}

/// A task whose Q&A session exists but is not complete.
pub fn ungated_task(task_id: &str, qa_session_id: &str) -> TaskRef {
    TaskRef {
        id: task_id.to_string(),
        title: Some(format!("Task {task_id}")),
        qa_session: Some(QaSessionRef {
            id: qa_session_id.to_string(),
            is_completed: false,
        }),
    }
}
