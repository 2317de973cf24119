//! Task execution boundary
//!
//! The agent core hands each task to a `TaskExecutor` and awaits a
//! `TaskOutcome`. While running, the executor may call back into the agent
//! through `AgentCallbacks`, which only exposes task creation, read-only
//! queue views and the profile status.

pub mod builtin;
pub mod command;
pub mod profile;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use tokio::sync::Mutex;

use crate::core::agent::CoreInner;
use crate::core::error::AgentResult;
use crate::scheduler::models::{Task, TaskOrigin, TaskSpec};

pub use builtin::BuiltinExecutor;
pub use command::CommandWorker;
pub use profile::{FsProfileSource, ProfileSource, ProfileStatus};

/// Result of executing a task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Result text stored on the task
    Success(String),
    /// Error text stored on the task
    Failure(String),
}

/// Performs the actual work for a task
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: Task, callbacks: AgentCallbacks) -> TaskOutcome;
}

/// Narrow handle the executor uses to talk back to the agent
///
/// Task creation goes through the same validation and capacity rules as the
/// public API.
#[derive(Clone)]
pub struct AgentCallbacks {
    inner: Arc<Mutex<CoreInner>>,
    profile: Arc<dyn ProfileSource>,
}

impl AgentCallbacks {
    pub(crate) fn new(inner: Arc<Mutex<CoreInner>>, profile: Arc<dyn ProfileSource>) -> Self {
        Self { inner, profile }
    }

    pub async fn create_task(&self, spec: TaskSpec) -> AgentResult<Task> {
        let mut inner = self.inner.lock().await;
        inner.create_task(spec, TaskOrigin::Executor, Local::now())
    }

    /// Pending and scheduled tasks in run order
    pub async fn list_pending_tasks(&self) -> Vec<Task> {
        self.inner.lock().await.scheduler.list_pending()
    }

    /// The `limit` most recent history entries, newest first
    pub async fn list_recent_history(&self, limit: usize) -> Vec<Task> {
        self.inner.lock().await.scheduler.list_history(limit)
    }

    pub fn get_profile_status(&self) -> AgentResult<ProfileStatus> {
        self.profile.status()
    }
}

impl fmt::Debug for AgentCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentCallbacks").finish_non_exhaustive()
    }
}
