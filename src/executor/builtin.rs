//! Default executor: native housekeeping plus an optional external worker

use async_trait::async_trait;
use log::{debug, warn};

use crate::scheduler::models::{Task, TaskStatus, TaskType};

use super::command::CommandWorker;
use super::{AgentCallbacks, TaskExecutor, TaskOutcome};

/// Runs `health_check` and `cleanup` in-process and hands every other task
/// type to the configured worker
pub struct BuiltinExecutor {
    worker: Option<CommandWorker>,
}

impl BuiltinExecutor {
    pub fn new(worker: Option<CommandWorker>) -> Self {
        Self { worker }
    }

    async fn health_check(&self, callbacks: &AgentCallbacks) -> TaskOutcome {
        let profile = match callbacks.get_profile_status() {
            Ok(profile) => profile,
            Err(e) => return TaskOutcome::Failure(format!("profile unavailable: {}", e)),
        };
        let pending = callbacks.list_pending_tasks().await.len();

        let mut lines = vec![format!(
            "Profile: {} files{}",
            profile.total_files,
            if profile.exists { "" } else { " (directory missing)" }
        )];
        if let Some(last) = profile.last_modified {
            lines.push(format!("Last profile update: {}", last.format("%Y-%m-%d %H:%M")));
        }
        for (category, count) in &profile.categories {
            lines.push(format!("  {}: {}", category, count));
        }
        lines.push(format!("Pending tasks: {}", pending));
        TaskOutcome::Success(lines.join("\n"))
    }

    async fn cleanup(&self, callbacks: &AgentCallbacks) -> TaskOutcome {
        let history = callbacks.list_recent_history(50).await;
        let failed = history.iter().filter(|t| t.status == TaskStatus::Failed).count();
        let pending = callbacks.list_pending_tasks().await.len();

        TaskOutcome::Success(format!(
            "Cleanup report: {} pending tasks, {} recent history entries ({} failed). Nothing removed.",
            pending,
            history.len(),
            failed
        ))
    }
}

#[async_trait]
impl TaskExecutor for BuiltinExecutor {
    async fn execute(&self, task: Task, callbacks: AgentCallbacks) -> TaskOutcome {
        debug!("Executing {} task {}", task.task_type.as_str(), task.id);
        match task.task_type {
            TaskType::HealthCheck => self.health_check(&callbacks).await,
            TaskType::Cleanup => self.cleanup(&callbacks).await,
            other => match &self.worker {
                Some(worker) => worker.run(&task, &callbacks).await,
                None => {
                    warn!("No worker configured for {} task {}", other.as_str(), task.id);
                    TaskOutcome::Failure(format!("no worker configured for task type {}", other.as_str()))
                }
            },
        }
    }
}
