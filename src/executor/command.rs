//! External worker process for the LLM-backed task types
//!
//! One process per task. The request is a single JSON document on stdin,
//! the response a single JSON document on stdout:
//!
//! ```text
//! -> {"task": {...}, "pending_tasks": [...], "recent_history": [...], "profile_status": {...}}
//! <- {"result": "...", "error": null, "follow_up_tasks": [{"type": "fill_gap", "title": "..."}]}
//! ```

use std::process::Stdio;

use chrono::Local;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::config::WorkerCommandConfig;
use crate::scheduler::models::{offset_by_secs, Task, TaskSpec, TaskType};

use super::profile::ProfileStatus;
use super::{AgentCallbacks, TaskOutcome};

const PLANNING_HISTORY: usize = 10;

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    task: &'a Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending_tasks: Option<Vec<Task>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recent_history: Option<Vec<Task>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    profile_status: Option<ProfileStatus>,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    follow_up_tasks: Vec<FollowUpTask>,
}

/// Task the worker wants scheduled after this one
#[derive(Debug, Clone, Deserialize)]
struct FollowUpTask {
    #[serde(rename = "type")]
    task_type: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_follow_up_priority")]
    priority: u8,
    /// Delay from now; runs as soon as possible when absent
    #[serde(default)]
    scheduled_in_secs: Option<u64>,
    #[serde(default)]
    target_file: Option<String>,
}

fn default_follow_up_priority() -> u8 {
    5
}

/// Spawns the configured program once per task
#[derive(Debug, Clone)]
pub struct CommandWorker {
    config: WorkerCommandConfig,
}

impl CommandWorker {
    pub fn new(config: WorkerCommandConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, task: &Task, callbacks: &AgentCallbacks) -> TaskOutcome {
        let request = self.build_request(task, callbacks).await;
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(e) => return TaskOutcome::Failure(format!("cannot encode worker request: {}", e)),
        };

        let response = match self.call(&payload).await {
            Ok(response) => response,
            Err(e) => return TaskOutcome::Failure(e),
        };

        if let Some(error) = response.error {
            return TaskOutcome::Failure(error);
        }

        let mut result = response.result.unwrap_or_default();
        if !response.follow_up_tasks.is_empty() {
            result.push_str(&self.schedule_follow_ups(response.follow_up_tasks, callbacks).await);
        }
        TaskOutcome::Success(result)
    }

    async fn build_request<'a>(&self, task: &'a Task, callbacks: &AgentCallbacks) -> WorkerRequest<'a> {
        let profile_status = match callbacks.get_profile_status() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Profile status unavailable for worker request: {}", e);
                None
            }
        };

        // Planning context only matters to self-reflection
        let (pending_tasks, recent_history) = if task.task_type == TaskType::SelfReflection {
            (
                Some(callbacks.list_pending_tasks().await),
                Some(callbacks.list_recent_history(PLANNING_HISTORY).await),
            )
        } else {
            (None, None)
        };

        WorkerRequest { task, pending_tasks, recent_history, profile_status }
    }

    async fn call(&self, payload: &[u8]) -> Result<WorkerResponse, String> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("cannot start worker '{}': {}", self.config.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload)
                .await
                .map_err(|e| format!("cannot write worker request: {}", e))?;
            // Dropping stdin closes the pipe so the worker sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("worker did not finish: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("worker exited with {}: {}", output.status, stderr.trim()));
        }

        debug!("Worker returned {} bytes", output.stdout.len());
        serde_json::from_slice(&output.stdout).map_err(|e| format!("unparsable worker output: {}", e))
    }

    async fn schedule_follow_ups(&self, follow_ups: Vec<FollowUpTask>, callbacks: &AgentCallbacks) -> String {
        let mut created = Vec::new();
        let mut rejected = Vec::new();

        for follow_up in follow_ups {
            let task_type = match TaskType::parse(&follow_up.task_type) {
                Ok(task_type) => task_type,
                Err(e) => {
                    rejected.push(format!("{} ({})", follow_up.title, e));
                    continue;
                }
            };

            let mut spec = TaskSpec::new(task_type, &follow_up.title)
                .with_description(&follow_up.description)
                .with_priority(follow_up.priority);
            if let Some(secs) = follow_up.scheduled_in_secs {
                match offset_by_secs(Local::now(), secs) {
                    Some(at) => spec = spec.scheduled_at(at),
                    None => {
                        rejected.push(format!("{} (delay of {}s is out of range)", follow_up.title, secs));
                        continue;
                    }
                }
            }
            if let Some(target) = &follow_up.target_file {
                spec = spec.with_target_file(target);
            }

            match callbacks.create_task(spec).await {
                Ok(task) => created.push(format!("{} ({})", task.title, task.id)),
                Err(e) => rejected.push(format!("{} ({})", follow_up.title, e)),
            }
        }

        info!("Worker follow-ups: {} created, {} rejected", created.len(), rejected.len());
        let mut report = format!("\n\nFollow-up tasks created: {}", created.len());
        for line in &created {
            report.push_str(&format!("\n- {}", line));
        }
        if !rejected.is_empty() {
            report.push_str(&format!("\nFollow-up tasks rejected: {}", rejected.len()));
            for line in &rejected {
                report.push_str(&format!("\n- {}", line));
            }
        }
        report
    }
}
