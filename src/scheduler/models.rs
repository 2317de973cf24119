//! Data models for the task scheduler

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{AgentError, AgentResult};

/// Kinds of background work the agent knows about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Review recent activity and plan follow-up work
    SelfReflection,
    /// Update a profile file
    UpdateProfile,
    /// Merge and tidy profile content
    Consolidate,
    /// Look for behavioral patterns across a longer period
    DiscoverPatterns,
    /// Learn from recent history
    LearnFromHistory,
    /// Summarize a time period
    SummarizePeriod,
    /// Dig into a topic the user cares about
    ExploreTopic,
    /// Fill a known gap in the profile
    FillGap,
    /// Check the agent and profile are healthy
    HealthCheck,
    /// Housekeeping
    Cleanup,
}

impl TaskType {
    pub const ALL: [TaskType; 10] = [
        TaskType::SelfReflection,
        TaskType::UpdateProfile,
        TaskType::Consolidate,
        TaskType::DiscoverPatterns,
        TaskType::LearnFromHistory,
        TaskType::SummarizePeriod,
        TaskType::ExploreTopic,
        TaskType::FillGap,
        TaskType::HealthCheck,
        TaskType::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SelfReflection => "self_reflection",
            TaskType::UpdateProfile => "update_profile",
            TaskType::Consolidate => "consolidate",
            TaskType::DiscoverPatterns => "discover_patterns",
            TaskType::LearnFromHistory => "learn_from_history",
            TaskType::SummarizePeriod => "summarize_period",
            TaskType::ExploreTopic => "explore_topic",
            TaskType::FillGap => "fill_gap",
            TaskType::HealthCheck => "health_check",
            TaskType::Cleanup => "cleanup",
        }
    }

    pub fn parse(value: &str) -> AgentResult<TaskType> {
        TaskType::ALL
            .iter()
            .find(|t| t.as_str() == value)
            .copied()
            .ok_or_else(|| AgentError::ValidationError(format!("unknown task type '{}'", value)))
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskType::SelfReflection => "Review recent activity and plan follow-up tasks",
            TaskType::UpdateProfile => "Update a specific profile file",
            TaskType::Consolidate => "Consolidate and tidy profile content",
            TaskType::DiscoverPatterns => "Discover behavioral patterns",
            TaskType::LearnFromHistory => "Learn from recent activity history",
            TaskType::SummarizePeriod => "Summarize a period of activity",
            TaskType::ExploreTopic => "Explore a topic of interest",
            TaskType::FillGap => "Fill a gap in the profile",
            TaskType::HealthCheck => "Check agent and profile health",
            TaskType::Cleanup => "Housekeeping and cleanup",
        }
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<TaskStatus> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "scheduled" => Some(TaskStatus::Scheduled),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses live in history, the rest in the queue
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Scheduled)
    }
}

/// Where a task came from, used for metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOrigin {
    Api,
    Executor,
    Recurring,
    Daily,
}

impl TaskOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOrigin::Api => "api",
            TaskOrigin::Executor => "executor",
            TaskOrigin::Recurring => "recurring",
            TaskOrigin::Daily => "daily",
        }
    }
}

/// A unit of background work
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Task identifier (`task_<8 hex>`)
    pub id: String,
    /// Kind of work
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    pub description: String,
    /// Priority 1..=10, higher runs first
    pub priority: u8,
    pub status: TaskStatus,
    /// Earliest time the task may run
    pub scheduled_time: Option<DateTime<Local>>,
    pub recurring: bool,
    pub recurrence_interval_secs: Option<u64>,
    /// Profile file the task works on, if any
    pub target_file: Option<String>,
    /// Free-form context handed to the executor
    pub context: Value,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Local>,
    pub started_at: Option<DateTime<Local>>,
    pub completed_at: Option<DateTime<Local>>,
    pub execution_time_ms: Option<u64>,
}

impl Task {
    /// Generate a fresh `task_<8 hex>` id
    pub fn generate_id() -> String {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        format!("task_{}", &raw[..8])
    }

    /// Due when unscheduled or its scheduled time has passed
    pub fn is_due(&self, now: DateTime<Local>) -> bool {
        self.status.is_waiting() && self.scheduled_time.map_or(true, |at| at <= now)
    }
}

/// Request to create a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default, alias = "scheduledTime")]
    pub scheduled_time: Option<DateTime<Local>>,
    #[serde(default)]
    pub recurring: bool,
    #[serde(default, alias = "recurrenceIntervalSeconds")]
    pub recurrence_interval_secs: Option<u64>,
    #[serde(default, alias = "targetFile")]
    pub target_file: Option<String>,
    #[serde(default)]
    pub context: Value,
}

/// `at` moved forward by `secs`, or `None` when that leaves the calendar range
pub fn offset_by_secs(at: DateTime<Local>, secs: u64) -> Option<DateTime<Local>> {
    let ms = i64::try_from(secs).ok()?.checked_mul(1000)?;
    at.checked_add_signed(chrono::Duration::milliseconds(ms))
}

/// Longest accepted recurrence interval (one leap year)
pub const MAX_RECURRENCE_INTERVAL_SECS: u64 = 366 * 86_400;

fn default_priority() -> u8 {
    5
}

impl TaskSpec {
    pub fn new(task_type: TaskType, title: &str) -> Self {
        Self {
            task_type,
            title: title.to_string(),
            description: String::new(),
            priority: default_priority(),
            scheduled_time: None,
            recurring: false,
            recurrence_interval_secs: None,
            target_file: None,
            context: Value::Null,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Local>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    pub fn recurring_every(mut self, secs: u64) -> Self {
        self.recurring = true;
        self.recurrence_interval_secs = Some(secs);
        self
    }

    pub fn with_target_file(mut self, target: &str) -> Self {
        self.target_file = Some(target.to_string());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn validate(&self) -> AgentResult<()> {
        if !(1..=10).contains(&self.priority) {
            return Err(AgentError::ValidationError(format!(
                "priority must be between 1 and 10, got {}",
                self.priority
            )));
        }
        if self.title.trim().is_empty() {
            return Err(AgentError::ValidationError("task title must not be empty".to_string()));
        }
        if self.recurring && !matches!(self.recurrence_interval_secs, Some(secs) if secs > 0) {
            return Err(AgentError::ValidationError(
                "recurring tasks need a positive recurrence interval".to_string(),
            ));
        }
        if let Some(secs) = self.recurrence_interval_secs.filter(|s| *s > MAX_RECURRENCE_INTERVAL_SECS) {
            return Err(AgentError::ValidationError(format!(
                "recurrence interval of {}s exceeds the maximum of {}s",
                secs, MAX_RECURRENCE_INTERVAL_SECS
            )));
        }
        Ok(())
    }
}

/// Outcome of `record_completion`
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    /// The finished task as stored in history
    pub task: Task,
    /// Next occurrence of a recurring task, if one was queued
    pub next_occurrence: Option<Task>,
    /// Ids pushed out of history to make room
    pub evicted: Vec<String>,
}

/// Snapshot of the scheduler for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub pending: usize,
    pub scheduled: usize,
    pub in_progress: usize,
    pub queue_length: usize,
    pub history_size: usize,
    pub max_tasks_in_queue: usize,
    pub max_history_size: usize,
    /// Task that would run next if the agent were awake now
    pub next_task: Option<TaskPreview>,
    pub next_scheduled_time: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskPreview {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub title: String,
    pub priority: u8,
}
