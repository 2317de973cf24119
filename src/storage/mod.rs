//! Durable storage for the agent
//!
//! The core writes through to an `AgentStore` on every transition, task
//! change and trigger fire, and reads everything back once at start-up.

pub mod schema;
pub mod sqlite;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::error::AgentResult;
use crate::core::state::AgentState;
use crate::scheduler::models::{Task, TaskStatus};
use crate::wakeup::models::{WakeupSchedule, WakeupTrigger};

pub use sqlite::SqliteStore;

/// The agent_state singleton row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedAgentState {
    pub state: AgentState,
    pub last_wakeup: Option<DateTime<Local>>,
    pub last_sleep: Option<DateTime<Local>>,
    pub tasks_completed_today: u32,
    pub last_daily_reset: NaiveDate,
    pub updated_at: DateTime<Local>,
}

/// Tasks read back at start-up
#[derive(Debug, Clone, Default)]
pub struct LoadedTasks {
    /// Pending, scheduled and in-progress tasks
    pub live: Vec<Task>,
    /// Finished tasks, oldest first
    pub history: Vec<Task>,
}

/// Storage seam between the agent core and its database
pub trait AgentStore: Send {
    fn save_agent_state(&self, state: &PersistedAgentState) -> AgentResult<()>;
    fn load_agent_state(&self) -> AgentResult<Option<PersistedAgentState>>;

    /// Insert or replace a task row
    fn save_task(&self, task: &Task) -> AgentResult<()>;
    /// Overwrite a task only if its stored status is still `expected`
    ///
    /// Returns false when the row had already moved on, so a late write is
    /// discarded instead of clobbering the newer record.
    fn update_task_if(&self, task: &Task, expected: TaskStatus) -> AgentResult<bool>;
    /// Stored status of a task, `None` if there is no such row
    fn task_status(&self, task_id: &str) -> AgentResult<Option<TaskStatus>>;
    fn delete_task(&self, task_id: &str) -> AgentResult<()>;
    /// Live tasks plus the most recent `history_limit` finished ones
    fn load_tasks(&self, history_limit: usize) -> AgentResult<LoadedTasks>;

    fn save_trigger(&self, trigger: &WakeupTrigger) -> AgentResult<()>;
    fn delete_trigger(&self, trigger_id: &str) -> AgentResult<()>;
    fn load_triggers(&self) -> AgentResult<Vec<WakeupTrigger>>;

    fn save_schedule(&self, schedule: &WakeupSchedule) -> AgentResult<()>;
    fn load_schedule(&self) -> AgentResult<Option<WakeupSchedule>>;
}
