//! SQLite-backed agent store

use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, TimeZone};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;

use crate::core::error::{AgentError, AgentResult};
use crate::core::state::AgentState;
use crate::scheduler::models::{Task, TaskStatus, TaskType};
use crate::wakeup::models::{hhmm, ScheduleSlot, TriggerType, WakeupSchedule, WakeupTrigger};

use super::schema::apply_schema;
use super::{AgentStore, LoadedTasks, PersistedAgentState};

const TASK_COLUMNS: &str = "id, type, title, description, priority, status, scheduled_time, \
     recurring, recurrence_interval_secs, target_file, context, result, error, created_at, \
     started_at, completed_at, execution_time_ms";

const TRIGGER_COLUMNS: &str = "id, type, name, enabled, scheduled_time, interval_secs, \
     last_triggered_at, priority, reason, schedule_slot, data_threshold";

/// Agent store on a single SQLite connection
///
/// Not shared between threads; the agent core serializes access behind its
/// own lock.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: &Path) -> AgentResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        info!("Opened agent database at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> AgentResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_ms(at: DateTime<Local>) -> i64 {
    at.timestamp_millis()
}

fn opt_ms(at: Option<DateTime<Local>>) -> Option<i64> {
    at.map(to_ms)
}

fn from_ms(ms: Option<i64>) -> Option<DateTime<Local>> {
    ms.and_then(|ms| Local.timestamp_millis_opt(ms).single())
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Option<Task>> {
    let id: String = row.get(0)?;
    let type_raw: String = row.get(1)?;
    let status_raw: String = row.get(5)?;

    let (task_type, status) = match (TaskType::parse(&type_raw), TaskStatus::parse(&status_raw)) {
        (Ok(task_type), Some(status)) => (task_type, status),
        _ => {
            warn!("Skipping stored task {} with type '{}' and status '{}'", id, type_raw, status_raw);
            return Ok(None);
        }
    };

    let context_raw: String = row.get(10)?;
    let priority: i64 = row.get(4)?;
    let recurrence: Option<i64> = row.get(8)?;
    let execution_time: Option<i64> = row.get(16)?;

    Ok(Some(Task {
        id,
        task_type,
        title: row.get(2)?,
        description: row.get(3)?,
        priority: priority.clamp(1, 10) as u8,
        status,
        scheduled_time: from_ms(row.get(6)?),
        recurring: row.get::<_, i64>(7)? != 0,
        recurrence_interval_secs: recurrence.map(|secs| secs.max(0) as u64),
        target_file: row.get(9)?,
        context: serde_json::from_str(&context_raw).unwrap_or(Value::Null),
        result: row.get(11)?,
        error: row.get(12)?,
        created_at: from_ms(row.get(13)?).unwrap_or_else(Local::now),
        started_at: from_ms(row.get(14)?),
        completed_at: from_ms(row.get(15)?),
        execution_time_ms: execution_time.map(|ms| ms.max(0) as u64),
    }))
}

fn row_to_trigger(row: &Row<'_>) -> rusqlite::Result<Option<WakeupTrigger>> {
    let id: String = row.get(0)?;
    let type_raw: String = row.get(1)?;
    let Some(trigger_type) = TriggerType::parse(&type_raw) else {
        warn!("Skipping stored trigger {} with unknown type '{}'", id, type_raw);
        return Ok(None);
    };

    let slot: Option<String> = row.get(9)?;
    let priority: i64 = row.get(7)?;
    let interval: Option<i64> = row.get(5)?;
    let threshold: Option<i64> = row.get(10)?;

    Ok(Some(WakeupTrigger {
        id,
        trigger_type,
        name: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        scheduled_time: from_ms(row.get(4)?),
        interval_secs: interval.map(|secs| secs.max(0) as u64),
        last_triggered_at: from_ms(row.get(6)?),
        // Out-of-range priorities are kept so the manager reports them as malformed
        priority: priority.clamp(0, u8::MAX as i64) as u8,
        reason: row.get(8)?,
        schedule_slot: slot.as_deref().and_then(ScheduleSlot::parse),
        data_threshold: threshold.map(|n| n.max(0) as u64),
    }))
}

impl AgentStore for SqliteStore {
    fn save_agent_state(&self, state: &PersistedAgentState) -> AgentResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO agent_state \
             (id, state, last_wakeup, last_sleep, tasks_completed_today, last_daily_reset, updated_at) \
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                state.state.as_str(),
                opt_ms(state.last_wakeup),
                opt_ms(state.last_sleep),
                state.tasks_completed_today as i64,
                state.last_daily_reset.format("%Y-%m-%d").to_string(),
                to_ms(state.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_agent_state(&self) -> AgentResult<Option<PersistedAgentState>> {
        let row = self
            .conn
            .query_row(
                "SELECT state, last_wakeup, last_sleep, tasks_completed_today, last_daily_reset, updated_at \
                 FROM agent_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((state, last_wakeup, last_sleep, completed, reset, updated)) = row else {
            return Ok(None);
        };

        let state = AgentState::parse(&state).unwrap_or_else(|| {
            warn!("Unknown stored agent state '{}', treating as sleeping", state);
            AgentState::Sleeping
        });
        let last_daily_reset = NaiveDate::parse_from_str(&reset, "%Y-%m-%d")
            .map_err(|e| AgentError::PersistenceError(format!("bad last_daily_reset '{}': {}", reset, e)))?;

        Ok(Some(PersistedAgentState {
            state,
            last_wakeup: from_ms(last_wakeup),
            last_sleep: from_ms(last_sleep),
            tasks_completed_today: completed.max(0) as u32,
            last_daily_reset,
            updated_at: from_ms(updated).unwrap_or_else(Local::now),
        }))
    }

    fn save_task(&self, task: &Task) -> AgentResult<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO tasks ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                TASK_COLUMNS
            ),
            params![
                task.id,
                task.task_type.as_str(),
                task.title,
                task.description,
                task.priority as i64,
                task.status.as_str(),
                opt_ms(task.scheduled_time),
                task.recurring as i64,
                task.recurrence_interval_secs.map(|s| s as i64),
                task.target_file,
                task.context.to_string(),
                task.result,
                task.error,
                to_ms(task.created_at),
                opt_ms(task.started_at),
                opt_ms(task.completed_at),
                task.execution_time_ms.map(|ms| ms as i64),
            ],
        )?;
        Ok(())
    }

    fn update_task_if(&self, task: &Task, expected: TaskStatus) -> AgentResult<bool> {
        let changed = self.conn.execute(
            "UPDATE tasks SET status = ?1, result = ?2, error = ?3, started_at = ?4, \
             completed_at = ?5, execution_time_ms = ?6 \
             WHERE id = ?7 AND status = ?8",
            params![
                task.status.as_str(),
                task.result,
                task.error,
                opt_ms(task.started_at),
                opt_ms(task.completed_at),
                task.execution_time_ms.map(|ms| ms as i64),
                task.id,
                expected.as_str(),
            ],
        )?;
        if changed == 0 {
            debug!("Task {} is no longer {}, update discarded", task.id, expected.as_str());
        }
        Ok(changed > 0)
    }

    fn task_status(&self, task_id: &str) -> AgentResult<Option<TaskStatus>> {
        let raw: Option<String> = self
            .conn
            .query_row("SELECT status FROM tasks WHERE id = ?1", params![task_id], |row| row.get(0))
            .optional()?;
        match raw {
            None => Ok(None),
            Some(raw) => TaskStatus::parse(&raw).map(Some).ok_or_else(|| {
                AgentError::PersistenceError(format!("task {} has unknown status '{}'", task_id, raw))
            }),
        }
    }

    fn delete_task(&self, task_id: &str) -> AgentResult<()> {
        self.conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])?;
        Ok(())
    }

    fn load_tasks(&self, history_limit: usize) -> AgentResult<LoadedTasks> {
        let mut live_stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status IN ('pending', 'scheduled', 'in_progress') \
             ORDER BY priority DESC, created_at",
            TASK_COLUMNS
        ))?;
        let mut live = Vec::new();
        for task in live_stmt.query_map([], row_to_task)? {
            if let Some(task) = task? {
                live.push(task);
            }
        }

        let mut history_stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status IN ('completed', 'failed', 'cancelled') \
             ORDER BY completed_at DESC LIMIT ?1",
            TASK_COLUMNS
        ))?;
        let mut history = Vec::new();
        for task in history_stmt.query_map(params![history_limit as i64], row_to_task)? {
            if let Some(task) = task? {
                history.push(task);
            }
        }
        history.reverse();

        Ok(LoadedTasks { live, history })
    }

    fn save_trigger(&self, trigger: &WakeupTrigger) -> AgentResult<()> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO wakeup_triggers ({}) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                TRIGGER_COLUMNS
            ),
            params![
                trigger.id,
                trigger.trigger_type.as_str(),
                trigger.name,
                trigger.enabled as i64,
                opt_ms(trigger.scheduled_time),
                trigger.interval_secs.map(|s| s as i64),
                opt_ms(trigger.last_triggered_at),
                trigger.priority as i64,
                trigger.reason,
                trigger.schedule_slot.map(|s| s.as_str()),
                trigger.data_threshold.map(|n| n as i64),
            ],
        )?;
        Ok(())
    }

    fn delete_trigger(&self, trigger_id: &str) -> AgentResult<()> {
        self.conn.execute("DELETE FROM wakeup_triggers WHERE id = ?1", params![trigger_id])?;
        Ok(())
    }

    fn load_triggers(&self) -> AgentResult<Vec<WakeupTrigger>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM wakeup_triggers ORDER BY rowid", TRIGGER_COLUMNS))?;
        let mut triggers = Vec::new();
        for trigger in stmt.query_map([], row_to_trigger)? {
            if let Some(trigger) = trigger? {
                triggers.push(trigger);
            }
        }
        Ok(triggers)
    }

    fn save_schedule(&self, schedule: &WakeupSchedule) -> AgentResult<()> {
        let weekdays = serde_json::to_string(&schedule.active_weekdays)
            .map_err(|e| AgentError::PersistenceError(e.to_string()))?;
        self.conn.execute(
            "INSERT OR REPLACE INTO wakeup_schedule (id, enabled, morning_time, evening_time, active_weekdays) \
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                schedule.enabled as i64,
                schedule.morning_time.format("%H:%M").to_string(),
                schedule.evening_time.format("%H:%M").to_string(),
                weekdays,
            ],
        )?;
        Ok(())
    }

    fn load_schedule(&self) -> AgentResult<Option<WakeupSchedule>> {
        let row = self
            .conn
            .query_row(
                "SELECT enabled, morning_time, evening_time, active_weekdays FROM wakeup_schedule WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((enabled, morning, evening, weekdays)) = row else {
            return Ok(None);
        };

        let (Some(morning_time), Some(evening_time)) = (hhmm::parse(&morning), hhmm::parse(&evening)) else {
            warn!("Ignoring stored schedule with bad times '{}' / '{}'", morning, evening);
            return Ok(None);
        };
        let active_weekdays = serde_json::from_str(&weekdays)
            .map_err(|e| AgentError::PersistenceError(format!("bad active_weekdays: {}", e)))?;

        Ok(Some(WakeupSchedule {
            enabled: enabled != 0,
            morning_time,
            evening_time,
            active_weekdays,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::models::TaskSpec;
    use crate::scheduler::queue::TaskScheduler;
    use serde_json::json;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_agent_state_round_trip() {
        let store = store();
        assert!(store.load_agent_state().unwrap().is_none());

        let now = Local.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let state = PersistedAgentState {
            state: AgentState::Working,
            last_wakeup: Some(now),
            last_sleep: None,
            tasks_completed_today: 4,
            last_daily_reset: now.date_naive(),
            updated_at: now,
        };
        store.save_agent_state(&state).unwrap();

        assert_eq!(store.load_agent_state().unwrap(), Some(state));
    }

    #[test]
    fn test_tasks_split_into_live_and_history() {
        let store = store();
        let mut scheduler = TaskScheduler::new(100, 500);
        let now = Local.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let live = scheduler
            .create_task(
                TaskSpec::new(TaskType::FillGap, "gap").with_context(json!({"file": "work.md"})),
                now,
            )
            .unwrap();
        let done = scheduler.create_task(TaskSpec::new(TaskType::Cleanup, "tidy"), now).unwrap();
        scheduler.start_task(&done.id, now).unwrap();
        let record = scheduler.record_completion(&done.id, Ok("clean".to_string()), now).unwrap();

        store.save_task(&live).unwrap();
        store.save_task(&record.task).unwrap();

        let loaded = store.load_tasks(10).unwrap();
        assert_eq!(loaded.live, vec![live]);
        assert_eq!(loaded.history.len(), 1);
        assert_eq!(loaded.history[0].result.as_deref(), Some("clean"));
    }

    #[test]
    fn test_conditional_update_discards_late_write() {
        let store = store();
        let mut scheduler = TaskScheduler::new(100, 500);
        let now = Local::now();
        let task = scheduler.create_task(TaskSpec::new(TaskType::Cleanup, "slow"), now).unwrap();
        let running = scheduler.start_task(&task.id, now).unwrap();
        store.save_task(&running).unwrap();

        let failed = scheduler
            .record_completion(&task.id, Err(AgentError::TimeoutError("deadline".to_string())), now)
            .unwrap()
            .task;
        assert!(store.update_task_if(&failed, TaskStatus::InProgress).unwrap());

        let mut late = failed.clone();
        late.status = TaskStatus::Completed;
        late.result = Some("too late".to_string());
        assert!(!store.update_task_if(&late, TaskStatus::InProgress).unwrap());

        let loaded = store.load_tasks(10).unwrap();
        assert_eq!(loaded.history[0].status, TaskStatus::Failed);
        assert_eq!(store.task_status(&task.id).unwrap(), Some(TaskStatus::Failed));
        assert_eq!(store.task_status("task_missing").unwrap(), None);
    }

    #[test]
    fn test_history_limit_keeps_most_recent() {
        let store = store();
        let mut scheduler = TaskScheduler::new(100, 500);
        let base = Local::now();
        for i in 0..5 {
            let at = base + chrono::Duration::seconds(i);
            let task = scheduler.create_task(TaskSpec::new(TaskType::Cleanup, &format!("t{}", i)), at).unwrap();
            scheduler.start_task(&task.id, at).unwrap();
            let record = scheduler.record_completion(&task.id, Ok(String::new()), at).unwrap();
            store.save_task(&record.task).unwrap();
        }

        let titles: Vec<String> = store.load_tasks(2).unwrap().history.into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["t3", "t4"]);
    }

    #[test]
    fn test_unknown_task_type_is_skipped() {
        let store = store();
        store
            .conn
            .execute(
                "INSERT INTO tasks (id, type, title, priority, status, created_at) \
                 VALUES ('task_bad', 'dream', 'x', 5, 'pending', 0)",
                [],
            )
            .unwrap();
        assert!(store.load_tasks(10).unwrap().live.is_empty());
    }

    #[test]
    fn test_trigger_and_schedule_round_trip() {
        let store = store();
        let mut trigger = WakeupTrigger::new("morning_wakeup", TriggerType::Scheduled, "Morning", 7, "morning");
        trigger.schedule_slot = Some(ScheduleSlot::Morning);
        trigger.last_triggered_at = Local.timestamp_millis_opt(1_700_000_000_000).single();
        store.save_trigger(&trigger).unwrap();
        assert_eq!(store.load_triggers().unwrap(), vec![trigger.clone()]);

        store.delete_trigger(&trigger.id).unwrap();
        assert!(store.load_triggers().unwrap().is_empty());

        let mut schedule = WakeupSchedule::default();
        schedule.enabled = false;
        schedule.active_weekdays = [5, 6].into_iter().collect();
        store.save_schedule(&schedule).unwrap();
        assert_eq!(store.load_schedule().unwrap(), Some(schedule));
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agent.db");
        SqliteStore::open(&path).unwrap();
        assert!(path.exists());
    }
}
