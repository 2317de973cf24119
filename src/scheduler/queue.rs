//! Priority task queue with bounded execution history
//!
//! Live tasks (pending, scheduled, in progress) sit in the queue; finished
//! and cancelled tasks move to a FIFO history that evicts its oldest entry
//! once `max_history_size` is reached. At most one task is ever in progress.

use std::collections::VecDeque;

use chrono::{DateTime, Local, NaiveDate};
use log::{debug, info, warn};

use crate::core::error::{AgentError, AgentResult};

use super::models::*;

/// Owns the live task queue and the execution history
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    queue: Vec<Task>,
    /// Oldest first
    history: VecDeque<Task>,
    max_tasks_in_queue: usize,
    max_history_size: usize,
}

impl TaskScheduler {
    pub fn new(max_tasks_in_queue: usize, max_history_size: usize) -> Self {
        Self {
            queue: Vec::new(),
            history: VecDeque::new(),
            max_tasks_in_queue,
            max_history_size: max_history_size.max(1),
        }
    }

    /// Replace queue and history with previously persisted tasks
    ///
    /// `history` is expected oldest first; anything beyond the history limit
    /// is dropped from the front.
    pub fn restore(&mut self, live: Vec<Task>, history: Vec<Task>) {
        self.queue = live;
        self.history = history.into_iter().collect();
        while self.history.len() > self.max_history_size {
            self.history.pop_front();
        }
    }

    /// Validate and enqueue a new task
    pub fn create_task(&mut self, spec: TaskSpec, now: DateTime<Local>) -> AgentResult<Task> {
        spec.validate()?;

        if self.queue.len() >= self.max_tasks_in_queue {
            return Err(AgentError::CapacityError(format!(
                "task queue is full ({} tasks)",
                self.max_tasks_in_queue
            )));
        }

        let status = match spec.scheduled_time {
            Some(at) if at > now => TaskStatus::Scheduled,
            _ => TaskStatus::Pending,
        };

        let task = Task {
            id: Task::generate_id(),
            task_type: spec.task_type,
            title: spec.title,
            description: spec.description,
            priority: spec.priority,
            status,
            scheduled_time: spec.scheduled_time,
            recurring: spec.recurring,
            recurrence_interval_secs: spec.recurrence_interval_secs,
            target_file: spec.target_file,
            context: spec.context,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
        };

        debug!("Queued task {} '{}' ({:?}, priority {})", task.id, task.title, task.status, task.priority);
        self.queue.push(task.clone());
        Ok(task)
    }

    /// Highest-priority due task, earliest created first among equals
    pub fn next_task(&self, now: DateTime<Local>) -> Option<&Task> {
        self.queue
            .iter()
            .filter(|t| t.is_due(now))
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)))
    }

    pub fn has_due_tasks(&self, now: DateTime<Local>) -> bool {
        self.queue.iter().any(|t| t.is_due(now))
    }

    pub fn in_progress(&self) -> Option<&Task> {
        self.queue.iter().find(|t| t.status == TaskStatus::InProgress)
    }

    /// Mark a due task as in progress
    pub fn start_task(&mut self, task_id: &str, now: DateTime<Local>) -> AgentResult<Task> {
        if let Some(running) = self.in_progress() {
            return Err(AgentError::StateTransitionError(format!(
                "task {} is already in progress",
                running.id
            )));
        }

        let task = self
            .queue
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AgentError::NotFound(format!("task {}", task_id)))?;

        if !task.status.is_waiting() {
            return Err(AgentError::StateTransitionError(format!(
                "task {} is {}, cannot start it",
                task_id,
                task.status.as_str()
            )));
        }

        task.status = TaskStatus::InProgress;
        task.started_at = Some(now);
        info!("Started task {} '{}'", task.id, task.title);
        Ok(task.clone())
    }

    /// Finish an in-progress task
    ///
    /// Only applies while the task is still in progress, so a late result for
    /// a task that already timed out is rejected instead of overwriting it.
    pub fn record_completion(
        &mut self,
        task_id: &str,
        outcome: Result<String, AgentError>,
        now: DateTime<Local>,
    ) -> AgentResult<CompletionRecord> {
        let index = self
            .queue
            .iter()
            .position(|t| t.id == task_id && t.status == TaskStatus::InProgress)
            .ok_or_else(|| match self.get_task(task_id) {
                Some(task) => AgentError::StateTransitionError(format!(
                    "task {} is {}, not in progress",
                    task_id,
                    task.status.as_str()
                )),
                None => AgentError::NotFound(format!("task {}", task_id)),
            })?;

        let mut task = self.queue.remove(index);
        task.completed_at = Some(now);
        task.execution_time_ms = task
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);

        let succeeded = outcome.is_ok();
        match outcome {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.result = Some(result);
            }
            Err(err) => {
                task.status = TaskStatus::Failed;
                task.error = Some(err.to_string());
            }
        }
        info!("Task {} '{}' finished as {}", task.id, task.title, task.status.as_str());

        let next_occurrence = if succeeded && task.recurring {
            match task.recurrence_interval_secs.and_then(|secs| offset_by_secs(now, secs)) {
                Some(at) => {
                    let next = self.next_occurrence_of(&task, at, now);
                    self.queue.push(next.clone());
                    Some(next)
                }
                None => {
                    warn!(
                        "Task {} has an unusable recurrence interval {:?}, not rescheduling",
                        task.id, task.recurrence_interval_secs
                    );
                    None
                }
            }
        } else {
            None
        };

        let evicted = self.push_history(task.clone());
        Ok(CompletionRecord { task, next_occurrence, evicted })
    }

    fn next_occurrence_of(&self, task: &Task, at: DateTime<Local>, now: DateTime<Local>) -> Task {
        Task {
            id: Task::generate_id(),
            task_type: task.task_type,
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
            status: if at > now { TaskStatus::Scheduled } else { TaskStatus::Pending },
            scheduled_time: Some(at),
            recurring: true,
            recurrence_interval_secs: task.recurrence_interval_secs,
            target_file: task.target_file.clone(),
            context: task.context.clone(),
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
        }
    }

    /// Cancel a waiting task; returns it with any evicted history ids
    pub fn cancel_task(&mut self, task_id: &str, now: DateTime<Local>) -> AgentResult<(Task, Vec<String>)> {
        let index = match self.queue.iter().position(|t| t.id == task_id) {
            Some(index) => index,
            None if self.history.iter().any(|t| t.id == task_id) => {
                return Err(AgentError::StateTransitionError(format!(
                    "task {} has already finished",
                    task_id
                )))
            }
            None => return Err(AgentError::NotFound(format!("task {}", task_id))),
        };

        if !self.queue[index].status.is_waiting() {
            return Err(AgentError::StateTransitionError(format!(
                "task {} is in progress and cannot be cancelled",
                task_id
            )));
        }

        let mut task = self.queue.remove(index);
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(now);
        info!("Cancelled task {} '{}'", task.id, task.title);

        let evicted = self.push_history(task.clone());
        Ok((task, evicted))
    }

    /// Remove an entry from history; the live queue is never touched
    pub fn delete_history_entry(&mut self, task_id: &str) -> AgentResult<Task> {
        let index = self
            .history
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| AgentError::NotFound(format!("history entry {}", task_id)))?;
        self.history
            .remove(index)
            .ok_or_else(|| AgentError::NotFound(format!("history entry {}", task_id)))
    }

    /// Fail every task left in progress by an interrupted run
    pub fn fail_interrupted(&mut self, now: DateTime<Local>) -> Vec<CompletionRecord> {
        let stale: Vec<String> = self
            .queue
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .map(|t| t.id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| {
                self.record_completion(id, Err(AgentError::ExecutionError("interrupted".to_string())), now)
                    .ok()
            })
            .collect()
    }

    fn push_history(&mut self, task: Task) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.history.len() >= self.max_history_size {
            if let Some(old) = self.history.pop_front() {
                evicted.push(old.id);
            }
        }
        self.history.push_back(task);
        evicted
    }

    /// Look in the live queue first, then history
    pub fn get_task(&self, task_id: &str) -> Option<&Task> {
        self.queue
            .iter()
            .find(|t| t.id == task_id)
            .or_else(|| self.history.iter().find(|t| t.id == task_id))
    }

    /// Live tasks in run order, or history entries for terminal statuses
    pub fn list_tasks(&self, status: Option<TaskStatus>, limit: usize) -> Vec<Task> {
        match status {
            Some(status) if status.is_terminal() => self
                .history
                .iter()
                .rev()
                .filter(|t| t.status == status)
                .take(limit)
                .cloned()
                .collect(),
            _ => {
                let mut tasks: Vec<Task> = self
                    .queue
                    .iter()
                    .filter(|t| status.map_or(true, |s| t.status == s))
                    .cloned()
                    .collect();
                tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
                tasks.truncate(limit);
                tasks
            }
        }
    }

    /// Pending and scheduled tasks in run order
    pub fn list_pending(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.queue.iter().filter(|t| t.status.is_waiting()).cloned().collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        tasks
    }

    /// History entries, most recent first
    pub fn list_history(&self, limit: usize) -> Vec<Task> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    /// Whether any live task is scheduled on the given local date
    pub fn has_task_scheduled_on(&self, date: NaiveDate) -> bool {
        self.queue
            .iter()
            .any(|t| t.scheduled_time.map_or(false, |at| at.date_naive() == date))
    }

    /// Earliest future scheduled time among waiting tasks
    pub fn next_scheduled_time(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        self.queue
            .iter()
            .filter(|t| t.status.is_waiting())
            .filter_map(|t| t.scheduled_time)
            .filter(|at| *at > now)
            .min()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn status(&self, now: DateTime<Local>) -> SchedulerStatus {
        let count = |status: TaskStatus| self.queue.iter().filter(|t| t.status == status).count();
        SchedulerStatus {
            pending: count(TaskStatus::Pending),
            scheduled: count(TaskStatus::Scheduled),
            in_progress: count(TaskStatus::InProgress),
            queue_length: self.queue.len(),
            history_size: self.history.len(),
            max_tasks_in_queue: self.max_tasks_in_queue,
            max_history_size: self.max_history_size,
            next_task: self.next_task(now).map(|t| TaskPreview {
                id: t.id.clone(),
                task_type: t.task_type,
                title: t.title.clone(),
                priority: t.priority,
            }),
            next_scheduled_time: self.next_scheduled_time(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scheduler() -> TaskScheduler {
        TaskScheduler::new(100, 500)
    }

    fn spec(title: &str, priority: u8) -> TaskSpec {
        TaskSpec::new(TaskType::ExploreTopic, title).with_priority(priority)
    }

    #[test]
    fn test_highest_priority_runs_first() {
        let mut scheduler = scheduler();
        let now = Local::now();
        scheduler.create_task(spec("normal", 5), now).unwrap();
        let urgent = scheduler.create_task(spec("urgent", 10), now + Duration::seconds(1)).unwrap();

        let next = scheduler.next_task(now + Duration::seconds(2)).unwrap();
        assert_eq!(next.id, urgent.id);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let first = scheduler.create_task(spec("first", 5), now).unwrap();
        scheduler.create_task(spec("second", 5), now + Duration::seconds(1)).unwrap();
        scheduler.create_task(spec("third", 5), now).unwrap();

        assert_eq!(scheduler.next_task(now + Duration::seconds(5)).unwrap().id, first.id);
    }

    #[test]
    fn test_future_tasks_are_not_due() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let later = scheduler
            .create_task(spec("later", 9).scheduled_at(now + Duration::minutes(30)), now)
            .unwrap();

        assert_eq!(later.status, TaskStatus::Scheduled);
        assert!(scheduler.next_task(now).is_none());
        assert!(!scheduler.has_due_tasks(now));

        let at = now + Duration::minutes(30);
        assert_eq!(scheduler.next_task(at).unwrap().id, later.id);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut scheduler = TaskScheduler::new(100, 500);
        let now = Local::now();
        for i in 0..100 {
            scheduler.create_task(spec(&format!("task {}", i), 5), now).unwrap();
        }

        let result = scheduler.create_task(spec("one too many", 5), now);
        assert!(matches!(result, Err(AgentError::CapacityError(_))));
        assert_eq!(scheduler.queue_len(), 100);
    }

    #[test]
    fn test_only_one_task_in_progress() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let a = scheduler.create_task(spec("a", 5), now).unwrap();
        let b = scheduler.create_task(spec("b", 5), now).unwrap();

        scheduler.start_task(&a.id, now).unwrap();
        assert!(matches!(scheduler.start_task(&b.id, now), Err(AgentError::StateTransitionError(_))));
        assert!(scheduler.next_task(now).map(|t| t.id.clone()) == Some(b.id.clone()));
    }

    #[test]
    fn test_recurring_task_spawns_next_occurrence() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let task = scheduler
            .create_task(spec("daily", 7).recurring_every(86_400), now)
            .unwrap();
        scheduler.start_task(&task.id, now).unwrap();

        let done_at = now + Duration::seconds(42);
        let record = scheduler.record_completion(&task.id, Ok("ok".to_string()), done_at).unwrap();

        let next = record.next_occurrence.unwrap();
        assert_eq!(next.scheduled_time, Some(done_at + Duration::seconds(86_400)));
        assert_eq!(next.title, "daily");
        assert_eq!(next.task_type, TaskType::ExploreTopic);
        assert_eq!(next.status, TaskStatus::Scheduled);
        assert_eq!(scheduler.queue_len(), 1);
        assert_eq!(record.task.execution_time_ms, Some(42_000));
    }

    #[test]
    fn test_out_of_range_recurrence_finishes_without_respawn() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let mut stored = scheduler
            .create_task(spec("forever", 5).recurring_every(60), now)
            .unwrap();
        // A row written before intervals were bounded
        stored.recurrence_interval_secs = Some(1_000_000_000_000_000);
        scheduler.restore(vec![stored.clone()], Vec::new());
        scheduler.start_task(&stored.id, now).unwrap();

        let record = scheduler.record_completion(&stored.id, Ok("done".to_string()), now).unwrap();
        assert_eq!(record.task.status, TaskStatus::Completed);
        assert!(record.next_occurrence.is_none());
        assert_eq!(scheduler.queue_len(), 0);
        assert_eq!(scheduler.history_len(), 1);
    }

    #[test]
    fn test_failed_recurring_task_does_not_respawn() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let task = scheduler.create_task(spec("daily", 7).recurring_every(60), now).unwrap();
        scheduler.start_task(&task.id, now).unwrap();

        let record = scheduler
            .record_completion(&task.id, Err(AgentError::ExecutionError("boom".to_string())), now)
            .unwrap();

        assert!(record.next_occurrence.is_none());
        assert_eq!(record.task.status, TaskStatus::Failed);
        assert_eq!(record.task.error.as_deref(), Some("Execution error: boom"));
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[test]
    fn test_late_completion_is_rejected() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let task = scheduler.create_task(spec("slow", 5), now).unwrap();
        scheduler.start_task(&task.id, now).unwrap();
        scheduler
            .record_completion(&task.id, Err(AgentError::TimeoutError("deadline".to_string())), now)
            .unwrap();

        let late = scheduler.record_completion(&task.id, Ok("finally".to_string()), now);
        assert!(matches!(late, Err(AgentError::StateTransitionError(_))));
        assert_eq!(scheduler.get_task(&task.id).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut scheduler = TaskScheduler::new(100, 3);
        let now = Local::now();
        let mut ids: Vec<String> = Vec::new();
        for i in 0..5 {
            let task = scheduler.create_task(spec(&format!("t{}", i), 5), now).unwrap();
            scheduler.start_task(&task.id, now).unwrap();
            let record = scheduler.record_completion(&task.id, Ok(String::new()), now).unwrap();
            if i >= 3 {
                assert_eq!(record.evicted, vec![ids[i - 3].clone()]);
            }
            ids.push(task.id);
        }

        assert_eq!(scheduler.history_len(), 3);
        let history: Vec<String> = scheduler.list_history(10).into_iter().map(|t| t.id).collect();
        assert_eq!(history, vec![ids[4].clone(), ids[3].clone(), ids[2].clone()]);
    }

    #[test]
    fn test_delete_history_entry_leaves_queue_alone() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let live = scheduler.create_task(spec("live", 5), now).unwrap();
        let done = scheduler.create_task(spec("done", 5), now).unwrap();
        scheduler.cancel_task(&done.id, now).unwrap();

        assert!(matches!(scheduler.delete_history_entry(&live.id), Err(AgentError::NotFound(_))));
        scheduler.delete_history_entry(&done.id).unwrap();
        assert_eq!(scheduler.queue_len(), 1);
        assert_eq!(scheduler.history_len(), 0);
    }

    #[test]
    fn test_cancel_rules() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let running = scheduler.create_task(spec("running", 5), now).unwrap();
        scheduler.start_task(&running.id, now).unwrap();

        assert!(matches!(
            scheduler.cancel_task(&running.id, now),
            Err(AgentError::StateTransitionError(_))
        ));
        assert!(matches!(scheduler.cancel_task("task_missing", now), Err(AgentError::NotFound(_))));

        let waiting = scheduler.create_task(spec("waiting", 5), now).unwrap();
        let (cancelled, _) = scheduler.cancel_task(&waiting.id, now).unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(matches!(
            scheduler.cancel_task(&waiting.id, now),
            Err(AgentError::StateTransitionError(_))
        ));
    }

    #[test]
    fn test_fail_interrupted() {
        let mut scheduler = scheduler();
        let now = Local::now();
        let task = scheduler.create_task(spec("stale", 5), now).unwrap();
        scheduler.start_task(&task.id, now).unwrap();

        let records = scheduler.fail_interrupted(now);
        assert_eq!(records.len(), 1);
        assert!(records[0].task.error.as_deref().unwrap().contains("interrupted"));
        assert!(scheduler.in_progress().is_none());
    }

    #[test]
    fn test_list_tasks_filters() {
        let mut scheduler = scheduler();
        let now = Local::now();
        scheduler.create_task(spec("low", 2), now).unwrap();
        scheduler.create_task(spec("high", 9), now).unwrap();
        let gone = scheduler.create_task(spec("gone", 5), now).unwrap();
        scheduler.cancel_task(&gone.id, now).unwrap();

        let pending = scheduler.list_tasks(Some(TaskStatus::Pending), 10);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].title, "high");
        assert_eq!(scheduler.list_tasks(Some(TaskStatus::Cancelled), 10).len(), 1);
        assert_eq!(scheduler.list_tasks(None, 1).len(), 1);
    }
}
