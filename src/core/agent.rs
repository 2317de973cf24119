//! Proactive agent core
//!
//! Owns the lifecycle state machine and drives the main loop. All mutable
//! agent data lives in `CoreInner` behind a single async mutex, so ticks,
//! API calls and executor callbacks are serialized through one writer.
//! Ticks are additionally serialized by `tick_guard`, which is held across
//! the executor await: the next tick never overlaps an in-flight task.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Local, NaiveDate};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::config::AgentConfig;
use crate::core::error::{AgentError, AgentResult};
use crate::core::metrics::MetricsManager;
use crate::core::state::{AgentState, StateMachine, StateTransition};
use crate::executor::{AgentCallbacks, ProfileSource, TaskExecutor, TaskOutcome};
use crate::scheduler::daily::ensure_daily_tasks;
use crate::scheduler::models::{SchedulerStatus, Task, TaskOrigin, TaskSpec, TaskStatus, TaskType};
use crate::scheduler::queue::TaskScheduler;
use crate::storage::{AgentStore, PersistedAgentState};
use crate::wakeup::manager::{TriggerContext, WakeupManager, WakeupStatus};
use crate::wakeup::models::{WakeupSchedule, WakeupTrigger};

const RECENT_TRANSITIONS: usize = 10;

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing to do
    Idle,
    /// A trigger fired and the agent woke up
    WokeUp { trigger_id: String },
    /// A task ran to completion, failure or timeout
    TaskFinished { task_id: String, status: TaskStatus },
    /// The agent went back to sleep
    WentToSleep,
    /// The agent was in a transient state
    Skipped,
}

/// Result of a wake-up request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WakeOutcome {
    /// False when the agent was not sleeping and nothing happened
    pub woke: bool,
    pub state: AgentState,
}

/// Full status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub state: AgentState,
    pub is_awake: bool,
    /// Whether the main loop is running
    pub running: bool,
    pub last_wakeup: Option<DateTime<Local>>,
    pub last_sleep: Option<DateTime<Local>>,
    pub last_activity: DateTime<Local>,
    pub tasks_completed_today: u32,
    pub last_daily_reset: NaiveDate,
    pub next_scheduled_task: Option<DateTime<Local>>,
    pub current_task: Option<String>,
    /// Sleep request waiting for the current task to finish
    pub pending_sleep: Option<String>,
    pub recent_transitions: Vec<StateTransition>,
    pub wakeup: WakeupStatus,
    pub scheduler: SchedulerStatus,
}

/// Task currently handed to the executor
#[derive(Debug, Clone)]
struct RunningTask {
    task_id: String,
    deadline: DateTime<Local>,
}

/// Everything the single writer owns
pub(crate) struct CoreInner {
    pub(crate) machine: StateMachine,
    pub(crate) scheduler: TaskScheduler,
    pub(crate) wakeup: WakeupManager,
    store: Box<dyn AgentStore>,
    metrics: MetricsManager,
    idle_timeout: Duration,
    max_working: Duration,
    daily_tasks: bool,
    last_wakeup: Option<DateTime<Local>>,
    last_sleep: Option<DateTime<Local>>,
    last_activity: DateTime<Local>,
    tasks_completed_today: u32,
    last_daily_reset: NaiveDate,
    pending_sleep: Option<String>,
    current: Option<RunningTask>,
    /// First persistence failure since the last commit
    write_error: Option<AgentError>,
}

impl CoreInner {
    /// Record a persistence result; the in-memory change is kept either way
    fn write(&mut self, result: AgentResult<()>) {
        if let Err(e) = result {
            error!("Failed to persist agent data: {}", e);
            if self.write_error.is_none() {
                self.write_error = Some(e);
            }
        }
    }

    /// Refresh gauges and surface the first persistence failure, if any
    fn commit(&mut self) -> AgentResult<()> {
        self.metrics
            .set_queue_sizes(self.scheduler.queue_len(), self.scheduler.history_len());
        match self.write_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn snapshot(&self, now: DateTime<Local>) -> PersistedAgentState {
        PersistedAgentState {
            state: self.machine.state(),
            last_wakeup: self.last_wakeup,
            last_sleep: self.last_sleep,
            tasks_completed_today: self.tasks_completed_today,
            last_daily_reset: self.last_daily_reset,
            updated_at: now,
        }
    }

    fn save_state(&mut self, now: DateTime<Local>) {
        let snapshot = self.snapshot(now);
        let result = self.store.save_agent_state(&snapshot);
        self.write(result);
    }

    fn save_task(&mut self, task: &Task) {
        let result = self.store.save_task(task);
        self.write(result);
    }

    fn save_trigger(&mut self, trigger: &WakeupTrigger) {
        let result = self.store.save_trigger(trigger);
        self.write(result);
    }

    fn transition(&mut self, to: AgentState, reason: &str, now: DateTime<Local>) -> AgentResult<()> {
        self.machine.transition(to, reason, now)?;
        self.metrics.record_transition(to.as_str());
        Ok(())
    }

    /// Reset the daily counter when the local date has changed
    fn roll_daily_counters(&mut self, now: DateTime<Local>) {
        let today = now.date_naive();
        if today != self.last_daily_reset {
            info!(
                "New day {}, resetting daily counters ({} tasks completed on {})",
                today, self.tasks_completed_today, self.last_daily_reset
            );
            self.tasks_completed_today = 0;
            self.last_daily_reset = today;
            self.save_state(now);
        }
    }

    pub(crate) fn create_task(
        &mut self,
        spec: TaskSpec,
        origin: TaskOrigin,
        now: DateTime<Local>,
    ) -> AgentResult<Task> {
        let task = self.scheduler.create_task(spec, now)?;
        self.metrics.record_task_created(origin.as_str());
        info!("Created task {} '{}' ({})", task.id, task.title, origin.as_str());
        self.save_task(&task);
        self.commit()?;
        Ok(task)
    }

    fn wake_up(&mut self, reason: &str, now: DateTime<Local>) -> AgentResult<WakeOutcome> {
        let state = self.machine.state();
        if state != AgentState::Sleeping {
            debug!("Wake-up requested while {}, ignoring", state);
            return Ok(WakeOutcome { woke: false, state });
        }

        self.transition(AgentState::WakingUp, reason, now)?;
        self.roll_daily_counters(now);

        for record in self.scheduler.fail_interrupted(now) {
            warn!("Task {} was interrupted by a restart", record.task.id);
            self.metrics.record_task_finished("failed");
            let result = self.store.update_task_if(&record.task, TaskStatus::InProgress).map(|_| ());
            self.write(result);
            self.delete_evicted(&record.evicted);
        }
        self.current = None;

        if self.daily_tasks {
            for task in ensure_daily_tasks(&mut self.scheduler, now) {
                self.metrics.record_task_created(TaskOrigin::Daily.as_str());
                self.save_task(&task);
            }
        }

        // Already awake, a queued user request would only wake the next sleep
        if let Some(trigger) = self.wakeup.cancel_immediate_wakeup() {
            self.save_trigger(&trigger);
        }

        self.transition(AgentState::Awake, "Initialization complete", now)?;
        self.last_wakeup = Some(now);
        self.last_activity = now;
        self.save_state(now);
        Ok(WakeOutcome { woke: true, state: AgentState::Awake })
    }

    fn go_to_sleep(&mut self, reason: &str, now: DateTime<Local>) -> AgentResult<AgentState> {
        match self.machine.state() {
            AgentState::Sleeping => Ok(AgentState::Sleeping),
            AgentState::Working => {
                self.pending_sleep = Some(reason.to_string());
                Err(AgentError::StateTransitionError(
                    "agent is working; sleep will be applied when the current task finishes".to_string(),
                ))
            }
            AgentState::Awake => {
                self.transition(AgentState::GoingToSleep, reason, now)?;
                self.transition(AgentState::Sleeping, reason, now)?;
                self.last_sleep = Some(now);
                self.pending_sleep = None;
                self.save_state(now);
                Ok(AgentState::Sleeping)
            }
            other => Err(AgentError::StateTransitionError(format!(
                "cannot go to sleep while {}",
                other
            ))),
        }
    }

    /// Move the next due task into progress and the agent into WORKING
    fn begin_task(&mut self, task_id: &str, now: DateTime<Local>) -> AgentResult<Task> {
        let task = self.scheduler.start_task(task_id, now)?;
        self.transition(AgentState::Working, &format!("Starting task: {}", task.title), now)?;
        self.current = Some(RunningTask {
            task_id: task.id.clone(),
            deadline: now + self.max_working,
        });
        self.save_task(&task);
        self.save_state(now);
        Ok(task)
    }

    /// Apply a task result; returns None when the task was no longer in progress
    fn finish_task(
        &mut self,
        task_id: &str,
        outcome: Result<String, AgentError>,
        at: DateTime<Local>,
    ) -> Option<Task> {
        let timed_out = matches!(outcome, Err(AgentError::TimeoutError(_)));
        let record = match self.scheduler.record_completion(task_id, outcome, at) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding result for task {}: {}", task_id, e);
                return None;
            }
        };

        match self.store.update_task_if(&record.task, TaskStatus::InProgress) {
            Ok(true) => {}
            Ok(false) => match self.store.task_status(task_id) {
                // The start was never written; store the final record
                Ok(None) => self.save_task(&record.task),
                Ok(Some(stored)) => warn!(
                    "Task {} is stored as {}, keeping it over the {} result",
                    task_id,
                    stored.as_str(),
                    record.task.status.as_str()
                ),
                Err(e) => self.write(Err(e)),
            },
            Err(e) => self.write(Err(e)),
        }
        self.delete_evicted(&record.evicted);

        if let Some(next) = &record.next_occurrence {
            self.metrics.record_task_created(TaskOrigin::Recurring.as_str());
            self.save_task(next);
        }

        let label = match record.task.status {
            TaskStatus::Completed => {
                self.tasks_completed_today += 1;
                "completed"
            }
            _ if timed_out => "timed_out",
            _ => "failed",
        };
        self.metrics.record_task_finished(label);

        if self.current.as_ref().map_or(false, |c| c.task_id == task_id) {
            self.current = None;
        }
        if self.machine.state() == AgentState::Working {
            let reason = format!("Task {}: {}", record.task.status.as_str(), record.task.title);
            let result = self.transition(AgentState::Awake, &reason, at);
            self.write(result);
        }
        self.last_activity = at;

        if let Some(reason) = self.pending_sleep.take() {
            info!("Applying queued sleep request: {}", reason);
            if let Err(e) = self.go_to_sleep(&reason, at) {
                warn!("Queued sleep request failed: {}", e);
            }
        }
        self.save_state(at);
        Some(record.task)
    }

    fn delete_evicted(&mut self, evicted: &[String]) {
        for id in evicted {
            let result = self.store.delete_task(id);
            self.write(result);
        }
    }
}

/// Handle to the agent; cheap to clone, all clones share one agent
#[derive(Clone)]
pub struct ProactiveCore {
    inner: Arc<Mutex<CoreInner>>,
    tick_guard: Arc<Mutex<()>>,
    executor: Arc<dyn TaskExecutor>,
    profile: Arc<dyn ProfileSource>,
    metrics: MetricsManager,
    config: Arc<AgentConfig>,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    loop_handle: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
    /// Serializes start calls
    lifecycle: Arc<Mutex<()>>,
    live_loops: Arc<AtomicUsize>,
}

impl ProactiveCore {
    /// Build the agent and reload whatever the store holds
    ///
    /// The agent always comes back SLEEPING, whatever state was persisted.
    pub fn new(
        config: AgentConfig,
        store: Box<dyn AgentStore>,
        executor: Arc<dyn TaskExecutor>,
        profile: Arc<dyn ProfileSource>,
    ) -> AgentResult<Self> {
        config.validate()?;
        let now = Local::now();
        let metrics = MetricsManager::new()?;

        let stored_schedule = store.load_schedule()?;
        let schedule = stored_schedule.clone().unwrap_or_else(|| config.schedule.clone());
        let mut wakeup = WakeupManager::new(schedule.clone(), config.health_check_interval_secs, now);
        for trigger in wakeup.restore(store.load_triggers()?) {
            store.save_trigger(&trigger)?;
        }
        if stored_schedule.is_none() {
            store.save_schedule(&schedule)?;
        }

        let loaded = store.load_tasks(config.max_history_size)?;
        info!(
            "Reloaded {} live tasks and {} history entries",
            loaded.live.len(),
            loaded.history.len()
        );
        let mut scheduler = TaskScheduler::new(config.max_tasks_in_queue, config.max_history_size);
        scheduler.restore(loaded.live, loaded.history);

        let persisted = store.load_agent_state()?;
        if let Some(previous) = persisted.as_ref().filter(|p| p.state != AgentState::Sleeping) {
            info!("Previous run ended while {}, resuming as sleeping", previous.state);
        }

        let mut inner = CoreInner {
            machine: StateMachine::new(config.transition_log_size),
            scheduler,
            wakeup,
            store,
            metrics: metrics.clone(),
            idle_timeout: config.idle_timeout(),
            max_working: config.max_working_duration(),
            daily_tasks: config.daily_tasks,
            last_wakeup: persisted.as_ref().and_then(|p| p.last_wakeup),
            last_sleep: persisted.as_ref().and_then(|p| p.last_sleep),
            last_activity: now,
            tasks_completed_today: persisted.as_ref().map_or(0, |p| p.tasks_completed_today),
            last_daily_reset: persisted.as_ref().map_or(now.date_naive(), |p| p.last_daily_reset),
            pending_sleep: None,
            current: None,
            write_error: None,
        };
        inner.save_state(now);
        inner.commit()?;

        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            tick_guard: Arc::new(Mutex::new(())),
            executor,
            profile,
            metrics,
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            stop_signal: Arc::new(Notify::new()),
            loop_handle: Arc::new(std::sync::Mutex::new(None)),
            lifecycle: Arc::new(Mutex::new(())),
            live_loops: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsManager {
        &self.metrics
    }

    /// Capability handle handed to the executor
    pub fn callbacks(&self) -> AgentCallbacks {
        AgentCallbacks::new(self.inner.clone(), self.profile.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the tick loop; returns false if it was already running
    ///
    /// A loop that was stopped but is still finishing its last tick is
    /// awaited first, so at most one loop ever runs.
    pub async fn start(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.running.load(Ordering::SeqCst) {
            debug!("Agent loop already running");
            return false;
        }

        let previous = self.loop_handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = previous {
            debug!("Waiting for the previous agent loop to exit");
            if let Err(e) = handle.await {
                error!("Previous agent loop ended abnormally: {}", e);
            }
        }
        self.running.store(true, Ordering::SeqCst);

        let core = self.clone();
        let handle = tokio::spawn(async move { core.run_loop().await });
        if let Ok(mut slot) = self.loop_handle.lock() {
            *slot = Some(handle);
        }
        info!("Agent loop started (tick every {}s)", self.config.tick_interval_secs);
        true
    }

    /// Ask the loop to exit after its current tick; returns false if it was not running
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            info!("Agent loop stopping");
            self.stop_signal.notify_waiters();
        }
        was_running
    }

    /// Stop the loop, wait for it to exit and put the agent to sleep
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.loop_handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Agent loop ended abnormally: {}", e);
            }
        }
        if let Err(e) = self.go_to_sleep("Shutdown").await {
            warn!("Could not put agent to sleep on shutdown: {}", e);
        }
    }

    async fn run_loop(self) {
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.stop_signal.notified() => break,
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let outcome = self.tick().await;
            if outcome != TickOutcome::Idle {
                debug!("Tick: {:?}", outcome);
            }
        }
        self.live_loops.fetch_sub(1, Ordering::SeqCst);
        info!("Agent loop stopped");
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Local::now()).await
    }

    /// Run one iteration of the main loop as if the clock read `now`
    pub async fn tick_at(&self, now: DateTime<Local>) -> TickOutcome {
        let _guard = self.tick_guard.lock().await;

        let task = {
            let mut inner = self.inner.lock().await;
            inner.roll_daily_counters(now);

            let state = inner.machine.state();
            let step = match state {
                AgentState::Sleeping => Self::check_wakeup(&mut inner, now),
                AgentState::Awake => Self::pick_work(&mut inner, now),
                AgentState::Working => Self::enforce_deadline(&mut inner, now),
                AgentState::WakingUp | AgentState::GoingToSleep => Err(TickOutcome::Skipped),
            };
            // Persistence failures inside the loop are logged by `write`
            let _ = inner.commit();

            match step {
                Ok(task) => task,
                Err(outcome) => return outcome,
            }
        };

        self.execute(task, now).await
    }

    fn check_wakeup(inner: &mut CoreInner, now: DateTime<Local>) -> Result<Task, TickOutcome> {
        let ctx = TriggerContext {
            has_due_task: inner.scheduler.has_due_tasks(now),
            sleeping: true,
        };
        let Some(trigger) = inner.wakeup.check_triggers(now, ctx) else {
            return Err(TickOutcome::Idle);
        };

        inner.metrics.record_trigger_fired(trigger.trigger_type.as_str());
        inner.save_trigger(&trigger);
        match inner.wake_up(&trigger.reason, now) {
            Ok(_) => Err(TickOutcome::WokeUp { trigger_id: trigger.id }),
            Err(e) => {
                error!("Wake-up from trigger {} failed: {}", trigger.id, e);
                Err(TickOutcome::Idle)
            }
        }
    }

    fn pick_work(inner: &mut CoreInner, now: DateTime<Local>) -> Result<Task, TickOutcome> {
        if let Some(next_id) = inner.scheduler.next_task(now).map(|t| t.id.clone()) {
            return inner.begin_task(&next_id, now).map_err(|e| {
                error!("Could not start task {}: {}", next_id, e);
                TickOutcome::Idle
            });
        }

        if now - inner.last_activity >= inner.idle_timeout {
            return match inner.go_to_sleep("No pending tasks", now) {
                Ok(_) => Err(TickOutcome::WentToSleep),
                Err(e) => {
                    error!("Idle sleep failed: {}", e);
                    Err(TickOutcome::Idle)
                }
            };
        }
        Err(TickOutcome::Idle)
    }

    fn enforce_deadline(inner: &mut CoreInner, now: DateTime<Local>) -> Result<Task, TickOutcome> {
        let Some(running) = inner.current.clone() else {
            return Err(TickOutcome::Skipped);
        };
        if now < running.deadline {
            return Err(TickOutcome::Skipped);
        }

        let error = AgentError::TimeoutError(format!(
            "task exceeded the maximum working duration of {}s",
            inner.max_working.num_seconds()
        ));
        match inner.finish_task(&running.task_id, Err(error), now) {
            Some(task) => Err(TickOutcome::TaskFinished { task_id: task.id, status: task.status }),
            None => Err(TickOutcome::Skipped),
        }
    }

    /// Hand a task to the executor and wait for it, at most `max_working`
    ///
    /// The executor runs on its own tokio task so a panic is contained. When
    /// the deadline passes the task is failed right away; if the abandoned
    /// call returns later its result is offered again and rejected, because
    /// the task is no longer in progress.
    async fn execute(&self, task: Task, now: DateTime<Local>) -> TickOutcome {
        let task_id = task.id.clone();
        let started = Instant::now();
        let executor = self.executor.clone();
        let callbacks = self.callbacks();
        let mut handle = tokio::spawn(async move { executor.execute(task, callbacks).await });

        let budget = self
            .config
            .max_working_duration()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(self.config.max_working_duration_secs));

        let waited = tokio::time::timeout(budget, &mut handle).await;
        let outcome = match waited {
            Ok(Ok(TaskOutcome::Success(result))) => Ok(result),
            Ok(Ok(TaskOutcome::Failure(message))) => Err(AgentError::ExecutionError(message)),
            Ok(Err(join_error)) => Err(AgentError::ExecutionError(format!("executor crashed: {}", join_error))),
            Err(_) => {
                warn!("Task {} exceeded {}s, abandoning it", task_id, self.config.max_working_duration_secs);
                self.watch_abandoned(task_id.clone(), handle);
                Err(AgentError::TimeoutError(format!(
                    "task exceeded the maximum working duration of {}s",
                    self.config.max_working_duration_secs
                )))
            }
        };

        let finished_at = now + Duration::from_std(started.elapsed()).unwrap_or_else(|_| Duration::zero());
        let mut inner = self.inner.lock().await;
        let finished = inner.finish_task(&task_id, outcome, finished_at);
        let _ = inner.commit();

        match finished {
            Some(task) => TickOutcome::TaskFinished { task_id: task.id, status: task.status },
            None => TickOutcome::Idle,
        }
    }

    fn watch_abandoned(&self, task_id: String, handle: JoinHandle<TaskOutcome>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let Ok(outcome) = handle.await else {
                return;
            };
            let late = match outcome {
                TaskOutcome::Success(result) => Ok(result),
                TaskOutcome::Failure(message) => Err(AgentError::ExecutionError(message)),
            };
            let mut inner = inner.lock().await;
            if inner.finish_task(&task_id, late, Local::now()).is_some() {
                error!("Late result for task {} was applied after its timeout", task_id);
            }
            let _ = inner.commit();
        });
    }

    /// Wake the agent; a no-op reporting the current state unless sleeping
    pub async fn wake_up(&self, reason: &str) -> AgentResult<WakeOutcome> {
        let mut inner = self.inner.lock().await;
        let outcome = inner.wake_up(reason, Local::now())?;
        inner.commit()?;
        Ok(outcome)
    }

    /// Put the agent to sleep; queued (and reported as an error) while working
    pub async fn go_to_sleep(&self, reason: &str) -> AgentResult<AgentState> {
        let mut inner = self.inner.lock().await;
        let state = inner.go_to_sleep(reason, Local::now())?;
        inner.commit()?;
        Ok(state)
    }

    pub async fn state(&self) -> AgentState {
        self.inner.lock().await.machine.state()
    }

    pub async fn status(&self) -> AgentStatus {
        let now = Local::now();
        let inner = self.inner.lock().await;
        AgentStatus {
            state: inner.machine.state(),
            is_awake: inner.machine.state().is_awake(),
            running: self.is_running(),
            last_wakeup: inner.last_wakeup,
            last_sleep: inner.last_sleep,
            last_activity: inner.last_activity,
            tasks_completed_today: inner.tasks_completed_today,
            last_daily_reset: inner.last_daily_reset,
            next_scheduled_task: inner.scheduler.next_scheduled_time(now),
            current_task: inner.current.as_ref().map(|c| c.task_id.clone()),
            pending_sleep: inner.pending_sleep.clone(),
            recent_transitions: inner.machine.recent(RECENT_TRANSITIONS),
            wakeup: inner.wakeup.status(now),
            scheduler: inner.scheduler.status(now),
        }
    }

    pub async fn create_task(&self, spec: TaskSpec) -> AgentResult<Task> {
        let mut inner = self.inner.lock().await;
        inner.create_task(spec, TaskOrigin::Api, Local::now())
    }

    /// Queue a priority-10 task that is due right away and make sure it runs
    ///
    /// A sleeping agent is woken and a stopped loop is started, so the task
    /// is picked up on the next tick. Returns the task and the agent state
    /// after the wake-up.
    pub async fn run_task_now(&self, task_type: TaskType, title: Option<&str>) -> AgentResult<(Task, AgentState)> {
        let title = title
            .map(str::to_string)
            .unwrap_or_else(|| format!("Manual {}", task_type.as_str()));
        let spec = TaskSpec::new(task_type, &title)
            .with_description(task_type.description())
            .with_priority(10);
        let task = self.create_task(spec).await?;

        // Wake before starting, so the first tick already sees an awake agent
        let outcome = self
            .wake_up(&format!("Manual task run: {}", task_type.as_str()))
            .await?;
        if !self.is_running() {
            self.start().await;
        }
        Ok((task, outcome.state))
    }

    pub async fn cancel_task(&self, task_id: &str) -> AgentResult<Task> {
        let mut inner = self.inner.lock().await;
        let (task, evicted) = inner.scheduler.cancel_task(task_id, Local::now())?;
        inner.save_task(&task);
        inner.delete_evicted(&evicted);
        inner.commit()?;
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> AgentResult<Task> {
        self.inner
            .lock()
            .await
            .scheduler
            .get_task(task_id)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(format!("task {}", task_id)))
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>, limit: usize) -> Vec<Task> {
        self.inner.lock().await.scheduler.list_tasks(status, limit)
    }

    pub async fn list_history(&self, limit: usize) -> Vec<Task> {
        self.inner.lock().await.scheduler.list_history(limit)
    }

    pub async fn delete_history_entry(&self, task_id: &str) -> AgentResult<Task> {
        let mut inner = self.inner.lock().await;
        let task = inner.scheduler.delete_history_entry(task_id)?;
        let result = inner.store.delete_task(task_id);
        inner.write(result);
        inner.commit()?;
        Ok(task)
    }

    pub async fn list_triggers(&self) -> Vec<WakeupTrigger> {
        self.inner.lock().await.wakeup.list_triggers()
    }

    pub async fn add_trigger(&self, trigger: WakeupTrigger) -> AgentResult<WakeupTrigger> {
        let mut inner = self.inner.lock().await;
        let trigger = inner.wakeup.add_trigger(trigger)?;
        inner.save_trigger(&trigger);
        inner.commit()?;
        Ok(trigger)
    }

    pub async fn remove_trigger(&self, trigger_id: &str) -> AgentResult<WakeupTrigger> {
        let mut inner = self.inner.lock().await;
        let trigger = inner.wakeup.remove_trigger(trigger_id)?;
        let result = inner.store.delete_trigger(trigger_id);
        inner.write(result);
        inner.commit()?;
        Ok(trigger)
    }

    pub async fn schedule_wakeup(
        &self,
        when: DateTime<Local>,
        reason: &str,
        priority: u8,
    ) -> AgentResult<WakeupTrigger> {
        let mut inner = self.inner.lock().await;
        let trigger = inner.wakeup.schedule_wakeup(when, reason, priority)?;
        inner.save_trigger(&trigger);
        inner.commit()?;
        Ok(trigger)
    }

    /// Enable the user-request trigger so the next tick wakes the agent
    ///
    /// Returns `None` without arming anything when the agent is not sleeping.
    pub async fn request_immediate_wakeup(&self, reason: &str) -> AgentResult<Option<WakeupTrigger>> {
        let mut inner = self.inner.lock().await;
        let state = inner.machine.state();
        if state != AgentState::Sleeping {
            debug!("Immediate wake-up requested while {}, nothing to do", state);
            return Ok(None);
        }
        let trigger = inner.wakeup.request_immediate_wakeup(reason);
        inner.save_trigger(&trigger);
        inner.commit()?;
        Ok(Some(trigger))
    }

    pub async fn record_new_data(&self, count: u64) -> u64 {
        self.inner.lock().await.wakeup.record_new_data(count)
    }

    pub async fn schedule(&self) -> (WakeupSchedule, Option<DateTime<Local>>) {
        let inner = self.inner.lock().await;
        (inner.wakeup.schedule().clone(), inner.wakeup.next_wakeup(Local::now()))
    }

    pub async fn set_schedule(&self, schedule: WakeupSchedule) -> AgentResult<WakeupSchedule> {
        let mut inner = self.inner.lock().await;
        inner.wakeup.set_schedule(schedule.clone())?;
        let result = inner.store.save_schedule(&schedule);
        inner.write(result);
        inner.commit()?;
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockTaskExecutor, ProfileStatus};
    use crate::storage::{LoadedTasks, SqliteStore};
    use crate::wakeup::models::{MORNING_TRIGGER_ID, TASK_DUE_TRIGGER_ID};
    use async_trait::async_trait;
    use chrono::{Datelike, TimeZone};

    struct EmptyProfile;

    impl ProfileSource for EmptyProfile {
        fn status(&self) -> AgentResult<ProfileStatus> {
            Ok(ProfileStatus::default())
        }
    }

    fn test_config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.daily_tasks = false;
        config.schedule.enabled = false;
        config
    }

    fn core_with(config: AgentConfig, executor: Arc<dyn TaskExecutor>) -> ProactiveCore {
        let store = SqliteStore::open_in_memory().unwrap();
        ProactiveCore::new(config, Box::new(store), executor, Arc::new(EmptyProfile)).unwrap()
    }

    fn succeeding() -> Arc<dyn TaskExecutor> {
        let mut mock = MockTaskExecutor::new();
        mock.expect_execute()
            .returning(|task, _| TaskOutcome::Success(format!("done: {}", task.title)));
        Arc::new(mock)
    }

    /// Sleeps before answering, to hold the agent in WORKING
    struct SlowExecutor {
        delay: std::time::Duration,
    }

    #[async_trait]
    impl TaskExecutor for SlowExecutor {
        async fn execute(&self, _task: Task, _callbacks: AgentCallbacks) -> TaskOutcome {
            tokio::time::sleep(self.delay).await;
            TaskOutcome::Success("finally".to_string())
        }
    }

    /// Schedules two follow-ups, the second one invalid
    struct PlanningExecutor;

    #[async_trait]
    impl TaskExecutor for PlanningExecutor {
        async fn execute(&self, _task: Task, callbacks: AgentCallbacks) -> TaskOutcome {
            let ok = callbacks
                .create_task(TaskSpec::new(TaskType::FillGap, "Fill work gap").with_priority(6))
                .await;
            let bad = callbacks
                .create_task(TaskSpec::new(TaskType::FillGap, "Bad priority").with_priority(11))
                .await;
            let pending = callbacks.list_pending_tasks().await.len();
            TaskOutcome::Success(format!("ok={} bad={} pending={}", ok.is_ok(), bad.is_err(), pending))
        }
    }

    /// Fails every write once `broken` is set
    struct FlakyStore {
        inner: SqliteStore,
        broken: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn check(&self) -> AgentResult<()> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(AgentError::PersistenceError("disk unplugged".to_string()));
            }
            Ok(())
        }
    }

    impl AgentStore for FlakyStore {
        fn save_agent_state(&self, state: &PersistedAgentState) -> AgentResult<()> {
            self.check()?;
            self.inner.save_agent_state(state)
        }
        fn load_agent_state(&self) -> AgentResult<Option<PersistedAgentState>> {
            self.inner.load_agent_state()
        }
        fn save_task(&self, task: &Task) -> AgentResult<()> {
            self.check()?;
            self.inner.save_task(task)
        }
        fn update_task_if(&self, task: &Task, expected: TaskStatus) -> AgentResult<bool> {
            self.check()?;
            self.inner.update_task_if(task, expected)
        }
        fn task_status(&self, task_id: &str) -> AgentResult<Option<TaskStatus>> {
            self.inner.task_status(task_id)
        }
        fn delete_task(&self, task_id: &str) -> AgentResult<()> {
            self.check()?;
            self.inner.delete_task(task_id)
        }
        fn load_tasks(&self, history_limit: usize) -> AgentResult<LoadedTasks> {
            self.inner.load_tasks(history_limit)
        }
        fn save_trigger(&self, trigger: &WakeupTrigger) -> AgentResult<()> {
            self.check()?;
            self.inner.save_trigger(trigger)
        }
        fn delete_trigger(&self, trigger_id: &str) -> AgentResult<()> {
            self.check()?;
            self.inner.delete_trigger(trigger_id)
        }
        fn load_triggers(&self) -> AgentResult<Vec<WakeupTrigger>> {
            self.inner.load_triggers()
        }
        fn save_schedule(&self, schedule: &WakeupSchedule) -> AgentResult<()> {
            self.check()?;
            self.inner.save_schedule(schedule)
        }
        fn load_schedule(&self) -> AgentResult<Option<WakeupSchedule>> {
            self.inner.load_schedule()
        }
    }

    #[tokio::test]
    async fn test_wake_up_only_from_sleeping() {
        let core = core_with(test_config(), succeeding());
        assert_eq!(core.state().await, AgentState::Sleeping);

        let first = core.wake_up("test").await.unwrap();
        assert!(first.woke);
        assert_eq!(first.state, AgentState::Awake);

        let second = core.wake_up("again").await.unwrap();
        assert!(!second.woke);
        assert_eq!(second.state, AgentState::Awake);

        let status = core.status().await;
        let path: Vec<AgentState> = status.recent_transitions.iter().rev().map(|t| t.to).collect();
        assert_eq!(path, vec![AgentState::WakingUp, AgentState::Awake]);
    }

    #[tokio::test]
    async fn test_due_task_wakes_agent_and_runs() {
        let core = core_with(test_config(), succeeding());
        let task = core
            .create_task(TaskSpec::new(TaskType::ExploreTopic, "tokio internals"))
            .await
            .unwrap();

        let now = Local::now();
        assert_eq!(
            core.tick_at(now).await,
            TickOutcome::WokeUp { trigger_id: TASK_DUE_TRIGGER_ID.to_string() }
        );
        assert_eq!(
            core.tick_at(now + Duration::seconds(1)).await,
            TickOutcome::TaskFinished { task_id: task.id.clone(), status: TaskStatus::Completed }
        );

        let finished = core.get_task(&task.id).await.unwrap();
        assert_eq!(finished.result.as_deref(), Some("done: tokio internals"));
        assert_eq!(core.state().await, AgentState::Awake);
        assert_eq!(core.status().await.tasks_completed_today, 1);
        assert_eq!(core.metrics().tasks_finished("completed"), 1);
    }

    #[tokio::test]
    async fn test_idle_agent_goes_back_to_sleep() {
        let mut config = test_config();
        config.idle_timeout_secs = 300;
        let core = core_with(config, succeeding());
        core.wake_up("test").await.unwrap();

        let now = Local::now();
        assert_eq!(core.tick_at(now + Duration::seconds(299)).await, TickOutcome::Idle);
        assert_eq!(core.tick_at(now + Duration::seconds(301)).await, TickOutcome::WentToSleep);
        assert_eq!(core.state().await, AgentState::Sleeping);
        assert_eq!(
            core.status().await.recent_transitions[0].reason,
            "No pending tasks"
        );
    }

    #[tokio::test]
    async fn test_executor_failure_is_recorded() {
        let mut mock = MockTaskExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _| TaskOutcome::Failure("model unavailable".to_string()));
        let core = core_with(test_config(), Arc::new(mock));
        let task = core
            .create_task(TaskSpec::new(TaskType::SummarizePeriod, "summary"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();

        let outcome = core.tick_at(Local::now()).await;
        assert_eq!(outcome, TickOutcome::TaskFinished { task_id: task.id.clone(), status: TaskStatus::Failed });

        let failed = core.list_history(1).await.remove(0);
        assert_eq!(failed.error.as_deref(), Some("Execution error: model unavailable"));
        assert_eq!(core.state().await, AgentState::Awake);
        assert_eq!(core.status().await.tasks_completed_today, 0);
    }

    #[tokio::test]
    async fn test_timeout_fails_task_and_discards_late_result() {
        let mut config = test_config();
        config.max_working_duration_secs = 1;
        let executor = Arc::new(SlowExecutor { delay: std::time::Duration::from_millis(1500) });
        let core = core_with(config, executor);
        let task = core
            .create_task(TaskSpec::new(TaskType::Consolidate, "slow"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();

        let outcome = core.tick_at(Local::now()).await;
        assert_eq!(outcome, TickOutcome::TaskFinished { task_id: task.id.clone(), status: TaskStatus::Failed });
        assert_eq!(core.state().await, AgentState::Awake);

        // Let the abandoned call finish and try to write its success
        tokio::time::sleep(std::time::Duration::from_millis(1000)).await;
        let stored = core.get_task(&task.id).await.unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert!(stored.error.unwrap().starts_with("Timeout error"));
        assert_eq!(core.metrics().tasks_finished("timed_out"), 1);
        assert_eq!(core.metrics().tasks_finished("completed"), 0);
    }

    #[tokio::test]
    async fn test_sleep_request_while_working_is_queued() {
        let executor = Arc::new(SlowExecutor { delay: std::time::Duration::from_millis(300) });
        let core = core_with(test_config(), executor);
        core.create_task(TaskSpec::new(TaskType::ExploreTopic, "reading"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();

        let ticking = core.clone();
        let tick = tokio::spawn(async move { ticking.tick_at(Local::now()).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(core.state().await, AgentState::Working);
        let refused = core.go_to_sleep("user asked").await;
        assert!(matches!(refused, Err(AgentError::StateTransitionError(_))));
        assert_eq!(core.state().await, AgentState::Working);

        tick.await.unwrap();
        assert_eq!(core.state().await, AgentState::Sleeping);
        assert!(core.status().await.pending_sleep.is_none());
    }

    #[tokio::test]
    async fn test_executor_can_schedule_follow_ups() {
        let core = core_with(test_config(), Arc::new(PlanningExecutor));
        core.create_task(TaskSpec::new(TaskType::SelfReflection, "reflect"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();
        core.tick_at(Local::now()).await;

        let history = core.list_history(1).await;
        assert_eq!(history[0].result.as_deref(), Some("ok=true bad=true pending=1"));
        let pending = core.list_tasks(Some(TaskStatus::Pending), 10).await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "Fill work gap");
        assert_eq!(core.metrics().tasks_created("executor"), 1);
    }

    #[tokio::test]
    async fn test_persistence_errors_reach_the_caller() {
        let broken = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            broken: broken.clone(),
        };
        let core = ProactiveCore::new(test_config(), Box::new(store), succeeding(), Arc::new(EmptyProfile)).unwrap();

        broken.store(true, Ordering::SeqCst);
        let result = core.create_task(TaskSpec::new(TaskType::Cleanup, "tidy")).await;
        assert!(matches!(result, Err(AgentError::PersistenceError(_))));
        // No rollback: the task is still queued in memory
        assert_eq!(core.list_tasks(None, 10).await.len(), 1);

        // The loop keeps going regardless
        let outcome = core.tick_at(Local::now()).await;
        assert!(matches!(outcome, TickOutcome::WokeUp { .. }));
    }

    #[tokio::test]
    async fn test_daily_counter_resets_on_new_date() {
        let core = core_with(test_config(), succeeding());
        core.create_task(TaskSpec::new(TaskType::Cleanup, "tidy")).await.unwrap();
        core.wake_up("test").await.unwrap();
        let now = Local::now();
        core.tick_at(now).await;
        assert_eq!(core.status().await.tasks_completed_today, 1);

        core.tick_at(now + Duration::days(1)).await;
        let status = core.status().await;
        assert_eq!(status.tasks_completed_today, 0);
        assert_eq!(status.last_daily_reset, (now + Duration::days(1)).date_naive());
    }

    async fn wait_for_status(core: &ProactiveCore, task_id: &str, status: TaskStatus) {
        for _ in 0..100 {
            if core.get_task(task_id).await.map_or(false, |t| t.status == status) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("task {} never reached {}", task_id, status.as_str());
    }

    #[tokio::test]
    async fn test_run_task_now_wakes_agent_and_starts_loop() {
        let mut config = test_config();
        config.tick_interval_secs = 60;
        let core = core_with(config, succeeding());
        core.create_task(TaskSpec::new(TaskType::ExploreTopic, "normal").with_priority(9))
            .await
            .unwrap();
        assert!(!core.is_running());

        let (manual, state) = core.run_task_now(TaskType::HealthCheck, None).await.unwrap();
        assert_eq!(manual.priority, 10);
        assert_eq!(manual.title, "Manual health_check");
        assert_eq!(state, AgentState::Awake);
        assert!(core.is_running());
        let transitions = core.status().await.recent_transitions;
        assert!(transitions.iter().any(|t| t.reason == "Manual task run: health_check"));

        // The loop's first tick runs the manual task ahead of the priority-9 one
        wait_for_status(&core, &manual.id, TaskStatus::Completed).await;
        let history = core.list_history(10).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, manual.id);

        core.shutdown().await;
    }

    #[tokio::test]
    async fn test_immediate_wakeup_is_ignored_while_awake() {
        let core = core_with(test_config(), succeeding());
        core.wake_up("test").await.unwrap();
        assert!(core.request_immediate_wakeup("late click").await.unwrap().is_none());

        let now = Local::now();
        assert_eq!(core.tick_at(now + Duration::seconds(301)).await, TickOutcome::WentToSleep);
        assert_eq!(core.tick_at(now + Duration::seconds(302)).await, TickOutcome::Idle);
        assert_eq!(core.state().await, AgentState::Sleeping);
    }

    #[tokio::test]
    async fn test_wake_up_drops_pending_immediate_request() {
        let core = core_with(test_config(), succeeding());
        let armed = core.request_immediate_wakeup("user clicked wake").await.unwrap().unwrap();
        assert!(armed.enabled);

        // Woken another way before the trigger fired
        core.wake_up("manual").await.unwrap();
        let user_request = core
            .list_triggers()
            .await
            .into_iter()
            .find(|t| t.id == armed.id)
            .unwrap();
        assert!(!user_request.enabled);

        let now = Local::now();
        assert_eq!(core.tick_at(now + Duration::seconds(301)).await, TickOutcome::WentToSleep);
        assert_eq!(core.tick_at(now + Duration::seconds(302)).await, TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_oversized_recurrence_is_rejected() {
        let core = core_with(test_config(), succeeding());
        let result = core
            .create_task(TaskSpec::new(TaskType::Cleanup, "forever").recurring_every(1_000_000_000_000_000))
            .await;
        assert!(matches!(result, Err(AgentError::ValidationError(_))));
        assert!(core.list_tasks(None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_morning_routine_runs_review_after_nap() {
        let mut config = test_config();
        config.daily_tasks = true;
        config.schedule = WakeupSchedule::default();
        config.health_check_interval_secs = 30 * 86_400;
        let core = core_with(config, succeeding());

        let day = (Local::now() + Duration::days(1)).date_naive();
        let at = |h: u32, m: u32, s: u32| {
            Local
                .with_ymd_and_hms(day.year(), day.month(), day.day(), h, m, s)
                .unwrap()
        };

        assert_eq!(
            core.tick_at(at(9, 0, 1)).await,
            TickOutcome::WokeUp { trigger_id: MORNING_TRIGGER_ID.to_string() }
        );
        let review = core
            .list_tasks(Some(TaskStatus::Scheduled), 10)
            .await
            .into_iter()
            .find(|t| t.title == "Morning Review")
            .unwrap();
        assert_eq!(review.task_type, TaskType::LearnFromHistory);
        assert_eq!(review.scheduled_time, Some(at(9, 30, 0)));

        assert_eq!(core.tick_at(at(9, 1, 0)).await, TickOutcome::Idle);
        assert_eq!(core.tick_at(at(9, 5, 1)).await, TickOutcome::WentToSleep);
        assert_eq!(core.tick_at(at(9, 6, 0)).await, TickOutcome::Idle);
        assert_eq!(
            core.tick_at(at(9, 30, 0)).await,
            TickOutcome::WokeUp { trigger_id: TASK_DUE_TRIGGER_ID.to_string() }
        );
        assert_eq!(
            core.tick_at(at(9, 30, 1)).await,
            TickOutcome::TaskFinished { task_id: review.id.clone(), status: TaskStatus::Completed }
        );

        let done = core.get_task(&review.id).await.unwrap();
        assert_eq!(done.result.as_deref(), Some("done: Morning Review"));
        // Seeding happens once per day, not on the second wake-up
        let reviews = core
            .list_tasks(None, 20)
            .await
            .into_iter()
            .filter(|t| t.title == "Morning Review" && t.id != review.id)
            .count();
        assert_eq!(reviews, 1);
    }

    #[tokio::test]
    async fn test_restart_while_last_tick_runs_keeps_one_loop() {
        let executor = Arc::new(SlowExecutor { delay: std::time::Duration::from_millis(300) });
        let core = core_with(test_config(), executor);
        let task = core
            .create_task(TaskSpec::new(TaskType::ExploreTopic, "reading"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();

        assert!(core.start().await);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(core.state().await, AgentState::Working);

        assert!(core.stop());
        assert!(core.start().await);
        // The old loop finished its task before the new one started
        assert_eq!(core.get_task(&task.id).await.unwrap().status, TaskStatus::Completed);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(core.live_loops.load(Ordering::SeqCst), 1);

        core.shutdown().await;
        assert_eq!(core.live_loops.load(Ordering::SeqCst), 0);
    }

    /// Writes the task as completed through a second connection, then fails
    struct OverwritingExecutor {
        other: std::sync::Mutex<SqliteStore>,
    }

    #[async_trait]
    impl TaskExecutor for OverwritingExecutor {
        async fn execute(&self, mut task: Task, _callbacks: AgentCallbacks) -> TaskOutcome {
            task.status = TaskStatus::Completed;
            task.result = Some("written elsewhere".to_string());
            if let Ok(store) = self.other.lock() {
                let _ = store.save_task(&task);
            }
            TaskOutcome::Failure("lost the race".to_string())
        }
    }

    #[tokio::test]
    async fn test_finished_row_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.db");
        let mut config = test_config();
        config.database_path = path.clone();

        let executor = Arc::new(OverwritingExecutor {
            other: std::sync::Mutex::new(SqliteStore::open(&path).unwrap()),
        });
        let store = SqliteStore::open(&path).unwrap();
        let core = ProactiveCore::new(config, Box::new(store), executor.clone(), Arc::new(EmptyProfile)).unwrap();
        let task = core
            .create_task(TaskSpec::new(TaskType::Consolidate, "contested"))
            .await
            .unwrap();
        core.wake_up("test").await.unwrap();

        let outcome = core.tick_at(Local::now()).await;
        assert_eq!(outcome, TickOutcome::TaskFinished { task_id: task.id.clone(), status: TaskStatus::Failed });

        let other = executor.other.lock().unwrap();
        assert_eq!(other.task_status(&task.id).unwrap(), Some(TaskStatus::Completed));
        let stored = other
            .load_tasks(10)
            .unwrap()
            .history
            .into_iter()
            .find(|t| t.id == task.id)
            .unwrap();
        assert_eq!(stored.result.as_deref(), Some("written elsewhere"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_stop_ends_loop() {
        let core = core_with(test_config(), succeeding());
        assert!(core.start().await);
        assert!(!core.start().await);
        assert!(core.status().await.running);

        core.shutdown().await;
        assert!(!core.is_running());
        assert_eq!(core.state().await, AgentState::Sleeping);
    }
}
