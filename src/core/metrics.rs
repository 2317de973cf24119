//! Prometheus metrics for the agent

use log::debug;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::core::error::{AgentError, AgentResult};

/// Collects agent counters and gauges in a private registry
#[derive(Debug, Clone)]
pub struct MetricsManager {
    registry: Registry,
    /// State transitions, labelled by target state
    transitions: IntCounterVec,
    /// Finished tasks, labelled by outcome (completed, failed, timed_out)
    tasks_finished: IntCounterVec,
    /// Created tasks, labelled by origin (api, executor, recurring, daily)
    tasks_created: IntCounterVec,
    /// Fired triggers, labelled by trigger type
    triggers_fired: IntCounterVec,
    queue_length: IntGauge,
    history_length: IntGauge,
}

impl MetricsManager {
    pub fn new() -> AgentResult<Self> {
        let registry = Registry::new_custom(Some("proactive_agent".to_string()), None)?;

        let transitions = IntCounterVec::new(
            Opts::new("state_transitions_total", "Agent state transitions"),
            &["to"],
        )?;
        let tasks_finished = IntCounterVec::new(
            Opts::new("tasks_finished_total", "Tasks that left the in-progress state"),
            &["outcome"],
        )?;
        let tasks_created = IntCounterVec::new(
            Opts::new("tasks_created_total", "Tasks accepted into the queue"),
            &["origin"],
        )?;
        let triggers_fired = IntCounterVec::new(
            Opts::new("triggers_fired_total", "Wakeup triggers that fired"),
            &["type"],
        )?;
        let queue_length = IntGauge::new("queue_length", "Live tasks in the queue")?;
        let history_length = IntGauge::new("history_length", "Finished tasks kept in history")?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(tasks_finished.clone()))?;
        registry.register(Box::new(tasks_created.clone()))?;
        registry.register(Box::new(triggers_fired.clone()))?;
        registry.register(Box::new(queue_length.clone()))?;
        registry.register(Box::new(history_length.clone()))?;

        Ok(Self {
            registry,
            transitions,
            tasks_finished,
            tasks_created,
            triggers_fired,
            queue_length,
            history_length,
        })
    }

    pub fn record_transition(&self, to: &str) {
        self.transitions.with_label_values(&[to]).inc();
    }

    pub fn record_task_finished(&self, outcome: &str) {
        self.tasks_finished.with_label_values(&[outcome]).inc();
    }

    pub fn record_task_created(&self, origin: &str) {
        self.tasks_created.with_label_values(&[origin]).inc();
    }

    pub fn record_trigger_fired(&self, trigger_type: &str) {
        self.triggers_fired.with_label_values(&[trigger_type]).inc();
    }

    pub fn set_queue_sizes(&self, queue: usize, history: usize) {
        self.queue_length.set(queue as i64);
        self.history_length.set(history as i64);
    }

    pub fn tasks_created(&self, origin: &str) -> u64 {
        self.tasks_created.with_label_values(&[origin]).get()
    }

    pub fn tasks_finished(&self, outcome: &str) -> u64 {
        self.tasks_finished.with_label_values(&[outcome]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> AgentResult<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        debug!("Rendered {} metric families", families.len());
        String::from_utf8(buffer).map_err(|e| AgentError::ConfigError(e.to_string()))
    }
}
