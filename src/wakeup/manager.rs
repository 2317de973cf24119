//! Trigger registry and due-trigger evaluation
//!
//! `check_triggers` is the only place triggers fire. It picks the single
//! best due trigger (highest priority, then earliest reference time), marks
//! it as fired and hands a copy back so the caller can persist it.

use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{DateTime, Duration, Local, Timelike};
use log::{debug, info, warn};
use serde::Serialize;

use crate::core::error::{AgentError, AgentResult};
use crate::scheduler::daily::today_at;

use super::models::*;

/// Facts about the rest of the agent a trigger may depend on
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerContext {
    /// The scheduler has at least one due task
    pub has_due_task: bool,
    /// The agent is currently sleeping
    pub sleeping: bool,
}

/// Preview of the trigger expected to fire next
#[derive(Debug, Clone, Serialize)]
pub struct NextTriggerInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub scheduled_for: DateTime<Local>,
    pub time_until: String,
}

/// Wakeup manager summary for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct WakeupStatus {
    pub triggers_count: usize,
    pub enabled_triggers: usize,
    pub schedule: WakeupSchedule,
    pub next_wakeup: Option<DateTime<Local>>,
    pub next_trigger: Option<NextTriggerInfo>,
    pub pending_new_data: u64,
}

/// Owns the trigger registry and the daily wakeup schedule
#[derive(Debug, Clone)]
pub struct WakeupManager {
    triggers: Vec<WakeupTrigger>,
    schedule: WakeupSchedule,
    new_data_count: u64,
    /// Malformed trigger ids already reported
    warned: HashSet<String>,
}

impl WakeupManager {
    /// Manager with the built-in triggers, armed relative to `now`
    pub fn new(schedule: WakeupSchedule, health_check_interval_secs: u64, now: DateTime<Local>) -> Self {
        let mut manager = Self {
            triggers: Vec::new(),
            schedule,
            new_data_count: 0,
            warned: HashSet::new(),
        };
        manager.triggers = Self::default_triggers(health_check_interval_secs);
        manager.arm(now);
        manager
    }

    fn default_triggers(health_check_interval_secs: u64) -> Vec<WakeupTrigger> {
        let mut morning = WakeupTrigger::new(
            MORNING_TRIGGER_ID,
            TriggerType::Scheduled,
            "Morning Wakeup",
            7,
            "Daily morning routine",
        );
        morning.schedule_slot = Some(ScheduleSlot::Morning);

        let mut evening = WakeupTrigger::new(
            EVENING_TRIGGER_ID,
            TriggerType::Scheduled,
            "Evening Wakeup",
            7,
            "Daily evening review",
        );
        evening.schedule_slot = Some(ScheduleSlot::Evening);

        let mut health = WakeupTrigger::new(
            HEALTH_CHECK_TRIGGER_ID,
            TriggerType::Periodic,
            "Periodic Health Check",
            3,
            "Periodic health check",
        );
        health.interval_secs = Some(health_check_interval_secs);

        let task_due = WakeupTrigger::new(
            TASK_DUE_TRIGGER_ID,
            TriggerType::TaskDue,
            "Task Due",
            6,
            "Scheduled task is due",
        );

        let mut user_request = WakeupTrigger::new(
            USER_REQUEST_TRIGGER_ID,
            TriggerType::UserRequest,
            "Immediate Wakeup",
            10,
            "User request",
        );
        user_request.enabled = false;

        vec![morning, evening, health, task_due, user_request]
    }

    /// Keep built-ins from firing for slots that passed before the agent existed
    fn arm(&mut self, now: DateTime<Local>) {
        let schedule = self.schedule.clone();
        for trigger in self.triggers.iter_mut().filter(|t| t.last_triggered_at.is_none()) {
            match (trigger.trigger_type, trigger.schedule_slot) {
                (TriggerType::Scheduled, Some(slot)) => {
                    if slot_today(&schedule, slot, now).map_or(false, |at| now >= at) {
                        trigger.last_triggered_at = Some(now);
                    }
                }
                (TriggerType::Periodic, _) => trigger.last_triggered_at = Some(now),
                _ => {}
            }
        }
    }

    /// Overlay persisted triggers on the built-ins
    ///
    /// Returns the built-ins that were missing from the store so the caller
    /// can write them back.
    pub fn restore(&mut self, stored: Vec<WakeupTrigger>) -> Vec<WakeupTrigger> {
        let stored_ids: HashSet<String> = stored.iter().map(|t| t.id.clone()).collect();
        let missing: Vec<WakeupTrigger> = self
            .triggers
            .iter()
            .filter(|t| !stored_ids.contains(&t.id))
            .cloned()
            .collect();

        for trigger in stored {
            match self.triggers.iter_mut().find(|t| t.id == trigger.id) {
                Some(existing) => *existing = trigger,
                None => self.triggers.push(trigger),
            }
        }
        missing
    }

    /// Fire the best due trigger, if any
    pub fn check_triggers(&mut self, now: DateTime<Local>, ctx: TriggerContext) -> Option<WakeupTrigger> {
        let mut best: Option<(Reverse<u8>, Option<DateTime<Local>>, usize)> = None;

        for (index, trigger) in self.triggers.iter().enumerate() {
            if !trigger.enabled {
                continue;
            }
            if let Err(e) = trigger.validate() {
                if self.warned.insert(trigger.id.clone()) {
                    warn!("Skipping malformed trigger {}: {}", trigger.id, e);
                }
                continue;
            }
            if let Some(reference) = self.due_reference(trigger, now, ctx) {
                let key = (Reverse(trigger.priority), reference, index);
                if best.as_ref().map_or(true, |b| key < *b) {
                    best = Some(key);
                }
            }
        }

        let (_, _, index) = best?;
        let trigger = &mut self.triggers[index];
        trigger.last_triggered_at = Some(now);
        let one_shot = matches!(trigger.trigger_type, TriggerType::UserRequest | TriggerType::System)
            || (trigger.trigger_type == TriggerType::Scheduled && trigger.schedule_slot.is_none());
        if one_shot {
            trigger.enabled = false;
        }
        if trigger.trigger_type == TriggerType::NewData {
            self.new_data_count = 0;
        }

        info!("Trigger '{}' fired ({})", trigger.name, trigger.reason);
        Some(trigger.clone())
    }

    /// Reference time for a due trigger (used as tie-break), `None` if not due
    ///
    /// The outer option says whether the trigger is due; the inner one is the
    /// time used for ordering, where `None` sorts first.
    fn due_reference(
        &self,
        trigger: &WakeupTrigger,
        now: DateTime<Local>,
        ctx: TriggerContext,
    ) -> Option<Option<DateTime<Local>>> {
        match trigger.trigger_type {
            TriggerType::Scheduled => match trigger.schedule_slot {
                Some(slot) => {
                    if !self.schedule.enabled || !self.schedule.is_active_on(now) {
                        return None;
                    }
                    let at = slot_today(&self.schedule, slot, now)?;
                    let fired_today = trigger.last_triggered_at.map_or(false, |last| last >= at);
                    (now >= at && !fired_today).then_some(Some(at))
                }
                None => {
                    let at = trigger.scheduled_time?;
                    (now >= at).then_some(Some(at))
                }
            },
            TriggerType::Periodic => {
                let interval = Duration::seconds(trigger.interval_secs? as i64);
                match trigger.last_triggered_at {
                    None => Some(None),
                    Some(last) => (now - last >= interval).then_some(Some(last)),
                }
            }
            TriggerType::TaskDue => {
                (ctx.has_due_task && ctx.sleeping).then_some(trigger.last_triggered_at)
            }
            TriggerType::NewData => {
                let threshold = trigger.data_threshold.unwrap_or(1).max(1);
                (self.new_data_count >= threshold).then_some(trigger.last_triggered_at)
            }
            TriggerType::UserRequest | TriggerType::System => Some(trigger.last_triggered_at),
        }
    }

    pub fn add_trigger(&mut self, mut trigger: WakeupTrigger) -> AgentResult<WakeupTrigger> {
        if trigger.id.trim().is_empty() {
            trigger.id = WakeupTrigger::generate_id();
        }
        trigger.validate()?;
        if self.triggers.iter().any(|t| t.id == trigger.id) {
            return Err(AgentError::ValidationError(format!("trigger {} already exists", trigger.id)));
        }

        debug!("Added trigger {} '{}'", trigger.id, trigger.name);
        self.triggers.push(trigger.clone());
        Ok(trigger)
    }

    pub fn remove_trigger(&mut self, trigger_id: &str) -> AgentResult<WakeupTrigger> {
        let index = self
            .triggers
            .iter()
            .position(|t| t.id == trigger_id)
            .ok_or_else(|| AgentError::NotFound(format!("trigger {}", trigger_id)))?;
        self.warned.remove(trigger_id);
        Ok(self.triggers.remove(index))
    }

    pub fn get_trigger(&self, trigger_id: &str) -> Option<&WakeupTrigger> {
        self.triggers.iter().find(|t| t.id == trigger_id)
    }

    pub fn list_triggers(&self) -> Vec<WakeupTrigger> {
        self.triggers.clone()
    }

    /// One-shot wakeup at `when`
    pub fn schedule_wakeup(
        &mut self,
        when: DateTime<Local>,
        reason: &str,
        priority: u8,
    ) -> AgentResult<WakeupTrigger> {
        let mut trigger = WakeupTrigger::new(
            &WakeupTrigger::generate_id(),
            TriggerType::Scheduled,
            "Scheduled Wakeup",
            priority,
            reason,
        );
        trigger.scheduled_time = Some(when);
        self.add_trigger(trigger)
    }

    /// Enable the user-request trigger so the next check wakes the agent
    pub fn request_immediate_wakeup(&mut self, reason: &str) -> WakeupTrigger {
        match self.triggers.iter_mut().find(|t| t.id == USER_REQUEST_TRIGGER_ID) {
            Some(trigger) => {
                trigger.enabled = true;
                trigger.reason = reason.to_string();
                trigger.clone()
            }
            None => {
                let trigger = WakeupTrigger::new(
                    USER_REQUEST_TRIGGER_ID,
                    TriggerType::UserRequest,
                    "Immediate Wakeup",
                    10,
                    reason,
                );
                self.triggers.push(trigger.clone());
                trigger
            }
        }
    }

    /// Disarm a pending user request; returns the trigger if it was armed
    pub fn cancel_immediate_wakeup(&mut self) -> Option<WakeupTrigger> {
        let trigger = self
            .triggers
            .iter_mut()
            .find(|t| t.id == USER_REQUEST_TRIGGER_ID && t.enabled)?;
        trigger.enabled = false;
        debug!("Dropped pending immediate wake-up ({})", trigger.reason);
        Some(trigger.clone())
    }

    /// Accumulate new data for new-data triggers; returns the running count
    pub fn record_new_data(&mut self, count: u64) -> u64 {
        self.new_data_count = self.new_data_count.saturating_add(count);
        self.new_data_count
    }

    pub fn schedule(&self) -> &WakeupSchedule {
        &self.schedule
    }

    pub fn set_schedule(&mut self, schedule: WakeupSchedule) -> AgentResult<()> {
        schedule.validate()?;
        info!(
            "Wakeup schedule set to {} / {} (enabled: {})",
            schedule.morning_time.format("%H:%M"),
            schedule.evening_time.format("%H:%M"),
            schedule.enabled
        );
        self.schedule = schedule;
        Ok(())
    }

    /// Next morning or evening slot from the schedule
    pub fn next_wakeup(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        if !self.schedule.enabled {
            return None;
        }
        if self.schedule.is_active_on(now) {
            for slot in [ScheduleSlot::Morning, ScheduleSlot::Evening] {
                if let Some(at) = slot_today(&self.schedule, slot, now).filter(|at| *at > now) {
                    return Some(at);
                }
            }
        }
        (1..=7)
            .map(|days| now + Duration::days(days))
            .find(|day| self.schedule.is_active_on(*day))
            .and_then(|day| slot_today(&self.schedule, ScheduleSlot::Morning, day))
    }

    /// Earliest upcoming time-based trigger
    pub fn next_trigger(&self, now: DateTime<Local>) -> Option<NextTriggerInfo> {
        self.triggers
            .iter()
            .filter(|t| t.enabled)
            .filter_map(|t| {
                let at = match (t.trigger_type, t.schedule_slot) {
                    (TriggerType::Scheduled, Some(_)) => self.next_wakeup(now).filter(|_| self.schedule.enabled)?,
                    (TriggerType::Scheduled, None) => t.scheduled_time.filter(|at| *at > now)?,
                    (TriggerType::Periodic, _) => match t.last_triggered_at {
                        Some(last) => last + Duration::seconds(t.interval_secs? as i64),
                        None => now,
                    },
                    _ => return None,
                };
                Some((at, t))
            })
            .min_by_key(|(at, _)| *at)
            .map(|(at, t)| NextTriggerInfo {
                id: t.id.clone(),
                name: t.name.clone(),
                trigger_type: t.trigger_type,
                scheduled_for: at,
                time_until: format_time_until(at - now),
            })
    }

    pub fn status(&self, now: DateTime<Local>) -> WakeupStatus {
        WakeupStatus {
            triggers_count: self.triggers.len(),
            enabled_triggers: self.triggers.iter().filter(|t| t.enabled).count(),
            schedule: self.schedule.clone(),
            next_wakeup: self.next_wakeup(now),
            next_trigger: self.next_trigger(now),
            pending_new_data: self.new_data_count,
        }
    }
}

fn slot_today(schedule: &WakeupSchedule, slot: ScheduleSlot, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let time = schedule.slot_time(slot);
    today_at(now, time.hour(), time.minute())
}

/// Human readable "1h 5m" style duration
fn format_time_until(delta: Duration) -> String {
    let total = delta.num_seconds();
    if total <= 0 {
        return "now".to_string();
    }
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 && hours == 0 {
        parts.push(format!("{}s", seconds));
    }
    parts.join(" ")
}
