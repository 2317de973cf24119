//! Data models for the wakeup manager

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Local, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::core::error::{AgentError, AgentResult};

/// Stable id of the schedule-derived morning trigger
pub const MORNING_TRIGGER_ID: &str = "morning_wakeup";
/// Stable id of the schedule-derived evening trigger
pub const EVENING_TRIGGER_ID: &str = "evening_wakeup";
/// Stable id of the default periodic health check trigger
pub const HEALTH_CHECK_TRIGGER_ID: &str = "periodic_health_check";
/// Stable id of the trigger that wakes the agent for due tasks
pub const TASK_DUE_TRIGGER_ID: &str = "task_due";
/// Stable id of the trigger enabled by immediate wakeup requests
pub const USER_REQUEST_TRIGGER_ID: &str = "user_request";

/// Kinds of wakeup triggers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Fires once at `scheduled_time`, then disables itself
    Scheduled,
    /// Fires every `interval_secs`
    Periodic,
    /// Fires while a task is due and the agent sleeps
    TaskDue,
    /// Fires when enough new data has been recorded
    NewData,
    /// Fires immediately once enabled, then disables itself
    UserRequest,
    /// Fires immediately once enabled, then disables itself
    System,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::Scheduled => "scheduled",
            TriggerType::Periodic => "periodic",
            TriggerType::TaskDue => "task_due",
            TriggerType::NewData => "new_data",
            TriggerType::UserRequest => "user_request",
            TriggerType::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<TriggerType> {
        match value {
            "scheduled" => Some(TriggerType::Scheduled),
            "periodic" => Some(TriggerType::Periodic),
            "task_due" => Some(TriggerType::TaskDue),
            "new_data" => Some(TriggerType::NewData),
            "user_request" => Some(TriggerType::UserRequest),
            "system" => Some(TriggerType::System),
            _ => None,
        }
    }
}

/// Daily slot a schedule-derived trigger follows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSlot {
    Morning,
    Evening,
}

impl ScheduleSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleSlot::Morning => "morning",
            ScheduleSlot::Evening => "evening",
        }
    }

    pub fn parse(value: &str) -> Option<ScheduleSlot> {
        match value {
            "morning" => Some(ScheduleSlot::Morning),
            "evening" => Some(ScheduleSlot::Evening),
            _ => None,
        }
    }
}

/// A condition that wakes a sleeping agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WakeupTrigger {
    /// Trigger identifier
    pub id: String,
    /// Trigger kind
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Display name
    pub name: String,
    /// Disabled triggers are never evaluated
    pub enabled: bool,
    /// Fire time for one-shot scheduled triggers
    pub scheduled_time: Option<DateTime<Local>>,
    /// Repeat interval for periodic triggers
    pub interval_secs: Option<u64>,
    /// Last time this trigger fired
    pub last_triggered_at: Option<DateTime<Local>>,
    /// Priority (higher wins when several are due)
    pub priority: u8,
    /// Reason handed to the agent on wake-up
    pub reason: String,
    /// Set on the morning/evening triggers that follow the wakeup schedule
    #[serde(default)]
    pub schedule_slot: Option<ScheduleSlot>,
    /// Number of new data items needed before a new-data trigger fires
    #[serde(default)]
    pub data_threshold: Option<u64>,
}

impl WakeupTrigger {
    pub fn new(id: &str, trigger_type: TriggerType, name: &str, priority: u8, reason: &str) -> Self {
        Self {
            id: id.to_string(),
            trigger_type,
            name: name.to_string(),
            enabled: true,
            scheduled_time: None,
            interval_secs: None,
            last_triggered_at: None,
            priority,
            reason: reason.to_string(),
            schedule_slot: None,
            data_threshold: None,
        }
    }

    /// Generate a fresh `trigger_<8 hex>` id
    pub fn generate_id() -> String {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        format!("trigger_{}", &raw[..8])
    }

    /// Check that the trigger carries what its type needs
    pub fn validate(&self) -> AgentResult<()> {
        if !(1..=10).contains(&self.priority) {
            return Err(AgentError::ValidationError(format!(
                "trigger priority must be between 1 and 10, got {}",
                self.priority
            )));
        }
        match self.trigger_type {
            TriggerType::Scheduled if self.scheduled_time.is_none() && self.schedule_slot.is_none() => {
                Err(AgentError::ValidationError(format!(
                    "scheduled trigger '{}' has no scheduled time",
                    self.name
                )))
            }
            TriggerType::Periodic if !matches!(self.interval_secs, Some(secs) if secs > 0) => {
                Err(AgentError::ValidationError(format!(
                    "periodic trigger '{}' needs a positive interval",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Daily morning/evening wakeup schedule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WakeupSchedule {
    pub enabled: bool,
    #[serde(with = "hhmm")]
    pub morning_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub evening_time: NaiveTime,
    /// Active weekdays, 0 = Monday .. 6 = Sunday
    pub active_weekdays: BTreeSet<u8>,
}

impl Default for WakeupSchedule {
    fn default() -> Self {
        Self {
            enabled: true,
            morning_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            evening_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
            active_weekdays: (0..7).collect(),
        }
    }
}

impl WakeupSchedule {
    pub fn validate(&self) -> AgentResult<()> {
        if let Some(day) = self.active_weekdays.iter().find(|d| **d > 6) {
            return Err(AgentError::ValidationError(format!(
                "weekday {} is outside 0..=6",
                day
            )));
        }
        Ok(())
    }

    pub fn slot_time(&self, slot: ScheduleSlot) -> NaiveTime {
        match slot {
            ScheduleSlot::Morning => self.morning_time,
            ScheduleSlot::Evening => self.evening_time,
        }
    }

    pub fn is_active_on(&self, at: DateTime<Local>) -> bool {
        let weekday = at.weekday().num_days_from_monday() as u8;
        self.active_weekdays.contains(&weekday)
    }
}

/// Serde helpers for "HH:MM" times
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}
