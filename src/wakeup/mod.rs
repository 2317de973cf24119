//! Wakeup manager
//!
//! Decides when a sleeping agent wakes up: a registry of triggers plus the
//! daily morning/evening schedule.

pub mod manager;
pub mod models;

pub use manager::{TriggerContext, WakeupManager, WakeupStatus};
pub use models::{ScheduleSlot, TriggerType, WakeupSchedule, WakeupTrigger};
