use actix_web::HttpResponse;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::AgentError;
use crate::wakeup::models::TriggerType;

/// Error body shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

/// Map an agent error onto its HTTP status
pub fn error_response(err: &AgentError) -> HttpResponse {
    let body = ErrorResponse {
        success: false,
        error: err.to_string(),
        error_code: err.error_code().to_string(),
    };

    match err {
        AgentError::ValidationError(_) => HttpResponse::BadRequest().json(body),
        AgentError::CapacityError(_) => HttpResponse::TooManyRequests().json(body),
        AgentError::StateTransitionError(_) => HttpResponse::Conflict().json(body),
        AgentError::NotFound(_) => HttpResponse::NotFound().json(body),
        AgentError::ExecutionError(_)
        | AgentError::TimeoutError(_)
        | AgentError::PersistenceError(_)
        | AgentError::ConfigError(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Body for wake and sleep requests
#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

/// Query for listing live tasks
#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Query for listing history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// New trigger
#[derive(Debug, Deserialize)]
pub struct AddTriggerRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Local>>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default = "default_trigger_priority")]
    pub priority: u8,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub data_threshold: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_trigger_priority() -> u8 {
    5
}

/// Partial schedule update; absent fields keep their current value
#[derive(Debug, Default, Deserialize)]
pub struct ScheduleUpdateRequest {
    pub enabled: Option<bool>,
    /// "HH:MM"
    pub morning_time: Option<String>,
    /// "HH:MM"
    pub evening_time: Option<String>,
    pub active_weekdays: Option<BTreeSet<u8>>,
}

/// One-shot wake-up at a given time
#[derive(Debug, Deserialize)]
pub struct ScheduleWakeupRequest {
    pub when: DateTime<Local>,
    pub reason: String,
    #[serde(default = "default_trigger_priority")]
    pub priority: u8,
}

/// Query for the run-task action
#[derive(Debug, Deserialize)]
pub struct RunTaskQuery {
    pub task_type: String,
    pub title: Option<String>,
}

/// Notification that new data arrived
#[derive(Debug, Deserialize)]
pub struct NewDataRequest {
    #[serde(default = "default_new_data_count")]
    pub count: u64,
}

fn default_new_data_count() -> u64 {
    1
}

/// Entry of the task type catalogue
#[derive(Debug, Serialize)]
pub struct TaskTypeInfo {
    pub task_type: String,
    pub description: String,
}
