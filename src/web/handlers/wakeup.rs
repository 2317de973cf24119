//! Web handlers for triggers and the wakeup schedule

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::core::error::AgentError;
use crate::wakeup::models::{hhmm, WakeupTrigger};
use crate::web::models::{
    error_response, AddTriggerRequest, NewDataRequest, ReasonRequest, ScheduleUpdateRequest,
    ScheduleWakeupRequest,
};
use crate::web::server::AppState;

pub async fn list_triggers(app_state: web::Data<AppState>) -> impl Responder {
    let triggers = app_state.core.list_triggers().await;
    HttpResponse::Ok().json(json!({
        "count": triggers.len(),
        "triggers": triggers,
    }))
}

pub async fn add_trigger(app_state: web::Data<AppState>, req: web::Json<AddTriggerRequest>) -> impl Responder {
    let req = req.into_inner();
    let reason = req.reason.unwrap_or_else(|| req.name.clone());
    let mut trigger = WakeupTrigger::new(
        req.id.as_deref().unwrap_or_default(),
        req.trigger_type,
        &req.name,
        req.priority,
        &reason,
    );
    trigger.enabled = req.enabled;
    trigger.scheduled_time = req.scheduled_time;
    trigger.interval_secs = req.interval_secs;
    trigger.data_threshold = req.data_threshold;

    match app_state.core.add_trigger(trigger).await {
        Ok(trigger) => HttpResponse::Created().json(json!({
            "success": true,
            "trigger": trigger,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn remove_trigger(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match app_state.core.remove_trigger(&path).await {
        Ok(trigger) => HttpResponse::Ok().json(json!({
            "success": true,
            "removed": trigger.id,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn get_schedule(app_state: web::Data<AppState>) -> impl Responder {
    let (schedule, next_wakeup) = app_state.core.schedule().await;
    HttpResponse::Ok().json(json!({
        "schedule": schedule,
        "next_wakeup": next_wakeup,
    }))
}

/// Merge a partial update into the current schedule
pub async fn update_schedule(
    app_state: web::Data<AppState>,
    req: web::Json<ScheduleUpdateRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let (mut schedule, _) = app_state.core.schedule().await;

    if let Some(enabled) = req.enabled {
        schedule.enabled = enabled;
    }
    for (raw, slot) in [
        (req.morning_time, &mut schedule.morning_time),
        (req.evening_time, &mut schedule.evening_time),
    ] {
        if let Some(raw) = raw {
            match hhmm::parse(&raw) {
                Some(time) => *slot = time,
                None => {
                    return error_response(&AgentError::ValidationError(format!(
                        "invalid time '{}', expected HH:MM",
                        raw
                    )))
                }
            }
        }
    }
    if let Some(weekdays) = req.active_weekdays {
        schedule.active_weekdays = weekdays;
    }

    match app_state.core.set_schedule(schedule).await {
        Ok(schedule) => HttpResponse::Ok().json(json!({
            "success": true,
            "schedule": schedule,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn schedule_wakeup(
    app_state: web::Data<AppState>,
    req: web::Json<ScheduleWakeupRequest>,
) -> impl Responder {
    let req = req.into_inner();
    match app_state.core.schedule_wakeup(req.when, &req.reason, req.priority).await {
        Ok(trigger) => HttpResponse::Created().json(json!({
            "success": true,
            "trigger": trigger,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn immediate_wakeup(
    app_state: web::Data<AppState>,
    req: Option<web::Json<ReasonRequest>>,
) -> impl Responder {
    let reason = req
        .and_then(|r| r.into_inner().reason)
        .unwrap_or_else(|| "User request".to_string());

    match app_state.core.request_immediate_wakeup(&reason).await {
        Ok(Some(trigger)) => HttpResponse::Accepted().json(json!({
            "success": true,
            "requested": true,
            "trigger": trigger,
        })),
        Ok(None) => HttpResponse::Ok().json(json!({
            "success": true,
            "requested": false,
            "message": "Agent is already awake",
            "state": app_state.core.state().await,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn new_data(app_state: web::Data<AppState>, req: web::Json<NewDataRequest>) -> impl Responder {
    let total = app_state.core.record_new_data(req.count).await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "pending_new_data": total,
    }))
}
