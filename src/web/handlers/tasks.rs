//! Web handlers for the task queue and history

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::core::error::AgentError;
use crate::scheduler::models::{TaskSpec, TaskStatus, TaskType};
use crate::web::models::{error_response, HistoryQuery, RunTaskQuery, TaskListQuery, TaskTypeInfo};
use crate::web::server::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;
const DEFAULT_HISTORY_LIMIT: usize = 50;

pub async fn list_tasks(app_state: web::Data<AppState>, query: web::Query<TaskListQuery>) -> impl Responder {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match TaskStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(&AgentError::ValidationError(format!("unknown task status '{}'", raw)))
            }
        },
    };

    let tasks = app_state
        .core
        .list_tasks(status, query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await;
    HttpResponse::Ok().json(json!({
        "count": tasks.len(),
        "tasks": tasks,
    }))
}

pub async fn create_task(app_state: web::Data<AppState>, req: web::Json<TaskSpec>) -> impl Responder {
    match app_state.core.create_task(req.into_inner()).await {
        Ok(task) => HttpResponse::Created().json(json!({
            "success": true,
            "task_id": task.id,
            "task": task,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn get_task(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match app_state.core.get_task(&path).await {
        Ok(task) => HttpResponse::Ok().json(task),
        Err(e) => error_response(&e),
    }
}

/// Cancel a pending or scheduled task
pub async fn cancel_task(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match app_state.core.cancel_task(&path).await {
        Ok(task) => HttpResponse::Ok().json(json!({
            "success": true,
            "task": task,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn list_history(app_state: web::Data<AppState>, query: web::Query<HistoryQuery>) -> impl Responder {
    let history = app_state
        .core
        .list_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await;
    HttpResponse::Ok().json(json!({
        "count": history.len(),
        "history": history,
    }))
}

pub async fn delete_history_entry(app_state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match app_state.core.delete_history_entry(&path).await {
        Ok(task) => HttpResponse::Ok().json(json!({
            "success": true,
            "deleted": task.id,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn task_types() -> impl Responder {
    let types: Vec<TaskTypeInfo> = TaskType::ALL
        .iter()
        .map(|t| TaskTypeInfo {
            task_type: t.as_str().to_string(),
            description: t.description().to_string(),
        })
        .collect();
    HttpResponse::Ok().json(types)
}

/// Queue a top-priority task, waking the agent and starting its loop if needed
pub async fn run_task(app_state: web::Data<AppState>, query: web::Query<RunTaskQuery>) -> impl Responder {
    let task_type = match TaskType::parse(&query.task_type) {
        Ok(task_type) => task_type,
        Err(e) => return error_response(&e),
    };

    match app_state.core.run_task_now(task_type, query.title.as_deref()).await {
        Ok((task, state)) => HttpResponse::Accepted().json(json!({
            "success": true,
            "task_id": task.id,
            "state": state,
            "running": app_state.core.is_running(),
        })),
        Err(e) => error_response(&e),
    }
}
