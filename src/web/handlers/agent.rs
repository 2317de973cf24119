//! Web handlers for the agent lifecycle

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::web::models::{error_response, ReasonRequest};
use crate::web::server::AppState;

/// Full agent status
pub async fn get_status(app_state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(app_state.core.status().await)
}

/// Start the main loop
pub async fn start(app_state: web::Data<AppState>) -> impl Responder {
    let started = app_state.core.start().await;
    HttpResponse::Ok().json(json!({
        "success": true,
        "running": true,
        "message": if started { "Agent loop started" } else { "Agent loop already running" },
    }))
}

/// Stop the main loop after its current tick
pub async fn stop(app_state: web::Data<AppState>) -> impl Responder {
    let stopped = app_state.core.stop();
    HttpResponse::Ok().json(json!({
        "success": true,
        "running": false,
        "message": if stopped { "Agent loop stopping" } else { "Agent loop was not running" },
    }))
}

pub async fn wake(app_state: web::Data<AppState>, req: Option<web::Json<ReasonRequest>>) -> impl Responder {
    let reason = req
        .and_then(|r| r.into_inner().reason)
        .unwrap_or_else(|| "Manual wake-up".to_string());

    match app_state.core.wake_up(&reason).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "woke": outcome.woke,
            "state": outcome.state,
        })),
        Err(e) => error_response(&e),
    }
}

/// Put the agent to sleep; 409 while a task is running (the request stays queued)
pub async fn sleep(app_state: web::Data<AppState>, req: Option<web::Json<ReasonRequest>>) -> impl Responder {
    let reason = req
        .and_then(|r| r.into_inner().reason)
        .unwrap_or_else(|| "Manual sleep".to_string());

    match app_state.core.go_to_sleep(&reason).await {
        Ok(state) => HttpResponse::Ok().json(json!({
            "success": true,
            "state": state,
        })),
        Err(e) => error_response(&e),
    }
}

/// Prometheus text exposition
pub async fn metrics(app_state: web::Data<AppState>) -> impl Responder {
    match app_state.core.metrics().render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => error_response(&e),
    }
}
