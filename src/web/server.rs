use actix_web::{middleware, web, App, HttpServer};
use log::info;

use crate::core::agent::ProactiveCore;
use crate::web::handlers;

/// Register every route of the management API
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Agent lifecycle
        .route("/status", web::get().to(handlers::agent::get_status))
        .route("/start", web::post().to(handlers::agent::start))
        .route("/stop", web::post().to(handlers::agent::stop))
        .route("/wake", web::post().to(handlers::agent::wake))
        .route("/sleep", web::post().to(handlers::agent::sleep))
        .route("/metrics", web::get().to(handlers::agent::metrics))
        // Tasks; history before {id} so it is not captured as an id
        .route("/tasks", web::get().to(handlers::tasks::list_tasks))
        .route("/tasks", web::post().to(handlers::tasks::create_task))
        .route("/tasks/history", web::get().to(handlers::tasks::list_history))
        .route("/tasks/history/{id}", web::delete().to(handlers::tasks::delete_history_entry))
        .route("/tasks/{id}", web::get().to(handlers::tasks::get_task))
        .route("/tasks/{id}", web::delete().to(handlers::tasks::cancel_task))
        .route("/task-types", web::get().to(handlers::tasks::task_types))
        // Triggers and schedule
        .route("/triggers", web::get().to(handlers::wakeup::list_triggers))
        .route("/triggers", web::post().to(handlers::wakeup::add_trigger))
        .route("/triggers/{id}", web::delete().to(handlers::wakeup::remove_trigger))
        .route("/schedule", web::get().to(handlers::wakeup::get_schedule))
        .route("/schedule", web::put().to(handlers::wakeup::update_schedule))
        .route("/schedule/wakeup", web::post().to(handlers::wakeup::schedule_wakeup))
        // Actions
        .route("/actions/run-task", web::post().to(handlers::tasks::run_task))
        .route("/actions/immediate-wakeup", web::post().to(handlers::wakeup::immediate_wakeup))
        .route("/actions/new-data", web::post().to(handlers::wakeup::new_data));
}

/// Serve the management API until the server is stopped
pub async fn start_web_server(core: ProactiveCore, bind_address: String) -> std::io::Result<()> {
    info!("Starting web server on http://{}", bind_address);

    let app_state = web::Data::new(AppState { core });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(routes)
    })
    .bind(bind_address)?
    .run();
    server.await
}

/// Shared application state for web handlers
pub struct AppState {
    pub core: ProactiveCore,
}
