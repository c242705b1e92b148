//! Medication Reminder Service, a standalone backend for scheduled WhatsApp reminders.
//!
//! Hosts the REST API and the minute-aligned reminder scheduler in one process.
//! Default: http://0.0.0.0:5000/

mod db;
mod routes;
mod whatsapp;
mod worker;

use routes::AppState;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let port: u16 = std::env::var("MED_REMINDER_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);

    let db_path =
        std::env::var("MED_REMINDER_DB_PATH").unwrap_or_else(|_| "./med_reminder.db".to_string());

    log::info!("Opening database at: {}", db_path);
    let database = Arc::new(db::Db::open(&db_path).expect("Failed to open database"));

    let sender = Arc::new(whatsapp::WhatsAppSender::from_env());
    match sender.mode() {
        whatsapp::SenderMode::Live => log::info!("Twilio WhatsApp messaging enabled"),
        whatsapp::SenderMode::Demo => log::warn!(
            "Twilio credentials not set, running in demo mode (messages are logged, not sent)"
        ),
    }

    let last_tick_at: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let state = Arc::new(AppState {
        db: database.clone(),
        sender: sender.clone(),
        start_time: Instant::now(),
        last_tick_at: last_tick_at.clone(),
    });

    // The scheduler runs in demo mode too; demo sends are logged receipts.
    let worker_db = database.clone();
    let worker_sender = sender.clone();
    let worker_last_tick = last_tick_at.clone();
    tokio::spawn(async move {
        worker::run_worker(worker_db, worker_sender, worker_last_tick).await;
    });

    let cors = tower_http::cors::CorsLayer::permissive();

    let app = axum::Router::new()
        // Medication management
        .route(
            "/api/medications",
            axum::routing::get(routes::medications_list).post(routes::medications_create),
        )
        .route(
            "/api/medications/:id",
            axum::routing::put(routes::medications_update).delete(routes::medications_delete),
        )
        // Contact management
        .route(
            "/api/contacts",
            axum::routing::get(routes::contacts_list).post(routes::contacts_create),
        )
        .route(
            "/api/contacts/:id",
            axum::routing::delete(routes::contacts_delete),
        )
        // Messaging
        .route(
            "/api/whatsapp/status",
            axum::routing::get(routes::whatsapp_status),
        )
        .route("/api/test-message", axum::routing::post(routes::test_message))
        // Service
        .route("/api/health", axum::routing::get(routes::health))
        .route("/api/stats", axum::routing::get(routes::stats))
        .route(
            "/api/backup/export",
            axum::routing::post(routes::backup_export),
        )
        .route(
            "/api/backup/restore",
            axum::routing::post(routes::backup_restore),
        )
        .with_state(state)
        .layer(cors);

    let addr = format!("0.0.0.0:{}", port);
    log::info!("Medication Reminder Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}
