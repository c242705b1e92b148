//! Axum route handlers for the medication reminder API.

use crate::db::Db;
use crate::whatsapp::{self, WhatsAppSender};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use med_reminder_types::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

pub struct AppState {
    pub db: Arc<Db>,
    pub sender: Arc<WhatsAppSender>,
    pub start_time: Instant,
    pub last_tick_at: Arc<Mutex<Option<String>>>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error(msg: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: msg }),
    )
}

fn not_found(msg: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
}

// =====================================================
// Medication Endpoints
// =====================================================

// GET /api/medications
pub async fn medications_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Medication>>, ApiError> {
    match state.db.list_medications() {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => Err(internal_error(format!("Failed to list medications: {}", e))),
    }
}

// POST /api/medications
pub async fn medications_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMedicationRequest>,
) -> Result<(StatusCode, Json<Medication>), ApiError> {
    match state.db.create_medication(&req) {
        Ok(med) => Ok((StatusCode::CREATED, Json(med))),
        Err(e) => Err(internal_error(format!("Failed to create medication: {}", e))),
    }
}

// PUT /api/medications/:id
pub async fn medications_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<UpdateMedicationRequest>,
) -> Result<Json<Medication>, ApiError> {
    match state.db.update_medication(&id, &patch) {
        Ok(Some(med)) => Ok(Json(med)),
        Ok(None) => Err(not_found("Medication not found")),
        Err(e) => Err(internal_error(format!("Failed to update medication: {}", e))),
    }
}

// DELETE /api/medications/:id
pub async fn medications_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    // Deleting an unknown id is a success: the record is gone either way.
    match state.db.delete_medication(&id) {
        Ok(_) => Ok(Json(MessageResponse {
            message: "Medication deleted successfully".to_string(),
        })),
        Err(e) => Err(internal_error(format!("Failed to delete medication: {}", e))),
    }
}

// =====================================================
// Contact Endpoints
// =====================================================

// GET /api/contacts
pub async fn contacts_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    match state.db.list_contacts() {
        Ok(entries) => Ok(Json(entries)),
        Err(e) => Err(internal_error(format!("Failed to list contacts: {}", e))),
    }
}

// POST /api/contacts
pub async fn contacts_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let phone = whatsapp::digits_only(&req.phone);
    match state
        .db
        .create_contact(&req.name, &phone, req.relation.as_deref())
    {
        Ok(contact) => Ok((StatusCode::CREATED, Json(contact))),
        Err(e) => Err(internal_error(format!("Failed to create contact: {}", e))),
    }
}

// DELETE /api/contacts/:id
pub async fn contacts_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    match state.db.delete_contact(&id) {
        Ok(_) => Ok(Json(MessageResponse {
            message: "Contact deleted successfully".to_string(),
        })),
        Err(e) => Err(internal_error(format!("Failed to delete contact: {}", e))),
    }
}

// =====================================================
// Messaging Endpoints
// =====================================================

// GET /api/whatsapp/status
pub async fn whatsapp_status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<WhatsAppStatus>) {
    let status = WhatsAppStatus {
        ready: state.sender.is_ready(),
        provider: "Twilio WhatsApp API".to_string(),
        mode: state.sender.mode().as_str().to_string(),
    };
    (StatusCode::OK, Json(status))
}

// POST /api/test-message
pub async fn test_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TestMessageRequest>,
) -> (StatusCode, Json<TestMessageResponse>) {
    match state.sender.send(&req.phone, &req.message).await {
        Ok(_) => (
            StatusCode::OK,
            Json(TestMessageResponse::ok("Test message sent successfully")),
        ),
        Err(e) => {
            log::warn!("[API] Test message to {} failed: {}", req.phone, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(TestMessageResponse::err(e)),
            )
        }
    }
}

// =====================================================
// Service Endpoints
// =====================================================

// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let last_tick = state.last_tick_at.lock().await.clone();
    let status = HealthStatus {
        status: "OK".to_string(),
        whatsapp: if state.sender.is_ready() {
            "configured".to_string()
        } else {
            "demo-mode".to_string()
        },
        provider: "Twilio".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        last_tick_at: last_tick,
    };
    (StatusCode::OK, Json(status))
}

// GET /api/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StoreStats>, ApiError> {
    match state.db.stats() {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => Err(internal_error(format!("Stats query failed: {}", e))),
    }
}

// POST /api/backup/export
pub async fn backup_export(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BackupData>, ApiError> {
    match state.db.export_for_backup() {
        Ok(data) => Ok(Json(data)),
        Err(e) => Err(internal_error(format!("Backup export failed: {}", e))),
    }
}

// POST /api/backup/restore
pub async fn backup_restore(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BackupRestoreRequest>,
) -> Result<Json<RestoreResponse>, ApiError> {
    match state.db.clear_and_restore(&req.data) {
        Ok((medications, contacts)) => Ok(Json(RestoreResponse {
            success: true,
            medications,
            contacts,
        })),
        Err(e) => Err(internal_error(format!("Backup restore failed: {}", e))),
    }
}
