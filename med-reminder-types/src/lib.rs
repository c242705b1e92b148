//! Shared types for the medication reminder service and its HTTP clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Domain Types
// =====================================================

/// A medication with its reminder schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    /// Reminder times as "HH:MM" strings, local wall-clock
    pub times: Vec<String>,
    pub notes: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A family contact that receives reminders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    /// Digits only, country code included
    pub phone: String,
    pub relation: Option<String>,
    pub created_at: String,
}

// =====================================================
// Request Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateMedicationRequest {
    pub name: String,
    pub dosage: String,
    pub times: Vec<String>,
    pub notes: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update: `None` fields are left unchanged
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateMedicationRequest {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub times: Option<Vec<String>>,
    pub notes: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub phone: String,
    pub relation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestMessageRequest {
    pub phone: String,
    pub message: String,
}

// =====================================================
// Response Types
// =====================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestMessageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestMessageResponse {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(msg.into()),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(msg.into()),
        }
    }
}

/// Store-wide counters
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreStats {
    pub medications: i64,
    pub active_medications: i64,
    pub contacts: i64,
}

// =====================================================
// Backup Types
// =====================================================

/// Full-store export; ids are preserved across restore
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupData {
    pub medications: Vec<Medication>,
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackupRestoreRequest {
    pub data: BackupData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub success: bool,
    pub medications: usize,
    pub contacts: usize,
}

// =====================================================
// Status Types
// =====================================================

/// Readiness of the WhatsApp delivery channel
#[derive(Debug, Serialize, Deserialize)]
pub struct WhatsAppStatus {
    pub ready: bool,
    pub provider: String,
    pub mode: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub whatsapp: String,
    pub provider: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub last_tick_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_is_active_unless_told_otherwise() {
        let req: CreateMedicationRequest = serde_json::from_value(serde_json::json!({
            "name": "Aspirin",
            "dosage": "100mg",
            "times": ["08:00"]
        }))
        .unwrap();
        assert!(req.active);
        assert!(req.notes.is_none());

        let req: CreateMedicationRequest = serde_json::from_value(serde_json::json!({
            "name": "Aspirin",
            "dosage": "100mg",
            "times": ["08:00"],
            "active": false
        }))
        .unwrap();
        assert!(!req.active);
    }

    #[test]
    fn update_request_tolerates_extra_fields() {
        // Clients may echo the full record back, id included.
        let patch: UpdateMedicationRequest = serde_json::from_value(serde_json::json!({
            "id": "client-supplied",
            "dosage": "200mg"
        }))
        .unwrap();
        assert_eq!(patch.dosage.as_deref(), Some("200mg"));
        assert!(patch.name.is_none());
        assert!(patch.active.is_none());

        let empty: UpdateMedicationRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.times.is_none());
    }

    #[test]
    fn test_message_response_keeps_only_the_populated_side() {
        let ok = serde_json::to_value(TestMessageResponse::ok("sent")).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["message"], "sent");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(TestMessageResponse::err("no such number")).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "no such number");
        assert!(err.get("message").is_none());
    }
}
