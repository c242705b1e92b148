//! Background reminder scheduler.
//!
//! Wakes on every minute boundary, matches active medications against the
//! current local HH:MM, and fans reminder messages out to all contacts.

use crate::db::Db;
use crate::whatsapp::WhatsAppSender;
use chrono::Timelike;
use med_reminder_types::Medication;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub async fn run_worker(
    db: Arc<Db>,
    sender: Arc<WhatsAppSender>,
    last_tick_at: Arc<Mutex<Option<String>>>,
) {
    log::info!("[REMINDER] Scheduler started (checking every minute)");

    loop {
        tokio::time::sleep(until_next_minute()).await;
        let current_time = chrono::Local::now().format("%H:%M").to_string();

        // The tick is awaited to completion, so a slow fan-out delays the
        // next check instead of overlapping it.
        match run_tick(&db, &sender, &current_time).await {
            Ok(sent) => {
                if sent > 0 {
                    log::info!(
                        "[REMINDER] Tick {}: {} reminders sent",
                        current_time,
                        sent
                    );
                }
                *last_tick_at.lock().await = Some(chrono::Utc::now().to_rfc3339());
            }
            Err(e) => {
                log::error!("[REMINDER] Tick error: {}", e);
            }
        }
    }
}

/// Time remaining until the next minute boundary of the local clock.
fn until_next_minute() -> Duration {
    let now = chrono::Local::now();
    let elapsed_ms = now.second() as u64 * 1_000 + now.timestamp_subsec_millis() as u64;
    Duration::from_millis(60_000u64.saturating_sub(elapsed_ms).max(1))
}

/// One scheduler pass for the given "HH:MM" minute. Returns the number of
/// deliveries that succeeded; individual failures are logged and skipped.
async fn run_tick(db: &Db, sender: &WhatsAppSender, current_time: &str) -> Result<usize, String> {
    let medications = db
        .list_active_medications()
        .map_err(|e| format!("Failed to list medications: {}", e))?;

    let due: Vec<Medication> = medications
        .into_iter()
        .filter(|m| m.times.iter().any(|t| t == current_time))
        .collect();
    if due.is_empty() {
        return Ok(0);
    }

    let contacts = db
        .list_contacts()
        .map_err(|e| format!("Failed to list contacts: {}", e))?;
    if contacts.is_empty() {
        log::warn!(
            "[REMINDER] {} medication(s) due at {} but no contacts registered",
            due.len(),
            current_time
        );
        return Ok(0);
    }

    let mut sent = 0usize;
    for med in &due {
        let message = format_reminder(med, current_time);
        for contact in &contacts {
            match sender.send(&contact.phone, &message).await {
                Ok(receipt) => {
                    sent += 1;
                    if let Some(sid) = receipt.sid {
                        log::debug!(
                            "[REMINDER] Sent {} reminder to {} (sid {})",
                            med.name,
                            contact.name,
                            sid
                        );
                    }
                }
                Err(e) => {
                    log::warn!(
                        "[REMINDER] Failed to send {} reminder to {}: {}",
                        med.name,
                        contact.name,
                        e
                    );
                }
            }
        }
    }

    Ok(sent)
}

fn format_reminder(med: &Medication, current_time: &str) -> String {
    let note_line = match &med.notes {
        Some(notes) if !notes.is_empty() => format!("📝 Note: {}\n\n", notes),
        _ => String::new(),
    };
    format!(
        "🔔 MEDICATION REMINDER\n\n💊 {}\n📋 Dosage: {}\n⏰ Time: {}\n\n{}Please take your medication now! 🙏",
        med.name, med.dosage, current_time, note_line
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use med_reminder_types::{CreateContactRequest, CreateMedicationRequest};

    fn test_db() -> Db {
        Db::open(":memory:").expect("in-memory db")
    }

    fn medication(name: &str, times: &[&str], active: bool) -> CreateMedicationRequest {
        CreateMedicationRequest {
            name: name.to_string(),
            dosage: "100mg".to_string(),
            times: times.iter().map(|t| t.to_string()).collect(),
            notes: None,
            active,
        }
    }

    #[tokio::test]
    async fn due_medication_reaches_every_contact() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();
        db.create_contact("Jonas", "4915770000000", None).unwrap();

        let sender = WhatsAppSender::mock();
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 2);

        let calls = sender.mock_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "15551234567");
        assert_eq!(calls[1].0, "4915770000000");
        assert!(calls[0].1.contains("Aspirin"));
        assert!(calls[0].1.contains("08:00"));
    }

    #[tokio::test]
    async fn nothing_fires_off_schedule() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sender = WhatsAppSender::mock();
        let sent = run_tick(&db, &sender, "08:01").await.unwrap();
        assert_eq!(sent, 0);
        assert!(sender.mock_calls().is_empty());
    }

    #[tokio::test]
    async fn inactive_medication_never_fires() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], false))
            .unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sender = WhatsAppSender::mock();
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 0);
        assert!(sender.mock_calls().is_empty());
    }

    #[tokio::test]
    async fn one_failing_contact_does_not_block_the_rest() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_contact("Broken", "15550000000", None).unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sender = WhatsAppSender::mock_failing(&["15550000000"]);
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 1, "the healthy contact still gets its reminder");

        let calls = sender.mock_calls();
        assert_eq!(calls.len(), 2, "both contacts were attempted");
        assert_eq!(calls[1].0, "15551234567");
    }

    #[tokio::test]
    async fn failures_do_not_block_later_medications() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_medication(&medication("Metformin", &["08:00"], true))
            .unwrap();
        db.create_contact("Broken", "15550000000", None).unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sender = WhatsAppSender::mock_failing(&["15550000000"]);
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 2, "each medication still reaches the healthy contact");

        let calls = sender.mock_calls();
        assert_eq!(calls.len(), 4, "every contact was attempted for every medication");
        assert_eq!(calls[3].0, "15551234567");
        assert!(calls[3].1.contains("Metformin"));
    }

    #[tokio::test]
    async fn every_due_medication_fires_in_one_tick() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_medication(&medication("Metformin", &["08:00", "20:00"], true))
            .unwrap();
        db.create_medication(&medication("Evening-only", &["20:00"], true))
            .unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sender = WhatsAppSender::mock();
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 2);

        let calls = sender.mock_calls();
        assert!(calls[0].1.contains("Aspirin"));
        assert!(calls[1].1.contains("Metformin"));
    }

    #[tokio::test]
    async fn demo_tick_succeeds_without_credentials() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();
        db.create_contact("Maria", "15551234567", None).unwrap();

        let sent = run_tick(&db, &WhatsAppSender::Demo, "08:00").await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn tick_without_contacts_sends_nothing() {
        let db = test_db();
        db.create_medication(&medication("Aspirin", &["08:00"], true))
            .unwrap();

        let sender = WhatsAppSender::mock();
        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 0);
        assert!(sender.mock_calls().is_empty());
    }

    #[tokio::test]
    async fn aspirin_end_to_end_through_the_api() {
        let db = Arc::new(test_db());
        let sender = Arc::new(WhatsAppSender::mock());
        let state = Arc::new(crate::routes::AppState {
            db: db.clone(),
            sender: sender.clone(),
            start_time: std::time::Instant::now(),
            last_tick_at: Arc::new(Mutex::new(None)),
        });

        use axum::extract::{Json, State};
        crate::routes::medications_create(
            State(state.clone()),
            Json(medication("Aspirin", &["08:00"], true)),
        )
        .await
        .expect("create medication");
        crate::routes::contacts_create(
            State(state.clone()),
            Json(CreateContactRequest {
                name: "Maria".to_string(),
                phone: "15551234567".to_string(),
                relation: None,
            }),
        )
        .await
        .expect("create contact");

        let sent = run_tick(&db, &sender, "08:00").await.unwrap();
        assert_eq!(sent, 1);
        let calls = sender.mock_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "15551234567");
        assert!(calls[0].1.contains("Aspirin"));

        let sent = run_tick(&db, &sender, "08:01").await.unwrap();
        assert_eq!(sent, 0);
        assert_eq!(sender.mock_calls().len(), 1);
    }

    #[test]
    fn reminder_message_includes_notes_only_when_present() {
        let db = test_db();
        let mut req = medication("Aspirin", &["08:00"], true);
        req.notes = Some("With food".to_string());
        let med = db.create_medication(&req).unwrap();

        let message = format_reminder(&med, "08:00");
        assert!(message.contains("MEDICATION REMINDER"));
        assert!(message.contains("Dosage: 100mg"));
        assert!(message.contains("Note: With food"));

        let plain = db
            .create_medication(&medication("Metformin", &["08:00"], true))
            .unwrap();
        assert!(!format_reminder(&plain, "08:00").contains("Note:"));
    }
}
