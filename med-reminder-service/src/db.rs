//! SQLite database operations for the medication reminder service.

use med_reminder_types::*;
use rusqlite::{Connection, Result as SqliteResult};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                dosage TEXT NOT NULL,
                times_json TEXT NOT NULL DEFAULT '[]',
                notes TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_medications_active ON medications(active)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS contacts (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                phone TEXT NOT NULL,
                relation TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    // =====================================================
    // Medication Operations
    // =====================================================

    pub fn create_medication(&self, req: &CreateMedicationRequest) -> SqliteResult<Medication> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let times_json =
            serde_json::to_string(&req.times).unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO medications (id, name, dosage, times_json, notes, active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            rusqlite::params![id, req.name, req.dosage, times_json, req.notes, req.active, now],
        )?;

        Ok(Medication {
            id,
            name: req.name.clone(),
            dosage: req.dosage.clone(),
            times: req.times.clone(),
            notes: req.notes.clone(),
            active: req.active,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn list_medications(&self) -> SqliteResult<Vec<Medication>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, dosage, times_json, notes, active, created_at, updated_at
             FROM medications ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map([], |row| row_to_medication(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn list_active_medications(&self) -> SqliteResult<Vec<Medication>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, dosage, times_json, notes, active, created_at, updated_at
             FROM medications WHERE active = 1 ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map([], |row| row_to_medication(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn get_medication(&self, id: &str) -> SqliteResult<Option<Medication>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, dosage, times_json, notes, active, created_at, updated_at
             FROM medications WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], |row| row_to_medication(row))?;
        Ok(rows.next().and_then(|r| r.ok()))
    }

    /// Partial update. `None` fields keep their stored values; the row id
    /// never changes. Returns `None` when the id is unknown.
    pub fn update_medication(
        &self,
        id: &str,
        patch: &UpdateMedicationRequest,
    ) -> SqliteResult<Option<Medication>> {
        {
            let conn = self.conn.lock().unwrap();
            let now = chrono::Utc::now().to_rfc3339();

            let mut updates = vec!["updated_at = ?1".to_string()];
            let mut param_idx = 2u32;
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

            if let Some(ref name) = patch.name {
                updates.push(format!("name = ?{}", param_idx));
                params.push(Box::new(name.clone()));
                param_idx += 1;
            }
            if let Some(ref dosage) = patch.dosage {
                updates.push(format!("dosage = ?{}", param_idx));
                params.push(Box::new(dosage.clone()));
                param_idx += 1;
            }
            if let Some(ref times) = patch.times {
                let times_json =
                    serde_json::to_string(times).unwrap_or_else(|_| "[]".to_string());
                updates.push(format!("times_json = ?{}", param_idx));
                params.push(Box::new(times_json));
                param_idx += 1;
            }
            if let Some(ref notes) = patch.notes {
                updates.push(format!("notes = ?{}", param_idx));
                params.push(Box::new(notes.clone()));
                param_idx += 1;
            }
            if let Some(active) = patch.active {
                updates.push(format!("active = ?{}", param_idx));
                params.push(Box::new(active));
                param_idx += 1;
            }

            let sql = format!(
                "UPDATE medications SET {} WHERE id = ?{}",
                updates.join(", "),
                param_idx
            );
            params.push(Box::new(id.to_string()));

            let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let rows = conn.execute(&sql, param_refs.as_slice())?;
            if rows == 0 {
                return Ok(None);
            }
        }
        self.get_medication(id)
    }

    pub fn delete_medication(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM medications WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // =====================================================
    // Contact Operations
    // =====================================================

    pub fn create_contact(&self, name: &str, phone: &str, relation: Option<&str>) -> SqliteResult<Contact> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO contacts (id, name, phone, relation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![id, name, phone, relation, now],
        )?;

        Ok(Contact {
            id,
            name: name.to_string(),
            phone: phone.to_string(),
            relation: relation.map(|s| s.to_string()),
            created_at: now,
        })
    }

    pub fn list_contacts(&self) -> SqliteResult<Vec<Contact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, phone, relation, created_at
             FROM contacts ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map([], |row| row_to_contact(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn get_contact(&self, id: &str) -> SqliteResult<Option<Contact>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, phone, relation, created_at
             FROM contacts WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map([id], |row| row_to_contact(row))?;
        Ok(rows.next().and_then(|r| r.ok()))
    }

    pub fn delete_contact(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM contacts WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // =====================================================
    // Stats
    // =====================================================

    pub fn stats(&self) -> SqliteResult<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let medications: i64 = conn
            .query_row("SELECT COUNT(*) FROM medications", [], |row| row.get(0))
            .unwrap_or(0);
        let active_medications: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM medications WHERE active = 1",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);
        let contacts: i64 = conn
            .query_row("SELECT COUNT(*) FROM contacts", [], |row| row.get(0))
            .unwrap_or(0);

        Ok(StoreStats {
            medications,
            active_medications,
            contacts,
        })
    }

    // =====================================================
    // Backup Operations
    // =====================================================

    pub fn export_for_backup(&self) -> SqliteResult<BackupData> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, name, dosage, times_json, notes, active, created_at, updated_at
             FROM medications ORDER BY created_at ASC",
        )?;
        let medications: Vec<Medication> = stmt
            .query_map([], |row| row_to_medication(row))?
            .filter_map(|r| r.ok())
            .collect();

        let mut stmt = conn.prepare(
            "SELECT id, name, phone, relation, created_at
             FROM contacts ORDER BY created_at ASC",
        )?;
        let contacts: Vec<Contact> = stmt
            .query_map([], |row| row_to_contact(row))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(BackupData {
            medications,
            contacts,
        })
    }

    /// Replaces the whole store with the backup contents. Ids and
    /// timestamps come from the backup, not from the restore instant.
    pub fn clear_and_restore(&self, data: &BackupData) -> Result<(usize, usize), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM medications", [])
            .map_err(|e| format!("Failed to clear medications: {}", e))?;
        conn.execute("DELETE FROM contacts", [])
            .map_err(|e| format!("Failed to clear contacts: {}", e))?;

        let mut med_count = 0;
        for med in &data.medications {
            let times_json =
                serde_json::to_string(&med.times).unwrap_or_else(|_| "[]".to_string());
            let rows = conn
                .execute(
                    "INSERT OR IGNORE INTO medications
                        (id, name, dosage, times_json, notes, active, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        med.id,
                        med.name,
                        med.dosage,
                        times_json,
                        med.notes,
                        med.active,
                        med.created_at,
                        med.updated_at
                    ],
                )
                .map_err(|e| format!("Failed to insert medication: {}", e))?;
            med_count += rows;
        }

        let mut contact_count = 0;
        for contact in &data.contacts {
            let rows = conn
                .execute(
                    "INSERT OR IGNORE INTO contacts (id, name, phone, relation, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        contact.id,
                        contact.name,
                        contact.phone,
                        contact.relation,
                        contact.created_at
                    ],
                )
                .map_err(|e| format!("Failed to insert contact: {}", e))?;
            contact_count += rows;
        }

        Ok((med_count, contact_count))
    }
}

// =====================================================
// Row Mapping Functions
// =====================================================

fn row_to_medication(row: &rusqlite::Row) -> rusqlite::Result<Medication> {
    let times_json: String = row.get(3)?;
    Ok(Medication {
        id: row.get(0)?,
        name: row.get(1)?,
        dosage: row.get(2)?,
        times: serde_json::from_str(&times_json).unwrap_or_default(),
        notes: row.get(4)?,
        active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        relation: row.get(3)?,
        created_at: row.get(4)?,
    })
}
