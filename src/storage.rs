use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::api::models::{Role, ServiceRequest, WorkerServiceRequest};
use crate::lobby::transcript::{DeliveryStatus, Message, MessageKind, ThreadKey, Transcript};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no data directory available")]
    NoDataDir,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt cache entry: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS service_requests (
        role TEXT NOT NULL,
        id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        raw_json TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (role, id)
    );
    CREATE TABLE IF NOT EXISTS messages (
        request_id INTEGER NOT NULL,
        worker_id INTEGER NOT NULL,
        id INTEGER NOT NULL,
        sender TEXT NOT NULL,
        body TEXT NOT NULL,
        kind TEXT NOT NULL,
        amount REAL,
        delivery TEXT NOT NULL,
        sent_at TEXT NOT NULL,
        PRIMARY KEY (request_id, worker_id, id)
    );
"#;

// Threads without a worker (the owner's view) are stored under worker id 0.
fn thread_worker(thread: ThreadKey) -> i64 {
    thread.worker_id.unwrap_or(0)
}

fn role_key(role: Role) -> &'static str {
    match role {
        Role::Client => "client",
        Role::Worker => "worker",
    }
}

fn parse_role(raw: &str) -> Result<Role, StorageError> {
    match raw {
        "client" => Ok(Role::Client),
        "worker" => Ok(Role::Worker),
        other => Err(StorageError::Corrupt(format!("unknown sender {other}"))),
    }
}

/// Offline copy of the last fetched request lists, plus the lobby
/// transcripts, which only ever live on this device.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    pub fn default_path() -> Option<std::path::PathBuf> {
        let proj = ProjectDirs::from("dz", "sala7li", "Sala7li")?;
        Some(proj.data_dir().join("cache.sqlite"))
    }

    pub fn open_default() -> Result<Self, StorageError> {
        let path = Self::default_path().ok_or(StorageError::NoDataDir)?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn replace_rows<T: Serialize>(
        &mut self,
        role: Role,
        rows: impl Iterator<Item = (i64, T)>,
    ) -> Result<usize, StorageError> {
        let now = Utc::now();
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM service_requests WHERE role = ?1",
            params![role_key(role)],
        )?;
        let mut count = 0;
        for (position, (id, row)) in rows.enumerate() {
            let raw = serde_json::to_string(&row)?;
            tx.execute(
                r#"
                INSERT INTO service_requests (role, id, position, raw_json, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(role, id) DO UPDATE SET
                    position=excluded.position,
                    raw_json=excluded.raw_json,
                    updated_at=excluded.updated_at
                "#,
                params![role_key(role), id, position as i64, raw, now],
            )?;
            count += 1;
        }
        tx.commit()?;
        debug!("Cached {} {} requests", count, role);
        Ok(count)
    }

    fn rows<T: DeserializeOwned>(&self, role: Role) -> Result<Vec<T>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT raw_json FROM service_requests WHERE role = ?1 ORDER BY position ASC",
        )?;
        let raws = stmt.query_map(params![role_key(role)], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in raws {
            out.push(serde_json::from_str(&raw?)?);
        }
        Ok(out)
    }

    pub fn store_client_requests(&mut self, requests: &[ServiceRequest]) -> Result<usize, StorageError> {
        self.replace_rows(Role::Client, requests.iter().map(|r| (r.id, r)))
    }

    pub fn store_worker_requests(&mut self, rows: &[WorkerServiceRequest]) -> Result<usize, StorageError> {
        self.replace_rows(Role::Worker, rows.iter().map(|r| (r.service_request_id, r)))
    }

    pub fn client_requests(&self) -> Result<Vec<ServiceRequest>, StorageError> {
        self.rows(Role::Client)
    }

    pub fn worker_requests(&self) -> Result<Vec<WorkerServiceRequest>, StorageError> {
        self.rows(Role::Worker)
    }

    /// When the list for `role` was last stored, if ever.
    pub fn last_synced(&self, role: Role) -> Result<Option<DateTime<Utc>>, StorageError> {
        let ts = self
            .conn
            .query_row(
                "SELECT MAX(updated_at) FROM service_requests WHERE role = ?1",
                params![role_key(role)],
                |row| row.get::<_, Option<DateTime<Utc>>>(0),
            )
            .optional()?;
        Ok(ts.flatten())
    }

    /// Writes every message of a transcript, overwriting entries with the
    /// same id in that thread.
    pub fn save_transcript(&mut self, thread: ThreadKey, messages: &[Message]) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        for m in messages {
            let (kind, amount) = match m.kind {
                MessageKind::Text => ("text", None),
                MessageKind::Bid { amount } => ("bid", Some(amount)),
            };
            tx.execute(
                r#"
                INSERT INTO messages
                    (request_id, worker_id, id, sender, body, kind, amount, delivery, sent_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(request_id, worker_id, id) DO UPDATE SET
                    sender=excluded.sender,
                    body=excluded.body,
                    kind=excluded.kind,
                    amount=excluded.amount,
                    delivery=excluded.delivery,
                    sent_at=excluded.sent_at
                "#,
                params![
                    thread.request_id,
                    thread_worker(thread),
                    m.id as i64,
                    role_key(m.sender),
                    m.text,
                    kind,
                    amount,
                    m.delivery.as_str(),
                    m.sent_at,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_transcript(&self, thread: ThreadKey) -> Result<Transcript, StorageError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, sender, body, kind, amount, delivery, sent_at
            FROM messages WHERE request_id = ?1 AND worker_id = ?2
            ORDER BY id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![thread.request_id, thread_worker(thread)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, DateTime<Utc>>(6)?,
            ))
        })?;
        let mut messages = Vec::new();
        for row in rows {
            let (id, sender, text, kind, amount, delivery, sent_at) = row?;
            let kind = match (kind.as_str(), amount) {
                ("bid", Some(amount)) => MessageKind::Bid { amount },
                ("text", _) => MessageKind::Text,
                (other, _) => return Err(StorageError::Corrupt(format!("message kind {other}"))),
            };
            let delivery = DeliveryStatus::parse(&delivery)
                .ok_or_else(|| StorageError::Corrupt(format!("delivery status {delivery}")))?;
            messages.push(Message {
                id: id as u64,
                sender: parse_role(&sender)?,
                text,
                sent_at,
                kind,
                delivery,
            });
        }
        Ok(Transcript::from_messages(messages))
    }
}
