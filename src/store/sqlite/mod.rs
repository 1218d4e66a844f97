use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::{MessageStore, StoreStats, UpsertOutcome};
use crate::errors::RelayError;
use crate::messages::{InboundMessage, MessageKind, MessageMetadata, StorageReference};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=3000;";

const SELECT_COLUMNS: &str = "provider_message_id, organization_id, sender_id, kind, body, metadata, received_at";

/// `SQLite`-backed message store.
///
/// The connection is shared behind a mutex and every query runs on the
/// blocking pool.
#[derive(Clone)]
pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
}

type RawRow = (String, String, String, String, Option<String>, String, String);

impl SqliteMessageStore {
    pub fn open(db_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(PRAGMAS)?;
        Self::with_connection(conn).with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, RelayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RelayError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| RelayError::Persistence(format!("DB lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| RelayError::Persistence(format!("DB task failed: {e}")))?
    }
}

fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS inbound_messages (
            id INTEGER PRIMARY KEY,
            provider_message_id TEXT NOT NULL UNIQUE,
            organization_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            received_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_inbound_org ON inbound_messages(organization_id);
         CREATE INDEX IF NOT EXISTS idx_inbound_received ON inbound_messages(received_at);",
    )?;
    Ok(())
}

fn encode_metadata(meta: &MessageMetadata) -> Result<String, RelayError> {
    serde_json::to_string(meta).map_err(|e| RelayError::Persistence(e.to_string()))
}

fn decode_metadata(raw: &str) -> Result<MessageMetadata, RelayError> {
    serde_json::from_str(raw)
        .map_err(|e| RelayError::Persistence(format!("corrupt metadata column: {e}")))
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn into_message(raw: RawRow) -> Result<InboundMessage, RelayError> {
    let (provider_message_id, organization_id, sender_id, kind, body, metadata, received_at) = raw;
    let kind: MessageKind = kind.parse().map_err(RelayError::Persistence)?;
    let received_at = DateTime::parse_from_rfc3339(&received_at)
        .map_err(|e| RelayError::Persistence(format!("corrupt received_at: {e}")))?
        .with_timezone(&Utc);
    Ok(InboundMessage {
        provider_message_id,
        organization_id,
        sender_id,
        kind,
        body,
        metadata: decode_metadata(&metadata)?,
        received_at,
    })
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn upsert(&self, message: &InboundMessage) -> Result<UpsertOutcome, RelayError> {
        let msg = message.clone();
        self.run(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT INTO inbound_messages
                    (provider_message_id, organization_id, sender_id, kind, body, metadata, received_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(provider_message_id) DO NOTHING",
                params![
                    msg.provider_message_id,
                    msg.organization_id,
                    msg.sender_id,
                    msg.kind.as_str(),
                    msg.body,
                    encode_metadata(&msg.metadata)?,
                    msg.received_at.to_rfc3339(),
                    now,
                ],
            )?;

            let outcome = if inserted == 1 {
                UpsertOutcome::Inserted
            } else {
                let existing: String = tx.query_row(
                    "SELECT metadata FROM inbound_messages WHERE provider_message_id = ?1",
                    params![msg.provider_message_id],
                    |row| row.get(0),
                )?;
                let stored = decode_metadata(&existing)?;
                let mut merged = stored.clone();
                merged.merge(&msg.metadata);
                if merged == stored {
                    UpsertOutcome::Duplicate
                } else {
                    tx.execute(
                        "UPDATE inbound_messages SET metadata = ?1, updated_at = ?2
                         WHERE provider_message_id = ?3",
                        params![encode_metadata(&merged)?, now, msg.provider_message_id],
                    )?;
                    UpsertOutcome::Updated
                }
            };

            tx.commit()?;
            debug!("upsert {}: {:?}", msg.provider_message_id, outcome);
            Ok(outcome)
        })
        .await
    }

    async fn get(&self, provider_message_id: &str) -> Result<Option<InboundMessage>, RelayError> {
        let id = provider_message_id.to_string();
        self.run(move |conn| {
            let raw = conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM inbound_messages WHERE provider_message_id = ?1"
                    ),
                    params![id],
                    read_row,
                )
                .optional()?;
            raw.map(into_message).transpose()
        })
        .await
    }

    async fn pending_media(&self, limit: usize) -> Result<Vec<InboundMessage>, RelayError> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM inbound_messages
                 WHERE kind != 'text'
                   AND json_extract(metadata, '$.storage_path') IS NULL
                   AND json_extract(metadata, '$.original_media_id') IS NOT NULL
                 ORDER BY received_at ASC, id ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![limit as i64], read_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(into_message).collect()
        })
        .await
    }

    async fn attach_storage_path(
        &self,
        provider_message_id: &str,
        reference: &StorageReference,
    ) -> Result<bool, RelayError> {
        let id = provider_message_id.to_string();
        let reference = reference.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT metadata FROM inbound_messages WHERE provider_message_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(existing) = existing else {
                return Ok(false);
            };
            let mut meta = decode_metadata(&existing)?;
            meta.storage_path = Some(reference.key.clone());
            meta.content_type = Some(reference.content_type.clone());
            tx.execute(
                "UPDATE inbound_messages SET metadata = ?1, updated_at = ?2
                 WHERE provider_message_id = ?3",
                params![encode_metadata(&meta)?, Utc::now().to_rfc3339(), id],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats, RelayError> {
        self.run(|conn| {
            let (total, media, pending): (i64, i64, i64) = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(kind != 'text'), 0),
                    COALESCE(SUM(kind != 'text'
                        AND json_extract(metadata, '$.storage_path') IS NULL
                        AND json_extract(metadata, '$.original_media_id') IS NOT NULL), 0)
                 FROM inbound_messages",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(StoreStats {
                total: total as u64,
                media: media as u64,
                pending_upload: pending as u64,
            })
        })
        .await
    }
}
