//! Database connection and query operations.
//!
//! Content mutations emit change events through the configured sink after
//! the statement commits. Import writes go through
//! [`Database::upsert_imported_content`], which emits nothing so imported
//! content is never federated back out.

use crate::migrations;
use crate::models::{FederationMapping, MappingStatus, StatusCounts};
use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use federation_core::{
    CanonicalContent, ContentEvent, ContentEventSink, ContentId, ContentUpdate, Embed,
    NewContent, Protocol, RemoteRef,
};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Database wrapper with query methods.
pub struct Database {
    conn: Connection,
    sink: Arc<dyn ContentEventSink>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    ///
    /// Content mutations emit change events through `sink` after commit.
    pub fn open(path: &Path, sink: Arc<dyn ContentEventSink>) -> StoreResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode and performance optimizations
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn, sink })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory(sink: Arc<dyn ContentEventSink>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        // Note: WAL mode doesn't apply to in-memory databases
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn, sink })
    }

    /// Cheap liveness probe.
    pub fn health_check(&self) -> StoreResult<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ==========================================
    // Canonical content
    // ==========================================

    /// Insert a new content item and emit `ContentCreated`.
    pub fn insert_content(&self, new: &NewContent) -> StoreResult<CanonicalContent> {
        let now = Utc::now().to_rfc3339();
        let embeds = serde_json::to_string(&new.embeds)?;
        self.conn.execute(
            "INSERT INTO content (id, author_id, body, embeds, reply_to_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                new.id.as_str(),
                new.author_id.as_str(),
                new.body,
                embeds,
                new.reply_to_id.as_ref().map(|id| id.as_str()),
                now,
            ],
        )?;

        let content = self
            .get_content(&new.id)?
            .ok_or_else(|| StoreError::NotFound("Content not found after insert".to_string()))?;

        debug!(content_id = %content.id, "Content inserted");
        self.sink.emit(ContentEvent::ContentCreated {
            content_id: content.id.clone(),
            updated_at: content.updated_at,
        });
        Ok(content)
    }

    /// Get a content item by ID.
    pub fn get_content(&self, id: &ContentId) -> StoreResult<Option<CanonicalContent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, author_id, body, embeds, reply_to_id, created_at, updated_at, deleted_at
             FROM content WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id.as_str()], |row| {
            Ok(RawContentRow {
                id: row.get(0)?,
                author_id: row.get(1)?,
                body: row.get(2)?,
                embeds: row.get(3)?,
                reply_to_id: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
                deleted_at: row.get(7)?,
            })
        });

        match result {
            Ok(raw) => Ok(Some(raw.into_content()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply an update to a content item and emit `ContentUpdated`.
    ///
    /// Fails with `NotFound` for missing or soft-deleted content.
    pub fn update_content(
        &self,
        id: &ContentId,
        update: &ContentUpdate,
    ) -> StoreResult<CanonicalContent> {
        let existing = self
            .get_content(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Content not found: {}", id)))?;
        if existing.is_deleted() {
            return Err(StoreError::NotFound(format!("Content deleted: {}", id)));
        }

        let body = update.body.clone().unwrap_or(existing.body);
        let embeds = update.embeds.clone().unwrap_or(existing.embeds);
        let embeds_json = serde_json::to_string(&embeds)?;
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "UPDATE content SET body = ?2, embeds = ?3, updated_at = ?4 WHERE id = ?1",
            params![id.as_str(), body, embeds_json, now],
        )?;

        let content = self
            .get_content(id)?
            .ok_or_else(|| StoreError::NotFound("Content not found after update".to_string()))?;

        debug!(content_id = %id, "Content updated");
        self.sink.emit(ContentEvent::ContentUpdated {
            content_id: content.id.clone(),
            updated_at: content.updated_at,
        });
        Ok(content)
    }

    /// Soft-delete a content item and emit `ContentDeleted`.
    ///
    /// Deleting already-deleted content is a no-op and emits nothing.
    pub fn delete_content(&self, id: &ContentId) -> StoreResult<CanonicalContent> {
        let existing = self
            .get_content(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Content not found: {}", id)))?;
        if existing.is_deleted() {
            return Ok(existing);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE content SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id.as_str(), now],
        )?;

        let content = self
            .get_content(id)?
            .ok_or_else(|| StoreError::NotFound("Content not found after delete".to_string()))?;

        debug!(content_id = %id, "Content soft-deleted");
        self.sink.emit(ContentEvent::ContentDeleted {
            content_id: content.id.clone(),
            updated_at: content.updated_at,
        });
        Ok(content)
    }

    /// Upsert content produced by the importer. Emits nothing.
    ///
    /// Repeated imports of the same remote object update the row in place;
    /// `created_at` keeps the value from the first import.
    pub fn upsert_imported_content(&self, content: &CanonicalContent) -> StoreResult<()> {
        let embeds = serde_json::to_string(&content.embeds)?;
        self.conn.execute(
            "INSERT INTO content (id, author_id, body, embeds, reply_to_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                author_id = excluded.author_id,
                body = excluded.body,
                embeds = excluded.embeds,
                reply_to_id = excluded.reply_to_id,
                updated_at = excluded.updated_at",
            params![
                content.id.as_str(),
                content.author_id.as_str(),
                content.body,
                embeds,
                content.reply_to_id.as_ref().map(|id| id.as_str()),
                content.created_at.to_rfc3339(),
                content.updated_at.to_rfc3339(),
            ],
        )?;
        debug!(content_id = %content.id, "Imported content upserted");
        Ok(())
    }

    // ==========================================
    // Federation mappings
    // ==========================================

    /// Get the mapping for a (content, protocol) pair.
    pub fn get_mapping(
        &self,
        content_id: &ContentId,
        protocol: Protocol,
    ) -> StoreResult<Option<FederationMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_id, protocol, remote_id, remote_digest, status, attempt_count,
                    last_error, last_attempt_at, created_at, updated_at
             FROM federation_mappings WHERE content_id = ?1 AND protocol = ?2",
        )?;

        let result = stmt.query_row(params![content_id.as_str(), protocol.as_str()], |row| {
            RawMappingRow::from_row(row)
        });

        match result {
            Ok(raw) => Ok(Some(raw.into_mapping()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the pending mapping for a pair if none exists yet, and return
    /// the current row. First call for a pair happens when a job first runs.
    pub fn ensure_mapping(
        &self,
        content_id: &ContentId,
        protocol: Protocol,
    ) -> StoreResult<FederationMapping> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO federation_mappings
                (content_id, protocol, status, attempt_count, created_at, updated_at)
             VALUES (?1, ?2, 'pending', 0, ?3, ?3)",
            params![content_id.as_str(), protocol.as_str(), now],
        )?;

        self.get_mapping(content_id, protocol)?.ok_or_else(|| {
            StoreError::NotFound(format!("Mapping not found after ensure: {}", content_id))
        })
    }

    /// Record a successful publish or update: status `synced`, fresh remote
    /// reference, attempt budget reset. Upserts so import can record origin
    /// mappings directly.
    ///
    /// `content_updated_at` becomes the mapping's `last_attempt_at`: the
    /// dispatcher compares later change events against it, so the stamp must
    /// name the content revision that reached the remote, not the wall
    /// clock at write time.
    pub fn mark_sync_success(
        &self,
        content_id: &ContentId,
        protocol: Protocol,
        remote: &RemoteRef,
        content_updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO federation_mappings
                (content_id, protocol, remote_id, remote_digest, status, attempt_count,
                 last_error, last_attempt_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'synced', 0, NULL, ?5, ?6, ?6)
             ON CONFLICT(content_id, protocol) DO UPDATE SET
                remote_id = excluded.remote_id,
                remote_digest = excluded.remote_digest,
                status = 'synced',
                attempt_count = 0,
                last_error = NULL,
                last_attempt_at = excluded.last_attempt_at,
                updated_at = excluded.updated_at",
            params![
                content_id.as_str(),
                protocol.as_str(),
                remote.id,
                remote.digest,
                content_updated_at.to_rfc3339(),
                now,
            ],
        )?;
        debug!(content_id = %content_id, protocol = %protocol, remote_id = %remote.id, "Mapping synced");
        Ok(())
    }

    /// Record a confirmed remote delete. The row is kept forever; the
    /// remote reference is preserved for audit.
    pub fn mark_tombstoned(&self, content_id: &ContentId, protocol: Protocol) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO federation_mappings
                (content_id, protocol, remote_id, remote_digest, status, attempt_count,
                 last_error, last_attempt_at, created_at, updated_at)
             VALUES (?1, ?2, NULL, NULL, 'tombstoned', 0, NULL, ?3, ?3, ?3)
             ON CONFLICT(content_id, protocol) DO UPDATE SET
                status = 'tombstoned',
                attempt_count = 0,
                last_error = NULL,
                last_attempt_at = excluded.last_attempt_at,
                updated_at = excluded.updated_at",
            params![content_id.as_str(), protocol.as_str(), now],
        )?;
        debug!(content_id = %content_id, protocol = %protocol, "Mapping tombstoned");
        Ok(())
    }

    /// Record one failed attempt and return the new attempt count. Status is
    /// left for the caller to decide against its retry ceiling.
    pub fn record_failed_attempt(
        &self,
        content_id: &ContentId,
        protocol: Protocol,
        error: &str,
    ) -> StoreResult<u32> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE federation_mappings
             SET attempt_count = attempt_count + 1, last_error = ?3,
                 last_attempt_at = ?4, updated_at = ?4
             WHERE content_id = ?1 AND protocol = ?2",
            params![content_id.as_str(), protocol.as_str(), error, now],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "Mapping not found: {} {}",
                content_id, protocol
            )));
        }

        let attempts: u32 = self.conn.query_row(
            "SELECT attempt_count FROM federation_mappings
             WHERE content_id = ?1 AND protocol = ?2",
            params![content_id.as_str(), protocol.as_str()],
            |row| row.get(0),
        )?;
        Ok(attempts)
    }

    /// Move a mapping to `failed`. Used after the retry ceiling is hit or on
    /// a permanent rejection.
    pub fn mark_failed(&self, content_id: &ContentId, protocol: Protocol) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE federation_mappings SET status = 'failed', updated_at = ?3
             WHERE content_id = ?1 AND protocol = ?2",
            params![content_id.as_str(), protocol.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "Mapping not found: {} {}",
                content_id, protocol
            )));
        }
        Ok(())
    }

    /// Put a mapping back to `pending` with a fresh attempt budget, for
    /// manual or scheduled re-drives.
    pub fn reset_for_redrive(
        &self,
        content_id: &ContentId,
        protocol: Protocol,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let changed = self.conn.execute(
            "UPDATE federation_mappings
             SET status = 'pending', attempt_count = 0, last_error = NULL, updated_at = ?3
             WHERE content_id = ?1 AND protocol = ?2",
            params![content_id.as_str(), protocol.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "Mapping not found: {} {}",
                content_id, protocol
            )));
        }
        Ok(())
    }

    /// List all mappings in a given status, oldest first.
    pub fn list_mappings_by_status(
        &self,
        status: MappingStatus,
    ) -> StoreResult<Vec<FederationMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_id, protocol, remote_id, remote_digest, status, attempt_count,
                    last_error, last_attempt_at, created_at, updated_at
             FROM federation_mappings WHERE status = ?1 ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![status.as_str()], RawMappingRow::from_row)?;

        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row?.into_mapping()?);
        }
        Ok(mappings)
    }

    /// Reverse lookup: the mapping that points at a given remote id, if any.
    pub fn find_mapping_by_remote(
        &self,
        protocol: Protocol,
        remote_id: &str,
    ) -> StoreResult<Option<FederationMapping>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_id, protocol, remote_id, remote_digest, status, attempt_count,
                    last_error, last_attempt_at, created_at, updated_at
             FROM federation_mappings WHERE protocol = ?1 AND remote_id = ?2",
        )?;

        let result = stmt.query_row(params![protocol.as_str(), remote_id], |row| {
            RawMappingRow::from_row(row)
        });

        match result {
            Ok(raw) => Ok(Some(raw.into_mapping()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Mapping counts per status, for the operator surface.
    pub fn count_mappings_by_status(&self) -> StoreResult<StatusCounts> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM federation_mappings GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        let mut counts = StatusCounts::default();
        for row in rows {
            let (status, count) = row?;
            match MappingStatus::from_str(&status) {
                MappingStatus::Pending => counts.pending = count,
                MappingStatus::Synced => counts.synced = count,
                MappingStatus::Failed => counts.failed = count,
                MappingStatus::Tombstoned => counts.tombstoned = count,
            }
        }
        Ok(counts)
    }
}

struct RawContentRow {
    id: String,
    author_id: String,
    body: String,
    embeds: String,
    reply_to_id: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl RawContentRow {
    fn into_content(self) -> StoreResult<CanonicalContent> {
        let embeds: Vec<Embed> = serde_json::from_str(&self.embeds)?;
        Ok(CanonicalContent {
            id: ContentId::from_string(self.id),
            author_id: self.author_id.into(),
            body: self.body,
            embeds,
            reply_to_id: self.reply_to_id.map(ContentId::from_string),
            created_at: parse_datetime(self.created_at),
            updated_at: parse_datetime(self.updated_at),
            deleted_at: self.deleted_at.map(parse_datetime),
        })
    }
}

struct RawMappingRow {
    content_id: String,
    protocol: String,
    remote_id: Option<String>,
    remote_digest: Option<String>,
    status: String,
    attempt_count: u32,
    last_error: Option<String>,
    last_attempt_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawMappingRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_id: row.get(0)?,
            protocol: row.get(1)?,
            remote_id: row.get(2)?,
            remote_digest: row.get(3)?,
            status: row.get(4)?,
            attempt_count: row.get(5)?,
            last_error: row.get(6)?,
            last_attempt_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_mapping(self) -> StoreResult<FederationMapping> {
        let protocol = Protocol::from_str(&self.protocol).ok_or_else(|| {
            StoreError::InvalidData(format!("unknown protocol: {}", self.protocol))
        })?;
        Ok(FederationMapping {
            content_id: ContentId::from_string(self.content_id),
            protocol,
            remote_id: self.remote_id,
            remote_digest: self.remote_digest,
            status: MappingStatus::from_str(&self.status),
            attempt_count: self.attempt_count,
            last_error: self.last_error,
            last_attempt_at: self.last_attempt_at.map(parse_datetime),
            created_at: parse_datetime(self.created_at),
            updated_at: parse_datetime(self.updated_at),
        })
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
