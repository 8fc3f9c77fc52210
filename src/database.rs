use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use parking_lot::Mutex;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::{GatewayError, NoteRecord, OrderBy, RecordPatch, RemoteStoreGateway};
use crate::media::{object_path, StorageBackend};
use crate::models::{AttachmentHandle, AttachmentKind, Identity, NoteId, OwnerId};
use crate::session::{AuthError, Credentials, SessionGate};

pub const MIN_PASSWORD_LEN: usize = 6;
const REMINDER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to create database directory: {0}")]
    DirectoryError(String),
    #[error("Media storage error: {0}")]
    MediaError(#[from] std::io::Error),
}

impl From<DatabaseError> for GatewayError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::MediaError(e) => GatewayError::Attachment(e.to_string()),
            other => GatewayError::Rejected(other.to_string()),
        }
    }
}

impl From<DatabaseError> for AuthError {
    fn from(err: DatabaseError) -> Self {
        AuthError::Unavailable(err.to_string())
    }
}

/// Self-hosted stand-in for the hosted backend: note records and accounts
/// in SQLite, attachment bytes in a [`StorageBackend`]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    media: Arc<dyn StorageBackend>,
}

impl SqliteBackend {
    /// Open (or create) the database and initialize the schema
    pub fn new(path: &str, media: Arc<dyn StorageBackend>) -> Result<Self, DatabaseError> {
        let db_path = PathBuf::from(path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DatabaseError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn, media)
    }

    pub fn with_connection(conn: Connection, media: Arc<dyn StorageBackend>) -> Result<Self, DatabaseError> {
        let backend = SqliteBackend {
            conn: Mutex::new(conn),
            media,
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.conn.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )",
            [],
        )?;

        // at most one signed-in user per database
        conn.execute(
            "CREATE TABLE IF NOT EXISTS session (
                slot            INTEGER PRIMARY KEY CHECK (slot = 1),
                user_id         TEXT NOT NULL REFERENCES users(id),
                signed_in_at    TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS notes (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL,
                title           TEXT,
                body            TEXT,
                completed       INTEGER NOT NULL DEFAULT 0,
                reminder_at     TEXT,
                image           TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notes_user_created ON notes(user_id, created_at)",
            [],
        )?;

        Self::migrate_add_media_columns(&conn)?;
        Ok(())
    }

    /// Databases from before voice memos and drawings lack those columns
    fn migrate_add_media_columns(conn: &Connection) -> Result<(), DatabaseError> {
        fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
            let mut stmt = conn.prepare("SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2")?;
            let count: i64 = stmt.query_row(rusqlite::params![table, column], |row| row.get(0))?;
            Ok(count > 0)
        }

        for column in ["drawing", "audio"] {
            if !column_exists(conn, "notes", column)? {
                conn.execute(&format!("ALTER TABLE notes ADD COLUMN {} TEXT", column), [])?;
                info!(column, "database: added notes column");
            }
        }
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<NoteRecord, rusqlite::Error> {
        let reminder: Option<String> = row.get(5)?;
        let reminder_at = reminder
            .map(|text| {
                NaiveDateTime::parse_from_str(&text, REMINDER_FORMAT).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })
            })
            .transpose()?;

        Ok(NoteRecord {
            id: Some(NoteId(row.get(0)?)),
            owner_id: OwnerId(row.get(1)?),
            title: row.get(2)?,
            body: row.get(3)?,
            completed: row.get::<_, i64>(4)? != 0,
            reminder_at,
            image: row.get::<_, Option<String>>(6)?.map(AttachmentHandle::remote),
            drawing: row.get::<_, Option<String>>(7)?.map(AttachmentHandle::remote),
            audio: row.get::<_, Option<String>>(8)?.map(AttachmentHandle::remote),
            created_at: Some(parse_timestamp(row.get(9)?, 9)?),
            updated_at: Some(parse_timestamp(row.get(10)?, 10)?),
        })
    }

    fn get_record(conn: &Connection, owner: &OwnerId, id: NoteId) -> Result<Option<NoteRecord>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, body, completed, reminder_at, image, drawing, audio, created_at, updated_at
             FROM notes WHERE id = ?1 AND user_id = ?2",
        )?;
        Ok(stmt
            .query_row(rusqlite::params![id.0, owner.0], Self::row_to_record)
            .optional()?)
    }

    /// Store a session-local attachment and return its durable handle
    async fn persist_attachment(
        &self,
        owner: &OwnerId,
        handle: Option<AttachmentHandle>,
        written: &mut Vec<String>,
    ) -> Result<Option<AttachmentHandle>, DatabaseError> {
        match handle {
            Some(AttachmentHandle::Local(local)) => {
                let path = object_path(owner, &local);
                self.media.write(&path, local.data()).await?;
                let uri = self.media.uri(&path);
                written.push(path);
                Ok(Some(AttachmentHandle::remote(uri)))
            }
            other => Ok(other),
        }
    }

    /// Best effort: a leftover object is only wasted space
    async fn discard_paths(&self, paths: Vec<String>) {
        for path in paths {
            if let Err(e) = self.media.delete(&path).await {
                warn!(%path, error = %e, "database: failed to remove media object");
            }
        }
    }

    async fn discard_uris(&self, uris: Vec<String>) {
        let paths = uris.iter().filter_map(|uri| self.media.path_of(uri)).collect();
        self.discard_paths(paths).await;
    }
}

fn parse_timestamp(text: String, idx: usize) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn attachment_uri(handle: &Option<AttachmentHandle>) -> Option<String> {
    handle.as_ref().map(AttachmentHandle::uri)
}

/// Argon2id PHC string, salt included
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Unavailable(format!("password hashing failed: {}", e)))
}

fn verify_password(stored: &str, password: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "database: unreadable password hash");
            false
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl RemoteStoreGateway for SqliteBackend {
    async fn insert(&self, mut record: NoteRecord) -> Result<NoteRecord, GatewayError> {
        let owner = record.owner_id.clone();
        let mut written = Vec::new();
        for kind in AttachmentKind::ALL {
            let handle = record.attachment_mut(kind).take();
            match self.persist_attachment(&owner, handle, &mut written).await {
                Ok(durable) => *record.attachment_mut(kind) = durable,
                Err(e) => {
                    self.discard_paths(written).await;
                    return Err(e.into());
                }
            }
        }

        let now = Utc::now().trunc_subsecs(6);
        let inserted = {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT INTO notes (user_id, title, body, completed, reminder_at, image, drawing, audio, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    record.owner_id.0,
                    record.title,
                    record.body,
                    if record.completed { 1 } else { 0 },
                    record.reminder_at.map(|t| t.format(REMINDER_FORMAT).to_string()),
                    attachment_uri(&record.image),
                    attachment_uri(&record.drawing),
                    attachment_uri(&record.audio),
                    format_timestamp(now),
                    format_timestamp(now),
                ],
            )
            .map(|_| conn.last_insert_rowid())
        };

        match inserted {
            Ok(id) => {
                record.id = Some(NoteId(id));
                record.created_at = Some(now);
                record.updated_at = Some(now);
                debug!(note_id = id, owner = %owner, "database: note inserted");
                Ok(record)
            }
            Err(e) => {
                self.discard_paths(written).await;
                Err(DatabaseError::from(e).into())
            }
        }
    }

    async fn update(&self, owner: &OwnerId, id: NoteId, mut patch: RecordPatch) -> Result<NoteRecord, GatewayError> {
        let existing = {
            let conn = self.conn.lock();
            Self::get_record(&conn, owner, id)?
        };
        let mut record = existing.ok_or(GatewayError::Missing(id))?;

        let mut written = Vec::new();
        let mut replaced = Vec::new();
        for kind in AttachmentKind::ALL {
            let Some(handle) = patch.attachment_mut(kind).take() else {
                continue;
            };
            match self.persist_attachment(owner, handle, &mut written).await {
                Ok(durable) => {
                    if let Some(old) = attachment_uri(record.attachment_mut(kind)) {
                        if attachment_uri(&durable).as_ref() != Some(&old) {
                            replaced.push(old);
                        }
                    }
                    *patch.attachment_mut(kind) = Some(durable);
                }
                Err(e) => {
                    self.discard_paths(written).await;
                    return Err(e.into());
                }
            }
        }

        patch.apply_to(&mut record);
        let now = Utc::now().trunc_subsecs(6);
        record.updated_at = Some(now);

        let updated = {
            let conn = self.conn.lock();
            conn.unchecked_transaction().and_then(|tx| {
                let changed = tx.execute(
                    "UPDATE notes SET title = ?1, body = ?2, completed = ?3, reminder_at = ?4,
                     image = ?5, drawing = ?6, audio = ?7, updated_at = ?8
                     WHERE id = ?9 AND user_id = ?10",
                    rusqlite::params![
                        record.title,
                        record.body,
                        if record.completed { 1 } else { 0 },
                        record.reminder_at.map(|t| t.format(REMINDER_FORMAT).to_string()),
                        attachment_uri(&record.image),
                        attachment_uri(&record.drawing),
                        attachment_uri(&record.audio),
                        format_timestamp(now),
                        id.0,
                        owner.0,
                    ],
                )?;
                tx.commit()?;
                Ok(changed)
            })
        };

        match updated {
            Ok(0) => {
                self.discard_paths(written).await;
                Err(GatewayError::Missing(id))
            }
            Ok(_) => {
                self.discard_uris(replaced).await;
                debug!(note_id = %id, "database: note updated");
                Ok(record)
            }
            Err(e) => {
                self.discard_paths(written).await;
                Err(DatabaseError::from(e).into())
            }
        }
    }

    async fn delete(&self, owner: &OwnerId, id: NoteId) -> Result<(), GatewayError> {
        let record = {
            let conn = self.conn.lock();
            let record = Self::get_record(&conn, owner, id)?.ok_or(GatewayError::Missing(id))?;
            let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
            tx.execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.0, owner.0],
            )
            .map_err(DatabaseError::from)?;
            tx.commit().map_err(DatabaseError::from)?;
            record
        };

        let uris: Vec<String> = [&record.image, &record.drawing, &record.audio]
            .into_iter()
            .filter_map(attachment_uri)
            .collect();
        self.discard_uris(uris).await;
        debug!(note_id = %id, "database: note deleted");
        Ok(())
    }

    async fn query(&self, owner: &OwnerId, order: OrderBy) -> Result<Vec<NoteRecord>, GatewayError> {
        let sql = match order {
            OrderBy::NewestFirst => {
                "SELECT id, user_id, title, body, completed, reminder_at, image, drawing, audio, created_at, updated_at
                 FROM notes WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
            }
            OrderBy::OldestFirst => {
                "SELECT id, user_id, title, body, completed, reminder_at, image, drawing, audio, created_at, updated_at
                 FROM notes WHERE user_id = ?1 ORDER BY created_at ASC, id ASC"
            }
        };

        let conn = self.conn.lock();
        let records = conn
            .prepare(sql)
            .and_then(|mut stmt| {
                stmt.query_map(rusqlite::params![owner.0], Self::row_to_record)?
                    .collect::<Result<Vec<_>, _>>()
            })
            .map_err(DatabaseError::from)?;
        Ok(records)
    }
}

#[async_trait]
impl SessionGate for SqliteBackend {
    async fn active_identity(&self) -> Result<Option<Identity>, AuthError> {
        let conn = self.conn.lock();
        let identity = conn
            .query_row(
                "SELECT users.id, users.email FROM session JOIN users ON users.id = session.user_id
                 WHERE session.slot = 1",
                [],
                |row| {
                    Ok(Identity {
                        user_id: OwnerId(row.get(0)?),
                        email: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(DatabaseError::from)?;
        Ok(identity)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.check_filled()?;
        let email = normalize_email(&credentials.email);

        let conn = self.conn.lock();
        let account: Option<(String, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(DatabaseError::from)?;

        let Some((user_id, hash)) = account else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&hash, &credentials.password) {
            return Err(AuthError::InvalidCredentials);
        }

        conn.execute(
            "INSERT INTO session (slot, user_id, signed_in_at) VALUES (1, ?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET user_id = excluded.user_id, signed_in_at = excluded.signed_in_at",
            rusqlite::params![user_id, format_timestamp(Utc::now())],
        )
        .map_err(DatabaseError::from)?;

        info!(%email, "database: signed in");
        Ok(Identity {
            user_id: OwnerId(user_id),
            email,
        })
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.check_filled()?;
        let email = normalize_email(&credentials.email);
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail(email));
        }
        if credentials.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(MIN_PASSWORD_LEN));
        }

        let user_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(&credentials.password)?;
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count > 0)
            .map_err(DatabaseError::from)?;
        if exists {
            return Err(AuthError::AlreadyRegistered);
        }

        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, email, password_hash, format_timestamp(Utc::now())],
        )
        .map_err(DatabaseError::from)?;

        info!(%email, "database: account created");
        Ok(Identity {
            user_id: OwnerId(user_id),
            email,
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM session", []).map_err(DatabaseError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::FilesystemBackend;
    use crate::models::LocalHandle;

    struct Fixture {
        _dir: tempfile::TempDir,
        media_dir: PathBuf,
        backend: SqliteBackend,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let media_dir = dir.path().join("media");
        let db_path = dir.path().join("data/notes.db");
        let backend = SqliteBackend::new(
            db_path.to_str().unwrap(),
            Arc::new(FilesystemBackend::new(&media_dir)),
        )
        .unwrap();
        Fixture {
            _dir: dir,
            media_dir,
            backend,
        }
    }

    fn record(owner: &OwnerId, body: &str) -> NoteRecord {
        NoteRecord {
            id: None,
            owner_id: owner.clone(),
            title: None,
            body: Some(body.to_string()),
            completed: false,
            reminder_at: None,
            image: None,
            drawing: None,
            audio: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn file_path(uri: &str) -> PathBuf {
        PathBuf::from(uri.strip_prefix("file://").unwrap())
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let f = fixture();
        let creds = Credentials::new("Ann@Example.com ", "secret1");

        let created = f.backend.sign_up(&creds).await.unwrap();
        assert_eq!(created.email, "ann@example.com");
        // sign-up alone does not start a session
        assert_eq!(f.backend.active_identity().await.unwrap(), None);

        let signed_in = f.backend.sign_in(&creds).await.unwrap();
        assert_eq!(signed_in, created);
        assert_eq!(f.backend.active_identity().await.unwrap(), Some(created));

        f.backend.sign_out().await.unwrap();
        assert_eq!(f.backend.active_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_up_rules() {
        let f = fixture();
        assert!(matches!(
            f.backend.sign_up(&Credentials::new("", "secret1")).await,
            Err(AuthError::MissingFields)
        ));
        assert!(matches!(
            f.backend.sign_up(&Credentials::new("nobody", "secret1")).await,
            Err(AuthError::InvalidEmail(_))
        ));
        assert!(matches!(
            f.backend.sign_up(&Credentials::new("a@b.c", "12345")).await,
            Err(AuthError::WeakPassword(MIN_PASSWORD_LEN))
        ));
        f.backend.sign_up(&Credentials::new("a@b.c", "123456")).await.unwrap();
        assert!(matches!(
            f.backend.sign_up(&Credentials::new("A@B.C", "654321")).await,
            Err(AuthError::AlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejected() {
        let f = fixture();
        f.backend.sign_up(&Credentials::new("a@b.c", "123456")).await.unwrap();
        assert!(matches!(
            f.backend.sign_in(&Credentials::new("a@b.c", "1234567")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            f.backend.sign_in(&Credentials::new("x@b.c", "123456")).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(f.backend.active_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_and_query_newest_first() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let other = OwnerId("u2".to_string());

        let first = f.backend.insert(record(&owner, "first")).await.unwrap();
        let second = f.backend.insert(record(&owner, "second")).await.unwrap();
        f.backend.insert(record(&other, "theirs")).await.unwrap();

        assert!(first.id.is_some() && first.created_at.is_some());
        let listed = f.backend.query(&owner, OrderBy::NewestFirst).await.unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);

        let oldest = f.backend.query(&owner, OrderBy::OldestFirst).await.unwrap();
        assert_eq!(oldest, vec![first, second]);
    }

    #[tokio::test]
    async fn test_local_attachments_become_files() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let mut rec = record(&owner, "memo");
        rec.audio = Some(LocalHandle::new("audio/mpeg", b"sound".to_vec()).into());

        let stored = f.backend.insert(rec).await.unwrap();
        let Some(AttachmentHandle::Remote { uri }) = stored.audio.clone() else {
            panic!("audio should be durable: {:?}", stored.audio);
        };
        assert!(uri.ends_with(".mp3"));
        assert!(file_path(&uri).starts_with(&f.media_dir));
        assert_eq!(std::fs::read(file_path(&uri)).unwrap(), b"sound");

        let listed = f.backend.query(&owner, OrderBy::NewestFirst).await.unwrap();
        assert_eq!(listed[0].audio, stored.audio);
    }

    #[tokio::test]
    async fn test_update_replaces_attachment_and_scopes_by_owner() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let mut rec = record(&owner, "pic");
        rec.image = Some(LocalHandle::new("image/png", b"one".to_vec()).into());
        let stored = f.backend.insert(rec).await.unwrap();
        let id = stored.id.unwrap();
        let old_uri = stored.image.as_ref().unwrap().uri();

        let patch = RecordPatch {
            image: Some(Some(LocalHandle::new("image/png", b"two".to_vec()).into())),
            completed: Some(true),
            ..RecordPatch::default()
        };
        assert!(matches!(
            f.backend.update(&OwnerId("u2".to_string()), id, patch.clone()).await,
            Err(GatewayError::Missing(_))
        ));

        let updated = f.backend.update(&owner, id, patch).await.unwrap();
        assert!(updated.completed);
        assert_eq!(updated.body.as_deref(), Some("pic"));
        let new_uri = updated.image.as_ref().unwrap().uri();
        assert_ne!(new_uri, old_uri);
        assert_eq!(std::fs::read(file_path(&new_uri)).unwrap(), b"two");
        assert!(!file_path(&old_uri).exists());
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_media() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let mut rec = record(&owner, "drawing");
        rec.drawing = Some(LocalHandle::new("image/svg+xml", b"<svg/>".to_vec()).into());
        let stored = f.backend.insert(rec).await.unwrap();
        let id = stored.id.unwrap();
        let uri = stored.drawing.as_ref().unwrap().uri();

        assert!(matches!(
            f.backend.delete(&OwnerId("u2".to_string()), id).await,
            Err(GatewayError::Missing(_))
        ));
        f.backend.delete(&owner, id).await.unwrap();
        assert!(f.backend.query(&owner, OrderBy::NewestFirst).await.unwrap().is_empty());
        assert!(!file_path(&uri).exists());
        assert!(matches!(f.backend.delete(&owner, id).await, Err(GatewayError::Missing(_))));
    }

    #[tokio::test]
    async fn test_passwords_are_stored_as_argon2() {
        let f = fixture();
        f.backend.sign_up(&Credentials::new("a@b.c", "123456")).await.unwrap();

        let stored: String = f
            .backend
            .conn
            .lock()
            .query_row("SELECT password_hash FROM users WHERE email = 'a@b.c'", [], |row| row.get(0))
            .unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("123456"));
        assert!(verify_password(&stored, "123456"));
        assert!(!verify_password(&stored, "1234567"));
        assert!(!verify_password("not a phc string", "123456"));
    }

    #[tokio::test]
    async fn test_reminder_keeps_subsecond_precision() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let mut rec = record(&owner, "precise");
        rec.reminder_at = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
            .and_then(|d| d.and_hms_nano_opt(9, 30, 15, 123_456_789));
        let inserted = f.backend.insert(rec.clone()).await.unwrap();
        assert_eq!(inserted.reminder_at, rec.reminder_at);

        let listed = f.backend.query(&owner, OrderBy::NewestFirst).await.unwrap();
        assert_eq!(listed[0].reminder_at, rec.reminder_at);
    }

    #[tokio::test]
    async fn test_reminder_survives_storage() {
        let f = fixture();
        let owner = OwnerId("u1".to_string());
        let mut rec = record(&owner, "dentist");
        rec.reminder_at = crate::utils::parse_reminder("2025-03-04T09:30").ok();
        f.backend.insert(rec.clone()).await.unwrap();

        let listed = f.backend.query(&owner, OrderBy::NewestFirst).await.unwrap();
        assert_eq!(listed[0].reminder_at, rec.reminder_at);
    }
}
