//! Boundary to the remote record store.
//!
//! Notes travel as flat [`NoteRecord`]s. The store assigns ids and
//! timestamps, and turns any session-local attachment it receives into a
//! durable URI.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{AttachmentHandle, AttachmentKind, Attachments, Note, NoteId, OwnerId};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),
    #[error("Remote store timed out after {0} ms")]
    Timeout(u64),
    #[error("No record {0} for this owner")]
    Missing(NoteId),
    #[error("Failed to store attachment: {0}")]
    Attachment(String),
}

/// Flat mapping of the note fields as the store keeps them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteRecord {
    pub id: Option<NoteId>,
    pub owner_id: OwnerId,
    pub title: Option<String>,
    pub body: Option<String>,
    pub completed: bool,
    pub reminder_at: Option<NaiveDateTime>,
    pub image: Option<AttachmentHandle>,
    pub drawing: Option<AttachmentHandle>,
    pub audio: Option<AttachmentHandle>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl NoteRecord {
    pub fn attachment_mut(&mut self, kind: AttachmentKind) -> &mut Option<AttachmentHandle> {
        match kind {
            AttachmentKind::Image => &mut self.image,
            AttachmentKind::Drawing => &mut self.drawing,
            AttachmentKind::Audio => &mut self.audio,
        }
    }
}

impl From<&Note> for NoteRecord {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            owner_id: note.owner_id.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            completed: note.completed,
            reminder_at: note.reminder_at,
            image: note.attachments.image.clone(),
            drawing: note.attachments.drawing.clone(),
            audio: note.attachments.audio.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

impl From<NoteRecord> for Note {
    fn from(record: NoteRecord) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            title: record.title,
            body: record.body,
            completed: record.completed,
            reminder_at: record.reminder_at,
            attachments: Attachments {
                image: record.image,
                drawing: record.drawing,
                audio: record.audio,
            },
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Changed columns only; `Some(None)` clears a column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub title: Option<Option<String>>,
    pub body: Option<Option<String>>,
    pub completed: Option<bool>,
    pub reminder_at: Option<Option<NaiveDateTime>>,
    pub image: Option<Option<AttachmentHandle>>,
    pub drawing: Option<Option<AttachmentHandle>>,
    pub audio: Option<Option<AttachmentHandle>>,
}

impl RecordPatch {
    /// Columns that differ between two versions of the same note
    pub fn between(before: &Note, after: &Note) -> Self {
        fn changed<T: PartialEq + Clone>(a: &T, b: &T) -> Option<T> {
            (a != b).then(|| b.clone())
        }

        Self {
            title: changed(&before.title, &after.title),
            body: changed(&before.body, &after.body),
            completed: changed(&before.completed, &after.completed),
            reminder_at: changed(&before.reminder_at, &after.reminder_at),
            image: changed(&before.attachments.image, &after.attachments.image),
            drawing: changed(&before.attachments.drawing, &after.attachments.drawing),
            audio: changed(&before.attachments.audio, &after.attachments.audio),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn attachment_mut(&mut self, kind: AttachmentKind) -> &mut Option<Option<AttachmentHandle>> {
        match kind {
            AttachmentKind::Image => &mut self.image,
            AttachmentKind::Drawing => &mut self.drawing,
            AttachmentKind::Audio => &mut self.audio,
        }
    }

    pub fn apply_to(&self, record: &mut NoteRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(body) = &self.body {
            record.body = body.clone();
        }
        if let Some(completed) = self.completed {
            record.completed = completed;
        }
        if let Some(reminder_at) = self.reminder_at {
            record.reminder_at = reminder_at;
        }
        if let Some(image) = &self.image {
            record.image = image.clone();
        }
        if let Some(drawing) = &self.drawing {
            record.drawing = drawing.clone();
        }
        if let Some(audio) = &self.audio {
            record.audio = audio.clone();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderBy {
    /// `created_at` descending, then `id` descending
    #[default]
    NewestFirst,
    OldestFirst,
}

/// The remote store as the sync engine sees it.
///
/// Implementations own timeouts and transport; any failure comes back as a
/// [`GatewayError`]. Writes are filtered by owner.
#[async_trait]
pub trait RemoteStoreGateway: Send + Sync {
    async fn insert(&self, record: NoteRecord) -> Result<NoteRecord, GatewayError>;

    async fn update(&self, owner: &OwnerId, id: NoteId, patch: RecordPatch) -> Result<NoteRecord, GatewayError>;

    async fn delete(&self, owner: &OwnerId, id: NoteId) -> Result<(), GatewayError>;

    async fn query(&self, owner: &OwnerId, order: OrderBy) -> Result<Vec<NoteRecord>, GatewayError>;
}
