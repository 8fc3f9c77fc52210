use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier assigned by the remote store on first successful creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the user owning a note
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated user as reported by the session gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: OwnerId,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Drawing,
    Audio,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 3] = [Self::Image, Self::Drawing, Self::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Drawing => "drawing",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured media that only lives for the current session.
///
/// The bytes are shared, so cloning a note that carries local handles is cheap.
#[derive(Clone, Serialize)]
pub struct LocalHandle {
    pub id: Uuid,
    pub media_type: String,
    #[serde(skip)]
    data: Arc<[u8]>,
}

impl LocalHandle {
    pub fn new(media_type: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Session-scoped URI, in the shape browsers hand out for object URLs
    pub fn uri(&self) -> String {
        format!("blob:{}", self.id)
    }
}

impl fmt::Debug for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalHandle")
            .field("id", &self.id)
            .field("media_type", &self.media_type)
            .field("len", &self.data.len())
            .finish()
    }
}

impl PartialEq for LocalHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalHandle {}

/// Reference to an attachment: either captured in this session or stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "location", rename_all = "lowercase")]
pub enum AttachmentHandle {
    Local(LocalHandle),
    Remote { uri: String },
}

impl AttachmentHandle {
    pub fn remote(uri: impl Into<String>) -> Self {
        Self::Remote { uri: uri.into() }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn uri(&self) -> String {
        match self {
            Self::Local(handle) => handle.uri(),
            Self::Remote { uri } => uri.clone(),
        }
    }
}

impl From<LocalHandle> for AttachmentHandle {
    fn from(handle: LocalHandle) -> Self {
        Self::Local(handle)
    }
}

/// One slot per attachment kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachments {
    pub image: Option<AttachmentHandle>,
    pub drawing: Option<AttachmentHandle>,
    pub audio: Option<AttachmentHandle>,
}

impl Attachments {
    pub fn get(&self, kind: AttachmentKind) -> Option<&AttachmentHandle> {
        match kind {
            AttachmentKind::Image => self.image.as_ref(),
            AttachmentKind::Drawing => self.drawing.as_ref(),
            AttachmentKind::Audio => self.audio.as_ref(),
        }
    }

    pub fn slot_mut(&mut self, kind: AttachmentKind) -> &mut Option<AttachmentHandle> {
        match kind {
            AttachmentKind::Image => &mut self.image,
            AttachmentKind::Drawing => &mut self.drawing,
            AttachmentKind::Audio => &mut self.audio,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.drawing.is_none() && self.audio.is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttachmentKind, &AttachmentHandle)> {
        AttachmentKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|handle| (kind, handle)))
    }
}

/// Where a submitted note is in its life. Drafts are plain [`Note`] values
/// with no id and never sit in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Pending,
    Persisted,
    Editing,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("A note needs a title, a body or at least one attachment")]
pub struct EmptyNoteError;

/// Raw inputs collected before a note is created
#[derive(Debug, Clone, Default)]
pub struct NoteFields {
    pub title: Option<String>,
    pub body: Option<String>,
    pub reminder_at: Option<NaiveDateTime>,
    pub attachments: Attachments,
}

impl NoteFields {
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Self::default()
        }
    }
}

/// Field-subset overlay for an existing note.
///
/// The outer `Option` means "leave unchanged"; `Some(None)` clears the field.
/// `id`, `owner_id` and `created_at` are accepted but never applied.
#[derive(Debug, Clone, Default)]
pub struct NotePatch {
    pub id: Option<NoteId>,
    pub owner_id: Option<OwnerId>,
    pub created_at: Option<DateTime<Utc>>,
    pub title: Option<Option<String>>,
    pub body: Option<Option<String>>,
    pub completed: Option<bool>,
    pub reminder_at: Option<Option<NaiveDateTime>>,
    pub image: Option<Option<AttachmentHandle>>,
    pub drawing: Option<Option<AttachmentHandle>>,
    pub audio: Option<Option<AttachmentHandle>>,
}

impl NotePatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.body.is_none()
            && self.completed.is_none()
            && self.reminder_at.is_none()
            && self.image.is_none()
            && self.drawing.is_none()
            && self.audio.is_none()
    }

    pub fn attachment(mut self, kind: AttachmentKind, handle: Option<AttachmentHandle>) -> Self {
        match kind {
            AttachmentKind::Image => self.image = Some(handle),
            AttachmentKind::Drawing => self.drawing = Some(handle),
            AttachmentKind::Audio => self.audio = Some(handle),
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: Option<NoteId>,
    pub owner_id: OwnerId,
    pub title: Option<String>,
    pub body: Option<String>,
    pub completed: bool,
    pub reminder_at: Option<NaiveDateTime>,
    pub attachments: Attachments,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Build a draft from raw inputs, rejecting notes with nothing in them
    pub fn validate_for_create(fields: NoteFields, owner_id: OwnerId) -> Result<Self, EmptyNoteError> {
        let note = Self {
            id: None,
            owner_id,
            title: normalize_text(fields.title),
            body: normalize_text(fields.body),
            completed: false,
            reminder_at: fields.reminder_at,
            attachments: fields.attachments,
            created_at: None,
            updated_at: None,
        };
        if note.is_empty() {
            return Err(EmptyNoteError);
        }
        Ok(note)
    }

    /// Overlay a patch; identity fields are never touched
    pub fn apply_edit(&self, patch: NotePatch) -> Self {
        let mut note = self.clone();
        if let Some(title) = patch.title {
            note.title = normalize_text(title);
        }
        if let Some(body) = patch.body {
            note.body = normalize_text(body);
        }
        if let Some(completed) = patch.completed {
            note.completed = completed;
        }
        if let Some(reminder_at) = patch.reminder_at {
            note.reminder_at = reminder_at;
        }
        if let Some(image) = patch.image {
            note.attachments.image = image;
        }
        if let Some(drawing) = patch.drawing {
            note.attachments.drawing = drawing;
        }
        if let Some(audio) = patch.audio {
            note.attachments.audio = audio;
        }
        note
    }

    pub fn set_attachment(&self, kind: AttachmentKind, handle: AttachmentHandle) -> Self {
        let mut note = self.clone();
        *note.attachments.slot_mut(kind) = Some(handle);
        note
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.attachments.is_empty()
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Case-insensitive substring match against title and body
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        [self.title.as_deref(), self.body.as_deref()]
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(&needle))
    }
}

fn normalize_text(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.trim().is_empty())
}
