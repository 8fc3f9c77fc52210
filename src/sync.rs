//! Optimistic mutation, then remote confirmation.
//!
//! Every write lands in the [`LocalNoteStore`] first and is then sent to the
//! [`RemoteStoreGateway`]. The remote answer either confirms the optimistic
//! entry or rolls it back; a failed call is reported once and never retried.
//! Writes on the same note are serialized, writes on different notes are not.
//! A refresh waits for in-flight writes and holds new ones back until it lands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, RwLock as AsyncRwLock};
use tracing::{debug, info, warn};

use crate::gateway::{GatewayError, OrderBy, RecordPatch, RemoteStoreGateway};
use crate::models::{EmptyNoteError, Identity, Note, NoteFields, NoteId, NotePatch};
use crate::session::{AuthError, SessionGate};
use crate::store::{LocalNoteStore, StoreToken};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    EmptyNote(#[from] EmptyNoteError),
    #[error("Not signed in")]
    Unauthenticated,
    #[error("Note {0} not found")]
    NotFound(NoteId),
    #[error("Note {0} belongs to another user")]
    OwnerMismatch(NoteId),
    #[error("Failed to persist note: {cause}")]
    PersistenceFailure {
        #[source]
        cause: GatewayError,
        /// The draft that could not be created, handed back for another attempt
        draft: Option<Box<Note>>,
    },
    #[error("Session check failed: {0}")]
    Session(#[from] AuthError),
}

impl SyncError {
    fn persistence(cause: GatewayError) -> Self {
        Self::PersistenceFailure { cause, draft: None }
    }
}

/// One async lock per note id, so back-to-back writes on a note settle in order
#[derive(Debug, Default)]
struct NoteLocks {
    locks: Mutex<HashMap<NoteId, Arc<AsyncMutex<()>>>>,
}

impl NoteLocks {
    async fn acquire(&self, id: NoteId) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().entry(id).or_default().clone();
        lock.lock_owned().await
    }

    fn forget(&self, id: NoteId) {
        let mut locks = self.locks.lock();
        // only drop the entry when no one else is holding or waiting on it
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }
}

pub struct SyncEngine {
    gateway: Arc<dyn RemoteStoreGateway>,
    session: Arc<dyn SessionGate>,
    store: LocalNoteStore,
    locks: NoteLocks,
    // writes share it, `load` takes it alone
    refresh: AsyncRwLock<()>,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn RemoteStoreGateway>, session: Arc<dyn SessionGate>) -> Self {
        Self::with_store(gateway, session, LocalNoteStore::new())
    }

    pub fn with_store(
        gateway: Arc<dyn RemoteStoreGateway>,
        session: Arc<dyn SessionGate>,
        store: LocalNoteStore,
    ) -> Self {
        Self {
            gateway,
            session,
            store,
            locks: NoteLocks::default(),
            refresh: AsyncRwLock::new(()),
        }
    }

    /// The working set this engine maintains
    pub fn store(&self) -> &LocalNoteStore {
        &self.store
    }

    /// Replace the working set with everything `identity` owns remotely.
    ///
    /// `identity` must still be the active session.
    pub async fn load(&self, identity: &Identity) -> Result<Vec<Note>, SyncError> {
        let _refresh = self.refresh.write().await;
        let active = self.require_identity().await?;
        if active.user_id != identity.user_id {
            warn!(requested = %identity.user_id, active = %active.user_id, "sync: load for inactive identity");
            return Err(SyncError::Unauthenticated);
        }

        let records = self
            .gateway
            .query(&identity.user_id, OrderBy::NewestFirst)
            .await
            .map_err(|e| {
                warn!(error = %e, "sync: load failed");
                SyncError::persistence(e)
            })?;

        // never take in records for someone else, whatever the store returned
        let notes: Vec<Note> = records
            .into_iter()
            .map(Note::from)
            .filter(|note| note.owner_id == identity.user_id)
            .collect();
        self.store.replace_all(notes);
        info!(count = self.store.len(), owner = %identity.user_id, "sync: loaded notes");
        Ok(self.store.list(None))
    }

    pub async fn create(&self, fields: NoteFields) -> Result<Note, SyncError> {
        let _refresh = self.refresh.read().await;
        let identity = self.require_identity().await?;
        let draft = Note::validate_for_create(fields, identity.user_id)?;

        let token = self.store.upsert_optimistic(draft.clone());
        match self.gateway.insert((&draft).into()).await {
            Ok(record) => {
                let note = Note::from(record);
                self.store.confirm(&token, note.clone());
                info!(note_id = ?note.id, "sync: note created");
                Ok(note)
            }
            Err(cause) => {
                self.store.rollback(&token);
                warn!(%token, error = %cause, "sync: create failed, draft rolled back");
                Err(SyncError::PersistenceFailure {
                    cause,
                    draft: Some(Box::new(draft)),
                })
            }
        }
    }

    pub async fn update(&self, id: NoteId, patch: NotePatch) -> Result<Note, SyncError> {
        self.edit(id, |note| note.apply_edit(patch)).await
    }

    pub async fn toggle_complete(&self, id: NoteId) -> Result<Note, SyncError> {
        self.edit(id, |note| {
            note.apply_edit(NotePatch {
                completed: Some(!note.completed),
                ..NotePatch::default()
            })
        })
        .await
    }

    pub async fn delete(&self, id: NoteId) -> Result<(), SyncError> {
        let _refresh = self.refresh.read().await;
        let guard = self.locks.acquire(id).await;
        let outcome = self.delete_locked(id).await;
        drop(guard);
        self.locks.forget(id);
        outcome
    }

    async fn delete_locked(&self, id: NoteId) -> Result<(), SyncError> {
        let identity = self.require_identity().await?;
        let note = self.store.get(id).ok_or(SyncError::NotFound(id))?;
        if note.owner_id != identity.user_id {
            return Err(SyncError::OwnerMismatch(id));
        }

        let token = self.store.remove_optimistic(id).ok_or(SyncError::NotFound(id))?;
        match self.gateway.delete(&identity.user_id, id).await {
            Ok(()) => {
                self.store.confirm_removal(&token);
                info!(note_id = %id, "sync: note deleted");
                Ok(())
            }
            Err(cause) => {
                self.store.rollback(&token);
                warn!(note_id = %id, error = %cause, "sync: delete failed, note restored");
                Err(SyncError::persistence(cause))
            }
        }
    }

    async fn edit<F>(&self, id: NoteId, change: F) -> Result<Note, SyncError>
    where
        F: FnOnce(&Note) -> Note,
    {
        let _refresh = self.refresh.read().await;
        let guard = self.locks.acquire(id).await;
        let outcome = self.edit_locked(id, change).await;
        drop(guard);
        self.locks.forget(id);
        outcome
    }

    async fn edit_locked<F>(&self, id: NoteId, change: F) -> Result<Note, SyncError>
    where
        F: FnOnce(&Note) -> Note,
    {
        let identity = self.require_identity().await?;
        let current = self.store.get(id).ok_or(SyncError::NotFound(id))?;
        if current.owner_id != identity.user_id {
            return Err(SyncError::OwnerMismatch(id));
        }

        let merged = change(&current);
        if merged.is_empty() {
            return Err(EmptyNoteError.into());
        }
        let patch = RecordPatch::between(&current, &merged);
        if patch.is_empty() {
            debug!(note_id = %id, "sync: edit changes nothing");
            return Ok(current);
        }

        let token = self.store.upsert_optimistic(merged);
        self.settle_edit(&identity, id, patch, token).await
    }

    async fn settle_edit(
        &self,
        identity: &Identity,
        id: NoteId,
        patch: RecordPatch,
        token: StoreToken,
    ) -> Result<Note, SyncError> {
        match self.gateway.update(&identity.user_id, id, patch).await {
            Ok(record) => {
                let note = Note::from(record);
                self.store.confirm(&token, note.clone());
                debug!(note_id = %id, "sync: note updated");
                Ok(note)
            }
            Err(cause) => {
                self.store.rollback(&token);
                warn!(%token, error = %cause, "sync: update failed, note reverted");
                Err(SyncError::persistence(cause))
            }
        }
    }

    async fn require_identity(&self) -> Result<Identity, SyncError> {
        self.session
            .active_identity()
            .await?
            .ok_or(SyncError::Unauthenticated)
    }
}
