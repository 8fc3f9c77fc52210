use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Lifecycle, Note, NoteId};

/// Key of an entry in the working set: drafts get a temporary token until the
/// remote store assigns an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    Persisted(NoteId),
    Draft(Uuid),
}

impl StoreKey {
    fn for_note(note: &Note) -> Self {
        match note.id {
            Some(id) => Self::Persisted(id),
            None => Self::Draft(Uuid::new_v4()),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persisted(id) => write!(f, "note:{}", id),
            Self::Draft(token) => write!(f, "draft:{}", token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// Handle on one outstanding optimistic mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreToken {
    key: StoreKey,
    generation: u64,
    kind: MutationKind,
}

impl StoreToken {
    pub fn key(&self) -> StoreKey {
        self.key
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }
}

impl fmt::Display for StoreToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

/// What a rollback did, so the caller can surface it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolledBack {
    /// An unconfirmed create was dropped from the working set
    Discarded(Note),
    /// The entry went back to its last confirmed value
    Reverted(Note),
}

#[derive(Debug, Clone)]
struct Entry {
    current: Note,
    confirmed: Option<Note>,
    pending: Option<(u64, MutationKind)>,
    hidden: bool,
    seq: u64,
}

impl Entry {
    fn lifecycle(&self) -> Lifecycle {
        match (self.pending, &self.confirmed) {
            (None, _) => Lifecycle::Persisted,
            (Some((_, MutationKind::Delete)), _) => Lifecycle::Deleted,
            (Some(_), None) => Lifecycle::Pending,
            (Some(_), Some(_)) => Lifecycle::Editing,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<StoreKey, Entry>,
    next_generation: u64,
    next_seq: u64,
}

impl Inner {
    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn snapshot(&self, filter: Option<&str>) -> Vec<Note> {
        let mut visible: Vec<&Entry> = self
            .entries
            .values()
            .filter(|entry| !entry.hidden)
            .filter(|entry| filter.is_none_or(|needle| entry.current.matches(needle)))
            .collect();
        visible.sort_by(|a, b| feed_order(a, b));
        visible.into_iter().map(|entry| entry.current.clone()).collect()
    }
}

/// Newest first: `created_at` descending, then `id` descending. Notes the
/// server has not stamped yet sit on top, most recently submitted first.
fn feed_order(a: &Entry, b: &Entry) -> Ordering {
    let (x, y) = (&a.current, &b.current);
    match (x.created_at, y.created_at) {
        (None, None) => b.seq.cmp(&a.seq),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(ta), Some(tb)) => tb
            .cmp(&ta)
            .then_with(|| y.id.cmp(&x.id))
            .then_with(|| b.seq.cmp(&a.seq)),
    }
}

/// The session's working set of notes.
///
/// Cloning yields another handle on the same set.
#[derive(Debug, Clone, Default)]
pub struct LocalNoteStore {
    inner: Arc<RwLock<Inner>>,
}

impl LocalNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current ordered notes, optionally narrowed by a search term
    pub fn list(&self, filter: Option<&str>) -> Vec<Note> {
        self.inner.read().snapshot(filter)
    }

    /// A view that re-reads the store every time it is iterated
    pub fn view(&self, filter: Option<String>) -> NotesView {
        NotesView {
            store: self.clone(),
            filter,
        }
    }

    pub fn get(&self, id: NoteId) -> Option<Note> {
        let inner = self.inner.read();
        inner
            .entries
            .get(&StoreKey::Persisted(id))
            .filter(|entry| !entry.hidden)
            .map(|entry| entry.current.clone())
    }

    pub fn lifecycle(&self, key: StoreKey) -> Option<Lifecycle> {
        self.inner.read().entries.get(&key).map(Entry::lifecycle)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.values().filter(|e| !e.hidden).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Throw away everything and take `notes` as the confirmed state
    pub fn replace_all(&self, notes: Vec<Note>) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        for note in notes {
            let Some(id) = note.id else {
                continue;
            };
            let seq = inner.bump_seq();
            inner.entries.insert(
                StoreKey::Persisted(id),
                Entry {
                    current: note.clone(),
                    confirmed: Some(note),
                    pending: None,
                    hidden: false,
                    seq,
                },
            );
        }
        debug!(count = inner.entries.len(), "store: replaced working set");
    }

    /// Insert or replace by id; drafts are keyed by a fresh temporary token
    pub fn upsert_optimistic(&self, note: Note) -> StoreToken {
        let mut inner = self.inner.write();
        let key = StoreKey::for_note(&note);
        let generation = inner.bump_generation();
        let seq = inner.bump_seq();

        let kind = match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.current = note;
                entry.hidden = false;
                let kind = if entry.confirmed.is_some() {
                    MutationKind::Update
                } else {
                    MutationKind::Create
                };
                entry.pending = Some((generation, kind));
                kind
            }
            None => {
                inner.entries.insert(
                    key,
                    Entry {
                        current: note,
                        confirmed: None,
                        pending: Some((generation, MutationKind::Create)),
                        hidden: false,
                        seq,
                    },
                );
                MutationKind::Create
            }
        };

        let token = StoreToken { key, generation, kind };
        debug!(%token, ?kind, "store: optimistic upsert");
        token
    }

    /// Hide a note pending its remote delete. Returns `None` if it is not in the set.
    pub fn remove_optimistic(&self, id: NoteId) -> Option<StoreToken> {
        let mut inner = self.inner.write();
        let key = StoreKey::Persisted(id);
        let generation = inner.bump_generation();
        let entry = inner.entries.get_mut(&key).filter(|entry| !entry.hidden)?;
        entry.hidden = true;
        entry.pending = Some((generation, MutationKind::Delete));

        let token = StoreToken {
            key,
            generation,
            kind: MutationKind::Delete,
        };
        debug!(%token, "store: optimistic removal");
        Some(token)
    }

    /// Swap the optimistic entry for the server's version of the note.
    ///
    /// Returns `false` when the entry is gone, in which case nothing changes.
    pub fn confirm(&self, token: &StoreToken, persisted: Note) -> bool {
        let mut inner = self.inner.write();
        let Some(mut entry) = inner.entries.remove(&token.key) else {
            debug!(%token, "store: confirm for vanished entry ignored");
            return false;
        };

        let latest = entry.pending.is_some_and(|(generation, _)| generation == token.generation);
        // a refresh in between cleared `pending`; the server value is still the newest
        let adopt = latest || entry.pending.is_none();
        entry.confirmed = Some(persisted.clone());
        if adopt {
            entry.current = persisted.clone();
            entry.pending = None;
            entry.hidden = false;
        }

        // drafts move over to their real id
        let key = persisted.id.map(StoreKey::Persisted).unwrap_or(token.key);
        inner.entries.insert(key, entry);
        debug!(%token, %key, adopt, "store: confirmed");
        true
    }

    /// Finish an optimistic delete. Returns `false` if the token is stale.
    pub fn confirm_removal(&self, token: &StoreToken) -> bool {
        let mut inner = self.inner.write();
        let current = inner
            .entries
            .get(&token.key)
            .and_then(|entry| entry.pending)
            .is_some_and(|(generation, _)| generation == token.generation);
        if current {
            inner.entries.remove(&token.key);
            debug!(%token, "store: removal confirmed");
        }
        current
    }

    /// Undo the mutation behind `token`.
    ///
    /// A token that was already confirmed, rolled back or superseded is a no-op
    /// and yields `None`.
    pub fn rollback(&self, token: &StoreToken) -> Option<RolledBack> {
        let mut inner = self.inner.write();
        let entry = inner.entries.get_mut(&token.key)?;
        if entry.pending != Some((token.generation, token.kind)) {
            return None;
        }

        let outcome = match entry.confirmed.clone() {
            Some(confirmed) => {
                entry.current = confirmed.clone();
                entry.pending = None;
                entry.hidden = false;
                RolledBack::Reverted(confirmed)
            }
            None => {
                let removed = inner.entries.remove(&token.key)?;
                RolledBack::Discarded(removed.current)
            }
        };
        debug!(%token, "store: rolled back");
        Some(outcome)
    }
}

/// Live, restartable view over the store
#[derive(Debug, Clone)]
pub struct NotesView {
    store: LocalNoteStore,
    filter: Option<String>,
}

impl NotesView {
    pub fn notes(&self) -> Vec<Note> {
        self.store.list(self.filter.as_deref())
    }

    pub fn iter(&self) -> std::vec::IntoIter<Note> {
        self.notes().into_iter()
    }
}

impl IntoIterator for &NotesView {
    type Item = Note;
    type IntoIter = std::vec::IntoIter<Note>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
