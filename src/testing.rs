//! In-memory stand-ins for the remote store and the identity service.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::gateway::{GatewayError, NoteRecord, OrderBy, RecordPatch, RemoteStoreGateway};
use crate::models::{AttachmentHandle, AttachmentKind, Identity, NoteId, OwnerId};
use crate::session::{AuthError, Credentials, SessionGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Insert,
    Update,
    Delete,
    Query,
}

/// Keeps one remote call parked until released
#[derive(Debug, Clone)]
pub struct Hold {
    entered: Arc<Notify>,
    gate: Arc<Semaphore>,
}

impl Hold {
    fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }

    /// Resolves once the held call has reached the gateway
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    async fn park(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<NoteId, NoteRecord>,
    next_id: i64,
    calls: Vec<Op>,
    failures: HashSet<Op>,
    holds: HashMap<Op, Hold>,
}

impl MemoryState {
    fn tick(&mut self) -> (NoteId, DateTime<Utc>) {
        self.next_id += 1;
        let stamp = Utc
            .timestamp_opt(1_700_000_000 + self.next_id, 0)
            .single()
            .unwrap_or_else(Utc::now);
        (NoteId(self.next_id), stamp)
    }
}

/// Remote store fake: assigns ids and a logical clock, can fail or hold calls
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Op> {
        self.state.lock().calls.clone()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// The next call of this kind fails as unreachable
    pub fn fail_next(&self, op: Op) {
        self.state.lock().failures.insert(op);
    }

    /// The next call of this kind waits for [`Hold::release`]
    pub fn hold(&self, op: Op) -> Hold {
        let hold = Hold::new();
        self.state.lock().holds.insert(op, hold.clone());
        hold
    }

    /// Put a record straight into the store, bypassing the call log
    pub fn seed(&self, owner: &OwnerId, body: &str) -> NoteId {
        let mut state = self.state.lock();
        let (id, stamp) = state.tick();
        state.records.insert(
            id,
            NoteRecord {
                id: Some(id),
                owner_id: owner.clone(),
                title: None,
                body: Some(body.to_string()),
                completed: false,
                reminder_at: None,
                image: None,
                drawing: None,
                audio: None,
                created_at: Some(stamp),
                updated_at: Some(stamp),
            },
        );
        id
    }

    async fn enter(&self, op: Op) -> Result<(), GatewayError> {
        let hold = {
            let mut state = self.state.lock();
            state.calls.push(op);
            state.holds.remove(&op)
        };
        if let Some(hold) = hold {
            hold.park().await;
        }
        if self.state.lock().failures.remove(&op) {
            return Err(GatewayError::Unreachable(format!("injected {:?} failure", op)));
        }
        Ok(())
    }
}

fn make_durable(owner: &OwnerId, handle: Option<AttachmentHandle>) -> Option<AttachmentHandle> {
    handle.map(|handle| match handle {
        AttachmentHandle::Local(local) => AttachmentHandle::remote(format!("mem://{}/{}", owner, local.id)),
        remote => remote,
    })
}

#[async_trait]
impl RemoteStoreGateway for MemoryGateway {
    async fn insert(&self, mut record: NoteRecord) -> Result<NoteRecord, GatewayError> {
        self.enter(Op::Insert).await?;
        let mut state = self.state.lock();
        let (id, stamp) = state.tick();
        record.id = Some(id);
        record.created_at = Some(stamp);
        record.updated_at = Some(stamp);
        let owner = record.owner_id.clone();
        for kind in AttachmentKind::ALL {
            let slot = record.attachment_mut(kind);
            *slot = make_durable(&owner, slot.take());
        }
        state.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, owner: &OwnerId, id: NoteId, mut patch: RecordPatch) -> Result<NoteRecord, GatewayError> {
        self.enter(Op::Update).await?;
        for kind in AttachmentKind::ALL {
            if let Some(slot) = patch.attachment_mut(kind) {
                *slot = make_durable(owner, slot.take());
            }
        }
        let mut state = self.state.lock();
        let (_, stamp) = state.tick();
        let record = state
            .records
            .get_mut(&id)
            .filter(|record| &record.owner_id == owner)
            .ok_or(GatewayError::Missing(id))?;
        patch.apply_to(record);
        record.updated_at = Some(stamp);
        Ok(record.clone())
    }

    async fn delete(&self, owner: &OwnerId, id: NoteId) -> Result<(), GatewayError> {
        self.enter(Op::Delete).await?;
        let mut state = self.state.lock();
        let owned = state.records.get(&id).is_some_and(|record| &record.owner_id == owner);
        if !owned {
            return Err(GatewayError::Missing(id));
        }
        state.records.remove(&id);
        Ok(())
    }

    async fn query(&self, owner: &OwnerId, order: OrderBy) -> Result<Vec<NoteRecord>, GatewayError> {
        self.enter(Op::Query).await?;
        let state = self.state.lock();
        let mut records: Vec<NoteRecord> = state
            .records
            .values()
            .filter(|record| &record.owner_id == owner)
            .cloned()
            .collect();
        records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if order == OrderBy::NewestFirst {
            records.reverse();
        }
        Ok(records)
    }
}

/// Session fake with a fixed (or swappable) signed-in user
#[derive(Debug, Default)]
pub struct StaticSession {
    identity: Mutex<Option<Identity>>,
}

impl StaticSession {
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            identity: Mutex::new(identity),
        }
    }

    pub fn set(&self, identity: Option<Identity>) {
        *self.identity.lock() = identity;
    }
}

#[async_trait]
impl SessionGate for StaticSession {
    async fn active_identity(&self) -> Result<Option<Identity>, AuthError> {
        Ok(self.identity.lock().clone())
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.check_filled()?;
        let identity = Identity {
            user_id: OwnerId(credentials.email.clone()),
            email: credentials.email.clone(),
        };
        self.set(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        credentials.check_filled()?;
        Ok(Identity {
            user_id: OwnerId(credentials.email.clone()),
            email: credentials.email.clone(),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set(None);
        Ok(())
    }
}
