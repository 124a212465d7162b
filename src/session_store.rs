//! # Conversation State Store
//!
//! Owns the discovery [`Session`] of every conversation. The state machine
//! reads a session, computes the transition and writes it back; it never
//! keeps session data between events.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teloxide::types::ChatId;

use crate::dialogue::{Session, SessionPatch};
use crate::errors::StoreError;

/// Stable identifier of one conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub i64);

impl From<ChatId> for ConversationId {
    fn from(chat_id: ChatId) -> Self {
        ConversationId(chat_id.0)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session storage keyed by conversation
///
/// `update` is an atomic read-modify-write for one conversation. Operations
/// on different conversations never wait on each other.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current session, a default `Idle` session when none is stored
    async fn get(&self, id: ConversationId) -> Result<Session, StoreError>;

    /// Replace the whole session
    async fn set(&self, id: ConversationId, session: Session) -> Result<(), StoreError>;

    /// Apply a partial update and return the resulting session
    async fn update(&self, id: ConversationId, patch: SessionPatch) -> Result<Session, StoreError>;

    async fn reset(&self, id: ConversationId) -> Result<(), StoreError> {
        self.set(id, Session::default()).await
    }
}

type Slot = Arc<tokio::sync::Mutex<Session>>;

/// In-memory session store with one lock per conversation
///
/// The outer map lock is only held to look up, insert or remove a slot, never
/// across an await, so conversations do not contend with each other. Only
/// conversations in the middle of a search keep a slot: reads never create
/// one and `reset` removes it.
#[derive(Default)]
pub struct InMemorySessionStore {
    slots: Mutex<HashMap<ConversationId, Slot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ConversationId, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Slot of a conversation, created on first write
    fn slot(&self, id: ConversationId) -> Slot {
        Arc::clone(self.slots().entry(id).or_default())
    }

    fn existing_slot(&self, id: ConversationId) -> Option<Slot> {
        self.slots().get(&id).cloned()
    }

    /// Number of conversations with a stored session
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: ConversationId) -> Result<Session, StoreError> {
        let Some(slot) = self.existing_slot(id) else {
            return Ok(Session::default());
        };
        let session = slot.lock().await.clone();
        Ok(session)
    }

    async fn set(&self, id: ConversationId, session: Session) -> Result<(), StoreError> {
        let slot = self.slot(id);
        *slot.lock().await = session;
        Ok(())
    }

    async fn update(&self, id: ConversationId, patch: SessionPatch) -> Result<Session, StoreError> {
        let slot = self.slot(id);
        let mut session = slot.lock().await;
        patch.apply(&mut session);
        Ok(session.clone())
    }

    /// Drop the conversation's slot; an absent slot reads as `Idle`
    async fn reset(&self, id: ConversationId) -> Result<(), StoreError> {
        self.slots().remove(&id);
        Ok(())
    }
}
