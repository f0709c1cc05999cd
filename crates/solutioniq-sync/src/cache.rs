//! Confirmed server reads and their invalidation.

use solutioniq_api::{ConfirmedMessage, Conversation};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Conversations,
    ConversationMessages(String),
    Tasks,
    Task(String),
    Approvals,
}

#[derive(Debug, Default)]
struct CacheState {
    conversations: Option<Vec<Conversation>>,
    messages: HashMap<String, Vec<ConfirmedMessage>>,
    stale: HashSet<QueryKey>,
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    invalidations: broadcast::Sender<QueryKey>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(64)
    }
}

impl QueryCache {
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        let (invalidations, _) = broadcast::channel(buffer.max(1));
        Self {
            state: Mutex::new(CacheState::default()),
            invalidations,
        }
    }

    #[must_use]
    pub fn conversations(&self) -> Option<Vec<Conversation>> {
        self.lock().conversations.clone()
    }

    #[must_use]
    pub fn messages(&self, conversation_id: &str) -> Option<Vec<ConfirmedMessage>> {
        self.lock().messages.get(conversation_id).cloned()
    }

    pub fn store_conversations(&self, conversations: Vec<Conversation>) {
        let mut state = self.lock();
        state.conversations = Some(conversations);
        state.stale.remove(&QueryKey::Conversations);
    }

    pub fn store_messages(&self, conversation_id: &str, messages: Vec<ConfirmedMessage>) {
        let mut state = self.lock();
        state.messages.insert(conversation_id.to_string(), messages);
        state
            .stale
            .remove(&QueryKey::ConversationMessages(conversation_id.to_string()));
    }

    pub fn remove_messages(&self, conversation_id: &str) {
        let mut state = self.lock();
        state.messages.remove(conversation_id);
        state
            .stale
            .remove(&QueryKey::ConversationMessages(conversation_id.to_string()));
    }

    /// Clear staleness for a key whose data lives outside the cache.
    pub fn mark_fresh(&self, key: &QueryKey) {
        self.lock().stale.remove(key);
    }

    /// Mark `key` stale and tell subscribers to re-read it.
    pub fn invalidate(&self, key: QueryKey) {
        self.lock().stale.insert(key.clone());
        debug!(key = ?key, "query invalidated");
        let _ = self.invalidations.send(key);
    }

    /// Stale when invalidated since the last store. Keys that hold data are
    /// also stale until first stored.
    #[must_use]
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        let state = self.lock();
        if state.stale.contains(key) {
            return true;
        }
        match key {
            QueryKey::Conversations => state.conversations.is_none(),
            QueryKey::ConversationMessages(id) => !state.messages.contains_key(id),
            _ => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
