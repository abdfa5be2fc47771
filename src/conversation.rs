//! Two-party message threads.
//!
//! A thread is stored once per unordered pair of identities. Both
//! participants derive the same key through [`thread_key_for`], so either
//! side can append and either side replays the same history.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::follow::read_following;
use crate::identity::{Display, IdentityResolver};
use crate::storage::{
    encode_record, keys, next_sequence_id, now_millis, read_record_or_default, KeyValueStore,
    StorageError,
};

/// ASCII unit separator. Never part of a handle, so distinct pairs never
/// collide on the same key.
pub const THREAD_KEY_SEPARATOR: char = '\u{1f}';

/// Canonical key for the pair `{a, b}`; symmetric in its arguments.
pub fn thread_key_for(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}{THREAD_KEY_SEPARATOR}{hi}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: u64,
    pub sender: String,
    pub text: String,
    pub sent_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPeer {
    pub identity: String,
    pub display: Display,
}

#[derive(Clone)]
pub struct ConversationStore {
    store: Arc<dyn KeyValueStore>,
    resolver: IdentityResolver,
}

impl ConversationStore {
    pub fn new(store: Arc<dyn KeyValueStore>, resolver: IdentityResolver) -> Self {
        Self { store, resolver }
    }

    fn thread(&self, thread_key: &str) -> Result<Vec<MessageRecord>, StorageError> {
        read_record_or_default(self.store.as_ref(), &keys::chat(thread_key))
    }

    fn thread_peers(&self, identity: &str) -> Result<Vec<String>, StorageError> {
        read_record_or_default(self.store.as_ref(), &keys::threads(identity))
    }

    /// Append `text` from `sender` to the thread between `a` and `b`.
    ///
    /// Blank text or a sender outside `{a, b}` is rejected with `None`.
    /// Message ids strictly increase within a thread and `sent_at` never
    /// goes backwards, so replay order matches append order.
    pub fn append_message(
        &self,
        a: &str,
        b: &str,
        sender: &str,
        text: &str,
    ) -> Result<Option<MessageRecord>, StorageError> {
        if text.trim().is_empty() || sender.is_empty() || (sender != a && sender != b) {
            return Ok(None);
        }
        let thread_key = thread_key_for(a, b);
        let mut messages = self.thread(&thread_key)?;
        let last = messages.last();
        let record = MessageRecord {
            id: next_sequence_id(last.map(|m| m.id))?,
            sender: sender.to_string(),
            text: text.to_string(),
            sent_at: now_millis().max(last.map_or(0, |m| m.sent_at)),
        };
        messages.push(record.clone());

        let mut batch = vec![(keys::chat(&thread_key), encode_record(&messages)?)];
        for (me, peer) in [(a, b), (b, a)] {
            let mut peers = self.thread_peers(me)?;
            if !peers.iter().any(|p| p == peer) {
                peers.push(peer.to_string());
                batch.push((keys::threads(me), encode_record(&peers)?));
            }
            if a == b {
                break;
            }
        }
        self.store.write_batch(&batch)?;
        crate::tlog!(
            "chat: {} wrote to {}",
            crate::logging::identity(sender),
            crate::logging::thread(&thread_key)
        );
        Ok(Some(record))
    }

    /// Full thread replay, oldest first. Identical for either participant.
    pub fn list_messages(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StorageError> {
        let mut messages = self.thread(&thread_key_for(a, b))?;
        messages.sort_by(|x, y| x.sent_at.cmp(&y.sent_at).then_with(|| x.id.cmp(&y.id)));
        Ok(messages)
    }

    /// People `identity` can message: everyone it follows, in follow order,
    /// then anyone it already has a thread with.
    pub fn list_conversations(
        &self,
        identity: &str,
    ) -> Result<Vec<ConversationPeer>, StorageError> {
        let mut peers: Vec<String> = Vec::new();
        let candidates = read_following(self.store.as_ref(), identity)?
            .into_iter()
            .chain(self.thread_peers(identity)?);
        for peer in candidates {
            if peer != identity && !peers.contains(&peer) {
                peers.push(peer);
            }
        }
        peers
            .into_iter()
            .map(|peer| -> Result<ConversationPeer, StorageError> {
                let display = self.resolver.display_for(&peer)?;
                Ok(ConversationPeer {
                    identity: peer,
                    display,
                })
            })
            .collect()
    }
}
