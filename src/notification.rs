//! Per-recipient notification queues.
//!
//! Producers (follows, likes, comments) append to the recipient's queue;
//! only the recipient flips records to read. The stored queue is in arrival
//! order and capped at [`MAX_NOTIFICATIONS`]; newest-first ordering is
//! applied when the queue is listed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::IdentityResolver;
use crate::storage::{
    keys, next_sequence_id, now_millis, read_record_or_default, write_record, KeyValueStore,
    StorageError,
};

/// Queue length after which the oldest entries are evicted.
pub const MAX_NOTIFICATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub actor: String,
    pub actor_name: String,
    #[serde(default)]
    pub actor_avatar: Option<String>,
    pub payload: String,
    pub read: bool,
    pub created_at: u64,
}

#[derive(Clone)]
pub struct NotificationCenter {
    store: Arc<dyn KeyValueStore>,
    resolver: IdentityResolver,
}

impl NotificationCenter {
    pub fn new(store: Arc<dyn KeyValueStore>, resolver: IdentityResolver) -> Self {
        Self { store, resolver }
    }

    fn queue(&self, recipient: &str) -> Result<Vec<NotificationRecord>, StorageError> {
        read_record_or_default(self.store.as_ref(), &keys::notifications(recipient))
    }

    /// Append a notification for `recipient`.
    ///
    /// Returns `None` without touching the queue when the recipient is the
    /// actor or is empty. After appending, the queue is trimmed from the
    /// front to [`MAX_NOTIFICATIONS`].
    pub fn enqueue(
        &self,
        recipient: &str,
        kind: NotificationKind,
        actor: &str,
        actor_name: &str,
        actor_avatar: Option<&str>,
        payload: &str,
    ) -> Result<Option<NotificationRecord>, StorageError> {
        if recipient.is_empty() || recipient == actor {
            return Ok(None);
        }
        let mut queue = self.queue(recipient)?;
        let last_id = queue.iter().map(|n| n.id).max();
        let record = NotificationRecord {
            id: next_sequence_id(last_id)?,
            kind,
            actor: actor.to_string(),
            actor_name: actor_name.to_string(),
            actor_avatar: actor_avatar.map(str::to_string),
            payload: payload.to_string(),
            read: false,
            created_at: now_millis(),
        };
        queue.push(record.clone());
        if queue.len() > MAX_NOTIFICATIONS {
            let overflow = queue.len() - MAX_NOTIFICATIONS;
            queue.drain(..overflow);
        }
        write_record(self.store.as_ref(), &keys::notifications(recipient), &queue)?;
        crate::tlog!(
            "notify: {} {} -> {}",
            crate::logging::identity(actor),
            kind.as_str(),
            crate::logging::identity(recipient)
        );
        Ok(Some(record))
    }

    /// [`enqueue`](Self::enqueue) with the actor's current display.
    pub fn notify(
        &self,
        recipient: &str,
        kind: NotificationKind,
        actor: &str,
        payload: &str,
    ) -> Result<Option<NotificationRecord>, StorageError> {
        if recipient.is_empty() || recipient == actor {
            return Ok(None);
        }
        let shown = self.resolver.display_for(actor)?;
        self.enqueue(
            recipient,
            kind,
            actor,
            &shown.label,
            shown.avatar.as_deref(),
            payload,
        )
    }

    /// Mark every notification read in one write. Returns how many changed.
    pub fn mark_all_read(&self, recipient: &str) -> Result<u32, StorageError> {
        let mut queue = self.queue(recipient)?;
        let mut flipped = 0u32;
        for n in queue.iter_mut().filter(|n| !n.read) {
            n.read = true;
            flipped += 1;
        }
        if flipped > 0 {
            write_record(self.store.as_ref(), &keys::notifications(recipient), &queue)?;
        }
        Ok(flipped)
    }

    pub fn unread_count(&self, recipient: &str) -> Result<u32, StorageError> {
        Ok(self.queue(recipient)?.iter().filter(|n| !n.read).count() as u32)
    }

    /// The recipient's notifications, newest first, with each actor shown
    /// through their current profile.
    pub fn list(&self, recipient: &str) -> Result<Vec<NotificationRecord>, StorageError> {
        let mut queue = self.queue(recipient)?;
        for n in queue.iter_mut() {
            let shown =
                self.resolver
                    .resolve_display(&n.actor, &n.actor_name, n.actor_avatar.as_deref())?;
            n.actor_name = shown.label;
            n.actor_avatar = shown.avatar;
        }
        queue.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(queue)
    }
}
