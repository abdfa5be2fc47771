//! Directed follow graph stored as two per-identity projections.
//!
//! `following_{a}` lists who `a` follows and `followers_{b}` lists who
//! follows `b`. An edge `a -> b` exists when `b` is in `following_{a}`;
//! `followers_{b}` is its reverse projection. Both projections are
//! rewritten together in a single [`KeyValueStore::write_batch`], so a
//! follow or unfollow either lands on both sides or on neither. Writers
//! outside this type can still tear the pair; that state is tolerated, not
//! repaired.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::notification::{NotificationCenter, NotificationKind};
use crate::storage::{encode_record, keys, read_record_or_default, KeyValueStore, StorageError};

pub const FOLLOW_PAYLOAD: &str = "started following you";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub followers: u32,
    pub following: u32,
}

/// `following_{identity}` in insertion order.
pub(crate) fn read_following(
    store: &dyn KeyValueStore,
    identity: &str,
) -> Result<Vec<String>, StorageError> {
    read_record_or_default(store, &keys::following(identity))
}

fn read_followers(store: &dyn KeyValueStore, identity: &str) -> Result<Vec<String>, StorageError> {
    read_record_or_default(store, &keys::followers(identity))
}

#[derive(Clone)]
pub struct FollowGraph {
    store: Arc<dyn KeyValueStore>,
    notifications: NotificationCenter,
}

impl FollowGraph {
    pub fn new(store: Arc<dyn KeyValueStore>, notifications: NotificationCenter) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Add the edge `follower -> followee` and notify the followee.
    ///
    /// Returns `false` with no writes for a self-follow, an empty identity,
    /// or an edge that already exists, meaning `followee` is in
    /// `following[follower]`. The followers side is not consulted for that
    /// check; it only avoids adding a duplicate entry.
    pub fn follow(&self, follower: &str, followee: &str) -> Result<bool, StorageError> {
        if follower.is_empty() || followee.is_empty() || follower == followee {
            return Ok(false);
        }
        let mut following = read_following(self.store.as_ref(), follower)?;
        if following.iter().any(|id| id == followee) {
            return Ok(false);
        }
        let mut followers = read_followers(self.store.as_ref(), followee)?;
        following.push(followee.to_string());
        if !followers.iter().any(|id| id == follower) {
            followers.push(follower.to_string());
        }
        self.store.write_batch(&[
            (keys::following(follower), encode_record(&following)?),
            (keys::followers(followee), encode_record(&followers)?),
        ])?;
        crate::tlog!(
            "follow: {} -> {}",
            crate::logging::identity(follower),
            crate::logging::identity(followee)
        );
        self.notifications
            .notify(followee, NotificationKind::Follow, follower, FOLLOW_PAYLOAD)?;
        Ok(true)
    }

    /// Remove the edge `follower -> followee` from both projections.
    /// Returns whether either side held it. No notification is sent.
    pub fn unfollow(&self, follower: &str, followee: &str) -> Result<bool, StorageError> {
        if follower.is_empty() || followee.is_empty() || follower == followee {
            return Ok(false);
        }
        let mut following = read_following(self.store.as_ref(), follower)?;
        let mut followers = read_followers(self.store.as_ref(), followee)?;
        let before = following.len() + followers.len();
        following.retain(|id| id != followee);
        followers.retain(|id| id != follower);
        if following.len() + followers.len() == before {
            return Ok(false);
        }
        self.store.write_batch(&[
            (keys::following(follower), encode_record(&following)?),
            (keys::followers(followee), encode_record(&followers)?),
        ])?;
        crate::tlog!(
            "unfollow: {} -/-> {}",
            crate::logging::identity(follower),
            crate::logging::identity(followee)
        );
        Ok(true)
    }

    pub fn is_following(&self, a: &str, b: &str) -> Result<bool, StorageError> {
        Ok(read_following(self.store.as_ref(), a)?
            .iter()
            .any(|id| id == b))
    }

    pub fn counts(&self, identity: &str) -> Result<FollowCounts, StorageError> {
        Ok(FollowCounts {
            followers: read_followers(self.store.as_ref(), identity)?.len() as u32,
            following: read_following(self.store.as_ref(), identity)?.len() as u32,
        })
    }

    pub fn following(&self, identity: &str) -> Result<Vec<String>, StorageError> {
        read_following(self.store.as_ref(), identity)
    }

    pub fn followers(&self, identity: &str) -> Result<Vec<String>, StorageError> {
        read_followers(self.store.as_ref(), identity)
    }
}
