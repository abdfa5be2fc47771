//! Likes and comments attached to posts.
//!
//! Engagement is keyed by [`Post::content_key`]. Likes are stored as the set
//! of identities currently liking the post, so a toggle moves the count by
//! exactly one and repeated toggles can never double count. Comments are an
//! append-only list in submission order.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::IdentityResolver;
use crate::notification::{NotificationCenter, NotificationKind};
use crate::posts::Post;
use crate::storage::{
    keys, next_sequence_id, now_millis, read_record_or_default, write_record, KeyValueStore,
    StorageError,
};

pub const LIKE_PAYLOAD: &str = "liked your post";
pub const COMMENT_PAYLOAD: &str = "commented on your post";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LikeSet {
    #[serde(default)]
    liked_by: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeSummary {
    pub like_count: u32,
    pub liked_by_viewer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: u64,
    pub author: String,
    /// Label the author had when submitting; shown only without a profile.
    pub author_label: String,
    #[serde(default)]
    pub author_avatar: Option<String>,
    pub text: String,
    pub created_at: u64,
}

/// Who is commenting and how they looked at submission time.
#[derive(Debug, Clone)]
pub struct CommentAuthor {
    pub identity: String,
    pub label: String,
    pub avatar: Option<String>,
}

/// Engagement on one post as seen by one viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementRecord {
    pub like_count: u32,
    pub liked_by_viewer: bool,
    pub comments: Vec<CommentRecord>,
}

#[derive(Clone)]
pub struct EngagementStore {
    store: Arc<dyn KeyValueStore>,
    resolver: IdentityResolver,
    notifications: NotificationCenter,
}

impl EngagementStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        resolver: IdentityResolver,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            store,
            resolver,
            notifications,
        }
    }

    fn likes(&self, post: &Post) -> Result<LikeSet, StorageError> {
        read_record_or_default(self.store.as_ref(), &keys::likes(&post.content_key()))
    }

    fn stored_comments(&self, post: &Post) -> Result<Vec<CommentRecord>, StorageError> {
        read_record_or_default(self.store.as_ref(), &keys::comments(&post.content_key()))
    }

    fn summarize(likes: &LikeSet, viewer: &str) -> LikeSummary {
        LikeSummary {
            like_count: likes.liked_by.len() as u32,
            liked_by_viewer: likes.liked_by.contains(viewer),
        }
    }

    /// Flip `viewer`'s like on `post`.
    ///
    /// When the flip results in a like by someone other than the owner, the
    /// owner is notified. Unliking sends nothing.
    pub fn toggle_like(&self, post: &Post, viewer: &str) -> Result<LikeSummary, StorageError> {
        let mut likes = self.likes(post)?;
        if viewer.is_empty() {
            return Ok(Self::summarize(&likes, viewer));
        }
        let now_liked = if likes.liked_by.remove(viewer) {
            false
        } else {
            likes.liked_by.insert(viewer.to_string());
            true
        };
        write_record(
            self.store.as_ref(),
            &keys::likes(&post.content_key()),
            &likes,
        )?;
        crate::tlog!(
            "engagement: {} {} post {}",
            crate::logging::identity(viewer),
            if now_liked { "liked" } else { "unliked" },
            post.content_key()
        );
        if now_liked && viewer != post.owner {
            self.notifications
                .notify(&post.owner, NotificationKind::Like, viewer, LIKE_PAYLOAD)?;
        }
        Ok(Self::summarize(&likes, viewer))
    }

    pub fn like_summary(&self, post: &Post, viewer: &str) -> Result<LikeSummary, StorageError> {
        Ok(Self::summarize(&self.likes(post)?, viewer))
    }

    /// Append a comment to `post`.
    ///
    /// Blank text, or an author without an identity, is rejected with
    /// `None`. A comment by anyone but the owner notifies the owner.
    pub fn add_comment(
        &self,
        post: &Post,
        author: &CommentAuthor,
        text: &str,
    ) -> Result<Option<CommentRecord>, StorageError> {
        if text.trim().is_empty() || author.identity.is_empty() {
            return Ok(None);
        }
        let mut comments = self.stored_comments(post)?;
        let record = CommentRecord {
            id: next_sequence_id(comments.iter().map(|c| c.id).max())?,
            author: author.identity.clone(),
            author_label: author.label.clone(),
            author_avatar: author.avatar.clone(),
            text: text.to_string(),
            created_at: now_millis(),
        };
        comments.push(record.clone());
        write_record(
            self.store.as_ref(),
            &keys::comments(&post.content_key()),
            &comments,
        )?;
        crate::tlog!(
            "engagement: {} commented on post {}",
            crate::logging::identity(&author.identity),
            post.content_key()
        );
        if author.identity != post.owner {
            self.notifications.notify(
                &post.owner,
                NotificationKind::Comment,
                &author.identity,
                COMMENT_PAYLOAD,
            )?;
        }
        Ok(Some(record))
    }

    /// Comments in submission order, each author shown through their
    /// current profile when they have one.
    pub fn comments(&self, post: &Post) -> Result<Vec<CommentRecord>, StorageError> {
        let mut comments = self.stored_comments(post)?;
        for c in comments.iter_mut() {
            let shown = self.resolver.resolve_display(
                &c.author,
                &c.author_label,
                c.author_avatar.as_deref(),
            )?;
            c.author_label = shown.label;
            c.author_avatar = shown.avatar;
        }
        Ok(comments)
    }

    pub fn engagement(&self, post: &Post, viewer: &str) -> Result<EngagementRecord, StorageError> {
        let likes = self.like_summary(post, viewer)?;
        Ok(EngagementRecord {
            like_count: likes.like_count,
            liked_by_viewer: likes.liked_by_viewer,
            comments: self.comments(post)?,
        })
    }
}
