//! Boundary to the posting collaborator.
//!
//! Posts are the only source of content identities and ownership. The
//! store keeps them as one newest-first collection under `db_posts`; ids
//! come from a persisted sequence so every new post has a unique, stable
//! content key.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::follow::read_following;
use crate::identity::{default_label, Display, IdentityResolver};
use crate::storage::{
    encode_record, keys, next_sequence_id, now_millis, read_record, read_record_or_default,
    KeyValueStore, StorageError,
};

pub const SEED_OWNER: &str = "admin@oldworld.com";
const SEED_BODY: &str = "Welcome to OldWorld! This is a persistent demo using local storage.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Absent only on legacy records; see [`Post::content_key`].
    #[serde(default)]
    pub id: Option<u64>,
    pub owner: String,
    /// Owner's label at creation time. A fallback for display only.
    #[serde(default)]
    pub author_label: String,
    #[serde(default)]
    pub author_avatar: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub media_ref: Option<String>,
    pub created_at: u64,
}

impl Post {
    /// Key under which this post's engagement is stored: the id, or the
    /// creation timestamp for records that predate id assignment.
    pub fn content_key(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => format!("t{}", self.created_at),
        }
    }
}

/// Fields supplied by the author when creating a post.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub owner: String,
    pub body: String,
    pub media_ref: Option<String>,
}

pub trait PostSource {
    /// All posts, newest first.
    fn list_posts(&self) -> Result<Vec<Post>, StorageError>;

    /// Store a new post. `None` when the draft has no owner or no content.
    fn create_post(&self, draft: NewPost) -> Result<Option<Post>, StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    /// Posts by identities the viewer follows, plus the viewer's own.
    Following,
}

/// One search hit: a post owner and how they are currently shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonMatch {
    pub identity: String,
    pub display: Display,
}

#[derive(Clone)]
pub struct StoredPosts {
    store: Arc<dyn KeyValueStore>,
    resolver: IdentityResolver,
}

impl StoredPosts {
    pub fn new(store: Arc<dyn KeyValueStore>, resolver: IdentityResolver) -> Self {
        Self { store, resolver }
    }

    /// Install the welcome post if the collection has never been written.
    /// Returns whether seeding happened.
    pub fn seed_if_empty(&self) -> Result<bool, StorageError> {
        if self.store.read(keys::POSTS)?.is_some() {
            return Ok(false);
        }
        let seed = Post {
            id: Some(1),
            owner: SEED_OWNER.to_string(),
            author_label: "Admin".to_string(),
            author_avatar: None,
            body: SEED_BODY.to_string(),
            media_ref: None,
            created_at: now_millis(),
        };
        self.store.write_batch(&[
            (keys::POSTS.to_string(), encode_record(&vec![seed])?),
            (keys::POST_SEQUENCE.to_string(), encode_record(&1u64)?),
        ])?;
        crate::tlog!("posts: seeded welcome post");
        Ok(true)
    }

    /// Look a post up by its content key.
    pub fn find(&self, content_key: &str) -> Result<Option<Post>, StorageError> {
        Ok(self
            .list_posts()?
            .into_iter()
            .find(|p| p.content_key() == content_key))
    }

    pub fn posts_by(&self, owner: &str) -> Result<Vec<Post>, StorageError> {
        Ok(self
            .list_posts()?
            .into_iter()
            .filter(|p| p.owner == owner)
            .collect())
    }

    pub fn feed(&self, viewer: &str, filter: FeedFilter) -> Result<Vec<Post>, StorageError> {
        let posts = self.list_posts()?;
        match filter {
            FeedFilter::All => Ok(posts),
            FeedFilter::Following => {
                let following: HashSet<String> =
                    read_following(self.store.as_ref(), viewer)?.into_iter().collect();
                Ok(posts
                    .into_iter()
                    .filter(|p| p.owner == viewer || following.contains(&p.owner))
                    .collect())
            }
        }
    }

    /// How `post`'s author is shown now.
    pub fn author_display(&self, post: &Post) -> Result<Display, StorageError> {
        let fallback = if post.author_label.is_empty() {
            default_label(&post.owner)
        } else {
            post.author_label.as_str()
        };
        self.resolver
            .resolve_display(&post.owner, fallback, post.author_avatar.as_deref())
    }

    /// Post owners whose shown label or handle contains `query`,
    /// case-insensitively, in order of their newest post.
    pub fn search_people(&self, query: &str) -> Result<Vec<PersonMatch>, StorageError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for post in self.list_posts()? {
            if post.owner.is_empty() || !seen.insert(post.owner.clone()) {
                continue;
            }
            let display = self.author_display(&post)?;
            if display.label.to_lowercase().contains(&needle)
                || post.owner.to_lowercase().contains(&needle)
            {
                matches.push(PersonMatch {
                    identity: post.owner.clone(),
                    display,
                });
            }
        }
        Ok(matches)
    }
}

impl PostSource for StoredPosts {
    fn list_posts(&self) -> Result<Vec<Post>, StorageError> {
        read_record_or_default(self.store.as_ref(), keys::POSTS)
    }

    fn create_post(&self, draft: NewPost) -> Result<Option<Post>, StorageError> {
        let body = draft.body.trim().to_string();
        let media_ref = draft.media_ref.filter(|m| !m.trim().is_empty());
        if draft.owner.is_empty() || (body.is_empty() && media_ref.is_none()) {
            return Ok(None);
        }
        let mut posts = self.list_posts()?;
        let last: Option<u64> = read_record(self.store.as_ref(), keys::POST_SEQUENCE)?;
        let highest = posts.iter().filter_map(|p| p.id).max();
        let id = match last.max(highest) {
            Some(n) => n.checked_add(1).ok_or(StorageError::SequenceExhausted(n))?,
            None => 1,
        };
        let author = self.resolver.display_for(&draft.owner)?;
        let post = Post {
            id: Some(id),
            owner: draft.owner,
            author_label: author.label,
            author_avatar: author.avatar,
            body,
            media_ref,
            created_at: next_sequence_id(posts.first().map(|p| p.created_at))?,
        };
        posts.insert(0, post.clone());
        self.store.write_batch(&[
            (keys::POSTS.to_string(), encode_record(&posts)?),
            (keys::POST_SEQUENCE.to_string(), encode_record(&id)?),
        ])?;
        crate::tlog!(
            "posts: {} created post {}",
            crate::logging::identity(&post.owner),
            id
        );
        Ok(Some(post))
    }
}
