//! All components wired over one injected store.

use std::sync::Arc;

use crate::conversation::ConversationStore;
use crate::engagement::{CommentAuthor, EngagementStore};
use crate::follow::{FollowCounts, FollowGraph};
use crate::identity::{default_label, Display, IdentityResolver};
use crate::notification::NotificationCenter;
use crate::posts::{PostSource, StoredPosts};
use crate::storage::{KeyValueStore, StorageError};

/// Everything a profile page shows about `identity` to `viewer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSummary {
    pub identity: String,
    pub display: Display,
    pub post_count: u32,
    pub counts: FollowCounts,
    pub viewer_follows: bool,
    pub is_owner: bool,
}

#[derive(Clone)]
pub struct Social {
    pub store: Arc<dyn KeyValueStore>,
    pub resolver: IdentityResolver,
    pub notifications: NotificationCenter,
    pub follows: FollowGraph,
    pub engagement: EngagementStore,
    pub conversations: ConversationStore,
    pub posts: StoredPosts,
}

impl Social {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let resolver = IdentityResolver::new(store.clone());
        let notifications = NotificationCenter::new(store.clone(), resolver.clone());
        Self {
            follows: FollowGraph::new(store.clone(), notifications.clone()),
            engagement: EngagementStore::new(
                store.clone(),
                resolver.clone(),
                notifications.clone(),
            ),
            conversations: ConversationStore::new(store.clone(), resolver.clone()),
            posts: StoredPosts::new(store.clone(), resolver.clone()),
            notifications,
            resolver,
            store,
        }
    }

    /// `identity` as a comment author, with its current display frozen in.
    pub fn comment_author(&self, identity: &str) -> Result<CommentAuthor, StorageError> {
        let shown = self.resolver.display_for(identity)?;
        Ok(CommentAuthor {
            identity: identity.to_string(),
            label: shown.label,
            avatar: shown.avatar,
        })
    }

    /// How `identity` is shown on its profile page.
    ///
    /// Profile override first, then the label and avatar embedded in the
    /// identity's most recent post, then the handle's local part.
    pub fn profile_display(&self, identity: &str) -> Result<Display, StorageError> {
        let latest = self.posts.posts_by(identity)?.into_iter().next();
        match latest {
            Some(post) if !post.author_label.is_empty() => self.resolver.resolve_display(
                identity,
                &post.author_label,
                post.author_avatar.as_deref(),
            ),
            _ => self
                .resolver
                .resolve_display(identity, default_label(identity), None),
        }
    }

    pub fn profile_summary(
        &self,
        viewer: &str,
        identity: &str,
    ) -> Result<ProfileSummary, StorageError> {
        let post_count = self
            .posts
            .list_posts()?
            .iter()
            .filter(|p| p.owner == identity)
            .count() as u32;
        Ok(ProfileSummary {
            identity: identity.to_string(),
            display: self.profile_display(identity)?,
            post_count,
            counts: self.follows.counts(identity)?,
            viewer_follows: viewer != identity && self.follows.is_following(viewer, identity)?,
            is_owner: viewer == identity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::posts::NewPost;
    use crate::storage::MemoryStore;

    fn post(social: &Social, owner: &str, body: &str) {
        social
            .posts
            .create_post(NewPost {
                owner: owner.to_string(),
                body: body.to_string(),
                media_ref: None,
            })
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_profile_display_chain() {
        let social = Social::new(Arc::new(MemoryStore::new()));
        assert_eq!(social.profile_display("ghost@x").unwrap().label, "ghost");

        social.resolver.set_profile("a@x", "Ada", None).unwrap();
        post(&social, "a@x", "hello");
        post(&social, "b@x", "hi");
        assert_eq!(social.profile_display("b@x").unwrap().label, "b");
        assert_eq!(social.profile_display("a@x").unwrap().label, "Ada");

        social.resolver.set_profile("a@x", "Ada L.", None).unwrap();
        assert_eq!(social.profile_display("a@x").unwrap().label, "Ada L.");
    }

    #[test]
    fn test_profile_summary() {
        let social = Social::new(Arc::new(MemoryStore::new()));
        post(&social, "b@x", "one");
        post(&social, "b@x", "two");
        post(&social, "c@x", "three");
        social.follows.follow("a@x", "b@x").unwrap();
        social.follows.follow("b@x", "c@x").unwrap();

        let seen_by_a = social.profile_summary("a@x", "b@x").unwrap();
        assert_eq!(seen_by_a.post_count, 2);
        assert_eq!(seen_by_a.counts.followers, 1);
        assert_eq!(seen_by_a.counts.following, 1);
        assert!(seen_by_a.viewer_follows);
        assert!(!seen_by_a.is_owner);

        let own = social.profile_summary("b@x", "b@x").unwrap();
        assert!(own.is_owner);
        assert!(!own.viewer_follows);
    }

    #[test]
    fn test_comment_author_uses_current_profile() {
        let social = Social::new(Arc::new(MemoryStore::new()));
        assert_eq!(social.comment_author("a@x").unwrap().label, "a");
        social
            .resolver
            .set_profile("a@x", "Ada", Some("ada.png"))
            .unwrap();
        let author = social.comment_author("a@x").unwrap();
        assert_eq!(author.label, "Ada");
        assert_eq!(author.avatar.as_deref(), Some("ada.png"));
    }
}
