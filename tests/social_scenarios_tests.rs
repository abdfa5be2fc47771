//! End-to-end flows across every component sharing one store.
//!
//! The same flows run against the in-memory store and an on-disk SQLite
//! database, and a second `Social` opened on the same file stands in for a
//! second client of the same device.

use std::sync::Arc;

use oldworld::notification::{NotificationKind, MAX_NOTIFICATIONS};
use oldworld::posts::{FeedFilter, NewPost, Post, PostSource};
use oldworld::social::Social;
use oldworld::storage::{db_path, KeyValueStore, MemoryStore, SqliteStore};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn memory_social() -> Social {
    Social::new(Arc::new(MemoryStore::new()))
}

fn publish(social: &Social, owner: &str, body: &str) -> Post {
    social
        .posts
        .create_post(NewPost {
            owner: owner.to_string(),
            body: body.to_string(),
            media_ref: None,
        })
        .unwrap()
        .unwrap()
}

fn follow_like_comment_chat(social: &Social) {
    let a = "alice@oldworld.com";
    let b = "bob@oldworld.com";
    let a_post = publish(social, a, "morning all");
    let b_post = publish(social, b, "first light");

    assert!(social.follows.follow(a, b).unwrap());
    let inbox = social.notifications.list(b).unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Follow);
    assert_eq!(inbox[0].actor, a);
    assert!(!social.follows.follow(a, b).unwrap());
    assert_eq!(social.notifications.list(b).unwrap().len(), 1);

    let blank = social
        .engagement
        .add_comment(&a_post, &social.comment_author(b).unwrap(), "   ")
        .unwrap();
    assert!(blank.is_none());
    assert!(social.engagement.comments(&a_post).unwrap().is_empty());
    assert!(social.notifications.list(a).unwrap().is_empty());
    assert_eq!(social.notifications.unread_count(b).unwrap(), 1);

    let liked = social.engagement.toggle_like(&b_post, a).unwrap();
    assert_eq!(liked.like_count, 1);
    assert!(liked.liked_by_viewer);
    assert_eq!(social.notifications.unread_count(b).unwrap(), 2);
    assert_eq!(
        social.notifications.list(b).unwrap()[0].kind,
        NotificationKind::Like
    );

    social.conversations.append_message(a, b, a, "hi bob").unwrap();
    social.conversations.append_message(b, a, b, "hi alice").unwrap();
    social.conversations.append_message(a, b, a, "coffee?").unwrap();
    for (me, them) in [(a, b), (b, a)] {
        let texts: Vec<String> = social
            .conversations
            .list_messages(me, them)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["hi bob", "hi alice", "coffee?"]);
    }
    // Messages do not notify.
    assert_eq!(social.notifications.unread_count(b).unwrap(), 2);
    assert_eq!(social.notifications.unread_count(a).unwrap(), 0);

    let peers = social.conversations.list_conversations(b).unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].identity, a);

    assert_eq!(social.notifications.mark_all_read(b).unwrap(), 2);
    assert_eq!(social.notifications.unread_count(b).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_follow_like_comment_chat_in_memory() {
    follow_like_comment_chat(&memory_social());
}

#[test]
fn test_follow_like_comment_chat_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&db_path(dir.path())).unwrap();
    follow_like_comment_chat(&Social::new(Arc::new(store)));
}

#[test]
fn test_profile_edit_repaints_past_posts() {
    let social = memory_social();
    let me = "carol@oldworld.com";
    for n in 0..5 {
        publish(&social, me, &format!("post {n}"));
    }
    let before: Vec<String> = social
        .posts
        .posts_by(me)
        .unwrap()
        .iter()
        .map(|p| social.posts.author_display(p).unwrap().label)
        .collect();
    assert_eq!(before, vec!["carol"; 5]);

    social
        .resolver
        .set_profile(me, "Carol Danvers", Some("carol.png"))
        .unwrap();

    let mine = social.posts.posts_by(me).unwrap();
    assert_eq!(mine.len(), 5);
    for post in &mine {
        let shown = social.posts.author_display(post).unwrap();
        assert_eq!(shown.label, "Carol Danvers");
        assert_eq!(shown.avatar.as_deref(), Some("carol.png"));
        // The stored record is untouched.
        assert_eq!(post.author_label, "carol");
    }
    let summary = social.profile_summary(me, me).unwrap();
    assert_eq!(summary.post_count, 5);
    assert_eq!(summary.display.label, "Carol Danvers");
}

#[test]
fn test_follow_then_unfollow_restores_counts_and_feed() {
    let social = memory_social();
    let (a, b) = ("a@x", "b@x");
    publish(&social, b, "from b");
    let before = social.follows.counts(b).unwrap();

    social.follows.follow(a, b).unwrap();
    assert!(social.follows.is_following(a, b).unwrap());
    assert_eq!(social.follows.counts(b).unwrap().followers, before.followers + 1);
    assert_eq!(social.posts.feed(a, FeedFilter::Following).unwrap().len(), 1);

    assert!(social.follows.unfollow(a, b).unwrap());
    assert!(!social.follows.is_following(a, b).unwrap());
    assert_eq!(social.follows.counts(b).unwrap(), before);
    assert!(social.posts.feed(a, FeedFilter::Following).unwrap().is_empty());
}

#[test]
fn test_notification_cap_across_many_likers() {
    let social = memory_social();
    let post = publish(&social, "star@x", "popular");
    for n in 0..=MAX_NOTIFICATIONS {
        social
            .engagement
            .toggle_like(&post, &format!("fan{n}@x"))
            .unwrap();
    }
    assert_eq!(
        social.engagement.like_summary(&post, "star@x").unwrap().like_count,
        MAX_NOTIFICATIONS as u32 + 1
    );
    let inbox = social.notifications.list("star@x").unwrap();
    assert_eq!(inbox.len(), MAX_NOTIFICATIONS);
    assert_eq!(inbox[0].actor, format!("fan{MAX_NOTIFICATIONS}@x"));
    assert!(inbox.iter().all(|n| n.actor != "fan0@x"));
}

#[test]
fn test_two_clients_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = db_path(dir.path());
    let first = Social::new(Arc::new(SqliteStore::open(&path).unwrap()));
    let second = Social::new(Arc::new(SqliteStore::open(&path).unwrap()));

    assert!(first.posts.seed_if_empty().unwrap());
    assert!(!second.posts.seed_if_empty().unwrap());

    let post = publish(&first, "a@x", "hello from one");
    second.engagement.toggle_like(&post, "b@x").unwrap();
    second
        .conversations
        .append_message("a@x", "b@x", "b@x", "saw it")
        .unwrap();

    assert_eq!(first.notifications.unread_count("a@x").unwrap(), 1);
    assert_eq!(
        first.conversations.list_messages("a@x", "b@x").unwrap()[0].text,
        "saw it"
    );
    let again = publish(&second, "b@x", "hello from two");
    assert_ne!(again.content_key(), post.content_key());
}

#[test]
fn test_corrupt_keys_recover_on_next_write() {
    let store = Arc::new(MemoryStore::new());
    let social = Social::new(store.clone());
    store.write("following_a@x", "{not json").unwrap();
    store.write("followers_b@x", "42").unwrap();

    assert!(social.follows.following("a@x").unwrap().is_empty());
    assert!(social.follows.follow("a@x", "b@x").unwrap());
    assert_eq!(social.follows.following("a@x").unwrap(), vec!["b@x"]);
    assert_eq!(social.follows.followers("b@x").unwrap(), vec!["a@x"]);
}
