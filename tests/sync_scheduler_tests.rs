//! Timer behaviour of `SyncScheduler` under paused tokio time.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use oldworld::conversation::thread_key_for;
use oldworld::notification::NotificationKind;
use oldworld::social::Social;
use oldworld::storage::{KeyValueStore, MemoryStore, StorageError};
use oldworld::sync::{Subject, SyncScheduler};

const TICK: Duration = Duration::from_millis(2000);

/// Map store whose reads can be switched to fail.
#[derive(Default)]
struct FlakyStore {
    data: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl FlakyStore {
    fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "offline")));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn write_batch(&self, entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut data = self.data.lock().unwrap();
        for (k, v) in entries {
            data.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.lock().unwrap().remove(key).is_some())
    }
}

fn social() -> Social {
    Social::new(Arc::new(MemoryStore::new()))
}

fn like_from(social: &Social, actor: &str) {
    social
        .notifications
        .notify("me@x", NotificationKind::Like, actor, "liked your post")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_notification_feed_refreshes_on_tick() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let mut rx = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    assert_eq!(rx.borrow().unread, 0);

    like_from(&social, "fan@x");
    timeout(TICK * 2, rx.changed())
        .await
        .expect("tick should publish")
        .unwrap();
    let feed = rx.borrow_and_update().clone();
    assert_eq!(feed.unread, 1);
    assert_eq!(feed.items[0].actor, "fan@x");

    social.notifications.mark_all_read("me@x").unwrap();
    timeout(TICK * 2, rx.changed()).await.unwrap().unwrap();
    assert_eq!(rx.borrow().unread, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_data_is_not_republished() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let mut rx = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    assert!(timeout(TICK * 5, rx.changed()).await.is_err());
    assert!(scheduler.is_active(&Subject::Notifications("me@x".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_reobserve_replaces_timer() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let mut first = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    let mut second = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();

    let ended = timeout(TICK, first.changed()).await.expect("old timer gone");
    assert!(ended.is_err());
    assert_eq!(scheduler.active_count(), 1);

    like_from(&social, "fan@x");
    timeout(TICK * 2, second.changed()).await.unwrap().unwrap();
    assert_eq!(second.borrow().unread, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_timer() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let subject = Subject::Notifications("me@x".to_string());
    let mut rx = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    assert!(scheduler.is_active(&subject));

    assert!(scheduler.stop(&subject));
    assert!(!scheduler.stop(&subject));
    assert!(!scheduler.is_active(&subject));
    assert!(timeout(TICK, rx.changed()).await.unwrap().is_err());
    assert_eq!(scheduler.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_observer_ends_timer() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let subject = Subject::Notifications("me@x".to_string());
    let rx = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    drop(rx);
    sleep(Duration::from_millis(10)).await;
    assert!(!scheduler.is_active(&subject));
    assert_eq!(scheduler.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_scheduler_ends_timers() {
    let social = social();
    let mut scheduler = SyncScheduler::default();
    assert_eq!(scheduler.interval(), TICK);
    let mut rx = scheduler
        .watch_conversation(social.conversations.clone(), "a@x", "b@x")
        .unwrap();
    drop(scheduler);
    assert!(timeout(TICK, rx.changed()).await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_conversation_watch_sees_other_side() {
    let social = social();
    let mut scheduler = SyncScheduler::new(TICK);
    let mut rx = scheduler
        .watch_conversation(social.conversations.clone(), "a@x", "b@x")
        .unwrap();
    assert!(rx.borrow().is_empty());
    assert!(scheduler.is_active(&Subject::Conversation(thread_key_for("b@x", "a@x"))));

    social
        .conversations
        .append_message("b@x", "a@x", "b@x", "ping")
        .unwrap();
    social
        .conversations
        .append_message("a@x", "b@x", "a@x", "pong")
        .unwrap();
    timeout(TICK * 2, rx.changed()).await.unwrap().unwrap();
    let texts: Vec<String> = rx.borrow().iter().map(|m| m.text.clone()).collect();
    assert_eq!(texts, vec!["ping", "pong"]);
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_keep_timer_alive() {
    let store = Arc::new(FlakyStore::default());
    let social = Social::new(store.clone());
    let mut scheduler = SyncScheduler::new(TICK);

    store.fail(true);
    assert!(scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .is_err());
    assert_eq!(scheduler.active_count(), 0);

    store.fail(false);
    let mut rx = scheduler
        .watch_notifications(social.notifications.clone(), "me@x")
        .unwrap();
    store.fail(true);
    sleep(TICK * 3).await;
    assert_eq!(scheduler.active_count(), 1);

    store.fail(false);
    like_from(&social, "fan@x");
    timeout(TICK * 2, rx.changed()).await.unwrap().unwrap();
    assert_eq!(rx.borrow().unread, 1);
}
