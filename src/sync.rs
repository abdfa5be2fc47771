//! Polling in place of push delivery.
//!
//! There is no channel through which one process can tell another that it
//! wrote something. Instead every open view (a notification list, a chat)
//! owns one timer that re-runs its read on a fixed interval and publishes
//! the result through a [`watch`] channel when it changed. The interval is
//! the latency bound for seeing another writer's changes.
//!
//! Each [`Subject`] has at most one timer. Observing a subject again
//! replaces the previous timer, and timers end when their observers are all
//! dropped, when [`SyncScheduler::stop`] is called, or when the scheduler is
//! dropped.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::conversation::{thread_key_for, ConversationStore, MessageRecord};
use crate::notification::{NotificationCenter, NotificationRecord};
use crate::storage::StorageError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// What a timer keeps fresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A recipient's notification queue.
    Notifications(String),
    /// A thread, by its canonical key.
    Conversation(String),
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Notifications(identity) => {
                write!(f, "notifications:{}", crate::logging::identity(identity))
            }
            Subject::Conversation(key) => write!(f, "chat:{}", crate::logging::thread(key)),
        }
    }
}

/// Snapshot published to notification observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFeed {
    pub unread: u32,
    /// Newest first.
    pub items: Vec<NotificationRecord>,
}

pub struct SyncScheduler {
    interval: Duration,
    tasks: HashMap<Subject, JoinHandle<()>>,
}

impl SyncScheduler {
    /// A zero interval is raised to one millisecond.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            tasks: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `read` for `subject`, replacing any existing timer for
    /// the same subject.
    ///
    /// The first read runs immediately and its error, if any, is returned.
    /// Later read errors are logged and the timer keeps going. Must be
    /// called from within a tokio runtime.
    pub fn observe<T, F>(
        &mut self,
        subject: Subject,
        mut read: F,
    ) -> Result<watch::Receiver<T>, StorageError>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: FnMut() -> Result<T, StorageError> + Send + 'static,
    {
        self.stop(&subject);
        let initial = read()?;
        let (tx, rx) = watch::channel(initial);
        let period = self.interval;
        let label = subject.to_string();
        crate::tlog!("sync: polling {} every {}ms", label, period.as_millis());
        let handle = tokio::spawn(poll_loop(tx, period, read, label));
        self.tasks.insert(subject, handle);
        Ok(rx)
    }

    /// Keep `recipient`'s unread count and list fresh.
    pub fn watch_notifications(
        &mut self,
        center: NotificationCenter,
        recipient: &str,
    ) -> Result<watch::Receiver<NotificationFeed>, StorageError> {
        let recipient = recipient.to_string();
        self.observe(Subject::Notifications(recipient.clone()), move || {
            Ok(NotificationFeed {
                unread: center.unread_count(&recipient)?,
                items: center.list(&recipient)?,
            })
        })
    }

    /// Keep the thread between `a` and `b` fresh.
    pub fn watch_conversation(
        &mut self,
        conversations: ConversationStore,
        a: &str,
        b: &str,
    ) -> Result<watch::Receiver<Vec<MessageRecord>>, StorageError> {
        let (a, b) = (a.to_string(), b.to_string());
        self.observe(Subject::Conversation(thread_key_for(&a, &b)), move || {
            conversations.list_messages(&a, &b)
        })
    }

    /// Cancel the timer for `subject`. Returns whether one was registered.
    pub fn stop(&mut self, subject: &Subject) -> bool {
        match self.tasks.remove(subject) {
            Some(handle) => {
                handle.abort();
                crate::tlog!("sync: stopped {}", subject);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    /// Whether a timer for `subject` is registered and still running.
    pub fn is_active(&self, subject: &Subject) -> bool {
        self.tasks
            .get(subject)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn active_count(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn poll_loop<T, F>(tx: watch::Sender<T>, period: Duration, mut read: F, label: String)
where
    T: PartialEq,
    F: FnMut() -> Result<T, StorageError>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        // Observers going away ends the timer as soon as it is noticed.
        tokio::select! {
            _ = tx.closed() => {
                crate::tlog!("sync: {} has no observers, stopping", label);
                break;
            }
            _ = ticker.tick() => {}
        }
        match read() {
            Ok(value) => {
                tx.send_if_modified(|current| {
                    if *current == value {
                        false
                    } else {
                        *current = value;
                        true
                    }
                });
            }
            Err(e) => crate::tlog!("sync: poll of {} failed: {}", label, e),
        }
    }
}
