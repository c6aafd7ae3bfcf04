//! Structured logger: leveled entries with named components, multiple
//! backends, and asynchronous plugin fan-out. Built on `tracing` +
//! `tracing-subscriber` (the teacher's logging stack) for in-process
//! filtering; `JackLogger` is the facade on top that additionally
//! writes to file/journald/memory backends and fans entries out to
//! subscribers (plugins, or a control-socket `log-stream` client).

pub mod backend;
pub mod entry;
pub mod level;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::{mpsc, RwLock};

pub use backend::{Backend, FileBackend, JournaldBackend, MemoryBackend, TracingBackend};
pub use entry::LogEntry;
pub use level::Level;

/// Something that wants a copy of every entry at or above the logger's
/// level. Implemented outside this crate (e.g. by a control-socket
/// connection, or an adapter wrapping a plugin's `OnLogEvent` RPC) to
/// avoid this crate depending on `jack-plugins`.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_log_event(&self, entry: LogEntry);
}

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

struct SubscriberHandle {
    tx: mpsc::Sender<LogEntry>,
}

/// Installs the process-wide `tracing_subscriber::fmt` layer. Call once
/// from `jackd::main`; `JACK_DEBUG` forces debug-level output regardless
/// of `RUST_LOG`.
pub fn init_tracing(debug: bool) {
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub struct JackLogger {
    component: String,
    fields: IndexMap<String, String>,
    level_filter: Level,
    backends: Vec<Arc<dyn Backend>>,
    subscribers: Arc<RwLock<HashMap<u64, SubscriberHandle>>>,
    next_subscriber_id: Arc<AtomicU64>,
}

impl JackLogger {
    pub fn new(component: impl Into<String>, level_filter: Level, backends: Vec<Arc<dyn Backend>>) -> Self {
        JackLogger {
            component: component.into(),
            fields: IndexMap::new(),
            level_filter,
            backends,
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_subscriber_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// A logger for a sub-component, carrying this logger's fields
    /// plus any given here.
    pub fn child(&self, component: impl Into<String>, extra_fields: &[(&str, &str)]) -> JackLogger {
        let mut fields = self.fields.clone();
        for (k, v) in extra_fields {
            fields.insert(k.to_string(), v.to_string());
        }
        JackLogger {
            component: component.into(),
            fields,
            level_filter: self.level_filter,
            backends: self.backends.clone(),
            subscribers: self.subscribers.clone(),
            next_subscriber_id: self.next_subscriber_id.clone(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message, &[]);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, &[]);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message, &[]);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message, &[]);
    }

    pub fn log(&self, level: Level, message: impl Into<String>, extra_fields: &[(&str, &str)]) {
        if level < self.level_filter {
            return;
        }
        let mut fields = self.fields.clone();
        for (k, v) in extra_fields {
            fields.insert(k.to_string(), v.to_string());
        }
        let entry = LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            component: self.component.clone(),
            message: message.into(),
            fields,
        };
        self.dispatch(entry);
    }

    fn dispatch(&self, entry: LogEntry) {
        for backend in self.backends.clone() {
            let entry = entry.clone();
            tokio::spawn(async move { backend.write(&entry).await });
        }
        let subscribers = self.subscribers.clone();
        tokio::spawn(async move {
            for handle in subscribers.read().await.values() {
                let _ = handle.tx.try_send(entry.clone());
            }
        });
    }

    /// Registers a subscriber and spawns its sequential forwarding
    /// task, fed from a bounded channel so log fan-out never blocks on
    /// a slow subscriber (a full channel just drops the entry).
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> u64 {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, mut rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        self.subscribers.write().await.insert(id, SubscriberHandle { tx });
        tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                subscriber.on_log_event(entry).await;
            }
        });
        id
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.write().await.remove(&id);
    }

    /// Drops every subscriber (closing their forwarding tasks) ahead of
    /// daemon shutdown; backends themselves need no explicit close.
    pub async fn shutdown(&self) {
        self.subscribers.write().await.clear();
    }
}

static GLOBAL: OnceLock<JackLogger> = OnceLock::new();

/// Installs the process-wide logger singleton. Must be called at most
/// once; subsequent calls are no-ops and return the existing instance.
pub fn init(component: impl Into<String>, level_filter: Level, backends: Vec<Arc<dyn Backend>>) -> &'static JackLogger {
    GLOBAL.get_or_init(|| JackLogger::new(component, level_filter, backends))
}

/// The process-wide logger. Panics if [`init`] was never called.
pub fn global() -> &'static JackLogger {
    GLOBAL.get().expect("jack_logger::init was never called")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct CapturingSubscriber {
        seen: Arc<StdMutex<Vec<String>>>,
    }

    #[async_trait]
    impl Subscriber for CapturingSubscriber {
        async fn on_log_event(&self, entry: LogEntry) {
            self.seen.lock().unwrap().push(entry.message);
        }
    }

    #[tokio::test]
    async fn entries_below_filter_level_are_dropped() {
        let memory = Arc::new(MemoryBackend::new());
        let logger = JackLogger::new("test", Level::Warn, vec![memory.clone()]);
        logger.info("should not appear");
        logger.error("should appear");
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let entries = memory.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "should appear");
    }

    #[tokio::test]
    async fn child_logger_inherits_fields() {
        let memory = Arc::new(MemoryBackend::new());
        let parent = JackLogger::new("parent", Level::Debug, vec![memory.clone()])
            .with_field("request_id", "abc");
        let child = parent.child("child", &[("extra", "1")]);
        child.info("hi");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let entries = memory.entries().await;
        assert_eq!(entries[0].component, "child");
        assert_eq!(entries[0].fields.get("request_id").map(String::as_str), Some("abc"));
        assert_eq!(entries[0].fields.get("extra").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn subscriber_receives_fanned_out_entries() {
        let logger = JackLogger::new("test", Level::Debug, vec![]);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let subscriber = Arc::new(CapturingSubscriber { seen: seen.clone() });
        logger.subscribe(subscriber).await;
        logger.info("event one");
        logger.info("event two");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["event one", "event two"]);
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let logger = JackLogger::new("test", Level::Debug, vec![]);
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let subscriber = Arc::new(CapturingSubscriber { seen: seen.clone() });
        let id = logger.subscribe(subscriber).await;
        logger.unsubscribe(id).await;
        logger.info("missed");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
