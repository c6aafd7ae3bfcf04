//! Backends an entry can be written to: tracing (in-process filtering),
//! append-only file, journald (via `systemd-cat`, mirroring the
//! teacher's `Command::new("journalctl")` shell-out idiom), and an
//! in-memory buffer for tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::entry::LogEntry;
use crate::level::Level;

#[async_trait]
pub trait Backend: Send + Sync {
    async fn write(&self, entry: &LogEntry);
}

/// Forwards into the process-wide `tracing` subscriber so entries honor
/// whatever `RUST_LOG`/`JACK_DEBUG` filtering `tracing_subscriber::fmt`
/// was configured with at startup.
pub struct TracingBackend;

#[async_trait]
impl Backend for TracingBackend {
    async fn write(&self, entry: &LogEntry) {
        match entry.level {
            Level::Debug => tracing::debug!(component = %entry.component, "{}", entry.message),
            Level::Info => tracing::info!(component = %entry.component, "{}", entry.message),
            Level::Warn => tracing::warn!(component = %entry.component, "{}", entry.message),
            Level::Error => tracing::error!(component = %entry.component, "{}", entry.message),
        }
    }
}

/// Append-only text backend. Rotation is left to an outside tool (e.g.
/// logrotate) per spec; this backend only ever appends.
pub struct FileBackend {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        FileBackend { path, lock: Mutex::new(()) }
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn write(&self, entry: &LogEntry) {
        let _guard = self.lock.lock().await;
        let line = entry.to_line();
        if let Ok(mut file) = tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await {
            let _ = file.write_all(line.as_bytes()).await;
            let _ = file.write_all(b"\n").await;
        }
    }
}

/// Ships entries to journald by piping a line into `systemd-cat`,
/// tagged with the daemon identifier and mapped to a syslog priority.
/// Spawning a short-lived helper process per entry mirrors the
/// teacher's `tokio::process::Command` shell-out style elsewhere in the
/// stack (`journalctl`, `btrfs`).
pub struct JournaldBackend {
    identifier: String,
}

impl JournaldBackend {
    pub fn new(identifier: impl Into<String>) -> Self {
        JournaldBackend { identifier: identifier.into() }
    }
}

#[async_trait]
impl Backend for JournaldBackend {
    async fn write(&self, entry: &LogEntry) {
        let priority = entry.level.syslog_priority().to_string();
        let child = Command::new("systemd-cat")
            .arg("-t")
            .arg(&self.identifier)
            .arg("-p")
            .arg(&priority)
            .stdin(Stdio::piped())
            .spawn();

        let mut child = match child {
            Ok(c) => c,
            Err(_) => return,
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(entry.to_line().as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
        }
        let _ = child.wait().await;
    }
}

/// In-memory ring used by tests that assert on emitted entries without
/// touching the filesystem or journald.
pub struct MemoryBackend {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend { entries: Arc::new(Mutex::new(Vec::new())) }
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write(&self, entry: &LogEntry) {
        self.entries.lock().await.push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn sample(level: Level) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now(),
            level,
            component: "test".into(),
            message: "hello".into(),
            fields: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn memory_backend_collects_entries_in_order() {
        let backend = MemoryBackend::new();
        backend.write(&sample(Level::Info)).await;
        backend.write(&sample(Level::Error)).await;
        let entries = backend.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::Info);
        assert_eq!(entries[1].level, Level::Error);
    }

    #[tokio::test]
    async fn file_backend_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jack.log");
        let backend = FileBackend::new(path.clone());
        backend.write(&sample(Level::Debug)).await;
        backend.write(&sample(Level::Warn)).await;
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
