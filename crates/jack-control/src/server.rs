//! The control socket itself: bind, accept, one task per connection.
//! Directly grounded on `op-jsonrpc/src/server.rs`'s `run_unix`/
//! `handle_unix_connection` shape, with newline-delimited JSON replaced
//! by the length-prefixed framing spec.md §4.8 calls for, and a single
//! request/response per connection rather than the teacher's
//! read-until-EOF loop (clients here don't pipeline).

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use jack_core::{JackError, Result};
use jack_logger::{JackLogger, LogEntry, Subscriber};

use crate::dispatch::Handlers;
use crate::framing::{read_json, write_json};
use crate::protocol::Request;

const LOG_STREAM_CHANNEL_CAPACITY: usize = 256;

struct ChannelSubscriber {
    tx: mpsc::Sender<LogEntry>,
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn on_log_event(&self, entry: LogEntry) {
        let _ = self.tx.send(entry).await;
    }
}

pub struct ControlServer {
    socket_path: PathBuf,
    handlers: Arc<Handlers>,
    logger: &'static JackLogger,
}

impl ControlServer {
    pub fn new(socket_path: impl Into<PathBuf>, handlers: Arc<Handlers>, logger: &'static JackLogger) -> Self {
        ControlServer { socket_path: socket_path.into(), handlers, logger }
    }

    pub async fn run(&self) -> Result<()> {
        let path: &Path = &self.socket_path;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.ok();
        }
        if path.exists() {
            tokio::fs::remove_file(path).await.ok();
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| JackError::Io(std::io::Error::new(e.kind(), format!("bind {}: {e}", path.display()))))?;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;

        info!(path = %path.display(), "control socket listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let handlers = self.handlers.clone();
            let logger = self.logger;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, handlers, logger).await {
                    debug!(error = %e, "control connection error");
                }
            });
        }
    }
}

async fn handle_connection(stream: UnixStream, handlers: Arc<Handlers>, logger: &'static JackLogger) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let request: Request = read_json(&mut reader).await?;

    if request.command == "log-stream" {
        return serve_log_stream(reader, writer, logger).await;
    }

    let response = handlers.dispatch(request).await;
    write_json(&mut writer, &response).await
}

/// Promotes the connection into streaming mode: every entry the logger
/// emits from here on is written as its own frame until the client
/// closes its side of the socket.
async fn serve_log_stream(
    mut reader: tokio::net::unix::OwnedReadHalf,
    mut writer: tokio::net::unix::OwnedWriteHalf,
    logger: &'static JackLogger,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(LOG_STREAM_CHANNEL_CAPACITY);
    let subscriber = Arc::new(ChannelSubscriber { tx });
    let subscription_id = logger.subscribe(subscriber).await;

    let mut probe = [0u8; 1];
    loop {
        tokio::select! {
            entry = rx.recv() => {
                match entry {
                    Some(entry) => {
                        if write_json(&mut writer, &entry).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            result = reader.read(&mut probe) => {
                match result {
                    Ok(0) | Err(_) => break,
                    Ok(_) => warn!("log-stream client sent unexpected data, ignoring"),
                }
            }
        }
    }

    logger.unsubscribe(subscription_id).await;
    Ok(())
}
