//! Reverse RPC channel: lets a plugin call another plugin's service
//! through the daemon as broker. The host, not the plugin, owns the
//! socket — it binds a fresh listener per plugin, hands the plugin the
//! path via `SetDaemonService`, and waits for the plugin to dial in.
//!
//! Handshake sequence: Accept-ready (listener bound and polling) then
//! Dial (plugin connects) then Verify (host confirms the connection by
//! issuing `VerifyDaemonService` back over the plugin's *main* RPC
//! channel, carrying a token the plugin must echo). Accept-ready and
//! Dial are each modeled with their own `tokio::sync::oneshot` so the
//! registry can await "is the listener actually live" separately from
//! "has the plugin connected yet" without polling either.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::oneshot;

use jack_core::{JackError, Result};

use crate::rpc::{RpcRequest, RpcResponse};
use crate::wire::{read_json, write_json};

/// Implemented by the registry; routes a `CallService` request arriving
/// on a plugin's reverse connection to the named target plugin's main
/// RPC channel.
#[async_trait]
pub trait ServiceRouter: Send + Sync {
    async fn call_service(&self, target_namespace: &str, service: &str, params: Value) -> Result<Value>;
}

pub struct ReverseBroker {
    dir: PathBuf,
}

impl ReverseBroker {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Bind a reverse-channel listener for `plugin_id` and return its
    /// socket path plus a handle that resolves once the plugin dials in.
    pub async fn prepare(&self, plugin_id: &str) -> Result<(String, PendingDial)> {
        let path = self.dir.join(format!("{plugin_id}.reverse.sock"));
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).map_err(JackError::Io)?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (dial_tx, dial_rx) = oneshot::channel();
        tokio::spawn(async move {
            let _ = ready_tx.send(());
            if let Ok((stream, _)) = listener.accept().await {
                let _ = dial_tx.send(stream);
            }
        });

        ready_rx
            .await
            .map_err(|_| JackError::Plugin("reverse listener task died before accepting".into()))?;

        Ok((path.to_string_lossy().into_owned(), PendingDial { dial_rx }))
    }
}

pub struct PendingDial {
    dial_rx: oneshot::Receiver<UnixStream>,
}

impl PendingDial {
    /// Waits for the plugin to dial the endpoint handed to it via
    /// `SetDaemonService`. Times out rather than hanging forever on a
    /// plugin that never connects.
    pub async fn wait_for_dial(self, timeout: Duration) -> Result<UnixStream> {
        match tokio::time::timeout(timeout, self.dial_rx).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(_)) => Err(JackError::Plugin(
                "reverse listener task dropped before a connection arrived".into(),
            )),
            Err(_) => Err(JackError::Plugin(
                "plugin did not dial the reverse endpoint in time".into(),
            )),
        }
    }
}

/// Serves `Ping`/`CallService` requests arriving on a plugin's reverse
/// connection until the plugin closes it. Runs for the lifetime of the
/// plugin process, spawned once the connection is verified.
pub async fn serve_reverse_channel(mut stream: UnixStream, router: Arc<dyn ServiceRouter>) {
    loop {
        let request: RpcRequest = match read_json(&mut stream).await {
            Ok(r) => r,
            Err(_) => return,
        };

        let response = match request.method.as_str() {
            "Ping" => RpcResponse::ok(request.id, Value::Bool(true)),
            "CallService" => {
                let target = request.params.get("target").and_then(Value::as_str).unwrap_or_default();
                let service = request.params.get("service").and_then(Value::as_str).unwrap_or_default();
                let params = request.params.get("params").cloned().unwrap_or(Value::Null);
                match router.call_service(target, service, params).await {
                    Ok(result) => RpcResponse::ok(request.id, result),
                    Err(e) => RpcResponse::err(request.id, e.to_string()),
                }
            }
            other => RpcResponse::err(request.id, format!("unknown reverse method: {other}")),
        };

        if write_json(&mut stream, &response).await.is_err() {
            return;
        }
    }
}
