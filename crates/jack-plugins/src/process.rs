//! A single spawned plugin process: its child handle, the dialed RPC
//! connection, and typed wrappers for every by-plugin RPC method.
//! Modeled on `op-plugins`' one-object-per-registered-plugin shape
//! (`registry.rs::RegisteredPlugin`), with the in-process trait object
//! swapped for a subprocess + socket connection.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::UnixStream;
use std::sync::atomic::AtomicU64;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use jack_core::{JackError, Result};

use crate::handshake::perform_handshake;
use crate::rpc::{CliCommand, LogEvent, PluginMetadata, PluginStatus, RpcRequest, RpcResponse, ServiceDescriptor};
use crate::wire::{read_json, write_json};

const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const TEARDOWN_WAIT: Duration = Duration::from_secs(5);

pub struct PluginProcess {
    child: Mutex<Child>,
    conn: Mutex<UnixStream>,
    next_id: AtomicU64,
}

impl PluginProcess {
    /// Spawns `path`, performs the stdio handshake, and dials the
    /// endpoint the plugin handed back.
    pub async fn spawn(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(JackError::Io)?;

        let mut stdin = child.stdin.take().ok_or_else(|| JackError::Plugin("plugin exposed no stdin".into()))?;
        let mut stdout = child.stdout.take().ok_or_else(|| JackError::Plugin("plugin exposed no stdout".into()))?;

        let endpoint = timeout(RPC_TIMEOUT, perform_handshake(&mut stdin, &mut stdout))
            .await
            .map_err(|_| JackError::Plugin("plugin handshake timed out".into()))??;

        let conn = timeout(RPC_TIMEOUT, UnixStream::connect(&endpoint))
            .await
            .map_err(|_| JackError::Plugin(format!("timed out dialing plugin endpoint {endpoint}")))?
            .map_err(JackError::Io)?;

        Ok(Self { child: Mutex::new(child), conn: Mutex::new(conn), next_id: AtomicU64::new(1) })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let request = RpcRequest { id, method: method.to_string(), params };

        let mut conn = self.conn.lock().await;
        timeout(RPC_TIMEOUT, write_json(&mut *conn, &request))
            .await
            .map_err(|_| JackError::Plugin(format!("timed out writing {method} request")))??;
        let response: RpcResponse = timeout(RPC_TIMEOUT, read_json(&mut *conn))
            .await
            .map_err(|_| JackError::Plugin(format!("timed out awaiting {method} response")))??;
        drop(conn);

        if response.id != id {
            return Err(JackError::Plugin(format!(
                "response id {} did not match request id {id}",
                response.id
            )));
        }
        match (response.result, response.error) {
            (Some(result), _) => Ok(result),
            (None, Some(err)) => Err(JackError::Plugin(err)),
            (None, None) => Ok(Value::Null),
        }
    }

    pub async fn metadata(&self) -> Result<PluginMetadata> {
        let value = self.call("Metadata", Value::Null).await?;
        serde_json::from_value(value).map_err(JackError::from)
    }

    pub async fn apply_config(&self, config: Value) -> Result<()> {
        self.call("ApplyConfig", config).await.map(|_| ())
    }

    pub async fn validate_config(&self, config: Value) -> Result<Vec<String>> {
        let value = self.call("ValidateConfig", config).await?;
        serde_json::from_value(value).map_err(JackError::from)
    }

    pub async fn flush(&self) -> Result<()> {
        self.call("Flush", Value::Null).await.map(|_| ())
    }

    pub async fn status(&self) -> Result<PluginStatus> {
        let value = self.call("Status", Value::Null).await?;
        serde_json::from_value(value).map_err(JackError::from)
    }

    pub async fn execute_cli_command(&self, command: &str, args: Vec<String>) -> Result<Value> {
        self.call("ExecuteCLICommand", json!({ "command": command, "args": args })).await
    }

    pub async fn on_log_event(&self, event: &LogEvent) -> Result<()> {
        self.call("OnLogEvent", serde_json::to_value(event)?).await.map(|_| ())
    }

    pub async fn get_provided_services(&self) -> Result<Vec<ServiceDescriptor>> {
        let value = self.call("GetProvidedServices", Value::Null).await?;
        serde_json::from_value(value).map_err(JackError::from)
    }

    pub async fn call_service(&self, service: &str, params: Value) -> Result<Value> {
        self.call("CallService", json!({ "service": service, "params": params })).await
    }

    pub async fn set_daemon_service(&self, endpoint: &str) -> Result<()> {
        self.call("SetDaemonService", json!({ "endpoint": endpoint })).await.map(|_| ())
    }

    pub async fn verify_daemon_service(&self, token: &str) -> Result<bool> {
        let value = self.call("VerifyDaemonService", json!({ "token": token })).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn cli_commands(&self) -> Result<Vec<CliCommand>> {
        Ok(self.metadata().await?.cli_commands)
    }

    /// Flush, then close the RPC connection, send the process a
    /// terminate signal, wait briefly, and force-kill if it hasn't
    /// exited.
    pub async fn teardown(&self) -> Result<()> {
        let _ = self.flush().await;

        let mut child = self.child.lock().await;
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }

        match timeout(TEARDOWN_WAIT, child.wait()).await {
            Ok(Ok(_)) => Ok(()),
            _ => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(())
            }
        }
    }
}
