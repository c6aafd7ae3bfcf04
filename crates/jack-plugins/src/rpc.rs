//! Wire types for the RPC surface a plugin exposes to the daemon and
//! the smaller reverse surface the daemon exposes back to plugins.
//! Modeled on `op-jsonrpc/src/protocol.rs`'s request/response envelope,
//! narrowed to the fixed method set plugins actually need.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HANDSHAKE_MAGIC: &[u8; 4] = b"JACK";
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeHello {
    pub magic: String,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeAck {
    pub protocol_version: u32,
    /// Filesystem path of the unix socket the plugin is listening on
    /// (or will dial, for the reverse handshake) for the RPC channel.
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self { id, result: None, error: Some(message.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliCommand {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Returned by `Metadata`. Drives namespace routing, CLI command
/// registration, config defaulting, and dependency-ordered startup in
/// the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub namespace: String,
    pub version: String,
    pub description: String,
    pub category: String,
    pub config_path: String,
    #[serde(default)]
    pub default_config: Value,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub cli_commands: Vec<CliCommand>,
    #[serde(default)]
    pub required_services: Vec<String>,
    #[serde(default)]
    pub provided_services: Vec<ServiceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginStatus {
    pub healthy: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: String,
    pub target: String,
    pub message: String,
}
