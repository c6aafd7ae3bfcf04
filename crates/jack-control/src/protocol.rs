//! Control-socket wire types: one JSON object per message, directly
//! modeled on spec.md §4.8's request/response schema. Framing (the
//! 4-byte big-endian length prefix) lives in [`crate::framing`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub plugin: Option<String>,
    #[serde(default)]
    pub cli_command: Option<String>,
    #[serde(default)]
    pub cli_args: Option<Vec<String>>,
    #[serde(default)]
    pub checkpoint_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok() -> Self {
        Response { success: true, ..Default::default() }
    }

    pub fn ok_with_data(data: Value) -> Self {
        Response { success: true, data: Some(data), ..Default::default() }
    }

    pub fn ok_with_message(message: impl Into<String>) -> Self {
        Response { success: true, message: Some(message.into()), ..Default::default() }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Response { success: false, error: Some(error.into()), ..Default::default() }
    }

    /// Builds an error response from a `JackError`, keeping its
    /// `kind_name()` tag separate from the human-readable message the
    /// way spec.md §7's propagation policy describes.
    pub fn from_error(err: &jack_core::JackError) -> Self {
        Response {
            success: false,
            error: Some(format!("{}: {}", err.kind_name(), err)),
            ..Default::default()
        }
    }
}
