//! Typed views of the `interfaces`/`routes` namespace documents. Parsed
//! from `jack_core::Value` via its lossless `serde_json::Value` bridge —
//! these structs only exist inside `jack-network`, the rest of the
//! daemon keeps passing the untyped `Value` around.

use jack_core::{JackError, Result, Value};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfaceType {
    Physical,
    Bridge,
    Vlan,
    Wireguard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Static,
    Dhcp,
    #[default]
    None,
}

fn default_mtu() -> u32 {
    1500
}

fn default_true() -> bool {
    true
}

fn default_metric() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceSpec {
    #[serde(rename = "type")]
    pub iface_type: IfaceType,
    pub device: String,
    pub device_name: Option<String>,
    pub vlan_id: Option<u16>,
    #[serde(default)]
    pub bridge_ports: Vec<String>,
    #[serde(default)]
    pub protocol: Protocol,
    pub ipaddr: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    #[serde(default = "default_metric")]
    pub metric: u32,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl InterfaceSpec {
    pub fn from_value(v: &Value) -> Result<Self> {
        serde_json::from_value(v.to_json())
            .map_err(|e| JackError::Validation(vec![format!("interface spec: {e}")]))
    }

    /// The kernel name a bridge is realized under: `device` if set,
    /// otherwise the entity name. `device_name` is VLAN's own "created
    /// virtual name" attribute and plays no part in this lookup.
    pub fn kernel_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.device.as_str() {
            "" => fallback,
            device => device,
        }
    }
}

fn default_table() -> u32 {
    254
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteSpec {
    pub destination: String,
    pub gateway: Option<String>,
    pub interface: Option<String>,
    #[serde(default)]
    pub metric: u32,
    #[serde(default = "default_table")]
    pub table: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RouteSpec {
    pub fn from_value(v: &Value) -> Result<Self> {
        serde_json::from_value(v.to_json())
            .map_err(|e| JackError::Validation(vec![format!("route spec: {e}")]))
    }
}

/// `interfaces.json`/`routes.json` are objects keyed by entity name; walk
/// them into `(name, typed spec)` pairs, skipping (and logging) entries
/// that don't parse rather than failing the whole reconciliation pass.
pub fn parse_entities<T>(
    value: &Value,
    parse: impl Fn(&Value) -> Result<T>,
) -> Vec<(String, T)> {
    let Some(obj) = value.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (name, entry) in obj {
        match parse(entry) {
            Ok(spec) => out.push((name.clone(), spec)),
            Err(e) => tracing::warn!(entity = %name, error = %e, "skipping malformed entity"),
        }
    }
    out
}
