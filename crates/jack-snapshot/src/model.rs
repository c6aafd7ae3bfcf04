//! The snapshot document itself: what `capture` records and what
//! `restore`/the checkpoint ring persist to disk.

use chrono::{DateTime, Utc};
use jack_osadapters::RouteScope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Auto,
    Manual,
}

impl CheckpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointKind::Auto => "auto",
            CheckpointKind::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlanSnapshot {
    pub vlan_id: u16,
    pub parent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub mtu: u32,
    pub up: bool,
    /// `"a.b.c.d/len"` strings, in kernel-reported order.
    pub addresses: Vec<String>,
    /// Gateway of the default route egressing through this interface, if any.
    pub default_gateway: Option<String>,
    /// Port names, only set for bridges.
    pub bridge_ports: Option<Vec<String>>,
    /// Set for VLAN sub-interfaces.
    pub vlan: Option<VlanSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSnapshot {
    /// `"default"` or a CIDR string.
    pub destination: String,
    pub gateway: Option<String>,
    /// Egress device name, resolved from the index at capture time.
    pub device: Option<String>,
    pub metric: u32,
    pub table: u32,
    pub scope: RouteScope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub id: String,
    pub kind: CheckpointKind,
    pub created_at: DateTime<Utc>,
    pub ip_forward: bool,
    pub interfaces: Vec<InterfaceSnapshot>,
    pub routes: Vec<RouteSnapshot>,
    /// Best-effort JSON dump of the daemon-owned nftables table; absence
    /// (no `nft` binary, no such table yet) is not an error.
    pub nftables: Option<String>,
}

/// `scope` for `RestoreSnapshot`: a set drawn from `{all, ipforward,
/// interfaces, routes}`, with `all` implying all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreScope {
    pub ip_forward: bool,
    pub interfaces: bool,
    pub routes: bool,
}

impl RestoreScope {
    pub fn all() -> Self {
        RestoreScope {
            ip_forward: true,
            interfaces: true,
            routes: true,
        }
    }

    pub fn from_names(names: &[&str]) -> Result<Self, jack_core::JackError> {
        if names.iter().any(|n| *n == "all") {
            return Ok(Self::all());
        }
        let mut scope = RestoreScope::default();
        for name in names {
            match *name {
                "ipforward" => scope.ip_forward = true,
                "interfaces" => scope.interfaces = true,
                "routes" => scope.routes = true,
                other => {
                    return Err(jack_core::JackError::validation(format!(
                        "unknown restore scope '{other}'"
                    )))
                }
            }
        }
        Ok(scope)
    }
}

/// Outcome of a `RestoreSnapshot` call. Errors in one subsystem don't halt
/// the others, so they're collected here instead of short-circuiting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreReport {
    pub errors: Vec<String>,
    /// Interfaces that were in the snapshot but no longer exist; restore
    /// is best-effort and does not recreate deleted interfaces.
    pub manual_intervention: Vec<String>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.manual_intervention.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub id: String,
    pub kind: CheckpointKind,
    pub created_at: DateTime<Utc>,
}
