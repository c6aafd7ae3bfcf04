//! Plain data shapes returned by the `Netlink` adapter. Kept independent of
//! `netlink-packet-route`'s wire types so the fake implementation doesn't
//! need to construct real netlink messages.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub index: u32,
    pub name: String,
    /// `None` for a plain physical link; `Some("bridge" | "vlan" | "veth" | ...)` otherwise.
    pub kind: Option<String>,
    pub mtu: u32,
    pub up: bool,
    pub mac_address: Option<String>,
    /// Bridge this link is enslaved to, if any.
    pub master_index: Option<u32>,
    /// Set for `kind == "vlan"` links.
    pub vlan_id: Option<u16>,
    /// The VLAN's parent link, set alongside `vlan_id`.
    pub parent_index: Option<u32>,
}

impl LinkInfo {
    pub fn is_vlan(&self) -> bool {
        self.kind.as_deref() == Some("vlan")
    }

    pub fn is_bridge(&self) -> bool {
        self.kind.as_deref() == Some("bridge")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrInfo {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteScope {
    Universe,
    Site,
    Link,
    Host,
    Nowhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteProtocol {
    Kernel,
    Boot,
    Static,
    Dhcp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteInfo {
    /// `None` destination means the default route (0.0.0.0/0).
    pub destination: Option<(Ipv4Addr, u8)>,
    pub gateway: Option<Ipv4Addr>,
    pub oif_index: Option<u32>,
    pub metric: u32,
    pub table: u32,
    pub scope: RouteScope,
    pub protocol: RouteProtocol,
}

impl RouteInfo {
    pub fn is_default(&self) -> bool {
        self.destination.is_none()
    }

    /// Routes the kernel installs on its own (link-scope subnet routes,
    /// `proto kernel`) that the network module must never touch.
    pub fn is_kernel_owned(&self) -> bool {
        self.protocol == RouteProtocol::Kernel && self.scope == RouteScope::Link
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborInfo {
    pub link_index: u32,
    pub destination: Ipv4Addr,
    pub lladdr: Option<[u8; 6]>,
}
