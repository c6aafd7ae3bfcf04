//! The reconciliation engine: the only component that mutates kernel
//! network state, grounded throughout on `op-network/src/rtnetlink.rs`.

pub mod bootstrap;
pub mod model;
pub mod netmask;
pub mod reconcile;
pub mod routes;
pub mod virtual_iface;

use std::sync::Arc;

use async_trait::async_trait;
use jack_config_store::InterfaceBootstrap;
use jack_core::{Result, Value};
use jack_osadapters::OsAdapters;

pub use model::{IfaceType, InterfaceSpec, Protocol, RouteSpec};

const IP_FORWARD_SYSCTL: &str = "net.ipv4.ip_forward";

pub struct NetworkManager {
    adapters: Arc<OsAdapters>,
}

impl NetworkManager {
    pub fn new(adapters: Arc<OsAdapters>) -> Self {
        NetworkManager { adapters }
    }

    /// Idempotent: writes `1` unconditionally, matching spec.md §4.5 —
    /// the sysctl write itself is already idempotent in the kernel.
    pub async fn enable_ip_forwarding(&self) -> Result<()> {
        self.adapters.sysctl.write(IP_FORWARD_SYSCTL, "1").await
    }

    pub async fn apply_interface_config(&self, name: &str, spec: &InterfaceSpec) -> Result<()> {
        reconcile::apply_interface_config(&self.adapters, name, spec).await
    }

    /// `config` is the `routes` namespace document; each entry is parsed
    /// independently so one malformed route doesn't block the rest.
    pub async fn apply_routes_config(&self, config: &Value) -> Result<()> {
        let parsed = model::parse_entities(config, RouteSpec::from_value);
        routes::apply_routes_config(&self.adapters, &parsed).await
    }

    /// Parses the `interfaces` namespace document and returns
    /// `(name, spec)` pairs in an order that respects VLAN-after-parent,
    /// for `jack-apply`'s orchestration step. Parent/child edges are
    /// exposed separately via [`vlan_dependency_edges`] for callers that
    /// want to run their own topological sort alongside other ordering
    /// constraints (e.g. plugin dependencies).
    pub fn parse_interfaces(config: &Value) -> Vec<(String, InterfaceSpec)> {
        model::parse_entities(config, InterfaceSpec::from_value)
    }

    /// `(child, parent)` edges: a VLAN must be applied after the
    /// interface named in its `device` field, if that parent is itself
    /// one of the configured interfaces.
    pub fn vlan_dependency_edges(interfaces: &[(String, InterfaceSpec)]) -> Vec<(String, String)> {
        let names: std::collections::HashSet<&str> =
            interfaces.iter().map(|(n, _)| n.as_str()).collect();
        interfaces
            .iter()
            .filter(|(_, spec)| spec.iface_type == IfaceType::Vlan)
            .filter(|(_, spec)| names.contains(spec.device.as_str()))
            .map(|(name, spec)| (name.clone(), spec.device.clone()))
            .collect()
    }
}

#[async_trait]
impl InterfaceBootstrap for NetworkManager {
    async fn bootstrap_interfaces(&self) -> Result<Value> {
        bootstrap::bootstrap_interfaces(&self.adapters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem, FakeNetlink, FakeSubprocess, FakeSysctl};

    fn fake_manager() -> NetworkManager {
        NetworkManager::new(Arc::new(OsAdapters {
            netlink: Arc::new(FakeNetlink::new()),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: Arc::new(FakeClock::new()),
        }))
    }

    #[tokio::test]
    async fn enable_ip_forwarding_writes_sysctl() {
        let mgr = fake_manager();
        mgr.enable_ip_forwarding().await.unwrap();
        assert_eq!(mgr.adapters.sysctl.read(IP_FORWARD_SYSCTL).await.unwrap(), "1");
    }

    #[test]
    fn vlan_edges_only_include_in_namespace_parents() {
        let interfaces = vec![
            (
                "eth0".to_string(),
                InterfaceSpec {
                    iface_type: IfaceType::Physical,
                    device: "eth0".into(),
                    device_name: None,
                    vlan_id: None,
                    bridge_ports: vec![],
                    protocol: Protocol::None,
                    ipaddr: None,
                    netmask: None,
                    gateway: None,
                    metric: 100,
                    mtu: 1500,
                    enabled: true,
                },
            ),
            (
                "eth0.10".to_string(),
                InterfaceSpec {
                    iface_type: IfaceType::Vlan,
                    device: "eth0".into(),
                    device_name: Some("eth0.10".into()),
                    vlan_id: Some(10),
                    bridge_ports: vec![],
                    protocol: Protocol::None,
                    ipaddr: None,
                    netmask: None,
                    gateway: None,
                    metric: 100,
                    mtu: 1500,
                    enabled: true,
                },
            ),
        ];
        let edges = NetworkManager::vlan_dependency_edges(&interfaces);
        assert_eq!(edges, vec![("eth0.10".to_string(), "eth0".to_string())]);
    }
}
