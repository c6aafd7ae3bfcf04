//! `CaptureSystemSnapshot`: read-only walk over the current kernel state.

use std::sync::Arc;

use jack_core::Result;
use jack_osadapters::OsAdapters;

use crate::model::{CheckpointKind, InterfaceSnapshot, RouteSnapshot, SystemSnapshot, VlanSnapshot};

const IP_FORWARD_SYSCTL: &str = "net.ipv4.ip_forward";
const NFT_TABLE: &[&str] = &["-j", "list", "table", "inet", "jack"];

pub async fn capture_system_snapshot(
    adapters: &Arc<OsAdapters>,
    id: String,
    kind: CheckpointKind,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Result<SystemSnapshot> {
    let ip_forward = adapters
        .sysctl
        .read(IP_FORWARD_SYSCTL)
        .await
        .map(|v| v.trim() == "1")
        .unwrap_or(false);

    let links = adapters.netlink.link_list().await?;
    let routes = adapters.netlink.route_list().await?;

    let mut interfaces = Vec::new();
    for link in links.iter().filter(|l| l.name != "lo") {
        let addrs = adapters.netlink.addr_list(link.index).await?;
        let addresses = addrs
            .iter()
            .map(|a| format!("{}/{}", a.address, a.prefix_len))
            .collect();

        let default_gateway = routes
            .iter()
            .find(|r| r.is_default() && r.oif_index == Some(link.index))
            .and_then(|r| r.gateway)
            .map(|g| g.to_string());

        let bridge_ports = if link.is_bridge() {
            Some(
                links
                    .iter()
                    .filter(|l| l.master_index == Some(link.index))
                    .map(|l| l.name.clone())
                    .collect(),
            )
        } else {
            None
        };

        let vlan = if link.is_vlan() {
            link.vlan_id.map(|vlan_id| VlanSnapshot {
                vlan_id,
                parent: link
                    .parent_index
                    .and_then(|idx| links.iter().find(|l| l.index == idx))
                    .map(|l| l.name.clone())
                    .unwrap_or_default(),
            })
        } else {
            None
        };

        interfaces.push(InterfaceSnapshot {
            name: link.name.clone(),
            mtu: link.mtu,
            up: link.up,
            addresses,
            default_gateway,
            bridge_ports,
            vlan,
        });
    }

    let route_snapshots = routes
        .iter()
        .map(|r| RouteSnapshot {
            destination: r
                .destination
                .map(|(addr, prefix)| format!("{addr}/{prefix}"))
                .unwrap_or_else(|| "default".to_string()),
            gateway: r.gateway.map(|g| g.to_string()),
            device: r
                .oif_index
                .and_then(|idx| links.iter().find(|l| l.index == idx))
                .map(|l| l.name.clone()),
            metric: r.metric,
            table: r.table,
            scope: r.scope,
        })
        .collect();

    let nftables = match adapters.subprocess.run("nft", &to_owned(NFT_TABLE), None).await {
        Ok(output) if output.success() => Some(output.stdout),
        _ => None,
    };

    Ok(SystemSnapshot {
        id,
        kind,
        created_at,
        ip_forward,
        interfaces,
        routes: route_snapshots,
        nftables,
    })
}

fn to_owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem, FakeNetlink, FakeSubprocess, FakeSysctl};
    use jack_osadapters::LinkInfo;

    fn fake_adapters() -> Arc<OsAdapters> {
        Arc::new(OsAdapters {
            netlink: Arc::new(FakeNetlink::new()),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: Arc::new(FakeClock::new()),
        })
    }

    async fn adapters_with_eth0() -> Arc<OsAdapters> {
        let netlink = FakeNetlink::new();
        netlink
            .seed_link(LinkInfo {
                index: 50,
                name: "eth0".into(),
                kind: None,
                mtu: 1500,
                up: true,
                mac_address: None,
                master_index: None,
                vlan_id: None,
                parent_index: None,
            })
            .await;
        Arc::new(OsAdapters {
            netlink: Arc::new(netlink),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: Arc::new(FakeClock::new()),
        })
    }

    #[tokio::test]
    async fn captures_ip_forward_and_skips_loopback() {
        let adapters = fake_adapters();
        adapters.sysctl.write("net.ipv4.ip_forward", "1").await.unwrap();
        let snapshot = capture_system_snapshot(
            &adapters,
            "manual-1".into(),
            CheckpointKind::Manual,
            chrono::Utc::now(),
        )
        .await
        .unwrap();
        assert!(snapshot.ip_forward);
        assert!(snapshot.interfaces.iter().all(|i| i.name != "lo"));
    }

    #[tokio::test]
    async fn captures_bridge_port_set() {
        let adapters = adapters_with_eth0().await;
        let nl = &adapters.netlink;
        let br = nl.link_add_bridge("br-lan").await.unwrap();
        let eth0 = nl.link_get("eth0").await.unwrap().unwrap().index;
        nl.link_set_master(eth0, br).await.unwrap();
        let snapshot = capture_system_snapshot(
            &adapters,
            "manual-1".into(),
            CheckpointKind::Manual,
            chrono::Utc::now(),
        )
        .await
        .unwrap();
        let bridge = snapshot.interfaces.iter().find(|i| i.name == "br-lan").unwrap();
        assert_eq!(bridge.bridge_ports, Some(vec!["eth0".to_string()]));
    }
}
