//! `RestoreSnapshot`: converge kernel state back toward a captured
//! snapshot. Reverse order of apply: routes, then interfaces, then IP
//! forwarding. Errors in one subsystem are collected rather than halting
//! the others, per spec.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use jack_core::Result;
use jack_osadapters::{OsAdapters, RouteInfo, RouteProtocol, RouteScope};

use crate::model::{RestoreReport, RestoreScope, SystemSnapshot};

const IP_FORWARD_SYSCTL: &str = "net.ipv4.ip_forward";

pub async fn restore_snapshot(
    adapters: &Arc<OsAdapters>,
    snapshot: &SystemSnapshot,
    scope: &RestoreScope,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();

    if scope.routes {
        restore_routes(adapters, snapshot, &mut report).await;
    }
    if scope.interfaces {
        restore_interfaces(adapters, snapshot, &mut report).await;
    }
    if scope.ip_forward {
        restore_ip_forward(adapters, snapshot, &mut report).await;
    }

    Ok(report)
}

fn is_protected_route(route: &RouteInfo) -> bool {
    route.protocol == RouteProtocol::Kernel || route.scope == RouteScope::Link
}

/// Resolve a snapshot route's (destination, gateway, device-as-index,
/// metric, table) against the current link set, for comparison against
/// live `RouteInfo`s. Device names that no longer resolve just mean the
/// route can never "already match" — it'll be re-added and fail there if
/// the device truly doesn't exist.
async fn resolve_snapshot_route(
    adapters: &Arc<OsAdapters>,
    route: &crate::model::RouteSnapshot,
) -> (Option<(Ipv4Addr, u8)>, Option<Ipv4Addr>, Option<u32>) {
    let destination = if route.destination == "default" {
        None
    } else {
        route
            .destination
            .split_once('/')
            .and_then(|(ip, prefix)| {
                Some((Ipv4Addr::from_str(ip).ok()?, prefix.parse::<u8>().ok()?))
            })
    };
    let gateway = route.gateway.as_deref().and_then(|g| g.parse().ok());
    let oif_index = match &route.device {
        Some(name) => adapters
            .netlink
            .link_get(name)
            .await
            .ok()
            .flatten()
            .map(|l| l.index),
        None => None,
    };
    (destination, gateway, oif_index)
}

async fn restore_routes(adapters: &Arc<OsAdapters>, snapshot: &SystemSnapshot, report: &mut RestoreReport) {
    let mut resolved_snapshot = Vec::with_capacity(snapshot.routes.len());
    for route in &snapshot.routes {
        resolved_snapshot.push((route, resolve_snapshot_route(adapters, route).await));
    }

    let current = match adapters.netlink.route_list().await {
        Ok(routes) => routes,
        Err(e) => {
            report.errors.push(format!("route list: {e}"));
            return;
        }
    };

    for route in &current {
        if is_protected_route(route) {
            continue;
        }
        let matches_snapshot = resolved_snapshot.iter().any(|(snap, (dest, gw, oif))| {
            route.destination == *dest
                && route.gateway == *gw
                && route.oif_index == *oif
                && route.metric == snap.metric
                && route.table == snap.table
        });
        if !matches_snapshot {
            if let Err(e) = adapters.netlink.route_del(route).await {
                report.errors.push(format!("remove stray route: {e}"));
            }
        }
    }

    for (snap, (destination, gateway, oif_index)) in &resolved_snapshot {
        let already_present = current.iter().any(|r| {
            r.destination == *destination
                && r.gateway == *gateway
                && r.oif_index == *oif_index
                && r.metric == snap.metric
                && r.table == snap.table
        });
        if already_present {
            continue;
        }
        let candidate = RouteInfo {
            destination: *destination,
            gateway: *gateway,
            oif_index: *oif_index,
            metric: snap.metric,
            table: snap.table,
            scope: snap.scope,
            protocol: RouteProtocol::Static,
        };
        if let Err(e) = adapters.netlink.route_add(&candidate).await {
            report
                .errors
                .push(format!("restore route {}: {e}", snap.destination));
        }
    }
}

async fn restore_interfaces(adapters: &Arc<OsAdapters>, snapshot: &SystemSnapshot, report: &mut RestoreReport) {
    let current = match adapters.netlink.link_list().await {
        Ok(links) => links,
        Err(e) => {
            report.errors.push(format!("link list: {e}"));
            return;
        }
    };

    for link in current.iter().filter(|l| l.name != "lo") {
        if !snapshot.interfaces.iter().any(|i| i.name == link.name) {
            if let Err(e) = adapters.netlink.link_delete(link.index).await {
                report
                    .errors
                    .push(format!("remove interface '{}': {e}", link.name));
            }
        }
    }

    for snap in &snapshot.interfaces {
        let Some(link) = current.iter().find(|l| l.name == snap.name) else {
            tracing::warn!(interface = %snap.name, "snapshot interface no longer exists, not recreating");
            report.manual_intervention.push(snap.name.clone());
            continue;
        };

        if link.mtu != snap.mtu {
            if let Err(e) = adapters.netlink.link_set_mtu(link.index, snap.mtu).await {
                report.errors.push(format!("restore mtu on '{}': {e}", snap.name));
            }
        }
        let set_state = if snap.up {
            adapters.netlink.link_set_up(link.index).await
        } else {
            adapters.netlink.link_set_down(link.index).await
        };
        if let Err(e) = set_state {
            report.errors.push(format!("restore admin state on '{}': {e}", snap.name));
        }

        if let Err(e) = reconcile_addresses(adapters, link.index, &snap.addresses).await {
            report.errors.push(format!("restore addresses on '{}': {e}", snap.name));
        }

        if let Some(ports) = &snap.bridge_ports {
            if let Err(e) = reconcile_bridge_ports(adapters, link.index, ports).await {
                report.errors.push(format!("restore bridge ports on '{}': {e}", snap.name));
            }
        }
    }
}

async fn reconcile_addresses(adapters: &Arc<OsAdapters>, index: u32, desired: &[String]) -> Result<()> {
    let desired: Vec<(Ipv4Addr, u8)> = desired
        .iter()
        .filter_map(|cidr| {
            let (ip, prefix) = cidr.split_once('/')?;
            Some((ip.parse().ok()?, prefix.parse().ok()?))
        })
        .collect();

    let current = adapters.netlink.addr_list(index).await?;
    for addr in &current {
        if !desired.iter().any(|(ip, prefix)| *ip == addr.address && *prefix == addr.prefix_len) {
            adapters.netlink.addr_del(index, addr.address, addr.prefix_len).await?;
        }
    }
    for (ip, prefix) in &desired {
        if !current.iter().any(|a| a.address == *ip && a.prefix_len == *prefix) {
            adapters.netlink.addr_add(index, *ip, *prefix).await?;
        }
    }
    Ok(())
}

async fn reconcile_bridge_ports(adapters: &Arc<OsAdapters>, bridge_index: u32, desired: &[String]) -> Result<()> {
    let links = adapters.netlink.link_list().await?;
    let current_ports: Vec<_> = links
        .iter()
        .filter(|l| l.master_index == Some(bridge_index))
        .collect();

    for port in &current_ports {
        if !desired.iter().any(|p| p == &port.name) {
            adapters.netlink.link_set_nomaster(port.index).await?;
        }
    }
    for name in desired {
        if !current_ports.iter().any(|p| &p.name == name) {
            if let Some(port) = adapters.netlink.link_get(name).await? {
                adapters.netlink.link_set_master(port.index, bridge_index).await?;
            }
        }
    }
    Ok(())
}

async fn restore_ip_forward(adapters: &Arc<OsAdapters>, snapshot: &SystemSnapshot, report: &mut RestoreReport) {
    let value = if snapshot.ip_forward { "1" } else { "0" };
    if let Err(e) = adapters.sysctl.write(IP_FORWARD_SYSCTL, value).await {
        report.errors.push(format!("restore ip_forward: {e}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::{FakeClock, FakeFilesystem, FakeNetlink, FakeSubprocess, FakeSysctl};
    use jack_osadapters::LinkInfo;

    fn link(index: u32, name: &str) -> LinkInfo {
        LinkInfo {
            index,
            name: name.to_string(),
            kind: None,
            mtu: 1500,
            up: true,
            mac_address: None,
            master_index: None,
            vlan_id: None,
            parent_index: None,
        }
    }

    async fn adapters_with(links: Vec<LinkInfo>) -> Arc<OsAdapters> {
        let netlink = FakeNetlink::new();
        for l in links {
            netlink.seed_link(l).await;
        }
        Arc::new(OsAdapters {
            netlink: Arc::new(netlink),
            sysctl: Arc::new(FakeSysctl::new()),
            filesystem: Arc::new(FakeFilesystem::new()),
            subprocess: Arc::new(FakeSubprocess::new()),
            clock: Arc::new(FakeClock::new()),
        })
    }

    fn bare_snapshot() -> SystemSnapshot {
        SystemSnapshot {
            id: "manual-1".into(),
            kind: crate::model::CheckpointKind::Manual,
            created_at: chrono::Utc::now(),
            ip_forward: false,
            interfaces: vec![],
            routes: vec![],
            nftables: None,
        }
    }

    #[tokio::test]
    async fn restores_ip_forward_flag() {
        let adapters = adapters_with(vec![]).await;
        adapters.sysctl.write("net.ipv4.ip_forward", "0").await.unwrap();
        let mut snap = bare_snapshot();
        snap.ip_forward = true;
        let report = restore_snapshot(&adapters, &snap, &RestoreScope::all()).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(adapters.sysctl.read("net.ipv4.ip_forward").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn deleted_interface_reported_as_manual_intervention() {
        let adapters = adapters_with(vec![]).await;
        let mut snap = bare_snapshot();
        snap.interfaces.push(crate::model::InterfaceSnapshot {
            name: "eth9".into(),
            mtu: 1500,
            up: true,
            addresses: vec![],
            default_gateway: None,
            bridge_ports: None,
            vlan: None,
        });
        let report = restore_snapshot(&adapters, &snap, &RestoreScope::all()).await.unwrap();
        assert_eq!(report.manual_intervention, vec!["eth9".to_string()]);
    }

    #[tokio::test]
    async fn extraneous_current_interface_is_removed() {
        let adapters = adapters_with(vec![link(2, "eth0")]).await;
        let report = restore_snapshot(&adapters, &bare_snapshot(), &RestoreScope::all())
            .await
            .unwrap();
        assert!(report.is_clean());
        assert!(adapters.netlink.link_get("eth0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scope_limits_subsystems_touched() {
        let adapters = adapters_with(vec![link(2, "eth0")]).await;
        let scope = RestoreScope::from_names(&["ipforward"]).unwrap();
        let mut snap = bare_snapshot();
        snap.ip_forward = true;
        restore_snapshot(&adapters, &snap, &scope).await.unwrap();
        assert_eq!(adapters.sysctl.read("net.ipv4.ip_forward").await.unwrap(), "1");
        assert!(adapters.netlink.link_get("eth0").await.unwrap().is_some());
    }
}
