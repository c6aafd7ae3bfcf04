//! First-boot interface bootstrap: probe the kernel, pick a WAN link,
//! fold everything else into `br-lan`. Grounded on spec.md §4.5's
//! "Interface bootstrap" paragraph.

use std::sync::Arc;

use jack_core::{Result, Value};
use jack_osadapters::{LinkInfo, OsAdapters};

use crate::netmask::prefix_to_netmask;
use crate::virtual_iface::is_virtual;

const LAN_BRIDGE_NAME: &str = "br-lan";
const LAN_ADDRESS: &str = "192.168.1.1";
const LAN_NETMASK: &str = "255.255.255.0";

pub async fn bootstrap_interfaces(adapters: &Arc<OsAdapters>) -> Result<Value> {
    let links = adapters.netlink.link_list().await?;
    let candidates: Vec<&LinkInfo> = links.iter().filter(|l| l.name != "lo").collect();

    let wan = pick_wan(adapters, &candidates).await?;

    let mut root = Value::object();
    if let Some(wan) = wan {
        let addrs = adapters.netlink.addr_list(wan.index).await?;
        let routes = adapters.netlink.route_list().await?;
        let gateway = routes
            .iter()
            .find(|r| r.is_default() && r.oif_index == Some(wan.index))
            .and_then(|r| r.gateway);

        let mut entry = Value::object();
        entry.set_path(&["type"], Value::String("physical".into()))?;
        entry.set_path(&["device"], Value::String(wan.name.clone()))?;
        entry.set_path(&["mtu"], Value::Int(wan.mtu as i64))?;
        entry.set_path(&["enabled"], Value::Bool(true))?;

        if let Some(addr) = addrs.first() {
            entry.set_path(&["protocol"], Value::String("static".into()))?;
            entry.set_path(&["ipaddr"], Value::String(addr.address.to_string()))?;
            entry.set_path(
                &["netmask"],
                Value::String(prefix_to_netmask(addr.prefix_len)),
            )?;
            if let Some(gw) = gateway {
                entry.set_path(&["gateway"], Value::String(gw.to_string()))?;
            }
        } else {
            entry.set_path(&["protocol"], Value::String("dhcp".into()))?;
        }
        root.set_path(&[wan.name.as_str()], entry)?;
    }

    let lan_ports: Vec<String> = candidates
        .iter()
        .copied()
        .filter(|l| {
            !is_virtual(l)
                && l.kind.is_none()
                && wan.map(|w| w.index != l.index).unwrap_or(true)
        })
        .map(|l| l.name.clone())
        .collect();

    let mut bridge = Value::object();
    bridge.set_path(&["type"], Value::String("bridge".into()))?;
    bridge.set_path(&["device"], Value::String(LAN_BRIDGE_NAME.into()))?;
    bridge.set_path(
        &["bridge_ports"],
        Value::List(lan_ports.into_iter().map(Value::String).collect()),
    )?;
    bridge.set_path(&["protocol"], Value::String("static".into()))?;
    bridge.set_path(&["ipaddr"], Value::String(LAN_ADDRESS.into()))?;
    bridge.set_path(&["netmask"], Value::String(LAN_NETMASK.into()))?;
    bridge.set_path(&["mtu"], Value::Int(1500))?;
    bridge.set_path(&["enabled"], Value::Bool(true))?;
    root.set_path(&[LAN_BRIDGE_NAME], bridge)?;

    Ok(root)
}

/// (a) the interface carrying the default route, else (b) the first
/// non-virtual, non-bridge, non-loopback link that is up with an
/// address, else (c) the first non-virtual physical link.
async fn pick_wan<'a>(
    adapters: &Arc<OsAdapters>,
    candidates: &[&'a LinkInfo],
) -> Result<Option<&'a LinkInfo>> {
    let routes = adapters.netlink.route_list().await?;
    if let Some(default_route) = routes.iter().find(|r| r.is_default()) {
        if let Some(oif) = default_route.oif_index {
            if let Some(link) = candidates.iter().copied().find(|l| l.index == oif) {
                return Ok(Some(link));
            }
        }
    }

    for link in candidates.iter().copied() {
        if is_virtual(link) || link.is_bridge() {
            continue;
        }
        if link.up && !adapters.netlink.addr_list(link.index).await?.is_empty() {
            return Ok(Some(link));
        }
    }

    Ok(candidates
        .iter()
        .copied()
        .find(|l| !is_virtual(l) && l.kind.is_none()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jack_osadapters::fake::FakeNetlink;
    use std::net::Ipv4Addr;

    async fn adapters_with(links: Vec<LinkInfo>) -> Arc<OsAdapters> {
        let netlink = FakeNetlink::new();
        for l in links {
            netlink.seed_link(l).await;
        }
        Arc::new(OsAdapters {
            netlink: Arc::new(netlink),
            sysctl: Arc::new(jack_osadapters::fake::FakeSysctl::new()),
            filesystem: Arc::new(jack_osadapters::fake::FakeFilesystem::new()),
            subprocess: Arc::new(jack_osadapters::fake::FakeSubprocess::new()),
            clock: Arc::new(jack_osadapters::fake::FakeClock::new()),
        })
    }

    fn phys(index: u32, name: &str) -> LinkInfo {
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

    #[tokio::test]
    async fn no_addressed_link_falls_back_to_first_physical_as_dhcp_wan() {
        let adapters = adapters_with(vec![phys(2, "eth0"), phys(3, "eth1")]).await;
        let result = bootstrap_interfaces(&adapters).await.unwrap();
        let eth0 = result.get_path(&["eth0", "protocol"]).unwrap();
        assert_eq!(eth0, &Value::String("dhcp".into()));
        let ports = result.get_path(&["br-lan", "bridge_ports"]).unwrap();
        assert_eq!(ports, &Value::List(vec![Value::String("eth1".into())]));
    }

    #[tokio::test]
    async fn addressed_link_is_preserved_as_static_wan() {
        let adapters = adapters_with(vec![phys(2, "eth0"), phys(3, "eth1")]).await;
        adapters
            .netlink
            .addr_add(2, "203.0.113.5".parse::<Ipv4Addr>().unwrap(), 24)
            .await
            .unwrap();
        let result = bootstrap_interfaces(&adapters).await.unwrap();
        assert_eq!(
            result.get_path(&["eth0", "ipaddr"]).unwrap(),
            &Value::String("203.0.113.5".into())
        );
        assert_eq!(
            result.get_path(&["eth0", "netmask"]).unwrap(),
            &Value::String("255.255.255.0".into())
        );
    }
}
