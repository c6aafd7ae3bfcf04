//! The `Netlink` capability trait and its real implementation.
//!
//! Grounded on `op-network/src/rtnetlink.rs`'s one-call-one-connection
//! style, generalized here into a single held `rtnetlink::Handle` shared
//! by every call so the apply orchestrator isn't opening a fresh netlink
//! socket per link.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use futures::TryStreamExt;
use jack_core::{JackError, Result};
use netlink_packet_route::address::AddressAttribute;
use netlink_packet_route::link::{LinkAttribute, LinkInfo as NlLinkInfo};
use netlink_packet_route::route::RouteAttribute;
use netlink_packet_route::{AddressFamily, RouteFlags};
use rtnetlink::{new_connection, Handle, IpVersion};

use crate::types::{AddrInfo, LinkInfo, NeighborInfo, RouteInfo, RouteProtocol, RouteScope};

#[async_trait]
pub trait Netlink: Send + Sync {
    async fn link_list(&self) -> Result<Vec<LinkInfo>>;
    async fn link_get(&self, name: &str) -> Result<Option<LinkInfo>>;
    async fn link_add_bridge(&self, name: &str) -> Result<u32>;
    async fn link_add_vlan(&self, name: &str, parent_index: u32, vlan_id: u16) -> Result<u32>;
    async fn link_delete(&self, index: u32) -> Result<()>;
    async fn link_set_up(&self, index: u32) -> Result<()>;
    async fn link_set_down(&self, index: u32) -> Result<()>;
    async fn link_set_mtu(&self, index: u32, mtu: u32) -> Result<()>;
    async fn link_set_master(&self, index: u32, master_index: u32) -> Result<()>;
    async fn link_set_nomaster(&self, index: u32) -> Result<()>;
    async fn link_set_name(&self, index: u32, name: &str) -> Result<()>;

    async fn addr_list(&self, index: u32) -> Result<Vec<AddrInfo>>;
    async fn addr_add(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()>;
    async fn addr_del(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()>;

    async fn route_list(&self) -> Result<Vec<RouteInfo>>;
    async fn route_add(&self, route: &RouteInfo) -> Result<()>;
    async fn route_del(&self, route: &RouteInfo) -> Result<()>;

    async fn neighbor_list(&self, index: u32) -> Result<Vec<NeighborInfo>>;
}

pub struct RtNetlink {
    handle: Handle,
}

impl RtNetlink {
    /// Open the netlink socket and spawn its driving connection task.
    /// One `RtNetlink` is meant to live for the life of the daemon.
    pub fn new() -> Result<Self> {
        let (connection, handle, _) =
            new_connection().map_err(|e| JackError::Kernel(format!("netlink connect: {e}")))?;
        tokio::spawn(connection);
        Ok(RtNetlink { handle })
    }

    async fn find_link(&self, index: u32) -> Result<netlink_packet_route::link::LinkMessage> {
        self.handle
            .link()
            .get()
            .match_index(index)
            .execute()
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("link lookup: {e}")))?
            .ok_or_else(|| JackError::NotFound(format!("link index {index}")))
    }

    fn to_link_info(msg: &netlink_packet_route::link::LinkMessage) -> LinkInfo {
        let mut name = String::new();
        let mut mac_address = None;
        let mut mtu = 0;
        let mut kind = None;
        let mut master_index = None;
        let mut vlan_id = None;
        let parent_index = None;

        for attr in &msg.attributes {
            match attr {
                LinkAttribute::IfName(n) => name = n.clone(),
                LinkAttribute::Address(addr) => {
                    mac_address = Some(
                        addr.iter()
                            .map(|b| format!("{b:02x}"))
                            .collect::<Vec<_>>()
                            .join(":"),
                    )
                }
                LinkAttribute::Mtu(m) => mtu = *m,
                LinkAttribute::Controller(idx) => master_index = Some(*idx),
                LinkAttribute::LinkInfo(infos) => {
                    for info in infos {
                        if let NlLinkInfo::Kind(k) = info {
                            kind = Some(format!("{k:?}").to_lowercase());
                        }
                        if let NlLinkInfo::Data(data) = info {
                            if let netlink_packet_route::link::LinkInfoData::Vlan(vlan_attrs) =
                                data
                            {
                                for va in vlan_attrs {
                                    if let netlink_packet_route::link::VlanAttribute::Id(id) = va {
                                        vlan_id = Some(*id);
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let up = msg
            .header
            .flags
            .contains(netlink_packet_route::link::LinkFlags::Up);

        LinkInfo {
            index: msg.header.index,
            name,
            kind,
            mtu,
            up,
            mac_address,
            master_index,
            vlan_id,
            parent_index,
        }
    }

    fn to_route_info(msg: &netlink_packet_route::route::RouteMessage) -> RouteInfo {
        let mut gateway = None;
        let mut oif_index = None;
        let mut destination = None;
        let mut metric = 0;
        let mut table = msg.header.table as u32;

        for attr in &msg.attributes {
            match attr {
                RouteAttribute::Gateway(netlink_packet_route::route::RouteAddress::Inet(gw)) => {
                    gateway = Some(*gw)
                }
                RouteAttribute::Oif(idx) => oif_index = Some(*idx),
                RouteAttribute::Destination(netlink_packet_route::route::RouteAddress::Inet(
                    d,
                )) => destination = Some((*d, msg.header.destination_prefix_length)),
                RouteAttribute::Priority(p) => metric = *p,
                RouteAttribute::Table(t) => table = *t,
                _ => {}
            }
        }
        if msg.header.destination_prefix_length == 0 {
            destination = None;
        }

        let scope = match msg.header.scope {
            netlink_packet_route::route::RouteScope::Universe => RouteScope::Universe,
            netlink_packet_route::route::RouteScope::Site => RouteScope::Site,
            netlink_packet_route::route::RouteScope::Link => RouteScope::Link,
            netlink_packet_route::route::RouteScope::Host => RouteScope::Host,
            _ => RouteScope::Nowhere,
        };
        let protocol = match msg.header.protocol {
            netlink_packet_route::route::RouteProtocol::Kernel => RouteProtocol::Kernel,
            netlink_packet_route::route::RouteProtocol::Boot => RouteProtocol::Boot,
            netlink_packet_route::route::RouteProtocol::Static => RouteProtocol::Static,
            _ => RouteProtocol::Dhcp,
        };

        RouteInfo {
            destination,
            gateway,
            oif_index,
            metric,
            table,
            scope,
            protocol,
        }
    }

    fn to_neighbor_info(msg: &netlink_packet_route::neighbour::NeighbourMessage) -> Option<NeighborInfo> {
        use netlink_packet_route::neighbour::NeighbourAttribute;

        let mut destination = None;
        let mut lladdr = None;
        for attr in &msg.attributes {
            match attr {
                NeighbourAttribute::Destination(netlink_packet_route::route::RouteAddress::Inet(d)) => {
                    destination = Some(*d)
                }
                NeighbourAttribute::LinkLocalAddress(addr) if addr.len() == 6 => {
                    let mut mac = [0u8; 6];
                    mac.copy_from_slice(addr);
                    lladdr = Some(mac);
                }
                _ => {}
            }
        }
        destination.map(|destination| NeighborInfo { link_index: msg.header.ifindex, destination, lladdr })
    }
}

#[async_trait]
impl Netlink for RtNetlink {
    async fn link_list(&self) -> Result<Vec<LinkInfo>> {
        let mut out = Vec::new();
        let mut links = self.handle.link().get().execute();
        while let Some(link) = links
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("link list: {e}")))?
        {
            out.push(Self::to_link_info(&link));
        }
        Ok(out)
    }

    async fn link_get(&self, name: &str) -> Result<Option<LinkInfo>> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match links
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("link get {name}: {e}")))?
        {
            Some(msg) => Ok(Some(Self::to_link_info(&msg))),
            None => Ok(None),
        }
    }

    async fn link_add_bridge(&self, name: &str) -> Result<u32> {
        self.handle
            .link()
            .add()
            .bridge(name.to_string())
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("create bridge {name}: {e}")))?;
        Ok(self
            .link_get(name)
            .await?
            .ok_or_else(|| JackError::Kernel(format!("bridge {name} missing after create")))?
            .index)
    }

    async fn link_add_vlan(&self, name: &str, parent_index: u32, vlan_id: u16) -> Result<u32> {
        self.handle
            .link()
            .add()
            .vlan(name.to_string(), parent_index, vlan_id)
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("create vlan {name}: {e}")))?;
        Ok(self
            .link_get(name)
            .await?
            .ok_or_else(|| JackError::Kernel(format!("vlan {name} missing after create")))?
            .index)
    }

    async fn link_delete(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("delete link {index}: {e}")))
    }

    async fn link_set_up(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("link up {index}: {e}")))
    }

    async fn link_set_down(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .down()
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("link down {index}: {e}")))
    }

    async fn link_set_mtu(&self, index: u32, mtu: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .mtu(mtu)
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("set mtu on {index}: {e}")))
    }

    async fn link_set_master(&self, index: u32, master_index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .controller(master_index)
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("enslave {index} to {master_index}: {e}")))
    }

    async fn link_set_nomaster(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .nocontroller()
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("release {index} from bridge: {e}")))
    }

    async fn link_set_name(&self, index: u32, name: &str) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .name(name.to_string())
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("rename link {index} to {name}: {e}")))
    }

    async fn addr_list(&self, index: u32) -> Result<Vec<AddrInfo>> {
        let mut out = Vec::new();
        let mut addrs = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .execute();
        while let Some(msg) = addrs
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("addr list on {index}: {e}")))?
        {
            if msg.header.family != AddressFamily::Inet {
                continue;
            }
            for attr in &msg.attributes {
                if let AddressAttribute::Address(std::net::IpAddr::V4(addr)) = attr {
                    out.push(AddrInfo {
                        address: *addr,
                        prefix_len: msg.header.prefix_len,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn addr_add(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        self.handle
            .address()
            .add(index, address.into(), prefix_len)
            .execute()
            .await
            .map_err(|e| JackError::Kernel(format!("add addr {address}/{prefix_len}: {e}")))
    }

    async fn addr_del(&self, index: u32, address: Ipv4Addr, prefix_len: u8) -> Result<()> {
        let mut addrs = self
            .handle
            .address()
            .get()
            .set_link_index_filter(index)
            .set_prefix_length_filter(prefix_len)
            .set_address_filter(std::net::IpAddr::V4(address))
            .execute();
        if let Some(msg) = addrs
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("addr lookup for delete: {e}")))?
        {
            self.handle
                .address()
                .del(msg)
                .execute()
                .await
                .map_err(|e| JackError::Kernel(format!("del addr {address}/{prefix_len}: {e}")))?;
        }
        Ok(())
    }

    async fn route_list(&self) -> Result<Vec<RouteInfo>> {
        let mut out = Vec::new();
        let mut routes = self.handle.route().get(IpVersion::V4).execute();
        while let Some(msg) = routes
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("route list: {e}")))?
        {
            if msg.header.flags.contains(RouteFlags::Cloned) {
                continue;
            }
            out.push(Self::to_route_info(&msg));
        }
        Ok(out)
    }

    async fn route_add(&self, route: &RouteInfo) -> Result<()> {
        let mut req = self.handle.route().add().v4();
        if let Some((dest, prefix)) = route.destination {
            req = req.destination_prefix(dest, prefix);
        } else {
            req = req.destination_prefix(Ipv4Addr::UNSPECIFIED, 0);
        }
        if let Some(gw) = route.gateway {
            req = req.gateway(gw);
        }
        if let Some(oif) = route.oif_index {
            req = req.output_interface(oif);
        }
        req.execute()
            .await
            .map_err(|e| JackError::Kernel(format!("route add: {e}")))
    }

    async fn route_del(&self, route: &RouteInfo) -> Result<()> {
        let mut routes = self.handle.route().get(IpVersion::V4).execute();
        while let Some(msg) = routes
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("route lookup for delete: {e}")))?
        {
            let info = Self::to_route_info(&msg);
            if info.destination == route.destination && info.oif_index == route.oif_index {
                self.handle
                    .route()
                    .del(msg)
                    .execute()
                    .await
                    .map_err(|e| JackError::Kernel(format!("route del: {e}")))?;
                return Ok(());
            }
        }
        Ok(())
    }

    async fn neighbor_list(&self, index: u32) -> Result<Vec<NeighborInfo>> {
        let mut out = Vec::new();
        let mut neighbors = self.handle.neighbours().get().execute();
        while let Some(msg) = neighbors
            .try_next()
            .await
            .map_err(|e| JackError::Kernel(format!("neighbor list on {index}: {e}")))?
        {
            if msg.header.ifindex != index {
                continue;
            }
            if let Some(info) = Self::to_neighbor_info(&msg) {
                out.push(info);
            }
        }
        Ok(out)
    }
}
