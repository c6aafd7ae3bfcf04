//! `ApplyRoutesConfig`: per-route parse/validate/dedup/add, grounded on
//! spec.md §4.5's route paragraphs.

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use jack_core::{JackError, Result};
use jack_osadapters::{OsAdapters, RouteInfo, RouteProtocol, RouteScope};

use crate::model::RouteSpec;

pub async fn apply_routes_config(
    adapters: &Arc<OsAdapters>,
    routes: &[(String, RouteSpec)],
) -> Result<()> {
    for (name, spec) in routes {
        if !spec.enabled {
            continue;
        }
        apply_one_route(adapters, name, spec).await?;
    }
    Ok(())
}

async fn apply_one_route(adapters: &Arc<OsAdapters>, name: &str, spec: &RouteSpec) -> Result<()> {
    let destination = parse_destination(&spec.destination)?;

    let (oif_index, gateway, scope) = if let Some(gateway_str) = spec
        .gateway
        .as_deref()
        .filter(|g| !g.is_empty())
    {
        let gateway: Ipv4Addr = gateway_str
            .parse()
            .map_err(|_| JackError::Validation(vec![format!("route {name}: invalid gateway")]))?;
        let oif = match spec.interface.as_deref().filter(|i| !i.is_empty()) {
            Some(iface) => Some(resolve_interface(adapters, iface).await?),
            None => find_interface_for_gateway(adapters, gateway).await?,
        };
        (oif, Some(gateway), RouteScope::Universe)
    } else {
        let iface = spec.interface.as_deref().filter(|i| !i.is_empty()).ok_or_else(|| {
            JackError::Validation(vec![format!(
                "route {name}: must specify at least one of gateway, interface"
            )])
        })?;
        let oif = resolve_interface(adapters, iface).await?;
        (Some(oif), None, RouteScope::Link)
    };

    let candidate = RouteInfo {
        destination,
        gateway,
        oif_index,
        metric: spec.metric,
        table: spec.table,
        scope,
        protocol: RouteProtocol::Static,
    };

    remove_matching(adapters, &candidate).await?;
    adapters.netlink.route_add(&candidate).await
}

fn parse_destination(destination: &str) -> Result<Option<(Ipv4Addr, u8)>> {
    if destination == "default" || destination == "0.0.0.0/0" {
        return Ok(None);
    }
    let net = Ipv4Net::from_str(destination)
        .map_err(|_| JackError::Validation(vec![format!("invalid destination '{destination}'")]))?;
    Ok(Some((net.network(), net.prefix_len())))
}

async fn resolve_interface(adapters: &Arc<OsAdapters>, name: &str) -> Result<u32> {
    adapters
        .netlink
        .link_get(name)
        .await?
        .map(|l| l.index)
        .ok_or_else(|| JackError::NotFound(format!("route interface '{name}'")))
}

/// Auto-select by finding the interface whose v4 network contains the
/// gateway.
async fn find_interface_for_gateway(
    adapters: &Arc<OsAdapters>,
    gateway: Ipv4Addr,
) -> Result<Option<u32>> {
    let links = adapters.netlink.link_list().await?;
    for link in links {
        let addrs = adapters.netlink.addr_list(link.index).await?;
        for addr in addrs {
            if let Ok(net) = Ipv4Net::new(addr.address, addr.prefix_len) {
                if net.contains(&gateway) {
                    return Ok(Some(link.index));
                }
            }
        }
    }
    Ok(None)
}

/// Route match used for pre-add dedup: destination equality, gateway
/// equality (including both-nil), interface index (0 treated as
/// wildcard), table. Metric is deliberately not part of dedup (only of
/// snapshot-restore match).
async fn remove_matching(adapters: &Arc<OsAdapters>, candidate: &RouteInfo) -> Result<()> {
    let current = adapters.netlink.route_list().await?;
    for route in current {
        let iface_matches = match (route.oif_index, candidate.oif_index) {
            (Some(0), _) | (_, Some(0)) | (None, None) => true,
            (a, b) => a == b,
        };
        if route.destination == candidate.destination
            && route.gateway == candidate.gateway
            && iface_matches
            && route.table == candidate.table
        {
            adapters.netlink.route_del(&route).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_and_explicit_zero_net_both_parse_to_none() {
        assert_eq!(parse_destination("default").unwrap(), None);
        assert_eq!(parse_destination("0.0.0.0/0").unwrap(), None);
    }

    #[test]
    fn cidr_destination_parses() {
        assert_eq!(
            parse_destination("10.0.0.0/24").unwrap(),
            Some(("10.0.0.0".parse().unwrap(), 24))
        );
    }

    #[test]
    fn garbage_destination_is_validation_error() {
        let err = parse_destination("not-a-cidr").unwrap_err();
        assert!(matches!(err, JackError::Validation(_)));
    }
}
