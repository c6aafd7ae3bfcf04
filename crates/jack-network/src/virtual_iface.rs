//! The virtual-interface predicate used by bootstrap to decide which
//! physical links are eligible to join `br-lan`, per spec.md §4.5.

use jack_osadapters::LinkInfo;

const VIRTUAL_NAME_PREFIXES: &[&str] = &[
    "veth", "docker", "tun", "tap", "wg-", "wg", "sit", "teql", "ip6tnl", "gre", "vlan",
    "macvlan", "vxlan",
];

const VIRTUAL_KINDS: &[&str] = &["veth", "tun", "tap", "wireguard"];

pub fn is_virtual(link: &LinkInfo) -> bool {
    if let Some(kind) = &link.kind {
        if VIRTUAL_KINDS.contains(&kind.as_str()) {
            return true;
        }
    }
    VIRTUAL_NAME_PREFIXES
        .iter()
        .any(|prefix| link.name.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(name: &str, kind: Option<&str>) -> LinkInfo {
        LinkInfo {
            index: 1,
            name: name.to_string(),
            kind: kind.map(str::to_string),
            mtu: 1500,
            up: true,
            mac_address: None,
            master_index: None,
            vlan_id: None,
            parent_index: None,
        }
    }

    #[test]
    fn name_prefix_matches() {
        assert!(is_virtual(&link("wg0", None)));
        assert!(is_virtual(&link("docker0", None)));
        assert!(is_virtual(&link("vxlan100", None)));
    }

    #[test]
    fn physical_name_is_not_virtual() {
        assert!(!is_virtual(&link("eth0", None)));
        assert!(!is_virtual(&link("enp3s0", None)));
    }

    #[test]
    fn kind_match_overrides_name() {
        assert!(is_virtual(&link("lanport0", Some("wireguard"))));
    }
}
