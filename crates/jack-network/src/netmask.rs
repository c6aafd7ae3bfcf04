//! Dotted-quad netmask <-> CIDR prefix length conversion. Interface specs
//! store `netmask` as a dotted string (`255.255.255.0`); the netlink
//! adapter and the route model work in CIDR prefix lengths throughout.

use jack_core::{JackError, Result};
use std::net::Ipv4Addr;

pub fn netmask_to_prefix(netmask: &str) -> Result<u8> {
    let addr: Ipv4Addr = netmask
        .parse()
        .map_err(|_| JackError::Validation(vec![format!("invalid netmask '{netmask}'")]))?;
    Ok(u32::from(addr).count_ones() as u8)
}

pub fn prefix_to_netmask(prefix: u8) -> String {
    if prefix == 0 {
        return Ipv4Addr::UNSPECIFIED.to_string();
    }
    let mask: u32 = u32::MAX << (32 - prefix as u32);
    Ipv4Addr::from(mask).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_common_prefixes() {
        assert_eq!(netmask_to_prefix("255.255.255.0").unwrap(), 24);
        assert_eq!(prefix_to_netmask(24), "255.255.255.0");
        assert_eq!(netmask_to_prefix("255.255.0.0").unwrap(), 16);
        assert_eq!(prefix_to_netmask(16), "255.255.0.0");
    }

    #[test]
    fn rejects_garbage() {
        assert!(netmask_to_prefix("not-an-ip").is_err());
    }
}
