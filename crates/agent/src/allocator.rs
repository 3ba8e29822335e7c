//! Peer address allocation
//!
//! Scans the gateway's flat peer-config text for `/32` and `/128` entries and
//! hands out the lowest unused host suffix. Callers must hold the
//! provisioning lock: two allocations against the same snapshot of the config
//! text would pick the same address.

use ipnetwork::{Ipv4Network, Ipv6Network};
use std::net::{Ipv4Addr, Ipv6Addr};
use wgfleet_common::{Error, Result};

/// Addresses allocated to one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddresses {
    pub v4: Ipv4Addr,
    pub v6: Ipv6Addr,
}

impl PeerAddresses {
    /// `a.b.c.d/32,x::y/128` form used in Address and AllowedIPs lines
    pub fn cidr_pair(&self) -> String {
        format!("{}/32,{}/128", self.v4, self.v6)
    }
}

fn host_v4(subnet: Ipv4Network, suffix: u32) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(subnet.network()).wrapping_add(suffix))
}

fn host_v6(subnet: Ipv6Network, suffix: u32) -> Ipv6Addr {
    Ipv6Addr::from(u128::from(subnet.network()).wrapping_add(suffix as u128))
}

/// Pick the lowest host suffix in `[2, max_peers + 1]` unused in both
/// address families.
pub fn allocate(
    config_text: &str,
    subnet_v4: Ipv4Network,
    subnet_v6: Ipv6Network,
    max_peers: u32,
) -> Result<PeerAddresses> {
    for suffix in 2..=max_peers.saturating_add(1) {
        let addrs = PeerAddresses {
            v4: host_v4(subnet_v4, suffix),
            v6: host_v6(subnet_v6, suffix),
        };
        let v4_entry = format!("{}/32", addrs.v4);
        let v6_entry = format!("{}/128", addrs.v6);
        if !config_text.contains(&v4_entry) && !config_text.contains(&v6_entry) {
            return Ok(addrs);
        }
    }

    Err(Error::AddressSpaceExhausted { max: max_peers })
}
