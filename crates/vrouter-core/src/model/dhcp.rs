// ── DHCP / guest network / VPN user entries ──

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::de::{default_true, flexible_bool};
use super::mac::MacAddress;

/// A static DHCP lease. Keyed by `ipv4_address` in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpEntry {
    #[serde(default)]
    pub mac_address: Option<MacAddress>,
    #[serde(default)]
    pub ipv4_address: Option<Ipv4Addr>,
    #[serde(default)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub default_gateway: Option<Ipv4Addr>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub default_entry: bool,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub add: bool,
}

/// Guest network facts for one device. Keyed by `device` in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestNetworkEntry {
    pub device: String,
    /// Comma-separated resolver list, as sent by the producer.
    #[serde(default)]
    pub dns: Option<String>,
    #[serde(default)]
    pub router_guest_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub router_guest_gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub router_guest_netmask: Option<Ipv4Addr>,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub mac_address: Option<MacAddress>,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub add: bool,
}

impl GuestNetworkEntry {
    /// Parsed resolvers; unparseable items are skipped.
    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.dns
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }
}

/// A remote-access VPN account. Keyed by `user` in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnUser {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub add: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dhcp_entry_defaults_to_add() {
        let entry: DhcpEntry =
            serde_json::from_str(r#"{"ipv4_address": "10.0.0.5", "mac_address": "AA:BB"}"#)
                .unwrap();
        assert!(entry.add);
        assert_eq!(entry.mac_address.unwrap().as_str(), "aa:bb");
    }

    #[test]
    fn guest_dns_list_skips_garbage() {
        let entry: GuestNetworkEntry = serde_json::from_str(
            r#"{"device": "eth1", "dns": "8.8.8.8, nonsense,1.1.1.1"}"#,
        )
        .unwrap();
        assert_eq!(
            entry.dns_servers(),
            vec![Ipv4Addr::new(8, 8, 8, 8), Ipv4Addr::new(1, 1, 1, 1)]
        );
    }
}
