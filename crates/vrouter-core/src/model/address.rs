// ── Address entries ──

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use super::de::{default_true, flexible_bool, flexible_u32};
use super::mac::MacAddress;

/// Role a device plays on the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceRole {
    #[default]
    Public,
    Guest,
    /// Link-local / management network. `control` on the wire.
    #[serde(rename = "control", alias = "private")]
    Private,
}

/// One IP address assigned to a router NIC.
///
/// `device`, `cidr`, `network` and `size` are derived by
/// [`AddressEntry::normalized`] and stored alongside the wire fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub public_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    #[serde(deserialize_with = "flexible_u32")]
    pub nic_dev_id: u32,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub nw_type: InterfaceRole,
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub add: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub source_nat: bool,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub one_to_one_nat: bool,
    #[serde(default)]
    pub vif_mac_address: Option<MacAddress>,

    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub cidr: Option<Ipv4Net>,
    #[serde(default)]
    pub network: Option<Ipv4Net>,
    #[serde(default)]
    pub size: Option<u8>,
}

/// Device name for a NIC index.
pub fn device_name(nic_dev_id: u32) -> String {
    format!("eth{nic_dev_id}")
}

impl AddressEntry {
    /// Fill in the derived fields. Fails only on a non-contiguous netmask.
    pub fn normalized(mut self) -> Result<Self, ipnet::PrefixLenError> {
        let prefix = ipnet::ipv4_mask_to_prefix(self.netmask)?;
        let cidr = Ipv4Net::new(self.public_ip, prefix)?;
        self.device = Some(device_name(self.nic_dev_id));
        self.cidr = Some(cidr);
        self.network = Some(cidr.trunc());
        self.size = Some(prefix);
        Ok(self)
    }

    pub fn device(&self) -> String {
        self.device
            .clone()
            .unwrap_or_else(|| device_name(self.nic_dev_id))
    }

    pub fn prefix_len(&self) -> u8 {
        self.size
            .or_else(|| ipnet::ipv4_mask_to_prefix(self.netmask).ok())
            .unwrap_or(32)
    }

    /// `address/prefix` as used by `ip addr` and `ip rule`.
    pub fn cidr_string(&self) -> String {
        format!("{}/{}", self.public_ip, self.prefix_len())
    }

    /// `network/prefix` of the subnet the address lives in.
    pub fn network_string(&self) -> String {
        match self.network {
            Some(net) => net.to_string(),
            None => Ipv4Net::new(self.public_ip, self.prefix_len())
                .map_or_else(|_| self.cidr_string(), |n| n.trunc().to_string()),
        }
    }
}
