// ── Appliance-wide settings ──

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::de::flexible_bool;

/// Boot-time parameters of the appliance, stored under the `config` key
/// of the `cmdline` bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CmdLine {
    /// Router flavour (`router`, `vpcrouter`, `dhcpsrvr`).
    #[serde(rename = "type")]
    pub router_type: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    pub redundant_router: bool,
    pub domain: Option<String>,
    pub dns1: Option<Ipv4Addr>,
    pub dns2: Option<Ipv4Addr>,
    pub name: Option<String>,
}

impl CmdLine {
    /// Key holding the settings inside the `cmdline` bag.
    pub const KEY: &'static str = "config";

    /// Appliance default resolvers, in order.
    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        self.dns1.into_iter().chain(self.dns2).collect()
    }
}

/// A process the on-box monitor keeps alive. Keyed by name in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredService {
    pub process_name: String,
    pub service_name: String,
    #[serde(default)]
    pub pidfile: Option<String>,
}
