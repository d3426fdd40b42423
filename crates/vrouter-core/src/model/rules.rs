// ── Forwarding and firewall rules ──

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::de::{flexible_bool, opaque_id};

/// Forwarding rule subtype, `type` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardKind {
    /// One-to-one NAT of a public IP onto a guest VM.
    #[serde(rename = "staticnat")]
    StaticNat,
    /// Port forward from a public IP/port range.
    Forward,
}

/// A NAT rule. Keyed by `source_ip_address` in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    pub source_ip_address: Ipv4Addr,
    pub destination_ip_address: Ipv4Addr,
    #[serde(default)]
    pub source_port_range: Option<String>,
    #[serde(default)]
    pub destination_port_range: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(rename = "type")]
    pub kind: ForwardKind,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub revoke: bool,
}

impl ForwardingRule {
    /// Same rule ignoring the revoke flag; a resend of an active rule.
    pub fn same_target(&self, other: &Self) -> bool {
        self.source_ip_address == other.source_ip_address
            && self.destination_ip_address == other.destination_ip_address
            && self.source_port_range == other.source_port_range
            && self.destination_port_range == other.destination_port_range
            && self.protocol == other.protocol
            && self.kind == other.kind
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrafficType {
    #[default]
    Ingress,
    Egress,
}

/// A filter rule. Keyed by its opaque `id` in the bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub revoked: bool,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub traffic_type: TrafficType,
    #[serde(default)]
    pub source_cidr_list: Vec<String>,
    #[serde(default)]
    pub first_port: Option<u16>,
    #[serde(default)]
    pub last_port: Option<u16>,
    #[serde(default)]
    pub public_ip: Option<Ipv4Addr>,
}

fn default_protocol() -> String {
    "all".into()
}
