// ── Resource type tags ──

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Every kind of declarative state the router keeps a bag for.
///
/// The lowercase name doubles as the bag file stem and as the `type`
/// tag on inbound payloads.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ResourceType {
    Addresses,
    DhcpEntries,
    ForwardingRules,
    GuestNetwork,
    VpnUsers,
    FirewallRules,
    LoadBalancer,
    MonitorService,
    CmdLine,
}

impl ResourceType {
    /// Bag file name inside the data directory.
    pub fn file_name(self) -> String {
        format!("{self}.json")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names_are_flat_lowercase() {
        assert_eq!(ResourceType::DhcpEntries.to_string(), "dhcpentries");
        assert_eq!(ResourceType::LoadBalancer.as_ref(), "loadbalancer");
        assert_eq!(ResourceType::CmdLine.file_name(), "cmdline.json");
    }

    #[test]
    fn parse_round_trips_every_variant() {
        for resource in ResourceType::iter() {
            let parsed: ResourceType = resource.to_string().parse().unwrap();
            assert_eq!(parsed, resource);
        }
        assert_eq!(
            "FirewallRules".parse::<ResourceType>().unwrap(),
            ResourceType::FirewallRules
        );
    }

    #[test]
    fn serde_uses_same_names() {
        let json = serde_json::to_string(&ResourceType::GuestNetwork).unwrap();
        assert_eq!(json, "\"guestnetwork\"");
    }
}
