// DHCP reservations: dnsmasq's hosts file plus the system hosts file.

use std::fmt::Write as _;

use super::{decode_all, Artifact, BagSet, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{DhcpEntry, ResourceType};

const HOSTS_HEADER: &str = "\
127.0.0.1\tlocalhost
::1\tlocalhost ip6-localhost ip6-loopback
ff02::1\tip6-allnodes
ff02::2\tip6-allrouters
";

pub(super) fn plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let mut entries: Vec<DhcpEntry> = decode_all::<DhcpEntry>(&bags.get(ResourceType::DhcpEntries))?
        .into_iter()
        .map(|(_, entry)| entry)
        .filter(|entry| entry.add && entry.ipv4_address.is_some())
        .collect();
    entries.sort_by_key(|entry| entry.ipv4_address);

    let mut dhcp_hosts = String::new();
    let mut hosts = String::from(HOSTS_HEADER);
    for entry in &entries {
        let Some(ip) = entry.ipv4_address else {
            continue;
        };
        if let Some(mac) = &entry.mac_address {
            let _ = match &entry.host_name {
                Some(name) => writeln!(dhcp_hosts, "{mac},{ip},{name},infinite"),
                None => writeln!(dhcp_hosts, "{mac},{ip},infinite"),
            };
        }
        if let Some(name) = &entry.host_name {
            let _ = writeln!(hosts, "{ip}\t{name}");
        }
    }

    Ok(RenderPlan {
        target: RenderTarget::Dhcp,
        artifacts: vec![
            Artifact::new(&config.artifacts.dhcp_hosts, dhcp_hosts),
            Artifact::new(&config.artifacts.hosts, hosts),
        ],
        action: PostAction::Restart(config.services.dhcp.clone()),
    })
}
