// dnsmasq configuration for guest networks.

use std::fmt::Write as _;

use super::{Artifact, BagSet, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::interface::AddressManager;
use crate::model::{InterfaceRole, ResourceType};

pub(super) fn plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let manager = AddressManager::new(
        &bags.get(ResourceType::Addresses),
        &bags.get(ResourceType::GuestNetwork),
        &bags.get(ResourceType::CmdLine),
    )?;

    let mut out = String::from("# Generated by vrouter, local changes are overwritten\n");
    out.push_str("domain-needed\nbogus-priv\nexpand-hosts\n");
    let _ = writeln!(out, "dhcp-hostsfile={}", config.artifacts.dhcp_hosts.display());
    if let Some(domain) = &manager.cmdline().domain {
        let _ = writeln!(out, "domain={domain}");
    }

    for facts in manager
        .devices()
        .into_iter()
        .filter(|f| f.role == InterfaceRole::Guest)
    {
        let Some(primary) = facts.primary() else {
            continue;
        };
        let device = &facts.device;
        let _ = writeln!(out, "\n# {device}");
        let _ = writeln!(out, "interface={device}");
        let network = primary.network.map_or_else(
            || primary.public_ip.to_string(),
            |net| net.network().to_string(),
        );
        let _ = writeln!(
            out,
            "dhcp-range=set:{device},{network},static,{},infinite",
            primary.netmask
        );
        if let Some(gateway) = facts.gateway {
            let _ = writeln!(out, "dhcp-option=tag:{device},option:router,{gateway}");
        }
        let resolvers: Vec<String> = if facts.dns.is_empty() {
            vec![primary.public_ip.to_string()]
        } else {
            facts.dns.iter().map(ToString::to_string).collect()
        };
        let _ = writeln!(
            out,
            "dhcp-option=tag:{device},option:dns-server,{}",
            resolvers.join(",")
        );
        if let Some(domain) = &facts.domain {
            let _ = writeln!(out, "dhcp-option=tag:{device},option:domain-name,{domain}");
        }
    }

    Ok(RenderPlan {
        target: RenderTarget::Dns,
        artifacts: vec![Artifact::new(&config.artifacts.dnsmasq_conf, out)],
        action: PostAction::Restart(config.services.dhcp.clone()),
    })
}
