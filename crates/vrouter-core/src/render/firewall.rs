// iptables-restore ruleset built from firewall rules and NAT forwards.
//
// Both resource types feed this single artifact, so it is always rendered
// from both bags together. The ruleset only touches chains it owns and is
// restored with `--noflush`; built-in chains reach it through hooks that
// are inserted once and left in place.

use std::fmt::Write as _;

use super::{decode_all, Artifact, BagSet, ChainHook, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{FirewallRule, ForwardKind, ForwardingRule, ResourceType, TrafficType};
use crate::process::CommandSpec;

const PREROUTING_CHAIN: &str = "VR_PREROUTING";
const POSTROUTING_CHAIN: &str = "VR_POSTROUTING";
const FORWARD_CHAIN: &str = "VR_FORWARD";
const INGRESS_CHAIN: &str = "VR_INGRESS";
const EGRESS_CHAIN: &str = "VR_EGRESS";

pub(super) fn plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let forwards: Vec<ForwardingRule> =
        decode_all::<ForwardingRule>(&bags.get(ResourceType::ForwardingRules))?
            .into_iter()
            .map(|(_, rule)| rule)
            .collect();
    let rules: Vec<FirewallRule> = decode_all::<FirewallRule>(&bags.get(ResourceType::FirewallRules))?
        .into_iter()
        .map(|(_, rule)| rule)
        .filter(|rule| !rule.revoked)
        .collect();

    let mut out = String::from("# Generated by vrouter\n");
    render_nat(&mut out, &forwards);
    render_filter(&mut out, &rules);

    let path = &config.artifacts.firewall_rules;
    Ok(RenderPlan {
        target: RenderTarget::Firewall,
        artifacts: vec![Artifact::new(path, out).validated_by(
            CommandSpec::new("iptables-restore").args(["--test", "--noflush", "{}"]),
        )],
        action: PostAction::Netfilter {
            restore: CommandSpec::new("iptables-restore")
                .arg("--noflush")
                .arg(path.display().to_string()),
            hooks: vec![
                ChainHook::new("nat", "PREROUTING", PREROUTING_CHAIN),
                ChainHook::new("nat", "POSTROUTING", POSTROUTING_CHAIN),
                ChainHook::new("filter", "FORWARD", FORWARD_CHAIN),
            ],
        },
    })
}

fn render_nat(out: &mut String, forwards: &[ForwardingRule]) {
    out.push_str("*nat\n");
    let _ = writeln!(out, ":{PREROUTING_CHAIN} - [0:0]");
    let _ = writeln!(out, ":{POSTROUTING_CHAIN} - [0:0]");
    for rule in forwards {
        let public = rule.source_ip_address;
        let private = rule.destination_ip_address;
        match rule.kind {
            ForwardKind::StaticNat => {
                let _ = writeln!(
                    out,
                    "-A {PREROUTING_CHAIN} -d {public}/32 -j DNAT --to-destination {private}"
                );
                let _ = writeln!(
                    out,
                    "-A {POSTROUTING_CHAIN} -s {private}/32 -j SNAT --to-source {public}"
                );
            }
            ForwardKind::Forward => {
                // tcp/udp forwards always carry a port range once merged;
                // anything else maps the whole address.
                match (port_protocol(rule.protocol.as_deref()), rule.source_port_range.as_deref()) {
                    (Some(proto), Some(ports)) => {
                        let target_ports = rule
                            .destination_port_range
                            .as_deref()
                            .unwrap_or(ports)
                            .trim()
                            .replace(':', "-");
                        let _ = writeln!(
                            out,
                            "-A {PREROUTING_CHAIN} -d {public}/32 -p {proto} -m {proto} --dport {} \
                             -j DNAT --to-destination {private}:{target_ports}",
                            match_ports(ports)
                        );
                    }
                    _ => {
                        let _ = writeln!(
                            out,
                            "-A {PREROUTING_CHAIN} -d {public}/32 -j DNAT --to-destination {private}"
                        );
                    }
                }
            }
        }
    }
    out.push_str("COMMIT\n");
}

fn render_filter(out: &mut String, rules: &[FirewallRule]) {
    out.push_str("*filter\n");
    for chain in [FORWARD_CHAIN, INGRESS_CHAIN, EGRESS_CHAIN] {
        let _ = writeln!(out, ":{chain} - [0:0]");
    }
    let _ = writeln!(
        out,
        "-A {FORWARD_CHAIN} -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT"
    );
    let _ = writeln!(out, "-A {FORWARD_CHAIN} -j {INGRESS_CHAIN}");
    let _ = writeln!(out, "-A {FORWARD_CHAIN} -j {EGRESS_CHAIN}");
    // Anything no rule accepted.
    let _ = writeln!(out, "-A {FORWARD_CHAIN} -j DROP");

    for rule in rules {
        let chain = match rule.traffic_type {
            TrafficType::Ingress => INGRESS_CHAIN,
            TrafficType::Egress => EGRESS_CHAIN,
        };
        let sources: Vec<&str> = if rule.source_cidr_list.is_empty() {
            vec!["0.0.0.0/0"]
        } else {
            rule.source_cidr_list.iter().map(String::as_str).collect()
        };
        let protocol = rule.protocol.to_ascii_lowercase();

        for source in sources {
            let mut line = format!("-A {chain} -s {source}");
            // Forwarded packets are already translated; match what they were sent to.
            if let Some(public) = rule.public_ip {
                let _ = write!(line, " -m conntrack --ctorigdst {public}/32");
            }
            if let Some(proto) = port_protocol(Some(&protocol)) {
                let _ = write!(line, " -p {proto}");
                if let Some(first) = rule.first_port {
                    let last = rule.last_port.unwrap_or(first);
                    if last == first {
                        let _ = write!(line, " -m {proto} --dport {first}");
                    } else {
                        let _ = write!(line, " -m {proto} --dport {first}:{last}");
                    }
                }
            } else if protocol == "icmp" {
                line.push_str(" -p icmp");
            }
            let _ = writeln!(
                out,
                "{line} -m comment --comment \"rule {}\" -j ACCEPT",
                rule.id
            );
        }
    }
    out.push_str("COMMIT\n");
}

/// Protocols that take port matches.
fn port_protocol(protocol: Option<&str>) -> Option<&'static str> {
    match protocol.map(str::trim) {
        Some(p) if p.eq_ignore_ascii_case("tcp") => Some("tcp"),
        Some(p) if p.eq_ignore_ascii_case("udp") => Some("udp"),
        _ => None,
    }
}

/// `22-25` or `22:25` as an iptables port match.
fn match_ports(ports: &str) -> String {
    ports.trim().replace('-', ":")
}
