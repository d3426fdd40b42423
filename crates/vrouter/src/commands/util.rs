//! Shared helpers for command handlers.

use std::io::{IsTerminal, Read};
use std::path::Path;

use vrouter_core::{RenderTarget, ResourceType};

use crate::cli::{ResourceArg, TargetArg};
use crate::error::CliError;

pub fn resource_type(arg: ResourceArg) -> ResourceType {
    match arg {
        ResourceArg::Addresses => ResourceType::Addresses,
        ResourceArg::DhcpEntries => ResourceType::DhcpEntries,
        ResourceArg::ForwardingRules => ResourceType::ForwardingRules,
        ResourceArg::GuestNetwork => ResourceType::GuestNetwork,
        ResourceArg::VpnUsers => ResourceType::VpnUsers,
        ResourceArg::FirewallRules => ResourceType::FirewallRules,
        ResourceArg::LoadBalancer => ResourceType::LoadBalancer,
        ResourceArg::MonitorService => ResourceType::MonitorService,
        ResourceArg::CmdLine => ResourceType::CmdLine,
    }
}

pub fn render_target(arg: TargetArg) -> RenderTarget {
    match arg {
        TargetArg::Dhcp => RenderTarget::Dhcp,
        TargetArg::Dns => RenderTarget::Dns,
        TargetArg::Firewall => RenderTarget::Firewall,
        TargetArg::LoadBalancer => RenderTarget::LoadBalancer,
        TargetArg::Vpn => RenderTarget::Vpn,
        TargetArg::Monitor => RenderTarget::Monitor,
        TargetArg::Routing => RenderTarget::Routing,
    }
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` is required.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Read a JSON document from a file, or stdin for `None` / `-`.
pub fn read_json(path: Option<&Path>) -> Result<serde_json::Value, CliError> {
    let contents = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    Ok(serde_json::from_str(&contents)?)
}
