// VPN credentials and the process monitor's service list. Both are read
// by their daemons on demand, so publishing is the whole action.

use std::fmt::Write as _;

use super::{decode_all, Artifact, BagSet, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{MonitoredService, ResourceType, VpnUser};

/// Credentials stay readable by root only.
const SECRETS_MODE: u32 = 0o600;

const CHAP_HEADER: &str = "\
# Secrets for authentication using CHAP
# client\tserver\tsecret\tIP addresses
";

pub(super) fn vpn_plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let users = decode_all::<VpnUser>(&bags.get(ResourceType::VpnUsers))?;

    let mut out = String::from(CHAP_HEADER);
    for (_, user) in users.iter().filter(|(_, u)| u.add) {
        let Some(password) = &user.password else {
            continue;
        };
        let _ = writeln!(out, "{} * {} *", user.user, password);
    }

    Ok(RenderPlan {
        target: RenderTarget::Vpn,
        artifacts: vec![
            Artifact::new(&config.artifacts.vpn_secrets, out).with_mode(SECRETS_MODE),
        ],
        action: PostAction::None,
    })
}

pub(super) fn monitor_plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let services = decode_all::<MonitoredService>(&bags.get(ResourceType::MonitorService))?;

    let mut out = String::new();
    for (name, svc) in &services {
        let _ = writeln!(out, "[{name}]");
        let _ = writeln!(out, "processname = {}", svc.process_name);
        let _ = writeln!(out, "servicename = {}", svc.service_name);
        if let Some(pidfile) = &svc.pidfile {
            let _ = writeln!(out, "pidfile = {pidfile}");
        }
        out.push('\n');
    }

    Ok(RenderPlan {
        target: RenderTarget::Monitor,
        artifacts: vec![Artifact::new(&config.artifacts.monitor_conf, out)],
        action: PostAction::None,
    })
}
