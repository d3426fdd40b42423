// Routing target: rt_tables plus a record of which addresses we put on
// which device. The record is what lets a later pass withdraw addresses
// that were removed from the bag.

use std::fmt::Write as _;

use super::{Artifact, BagSet, PostAction, RenderPlan, RenderTarget};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::interface::{AddressManager, DeviceFacts};
use crate::model::{InterfaceRole, ResourceType};
use crate::routing;

pub(super) fn plan(bags: &BagSet, config: &RouterConfig) -> Result<RenderPlan, CoreError> {
    let manager = AddressManager::new(
        &bags.get(ResourceType::Addresses),
        &bags.get(ResourceType::GuestNetwork),
        &bags.get(ResourceType::CmdLine),
    )?;
    let devices = manager.devices();

    Ok(RenderPlan {
        target: RenderTarget::Routing,
        artifacts: vec![
            Artifact::new(&config.artifacts.rt_tables, routing::rt_tables(&devices)),
            Artifact::new(&config.artifacts.address_state, address_state(&devices)),
        ],
        action: PostAction::Routing {
            devices,
            state_path: config.artifacts.address_state.clone(),
        },
    })
}

fn address_state(devices: &[DeviceFacts]) -> String {
    let mut out = String::new();
    for facts in devices {
        for entry in &facts.addresses {
            let _ = writeln!(
                out,
                "{} {} {}",
                facts.device,
                entry.cidr_string(),
                role_name(facts.role)
            );
        }
    }
    out
}

fn role_name(role: InterfaceRole) -> &'static str {
    match role {
        InterfaceRole::Public => "public",
        InterfaceRole::Guest => "guest",
        InterfaceRole::Private => "control",
    }
}

/// `(device, cidr)` from one line of the address record.
pub(super) fn parse_state_line(line: &str) -> Option<(String, String)> {
    let mut fields = line.split_whitespace();
    let device = fields.next()?;
    let cidr = fields.next()?;
    cidr.contains('/')
        .then(|| (device.to_owned(), cidr.to_owned()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DataBag;
    use serde_json::json;

    #[test]
    fn plan_records_every_address() {
        let mut addresses = DataBag::new(ResourceType::Addresses);
        addresses.insert(
            "eth2",
            json!([
                {"public_ip": "203.0.113.5", "netmask": "255.255.255.0", "nic_dev_id": 2},
                {"public_ip": "203.0.113.6", "netmask": "255.255.255.0", "nic_dev_id": 2}
            ]),
        );
        let config = RouterConfig::rooted_at("/tmp/vr");
        let plan = plan(&BagSet::new().with(addresses), &config).unwrap();

        assert_eq!(
            plan.artifacts[1].contents,
            "eth2 203.0.113.5/24 public\neth2 203.0.113.6/24 public\n"
        );
        assert!(plan.artifacts[0].contents.contains("102\tTable_eth2"));
        let PostAction::Routing { devices, state_path } = plan.action else {
            panic!("routing target must carry a routing action");
        };
        assert_eq!(devices.len(), 1);
        assert_eq!(state_path, config.artifacts.address_state);
    }

    #[test]
    fn state_lines_parse_back() {
        assert_eq!(
            parse_state_line("eth1 10.1.1.1/24 guest"),
            Some(("eth1".into(), "10.1.1.1/24".into()))
        );
        assert_eq!(parse_state_line("# comment"), None);
        assert_eq!(parse_state_line(""), None);
    }
}
