// ── Policy routing ──
//
// Each public or guest device gets its own routing table (`Table_ethN`,
// number 100 + N) plus a source rule per address, so replies leave by the
// interface the traffic arrived on. All commands are safe to re-run.

use std::fmt::Write as _;

use tracing::{debug, info};

use crate::error::CoreError;
use crate::interface::{table_name, DeviceFacts};
use crate::model::{AddressEntry, InterfaceRole};
use crate::process::{CommandRunner, CommandSpec, ProcessController};

const RT_TABLES_HEADER: &str = "\
#
# reserved values
#
255\tlocal
254\tmain
253\tdefault
0\tunspec
#
# vrouter device tables
#
";

/// Contents of `rt_tables` naming one table per routed device.
pub fn rt_tables(devices: &[DeviceFacts]) -> String {
    let mut out = String::from(RT_TABLES_HEADER);
    for facts in devices.iter().filter(|f| needs_table(f)) {
        let _ = writeln!(out, "{}\t{}", facts.table_id(), facts.table_name());
    }
    out
}

fn needs_table(facts: &DeviceFacts) -> bool {
    matches!(facts.role, InterfaceRole::Public | InterfaceRole::Guest)
}

/// Commands that bring one address up on its device.
pub fn address_add(device: &str, entry: &AddressEntry) -> Vec<CommandSpec> {
    vec![
        CommandSpec::ip(["addr", "add", entry.cidr_string().as_str(), "dev", device]),
        CommandSpec::ip(["link", "set", "dev", device, "up"]),
    ]
}

/// Command that takes one address off its device.
pub fn address_del(device: &str, cidr: &str) -> CommandSpec {
    CommandSpec::ip(["addr", "del", cidr, "dev", device])
}

/// Commands asserting source rules and routes for one device's table.
pub fn table_commands(facts: &DeviceFacts) -> Vec<CommandSpec> {
    if !needs_table(facts) {
        return Vec::new();
    }
    let table = facts.table_name();
    let mut commands = Vec::new();
    for entry in &facts.addresses {
        let ip = entry.public_ip.to_string();
        commands.push(CommandSpec::ip([
            "route",
            "replace",
            entry.network_string().as_str(),
            "dev",
            facts.device.as_str(),
            "proto",
            "static",
            "src",
            ip.as_str(),
            "table",
            table.as_str(),
        ]));
        commands.push(CommandSpec::ip(["rule", "add", "from", ip.as_str(), "table", table.as_str()]));
    }
    if let Some(gateway) = facts.gateway.filter(|_| facts.role == InterfaceRole::Public) {
        commands.push(CommandSpec::ip([
            "route",
            "replace",
            "default",
            "via",
            gateway.to_string().as_str(),
            "dev",
            facts.device.as_str(),
            "table",
            table.as_str(),
        ]));
    }
    commands
}

/// Command removing the source rule for a withdrawn address.
pub fn rule_del(device: &str, ip: &str) -> CommandSpec {
    CommandSpec::ip(["rule", "del", "from", ip, "table", table_name(device).as_str()])
}

/// Applies policy routing through a process controller.
pub struct PolicyRouting<'a, R> {
    processes: &'a ProcessController<R>,
}

impl<'a, R: CommandRunner> PolicyRouting<'a, R> {
    pub fn new(processes: &'a ProcessController<R>) -> Self {
        Self { processes }
    }

    /// Assert the device's table, rules and default route.
    pub async fn assert_device(&self, facts: &DeviceFacts) -> Result<(), CoreError> {
        let commands = table_commands(facts);
        if commands.is_empty() {
            return Ok(());
        }
        debug!(device = %facts.device, table = %facts.table_name(), "asserting policy routing");
        for command in &commands {
            self.processes.execute_idempotent(command).await?;
        }
        Ok(())
    }

    /// Bring every address of a device up.
    pub async fn assign_addresses(&self, facts: &DeviceFacts) -> Result<(), CoreError> {
        for entry in &facts.addresses {
            for command in address_add(facts.device.as_str(), entry) {
                self.processes.execute_idempotent(&command).await?;
            }
        }
        info!(device = %facts.device, count = facts.addresses.len(), "addresses assigned");
        Ok(())
    }

    /// Take every address of a device down.
    pub async fn withdraw_addresses(&self, facts: &DeviceFacts) -> Result<(), CoreError> {
        for entry in &facts.addresses {
            self.processes
                .execute_idempotent(&address_del(facts.device.as_str(), entry.cidr_string().as_str()))
                .await?;
        }
        info!(device = %facts.device, count = facts.addresses.len(), "addresses withdrawn");
        Ok(())
    }

    pub async fn flush_cache(&self) -> Result<(), CoreError> {
        self.processes
            .execute_idempotent(&CommandSpec::ip(["route", "flush", "cache"]))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use crate::config::RouterConfig;
    use crate::process::DryRunRunner;

    fn public_facts() -> DeviceFacts {
        let entry: AddressEntry = serde_json::from_value(serde_json::json!({
            "public_ip": "203.0.113.5", "netmask": "255.255.255.0", "nic_dev_id": 2,
            "nw_type": "public", "gateway": "203.0.113.1"
        }))
        .unwrap();
        DeviceFacts {
            device: "eth2".into(),
            nic_dev_id: 2,
            role: InterfaceRole::Public,
            addresses: vec![entry.normalized().unwrap()],
            gateway: Some(Ipv4Addr::new(203, 0, 113, 1)),
            dns: Vec::new(),
            domain: None,
            vrrp: false,
        }
    }

    #[test]
    fn rt_tables_lists_routed_devices_only() {
        let mut private = public_facts();
        private.device = "eth0".into();
        private.nic_dev_id = 0;
        private.role = InterfaceRole::Private;

        let text = rt_tables(&[public_facts(), private]);
        assert!(text.starts_with("#\n# reserved values"));
        assert!(text.contains("102\tTable_eth2\n"));
        assert!(!text.contains("Table_eth0"));
    }

    #[test]
    fn public_device_gets_rule_routes_and_default() {
        let lines: Vec<String> = table_commands(&public_facts())
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "ip route replace 203.0.113.0/24 dev eth2 proto static src 203.0.113.5 table Table_eth2",
                "ip rule add from 203.0.113.5 table Table_eth2",
                "ip route replace default via 203.0.113.1 dev eth2 table Table_eth2",
            ]
        );
    }

    #[tokio::test]
    async fn assign_and_withdraw_use_ip_addr() {
        let config = RouterConfig::default();
        let runner = Arc::new(DryRunRunner::new());
        let processes = ProcessController::new(Arc::clone(&runner), &config);
        let routing = PolicyRouting::new(&processes);

        routing.assign_addresses(&public_facts()).await.unwrap();
        routing.withdraw_addresses(&public_facts()).await.unwrap();
        assert_eq!(
            runner.recorded_lines(),
            vec![
                "ip addr add 203.0.113.5/24 dev eth2",
                "ip link set dev eth2 up",
                "ip addr del 203.0.113.5/24 dev eth2",
            ]
        );
    }
}
