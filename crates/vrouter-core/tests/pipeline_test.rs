// End-to-end reconciliation passes against a sandboxed root and a
// recording command runner.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use vrouter_core::{
    CommandOutput, CommandPayload, CoreError, DryRunRunner, Reconciler, RenderOptions,
    RenderTarget, ResourceType, RouterConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn setup(root: &Path, runner: DryRunRunner) -> (Reconciler<DryRunRunner>, Arc<DryRunRunner>) {
    let runner = Arc::new(runner);
    let reconciler = Reconciler::new(RouterConfig::rooted_at(root), Arc::clone(&runner));
    (reconciler, runner)
}

fn payload(resource: ResourceType, data: Value) -> CommandPayload {
    CommandPayload::new(resource, data)
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o777
}

// ── DHCP ────────────────────────────────────────────────────────────

#[tokio::test]
async fn dhcp_reservation_added_then_removed_by_mac() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, runner) = setup(dir.path(), DryRunRunner::new());
    let hosts_file = reconciler.config().artifacts.dhcp_hosts.clone();

    reconciler
        .apply(payload(
            ResourceType::DhcpEntries,
            json!({"ipv4_address": "10.1.1.20", "mac_address": "AA-BB-CC-00-11-22",
                   "host_name": "web01", "add": true}),
        ))
        .await
        .unwrap();
    assert_eq!(read(&hosts_file), "aa:bb:cc:00:11:22,10.1.1.20,web01,infinite\n");
    assert!(read(&reconciler.config().artifacts.hosts).contains("10.1.1.20\tweb01"));
    // dnsmasq runs unprivileged and must still read what we publish.
    assert_eq!(mode_of(&hosts_file), 0o644);
    assert_eq!(mode_of(&reconciler.config().artifacts.hosts), 0o644);

    let report = reconciler
        .apply(payload(
            ResourceType::DhcpEntries,
            json!({"mac_address": "aa:bb:cc:00:11:22", "add": false}),
        ))
        .await
        .unwrap();
    assert!(report.changed);
    assert_eq!(report.version, 2);
    assert_eq!(read(&hosts_file), "");
    assert_eq!(
        runner.recorded_lines(),
        vec!["systemctl restart dnsmasq", "systemctl restart dnsmasq"]
    );
}

// ── Firewall and NAT ────────────────────────────────────────────────

#[tokio::test]
async fn static_nat_revoke_removes_the_translation() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, runner) = setup(dir.path(), DryRunRunner::new());
    let rules_file = reconciler.config().artifacts.firewall_rules.clone();
    let nat = |revoke: bool| {
        json!({"rules": [{"source_ip_address": "203.0.113.10",
                          "destination_ip_address": "10.1.1.20",
                          "type": "staticnat", "revoke": revoke}]})
    };

    reconciler
        .apply(payload(ResourceType::ForwardingRules, nat(false)))
        .await
        .unwrap();
    assert!(read(&rules_file)
        .contains("-A VR_PREROUTING -d 203.0.113.10/32 -j DNAT --to-destination 10.1.1.20"));

    reconciler
        .apply(payload(ResourceType::ForwardingRules, nat(true)))
        .await
        .unwrap();
    assert!(!read(&rules_file).contains("203.0.113.10"));

    let lines = runner.recorded_lines();
    assert_eq!(
        lines.iter().filter(|l| l.starts_with("iptables-restore --test")).count(),
        2
    );
    let restore = format!("iptables-restore --noflush {}", rules_file.display());
    assert_eq!(lines.iter().filter(|l| **l == restore).count(), 2);
    // Hooks already in place are only checked.
    assert!(!lines.iter().any(|l| l.contains(" -I ")));
}

#[tokio::test]
async fn missing_hook_is_inserted_after_the_restore() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, runner) = setup(
        dir.path(),
        DryRunRunner::new().respond(
            &["iptables", "-w", "-t", "filter", "-C"],
            CommandOutput::with_status(1).stderr("iptables: No chain/target/match by that name."),
        ),
    );
    let rules_file = reconciler.config().artifacts.firewall_rules.clone();

    reconciler
        .apply(payload(
            ResourceType::FirewallRules,
            json!({"rules": [{"id": 3, "protocol": "tcp", "first_port": 443}]}),
        ))
        .await
        .unwrap();

    let lines = runner.recorded_lines();
    let restore = format!("iptables-restore --noflush {}", rules_file.display());
    let restored_at = lines.iter().position(|l| *l == restore).unwrap();
    let inserted_at = lines
        .iter()
        .position(|l| l == "iptables -w -t filter -I FORWARD 1 -j VR_FORWARD")
        .unwrap();
    assert!(restored_at < inserted_at);
    assert_eq!(lines.iter().filter(|l| l.contains(" -I ")).count(), 1);

    let ruleset = read(&rules_file);
    assert!(ruleset.contains("-A VR_INGRESS -s 0.0.0.0/0 -p tcp -m tcp --dport 443"));
    assert!(ruleset.contains("-A VR_FORWARD -j DROP\n"));
}

#[tokio::test]
async fn port_forward_collision_is_reported_not_applied() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, _runner) = setup(dir.path(), DryRunRunner::new());
    let forward = |dst: &str| {
        json!({"rules": [{"source_ip_address": "203.0.113.11", "destination_ip_address": dst,
                          "source_port_range": "80", "protocol": "tcp", "type": "forward"}]})
    };

    reconciler
        .apply(payload(ResourceType::ForwardingRules, forward("10.1.1.30")))
        .await
        .unwrap();
    let report = reconciler
        .apply(payload(ResourceType::ForwardingRules, forward("10.1.1.31")))
        .await
        .unwrap();

    assert!(!report.changed);
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].key, "203.0.113.11");
    let rules = read(&reconciler.config().artifacts.firewall_rules);
    assert!(rules.contains("10.1.1.30:80"));
    assert!(!rules.contains("10.1.1.31"));
}

#[tokio::test]
async fn failed_reload_restores_the_previous_ruleset() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, _runner) = setup(dir.path(), DryRunRunner::new());
    let rules_file = reconciler.config().artifacts.firewall_rules.clone();
    reconciler
        .apply(payload(
            ResourceType::FirewallRules,
            json!({"rules": [{"id": 7, "protocol": "tcp", "first_port": 22,
                              "source_cidr_list": ["192.0.2.0/24"]}]}),
        ))
        .await
        .unwrap();
    let before = read(&rules_file);

    // A second reconciler over the same root whose reload step fails.
    let failing = DryRunRunner::new().respond(
        &["iptables-restore", "--noflush", rules_file.to_str().unwrap()],
        CommandOutput::with_status(1).stderr("iptables-restore: line 9 failed"),
    );
    let (reconciler, _runner) = setup(dir.path(), failing);
    let err = reconciler
        .apply(payload(
            ResourceType::FirewallRules,
            json!({"rules": [{"id": 8, "protocol": "udp", "first_port": 53}]}),
        ))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::CommandFailed { status: 1, .. }));
    assert_eq!(read(&rules_file), before);
    // The bag keeps the new rule; the next pass retries the render.
    let bag = reconciler.store().load(ResourceType::FirewallRules).unwrap();
    assert!(bag.contains("8"));
}

// ── Addresses and routing ───────────────────────────────────────────

#[tokio::test]
async fn removed_address_is_withdrawn_from_the_device() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, runner) = setup(dir.path(), DryRunRunner::new());
    let address = |ip: &str, add: bool| {
        json!({"ip_address": [{"public_ip": ip, "netmask": "255.255.255.0", "nic_dev_id": 2,
                               "gateway": "203.0.113.1", "nw_type": "public", "add": add}]})
    };

    reconciler
        .apply(payload(ResourceType::Addresses, address("203.0.113.5", true)))
        .await
        .unwrap();
    reconciler
        .apply(payload(ResourceType::Addresses, address("203.0.113.6", true)))
        .await
        .unwrap();
    assert!(
        runner
            .recorded_lines()
            .contains(&"ip addr add 203.0.113.6/24 dev eth2".to_owned())
    );

    runner.clear();
    reconciler
        .apply(payload(ResourceType::Addresses, address("203.0.113.6", false)))
        .await
        .unwrap();

    let lines = runner.recorded_lines();
    assert!(lines.contains(&"ip addr del 203.0.113.6/24 dev eth2".to_owned()));
    assert!(!lines.iter().any(|l| l.starts_with("ip addr del 203.0.113.5")));
    assert_eq!(
        read(&reconciler.config().artifacts.address_state),
        "eth2 203.0.113.5/24 public\n"
    );
    assert!(read(&reconciler.config().artifacts.rt_tables).contains("102\tTable_eth2"));
}

#[tokio::test]
async fn backup_router_skips_vrrp_routes_it_cannot_source() {
    let dir = tempfile::tempdir().unwrap();
    // Without the address on the device the kernel refuses the route.
    let (reconciler, runner) = setup(
        dir.path(),
        DryRunRunner::new().respond(
            &["ip", "route", "replace"],
            CommandOutput::with_status(2).stderr("Error: Invalid prefsrc address."),
        ),
    );
    reconciler
        .apply(payload(ResourceType::CmdLine, json!({"cmd_line": {"redundant_router": true}})))
        .await
        .unwrap();
    assert!(!reconciler.owns_vips().unwrap());
    runner.clear();

    let report = reconciler
        .apply(payload(
            ResourceType::Addresses,
            json!({"ip_address": [
                {"public_ip": "203.0.113.5", "netmask": "255.255.255.0", "nic_dev_id": 2,
                 "gateway": "203.0.113.1", "nw_type": "public", "add": true},
                {"public_ip": "10.1.1.1", "netmask": "255.255.255.0", "nic_dev_id": 1,
                 "nw_type": "guest", "add": true},
            ]}),
        ))
        .await
        .unwrap();

    assert!(report.changed);
    let lines = runner.recorded_lines();
    assert!(!lines.iter().any(|l| l.starts_with("ip route replace")));
    assert!(!lines.iter().any(|l| l.starts_with("ip addr add")));
    // Routing succeeded, so the dns target after it converged too.
    assert!(lines.contains(&"systemctl restart dnsmasq".to_owned()));
    let state = read(&reconciler.config().artifacts.address_state);
    assert!(state.contains("eth2 203.0.113.5/24 public\n"));
    assert!(state.contains("eth1 10.1.1.1/24 guest\n"));
}

// ── Idempotence ─────────────────────────────────────────────────────

#[tokio::test]
async fn forced_sweep_republishes_without_bag_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (reconciler, runner) = setup(dir.path(), DryRunRunner::new());
    reconciler
        .apply(payload(
            ResourceType::VpnUsers,
            json!({"vpn_users": [{"user": "alice", "password": "s3cret", "add": true}]}),
        ))
        .await
        .unwrap();
    let version = reconciler.store().load(ResourceType::VpnUsers).unwrap().version;

    runner.clear();
    let incremental = reconciler.converge(RenderTarget::Vpn, RenderOptions::incremental(true)).await.unwrap();
    assert!(incremental.published.is_empty());
    assert!(runner.recorded().is_empty());

    let forced = reconciler.converge(RenderTarget::Vpn, RenderOptions::forced(true)).await.unwrap();
    assert_eq!(mode_of(&reconciler.config().artifacts.vpn_secrets), 0o600);
    assert_eq!(forced.published, vec![reconciler.config().artifacts.vpn_secrets.clone()]);
    assert_eq!(
        reconciler.store().load(ResourceType::VpnUsers).unwrap().version,
        version
    );
}
