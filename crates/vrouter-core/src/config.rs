// ── Runtime router configuration ──
//
// Paths, service names and timeouts the core operates with. The config
// crate builds a `RouterConfig` from TOML + env and hands it in; core
// never reads config files itself.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How services are started, stopped and restarted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceManager {
    /// `systemctl <action> <service>`
    #[default]
    Systemd,
    /// `service <service> <action>`
    Sysv,
}

/// Fixed artifact path per render target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub dhcp_hosts: PathBuf,
    pub hosts: PathBuf,
    pub dnsmasq_conf: PathBuf,
    pub firewall_rules: PathBuf,
    pub haproxy_cfg: PathBuf,
    pub vpn_secrets: PathBuf,
    pub monitor_conf: PathBuf,
    pub rt_tables: PathBuf,
    pub address_state: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self {
            dhcp_hosts: "/etc/dhcphosts.txt".into(),
            hosts: "/etc/hosts".into(),
            dnsmasq_conf: "/etc/dnsmasq.d/vrouter.conf".into(),
            firewall_rules: "/etc/iptables/vrouter.rules".into(),
            haproxy_cfg: "/etc/haproxy/haproxy.cfg".into(),
            vpn_secrets: "/etc/ppp/chap-secrets".into(),
            monitor_conf: "/etc/monitor.conf".into(),
            rt_tables: "/etc/iproute2/rt_tables".into(),
            address_state: "/var/lib/vrouter/address_state".into(),
        }
    }
}

/// Names of the services that own artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNames {
    pub dhcp: String,
    pub load_balancer: String,
    pub vrrp: String,
}

impl Default for ServiceNames {
    fn default() -> Self {
        Self {
            dhcp: "dnsmasq".into(),
            load_balancer: "haproxy".into(),
            vrrp: "keepalived".into(),
        }
    }
}

/// Configuration for one router instance.
///
/// Built by the config crate or directly by tests, passed to the
/// `Reconciler` which shares it with the renderer and process controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Directory holding one `<resource>.json` bag file per resource type.
    pub data_dir: PathBuf,
    /// Directory holding per-resource and per-target lock files.
    pub lock_dir: PathBuf,
    /// Persisted redundancy role.
    pub state_file: PathBuf,
    /// Upper bound for any external command, in seconds.
    pub command_timeout_secs: u64,
    /// How long to wait for a contended lock, in seconds.
    pub lock_timeout_secs: u64,
    pub service_manager: ServiceManager,
    /// Argument-vector prefix identifying a running VRRP daemon.
    pub vrrp_signature: Vec<String>,
    pub artifacts: ArtifactPaths,
    pub services: ServiceNames,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            data_dir: "/etc/vrouter/databags".into(),
            lock_dir: "/run/vrouter/locks".into(),
            state_file: "/run/vrouter/redundancy_state".into(),
            command_timeout_secs: 30,
            lock_timeout_secs: 60,
            service_manager: ServiceManager::default(),
            vrrp_signature: vec!["keepalived".into()],
            artifacts: ArtifactPaths::default(),
            services: ServiceNames::default(),
        }
    }
}

impl RouterConfig {
    /// A configuration rooted entirely under `root`, for sandboxes and tests.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let etc = root.join("etc");
        Self {
            data_dir: root.join("databags"),
            lock_dir: root.join("locks"),
            state_file: root.join("redundancy_state"),
            artifacts: ArtifactPaths {
                dhcp_hosts: etc.join("dhcphosts.txt"),
                hosts: etc.join("hosts"),
                dnsmasq_conf: etc.join("dnsmasq.conf"),
                firewall_rules: etc.join("vrouter.rules"),
                haproxy_cfg: etc.join("haproxy.cfg"),
                vpn_secrets: etc.join("chap-secrets"),
                monitor_conf: etc.join("monitor.conf"),
                rt_tables: etc.join("rt_tables"),
                address_state: etc.join("address_state"),
            },
            ..Self::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}
