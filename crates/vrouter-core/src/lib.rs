// vrouter-core: state reconciliation for a redundant virtual router.
//
// Declarative configuration payloads are merged into durable per-type
// bags, rendered into OS artifacts (routing tables, DHCP hosts, dnsmasq,
// iptables, haproxy, VPN secrets) and applied through a pluggable
// command runner. A two-node VRRP state machine decides which node owns
// the shared addresses.
//
// Entry point is `Reconciler`; `RedundancyMachine` wraps it for failover.

pub mod artifact;
pub mod command;
pub mod config;
pub mod error;
pub mod interface;
pub mod merge;
pub mod model;
pub mod process;
pub mod reconciler;
pub mod redundancy;
pub mod render;
pub mod routing;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────

pub use command::{CommandPayload, PassReport};
pub use config::{ArtifactPaths, RouterConfig, ServiceManager, ServiceNames};
pub use error::CoreError;
pub use interface::{AddressManager, DeviceFacts};
pub use merge::{MergeConflict, MergeError, MergeOutcome};
pub use process::{
    CommandOutput, CommandRunner, CommandSpec, DryRunRunner, ProcessController, ServiceAction,
    SystemRunner,
};
pub use reconciler::{Reconciler, TargetOutcome};
pub use redundancy::{
    RedundancyEvent, RedundancyMachine, RedundancyState, TransitionReport, TriggerSource,
};
pub use render::{RenderMode, RenderOptions, RenderReport, RenderTarget};
pub use store::DataBagStore;

// ── Model re-exports ────────────────────────────────────────────────

pub use model::{
    AddressEntry, CmdLine, DataBag, DhcpEntry, FirewallRule, ForwardKind, ForwardingRule,
    GuestNetworkEntry, InterfaceRole, MacAddress, MonitoredService, ResourceType, TrafficType,
    VpnUser,
};
