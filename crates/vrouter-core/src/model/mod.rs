// ── Declarative state model ──
//
// Bags, the resource type tag, and the typed views of every entry shape
// the upstream producer sends. Field names here are the wire contract.

pub mod address;
pub mod bag;
pub(crate) mod de;
pub mod dhcp;
pub mod mac;
pub mod resource;
pub mod rules;
pub mod system;

// ── Re-exports ──────────────────────────────────────────────────────

pub use address::{device_name, AddressEntry, InterfaceRole};
pub use bag::DataBag;
pub use dhcp::{DhcpEntry, GuestNetworkEntry, VpnUser};
pub use mac::MacAddress;
pub use resource::ResourceType;
pub use rules::{FirewallRule, ForwardKind, ForwardingRule, TrafficType};
pub use system::{CmdLine, MonitoredService};
