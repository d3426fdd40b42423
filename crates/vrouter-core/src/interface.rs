// ── Interface and address facts ──
//
// Derives per-device facts (role, addresses, gateway, resolvers, domain)
// from the addresses, guestnetwork and cmdline bags. Read-only: nothing
// here touches the host.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::Serialize;

use crate::error::CoreError;
use crate::model::{
    AddressEntry, CmdLine, DataBag, GuestNetworkEntry, InterfaceRole, ResourceType,
};

/// Everything known about one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceFacts {
    pub device: String,
    pub nic_dev_id: u32,
    pub role: InterfaceRole,
    pub addresses: Vec<AddressEntry>,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Vec<Ipv4Addr>,
    pub domain: Option<String>,
    /// Addresses on this device follow the VRRP master.
    pub vrrp: bool,
}

impl DeviceFacts {
    /// Primary address: the first one assigned.
    pub fn primary(&self) -> Option<&AddressEntry> {
        self.addresses.first()
    }

    /// Policy routing table number for this device.
    pub fn table_id(&self) -> u32 {
        100 + self.nic_dev_id
    }

    pub fn table_name(&self) -> String {
        table_name(&self.device)
    }
}

pub fn table_name(device: &str) -> String {
    format!("Table_{device}")
}

/// Read-only view over the interface-related bags.
#[derive(Debug, Clone, Default)]
pub struct AddressManager {
    devices: BTreeMap<String, Vec<AddressEntry>>,
    guest: BTreeMap<String, GuestNetworkEntry>,
    cmdline: CmdLine,
}

impl AddressManager {
    pub fn new(
        addresses: &DataBag,
        guest: &DataBag,
        cmdline: &DataBag,
    ) -> Result<Self, CoreError> {
        let devices = addresses
            .typed::<Vec<AddressEntry>>()
            .map_err(|e| unreadable(ResourceType::Addresses, "*", &e))?
            .into_iter()
            .filter(|(_, list)| !list.is_empty())
            .collect();
        let guest = guest
            .typed::<GuestNetworkEntry>()
            .map_err(|e| unreadable(ResourceType::GuestNetwork, "*", &e))?
            .into_iter()
            .filter(|(_, entry)| entry.add)
            .collect();
        let cmdline = cmdline
            .entry::<CmdLine>(CmdLine::KEY)
            .map_err(|e| unreadable(ResourceType::CmdLine, CmdLine::KEY, &e))?
            .unwrap_or_default();

        Ok(Self {
            devices,
            guest,
            cmdline,
        })
    }

    pub fn cmdline(&self) -> &CmdLine {
        &self.cmdline
    }

    pub fn is_redundant(&self) -> bool {
        self.cmdline.redundant_router
    }

    /// Role of a device, `None` if it has no addresses.
    pub fn role(&self, device: &str) -> Option<InterfaceRole> {
        self.devices
            .get(device)
            .and_then(|list| list.first())
            .map(|entry| entry.nw_type)
    }

    pub fn is_public(&self, device: &str) -> bool {
        self.role(device) == Some(InterfaceRole::Public)
    }

    pub fn is_guest(&self, device: &str) -> bool {
        self.role(device) == Some(InterfaceRole::Guest)
    }

    pub fn is_private(&self, device: &str) -> bool {
        self.role(device) == Some(InterfaceRole::Private)
    }

    /// Guest and public devices of a redundant pair move with VRRP.
    pub fn needs_vrrp(&self, device: &str) -> bool {
        self.is_redundant()
            && matches!(
                self.role(device),
                Some(InterfaceRole::Guest | InterfaceRole::Public)
            )
    }

    pub fn facts(&self, device: &str) -> Option<DeviceFacts> {
        let addresses = self.devices.get(device)?;
        let primary = addresses.first()?;
        let role = primary.nw_type;
        let guest = self.guest.get(device);

        let gateway = match role {
            InterfaceRole::Guest => guest
                .and_then(|g| g.router_guest_ip)
                .or(Some(primary.public_ip)),
            InterfaceRole::Public => addresses.iter().find_map(|a| a.gateway),
            InterfaceRole::Private => None,
        };

        let mut dns = guest.map(GuestNetworkEntry::dns_servers).unwrap_or_default();
        if dns.is_empty() {
            dns = self.cmdline.dns_servers();
        }
        let domain = guest
            .and_then(|g| g.domain_name.clone())
            .or_else(|| self.cmdline.domain.clone());

        Some(DeviceFacts {
            device: device.to_owned(),
            nic_dev_id: primary.nic_dev_id,
            role,
            addresses: addresses.clone(),
            gateway,
            dns,
            domain,
            vrrp: self.needs_vrrp(device),
        })
    }

    /// Facts for a guest device, `None` if it is not a guest or has no
    /// addresses.
    pub fn guest_interface(&self, device: &str) -> Option<DeviceFacts> {
        self.facts(device)
            .filter(|facts| facts.role == InterfaceRole::Guest)
    }

    /// All devices that have at least one address.
    pub fn devices(&self) -> Vec<DeviceFacts> {
        self.devices
            .keys()
            .filter_map(|device| self.facts(device))
            .collect()
    }

    pub fn public_and_guest_devices(&self) -> Vec<DeviceFacts> {
        self.devices()
            .into_iter()
            .filter(|f| matches!(f.role, InterfaceRole::Public | InterfaceRole::Guest))
            .collect()
    }

    /// Guest settings for devices, including ones with no addresses yet.
    pub fn guest_networks(&self) -> impl Iterator<Item = &GuestNetworkEntry> {
        self.guest.values()
    }
}

fn unreadable(resource: ResourceType, key: &str, err: &serde_json::Error) -> CoreError {
    CoreError::InvalidEntry {
        resource,
        key: key.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bags(redundant: bool) -> (DataBag, DataBag, DataBag) {
        let mut addresses = DataBag::new(ResourceType::Addresses);
        addresses.insert(
            "eth1",
            json!([{"public_ip": "10.1.1.1", "netmask": "255.255.255.0", "nic_dev_id": 1,
                    "nw_type": "guest"}]),
        );
        addresses.insert(
            "eth2",
            json!([{"public_ip": "203.0.113.5", "netmask": "255.255.255.0", "nic_dev_id": 2,
                    "nw_type": "public", "gateway": "203.0.113.1"}]),
        );
        addresses.insert(
            "eth0",
            json!([{"public_ip": "169.254.0.10", "netmask": "255.255.0.0", "nic_dev_id": 0,
                    "nw_type": "control"}]),
        );

        let mut guest = DataBag::new(ResourceType::GuestNetwork);
        guest.insert(
            "eth1",
            json!({"device": "eth1", "router_guest_ip": "10.1.1.1", "domain_name": "guest.local"}),
        );
        guest.insert("eth5", json!({"device": "eth5", "dns": "9.9.9.9"}));

        let mut cmdline = DataBag::new(ResourceType::CmdLine);
        cmdline.insert(
            "config",
            json!({"redundant_router": redundant, "dns1": "8.8.8.8", "domain": "cloud.local"}),
        );
        (addresses, guest, cmdline)
    }

    fn manager(redundant: bool) -> AddressManager {
        let (a, g, c) = bags(redundant);
        AddressManager::new(&a, &g, &c).unwrap()
    }

    #[test]
    fn roles_and_vrrp_membership() {
        let m = manager(true);
        assert!(m.is_guest("eth1"));
        assert!(m.is_public("eth2"));
        assert!(m.is_private("eth0"));
        assert!(m.needs_vrrp("eth1"));
        assert!(m.needs_vrrp("eth2"));
        assert!(!m.needs_vrrp("eth0"));
        assert!(!manager(false).needs_vrrp("eth2"));
    }

    #[test]
    fn gateway_depends_on_role() {
        let m = manager(false);
        assert_eq!(m.facts("eth1").unwrap().gateway, Some(Ipv4Addr::new(10, 1, 1, 1)));
        assert_eq!(m.facts("eth2").unwrap().gateway, Some(Ipv4Addr::new(203, 0, 113, 1)));
        assert_eq!(m.facts("eth0").unwrap().gateway, None);
    }

    #[test]
    fn dns_and_domain_fall_back_to_cmdline() {
        let facts = manager(false).facts("eth1").unwrap();
        assert_eq!(facts.dns, vec![Ipv4Addr::new(8, 8, 8, 8)]);
        assert_eq!(facts.domain.as_deref(), Some("guest.local"));

        let public = manager(false).facts("eth2").unwrap();
        assert_eq!(public.domain.as_deref(), Some("cloud.local"));
    }

    #[test]
    fn device_without_addresses_is_not_a_guest_interface() {
        let m = manager(false);
        assert!(m.guest_interface("eth5").is_none());
        assert!(m.guest_interface("eth2").is_none());
        assert!(m.guest_interface("eth1").is_some());
        assert_eq!(m.public_and_guest_devices().len(), 2);
    }

    #[test]
    fn table_naming() {
        let facts = manager(false).facts("eth2").unwrap();
        assert_eq!(facts.table_id(), 102);
        assert_eq!(facts.table_name(), "Table_eth2");
    }

    #[test]
    fn empty_bags_give_no_devices() {
        let m = AddressManager::new(
            &DataBag::new(ResourceType::Addresses),
            &DataBag::new(ResourceType::GuestNetwork),
            &DataBag::new(ResourceType::CmdLine),
        )
        .unwrap();
        assert!(m.devices().is_empty());
        assert!(!m.is_redundant());
    }
}
