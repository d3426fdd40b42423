// DHCP reservations, keyed by IPv4 address.

use serde_json::Value;

use super::{decode, encode, with_field, MergeError, MergeOutcome};
use crate::model::{DataBag, DhcpEntry, MacAddress, ResourceType};

const RESOURCE: ResourceType = ResourceType::DhcpEntries;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    if payload.get("ipv4_address").is_none() && payload.get("mac_address").is_none() {
        return Ok(MergeOutcome::unchanged(current));
    }
    let entry: DhcpEntry = decode(RESOURCE, payload)?;
    let mut bag = current.clone();

    if entry.add {
        let Some(ip) = entry.ipv4_address else {
            return Ok(MergeOutcome::unchanged(current));
        };
        let mut stored = payload.clone();
        if let Some(mac) = &entry.mac_address {
            stored = with_field(&stored, "mac_address", encode(RESOURCE, mac)?);
        }
        if let Some(map) = stored.as_object_mut() {
            map.remove("type");
        }
        bag.insert(ip.to_string(), stored);
    } else {
        if let Some(ip) = entry.ipv4_address {
            bag.remove(&ip.to_string());
        }
        if let Some(mac) = &entry.mac_address {
            bag.entries.retain(|_, stored| stored_mac(stored).as_ref() != Some(mac));
        }
    }

    Ok(MergeOutcome::with(bag, Vec::new()))
}

fn stored_mac(entry: &Value) -> Option<MacAddress> {
    entry
        .get("mac_address")
        .and_then(Value::as_str)
        .map(MacAddress::new)
}
