// Interface addresses: a list per device, each entry normalized with its
// device name, CIDR and network on the way in.
//
// A public IP lives on at most one device. Any payload entry first evicts
// that IP everywhere; additions then append it to their own device.

use serde_json::Value;

use super::{decode, encode, invalid, list_field, MergeError, MergeOutcome};
use crate::model::{AddressEntry, DataBag, ResourceType};

const RESOURCE: ResourceType = ResourceType::Addresses;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    let Some(addresses) = list_field(RESOURCE, payload, "ip_address")? else {
        return Ok(MergeOutcome::unchanged(current));
    };

    let mut bag = current.clone();
    for raw in addresses {
        let entry: AddressEntry = decode(RESOURCE, raw)?;
        let entry = entry.normalized().map_err(|_| {
            invalid(RESOURCE, format!("netmask {} is not contiguous", raw["netmask"]))
        })?;
        let ip = entry.public_ip.to_string();

        for list in bag.entries.values_mut() {
            if let Value::Array(items) = list {
                items.retain(|item| item.get("public_ip").and_then(Value::as_str) != Some(ip.as_str()));
            }
        }
        bag.entries
            .retain(|_, list| list.as_array().is_none_or(|items| !items.is_empty()));

        if entry.add {
            let device = entry.device();
            let encoded = encode(RESOURCE, &entry)?;
            match bag.entries.get_mut(&device) {
                Some(Value::Array(items)) => items.push(encoded),
                _ => {
                    bag.insert(device, Value::Array(vec![encoded]));
                }
            }
        }
    }
    Ok(MergeOutcome::with(bag, Vec::new()))
}
