// Guest network settings, one entry per device.

use serde_json::Value;

use super::{decode, MergeError, MergeOutcome};
use crate::model::{DataBag, GuestNetworkEntry, ResourceType};

const RESOURCE: ResourceType = ResourceType::GuestNetwork;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    if payload.get("device").is_none() {
        return Ok(MergeOutcome::unchanged(current));
    }
    let entry: GuestNetworkEntry = decode(RESOURCE, payload)?;
    let mut bag = current.clone();

    if entry.add {
        let mut stored = payload.clone();
        if let Some(map) = stored.as_object_mut() {
            map.remove("type");
        }
        bag.insert(entry.device, stored);
    } else {
        bag.remove(&entry.device);
    }
    Ok(MergeOutcome::with(bag, Vec::new()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_entry_is_replaced_then_removed() {
        let bag = DataBag::new(RESOURCE);
        let bag = merge(&bag, &json!({"device": "eth1", "dns": "8.8.8.8"})).unwrap().bag;
        let bag = merge(&bag, &json!({"device": "eth1", "dns": "1.1.1.1"})).unwrap().bag;
        assert_eq!(bag.get("eth1").unwrap()["dns"], "1.1.1.1");

        let bag = merge(&bag, &json!({"device": "eth1", "add": false})).unwrap().bag;
        assert!(bag.is_empty());
    }
}
