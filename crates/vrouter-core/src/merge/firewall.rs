// Firewall rules, keyed by their opaque upstream id.

use serde_json::Value;

use super::{decode, list_field, with_field, MergeError, MergeOutcome};
use crate::model::{DataBag, FirewallRule, ResourceType};

const RESOURCE: ResourceType = ResourceType::FirewallRules;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    let Some(rules) = list_field(RESOURCE, payload, "rules")? else {
        return Ok(MergeOutcome::unchanged(current));
    };

    let mut bag = current.clone();
    for raw in rules {
        let rule: FirewallRule = decode(RESOURCE, raw)?;
        if rule.revoked {
            bag.remove(&rule.id);
        } else {
            let stored = with_field(raw, "id", Value::String(rule.id.clone()));
            bag.insert(rule.id, stored);
        }
    }
    Ok(MergeOutcome::with(bag, Vec::new()))
}
