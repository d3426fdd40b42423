// Static NAT and port forwards, keyed by public (source) IP.
//
// Static NAT owns its key outright: a newer mapping overwrites an older
// one. A port forward never silently replaces anything; a collision with
// a different target is returned as a conflict and the old entry stays.

use serde_json::Value;

use super::{decode, invalid, list_field, MergeConflict, MergeError, MergeOutcome};
use crate::model::{DataBag, ForwardKind, ForwardingRule, ResourceType};

const RESOURCE: ResourceType = ResourceType::ForwardingRules;

pub(super) fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    let Some(rules) = list_field(RESOURCE, payload, "rules")? else {
        return Ok(MergeOutcome::unchanged(current));
    };

    let mut bag = current.clone();
    let mut conflicts = Vec::new();

    for raw in rules {
        let rule: ForwardingRule = decode(RESOURCE, raw)?;
        if rule.kind == ForwardKind::Forward && !rule.revoke {
            require_ports(&rule)?;
        }
        let key = rule.source_ip_address.to_string();
        let existing = match bag.get(&key) {
            Some(value) => Some((decode::<ForwardingRule>(RESOURCE, value)?, value.clone())),
            None => None,
        };

        match (rule.kind, rule.revoke, existing) {
            (ForwardKind::StaticNat, true, Some((old, _))) if old.kind == ForwardKind::StaticNat => {
                bag.remove(&key);
            }
            (ForwardKind::StaticNat, true, _) | (ForwardKind::Forward, true, _) => {}
            (_, false, None) => {
                bag.insert(key, strip_revoke(raw));
            }
            (ForwardKind::StaticNat, false, Some((old, _))) if old.kind == ForwardKind::StaticNat => {
                bag.insert(key, strip_revoke(raw));
            }
            (_, false, Some((old, _))) if old.same_target(&rule) => {}
            (_, false, Some((old, existing))) => conflicts.push(MergeConflict {
                resource: RESOURCE,
                key,
                reason: if old.kind == rule.kind {
                    "port forward already maps this public IP to a different target".into()
                } else {
                    format!("public IP is already used by a {} rule", kind_name(old.kind))
                },
                existing,
                rejected: raw.clone(),
            }),
        }
    }

    Ok(MergeOutcome::with(bag, conflicts))
}

/// A protocol without the ports it applies to would widen into a
/// whole-address DNAT.
fn require_ports(rule: &ForwardingRule) -> Result<(), MergeError> {
    let present = |field: Option<&str>| field.is_some_and(|v| !v.trim().is_empty());
    if present(rule.protocol.as_deref()) && !present(rule.source_port_range.as_deref()) {
        return Err(invalid(
            RESOURCE,
            format!(
                "port forward for {} names a protocol but no source_port_range",
                rule.source_ip_address
            ),
        ));
    }
    Ok(())
}

fn strip_revoke(raw: &Value) -> Value {
    let mut stored = raw.clone();
    if let Some(map) = stored.as_object_mut() {
        map.remove("revoke");
    }
    stored
}

fn kind_name(kind: ForwardKind) -> &'static str {
    match kind {
        ForwardKind::StaticNat => "static NAT",
        ForwardKind::Forward => "port forward",
    }
}
