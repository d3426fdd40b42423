// ── Merge engine ──
//
// One pure function per resource type: (current bag, payload) -> new bag.
// No I/O, no logging, no clock. Callers own persistence and side effects.

mod addresses;
mod dhcp;
mod firewall;
mod forwarding;
mod guest_network;
mod replace;
mod vpn_users;

pub use replace::LOAD_BALANCER_KEY;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{DataBag, ResourceType};

/// Signature shared by every per-type merge rule.
pub type MergeFn = fn(&DataBag, &Value) -> Result<MergeOutcome, MergeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("invalid {resource} payload: {reason}")]
    InvalidPayload {
        resource: ResourceType,
        reason: String,
    },
}

/// A payload entry that was rejected because it collides with existing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    pub resource: ResourceType,
    pub key: String,
    pub reason: String,
    pub existing: Value,
    pub rejected: Value,
}

/// Result of a merge: the next bag plus anything that was refused.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub bag: DataBag,
    pub conflicts: Vec<MergeConflict>,
}

impl MergeOutcome {
    pub fn unchanged(current: &DataBag) -> Self {
        Self {
            bag: current.clone(),
            conflicts: Vec::new(),
        }
    }

    fn with(bag: DataBag, conflicts: Vec<MergeConflict>) -> Self {
        Self { bag, conflicts }
    }

    /// True when the merged entries differ from `before`.
    pub fn changed(&self, before: &DataBag) -> bool {
        !self.bag.same_entries(before)
    }
}

/// Static dispatch table from resource type to its merge rule.
pub fn registry(resource: ResourceType) -> MergeFn {
    match resource {
        ResourceType::Addresses => addresses::merge,
        ResourceType::DhcpEntries => dhcp::merge,
        ResourceType::ForwardingRules => forwarding::merge,
        ResourceType::GuestNetwork => guest_network::merge,
        ResourceType::VpnUsers => vpn_users::merge,
        ResourceType::FirewallRules => firewall::merge,
        ResourceType::LoadBalancer => replace::load_balancer,
        ResourceType::MonitorService => replace::monitor_service,
        ResourceType::CmdLine => replace::cmdline,
    }
}

/// Merge `payload` into `current` using the rule registered for its type.
pub fn merge(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    registry(current.id)(current, payload)
}

// ── Shared helpers ──────────────────────────────────────────────────

fn invalid(resource: ResourceType, reason: impl Into<String>) -> MergeError {
    MergeError::InvalidPayload {
        resource,
        reason: reason.into(),
    }
}

fn decode<T: DeserializeOwned>(resource: ResourceType, value: &Value) -> Result<T, MergeError> {
    serde_json::from_value(value.clone()).map_err(|e| invalid(resource, e.to_string()))
}

fn encode<T: Serialize>(resource: ResourceType, value: &T) -> Result<Value, MergeError> {
    serde_json::to_value(value).map_err(|e| invalid(resource, e.to_string()))
}

/// The array under `field`, `None` when the field is absent.
fn list_field<'a>(
    resource: ResourceType,
    payload: &'a Value,
    field: &str,
) -> Result<Option<&'a Vec<Value>>, MergeError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(_) => Err(invalid(resource, format!("'{field}' must be a list"))),
    }
}

/// Payload entry with one field replaced, keeping every other field as sent.
fn with_field(entry: &Value, field: &str, value: Value) -> Value {
    let mut entry = entry.clone();
    if let Some(map) = entry.as_object_mut() {
        map.insert(field.to_owned(), value);
    }
    entry
}
