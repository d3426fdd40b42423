// Resource types whose payload describes the whole desired state.

use serde_json::{Map, Value};

use super::{decode, invalid, MergeError, MergeOutcome};
use crate::model::{CmdLine, DataBag, MonitoredService, ResourceType};

/// Key under which the load balancer configuration block list is stored.
pub const LOAD_BALANCER_KEY: &str = "configuration";

pub(super) fn load_balancer(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    const RESOURCE: ResourceType = ResourceType::LoadBalancer;
    let Some(config) = payload.get(LOAD_BALANCER_KEY) else {
        return Ok(MergeOutcome::unchanged(current));
    };
    let blocks: Vec<String> = decode(RESOURCE, config)?;

    let mut bag = current.clone();
    bag.entries.clear();
    bag.insert(LOAD_BALANCER_KEY, Value::from(blocks));
    Ok(MergeOutcome::with(bag, Vec::new()))
}

pub(super) fn monitor_service(
    current: &DataBag,
    payload: &Value,
) -> Result<MergeOutcome, MergeError> {
    const RESOURCE: ResourceType = ResourceType::MonitorService;
    let Some(services) = payload.get("services") else {
        return Ok(MergeOutcome::unchanged(current));
    };
    let Value::Object(services) = services else {
        return Err(invalid(RESOURCE, "'services' must be a map of name to service"));
    };

    let mut bag = current.clone();
    bag.entries.clear();
    for (name, service) in services {
        let _: MonitoredService = decode(RESOURCE, service)?;
        bag.insert(name.clone(), service.clone());
    }
    Ok(MergeOutcome::with(bag, Vec::new()))
}

/// Shallow-merge boot parameters into the single `config` entry.
pub(super) fn cmdline(current: &DataBag, payload: &Value) -> Result<MergeOutcome, MergeError> {
    const RESOURCE: ResourceType = ResourceType::CmdLine;
    let Some(update) = payload.get("cmd_line") else {
        return Ok(MergeOutcome::unchanged(current));
    };
    let Value::Object(update) = update else {
        return Err(invalid(RESOURCE, "'cmd_line' must be a map"));
    };

    let mut merged: Map<String, Value> = match current.get(CmdLine::KEY) {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };
    for (k, v) in update {
        merged.insert(k.clone(), v.clone());
    }
    let merged = Value::Object(merged);
    let _: CmdLine = decode(RESOURCE, &merged)?;

    let mut bag = current.clone();
    bag.insert(CmdLine::KEY, merged);
    Ok(MergeOutcome::with(bag, Vec::new()))
}
