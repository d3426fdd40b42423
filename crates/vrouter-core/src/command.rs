// ── Inbound payloads and pass reports ──

use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::merge::MergeConflict;
use crate::model::ResourceType;
use crate::render::RenderReport;

/// One configuration command: a resource type and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPayload {
    pub resource: ResourceType,
    pub data: Value,
}

impl CommandPayload {
    pub fn new(resource: ResourceType, data: Value) -> Self {
        Self { resource, data }
    }

    /// Build a payload from a dropped JSON document.
    ///
    /// The resource type comes from `explicit` when given, otherwise from
    /// the document's `type` field. The field is stripped from the data.
    pub fn from_document(
        mut document: Value,
        explicit: Option<ResourceType>,
    ) -> Result<Self, CoreError> {
        let Value::Object(map) = &mut document else {
            return Err(CoreError::Config {
                message: "payload document must be a JSON object".into(),
            });
        };
        let tagged = map.remove("type");

        let resource = match (explicit, tagged) {
            (Some(resource), _) => resource,
            (None, Some(Value::String(name))) => name.parse().map_err(|_| CoreError::Config {
                message: format!("unknown resource type '{name}'"),
            })?,
            (None, _) => {
                return Err(CoreError::Config {
                    message: "payload has no 'type' field; pass the resource type explicitly"
                        .into(),
                });
            }
        };
        Ok(Self {
            resource,
            data: document,
        })
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub resource: ResourceType,
    /// The bag was modified and saved.
    pub changed: bool,
    pub version: u64,
    pub conflicts: Vec<MergeConflict>,
    pub renders: Vec<RenderReport>,
}
