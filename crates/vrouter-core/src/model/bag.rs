// ── DataBag ──
//
// The persisted collection of entries for one resource type. Entries
// stay raw JSON so fields the core does not model survive a round trip;
// typed views are decoded on demand.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resource::ResourceType;

/// Keyed, versioned state for one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBag {
    pub id: ResourceType,
    /// Bumped by the store on every save.
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: BTreeMap<String, Value>,
}

impl DataBag {
    pub fn new(id: ResourceType) -> Self {
        Self {
            id,
            version: 0,
            updated_at: None,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Entry-level equality, ignoring version metadata.
    pub fn same_entries(&self, other: &Self) -> bool {
        self.entries == other.entries
    }

    /// Decode one entry into its typed form.
    pub fn entry<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.entries
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    /// Decode every entry, in key order.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<Vec<(String, T)>, serde_json::Error> {
        self.entries
            .iter()
            .map(|(k, v)| Ok((k.clone(), serde_json::from_value(v.clone())?)))
            .collect()
    }
}
