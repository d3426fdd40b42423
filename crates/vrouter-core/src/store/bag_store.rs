// ── Persistent bag storage ──
//
// One JSON file per resource type. Writes go through a temp file in the
// same directory followed by a rename, so readers only ever observe a
// complete old bag or a complete new one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use strum::IntoEnumIterator;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::lock::FileLock;
use super::BagLock;
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::model::{DataBag, ResourceType};

/// Durable, per-resource-type bag storage.
#[derive(Debug, Clone)]
pub struct DataBagStore {
    data_dir: PathBuf,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl DataBagStore {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            lock_dir: config.lock_dir.clone(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn path(&self, resource: ResourceType) -> PathBuf {
        self.data_dir.join(resource.file_name())
    }

    /// Take the single-writer lock for one resource type.
    ///
    /// Hold it for the whole load-merge-save-render sequence.
    pub async fn lock(&self, resource: ResourceType) -> Result<BagLock, CoreError> {
        let path = self.lock_dir.join(format!("{resource}.lock"));
        FileLock::acquire(&path, self.lock_timeout).await
    }

    /// Load the last persisted bag, or an empty one if none exists yet.
    ///
    /// A file that exists but cannot be parsed is an error, never an
    /// empty bag: resetting would drop live leases and NAT state.
    pub fn load(&self, resource: ResourceType) -> Result<DataBag, CoreError> {
        let path = self.path(resource);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%resource, "no bag on disk, starting empty");
                return Ok(DataBag::new(resource));
            }
            Err(e) => return Err(CoreError::io(path, e)),
        };

        let bag: DataBag = serde_json::from_str(&raw).map_err(|e| CoreError::BagCorrupt {
            resource,
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if bag.id != resource {
            return Err(CoreError::BagCorrupt {
                resource,
                path,
                reason: format!("file holds a '{}' bag", bag.id),
            });
        }
        Ok(bag)
    }

    /// Persist a bag atomically, bumping its version.
    ///
    /// `bag` is only updated once the rename has succeeded.
    pub fn save(&self, bag: &mut DataBag) -> Result<(), CoreError> {
        let mut next = bag.clone();
        next.version += 1;
        next.updated_at = Some(Utc::now());

        let path = self.path(bag.id);
        let body = serde_json::to_vec_pretty(&next)
            .map_err(|e| CoreError::Internal(format!("bag serialization failed: {e}")))?;
        write_atomic(&path, &body)?;

        info!(resource = %bag.id, version = next.version, entries = next.len(), "bag saved");
        *bag = next;
        Ok(())
    }

    /// Resource types that currently have a bag file.
    pub fn stored(&self) -> Vec<ResourceType> {
        ResourceType::iter()
            .filter(|r| self.path(*r).is_file())
            .collect()
    }
}

/// Write `contents` to `path` via a same-directory temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::io(dir, e))?;
    tmp.write_all(contents).map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CoreError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| CoreError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> DataBagStore {
        DataBagStore::new(&RouterConfig::rooted_at(dir))
    }

    #[test]
    fn missing_bag_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bag = store_in(dir.path()).load(ResourceType::DhcpEntries).unwrap();
        assert!(bag.is_empty());
        assert_eq!(bag.id, ResourceType::DhcpEntries);
    }

    #[test]
    fn save_then_load_round_trips_and_bumps_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());

        let mut bag = DataBag::new(ResourceType::VpnUsers);
        bag.insert("alice", json!({"user": "alice", "add": true}));
        store.save(&mut bag).unwrap();
        store.save(&mut bag).unwrap();
        assert_eq!(bag.version, 2);

        let loaded = store.load(ResourceType::VpnUsers).unwrap();
        assert_eq!(loaded, bag);
        assert_eq!(store.stored(), vec![ResourceType::VpnUsers]);
    }

    #[test]
    fn corrupt_bag_is_an_error_not_an_empty_bag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        std::fs::create_dir_all(dir.path().join("databags")).unwrap();
        std::fs::write(store.path(ResourceType::DhcpEntries), "{\"id\": \"dhcpent").unwrap();

        let err = store.load(ResourceType::DhcpEntries).unwrap_err();
        assert!(matches!(err, CoreError::BagCorrupt { .. }));
    }

    #[test]
    fn bag_of_wrong_type_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut other = DataBag::new(ResourceType::VpnUsers);
        store.save(&mut other).unwrap();
        std::fs::copy(
            store.path(ResourceType::VpnUsers),
            store.path(ResourceType::FirewallRules),
        )
        .unwrap();

        let err = store.load(ResourceType::FirewallRules).unwrap_err();
        assert!(matches!(err, CoreError::BagCorrupt { .. }));
    }

    #[test]
    fn save_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut bag = DataBag::new(ResourceType::CmdLine);
        store.save(&mut bag).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path().join("databags"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["cmdline.json".to_string()]);
    }
}
