// ── Reconciler facade ──
//
// Composes store, merge engine, renderer and process controller into a
// reconciliation pass:
//
//   lock type → load bag → merge → save (if changed) → converge targets
//
// The bag lock is held for the whole pass so same-type passes serialize;
// render targets take their own lock because two types can feed one.

use std::sync::Arc;

use serde::Serialize;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::command::{CommandPayload, PassReport};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::interface::AddressManager;
use crate::merge;
use crate::model::ResourceType;
use crate::process::{CommandRunner, ProcessController};
use crate::redundancy::{self, RedundancyState};
use crate::render::{self, BagSet, ConvergenceRenderer, RenderOptions, RenderReport, RenderTarget};
use crate::store::{DataBagStore, FileLock};

/// Result of converging one target as part of a sweep.
#[derive(Debug, Serialize)]
pub struct TargetOutcome {
    pub target: RenderTarget,
    pub report: Option<RenderReport>,
    pub error: Option<String>,
}

pub struct Reconciler<R> {
    config: Arc<RouterConfig>,
    store: DataBagStore,
    processes: Arc<ProcessController<R>>,
    renderer: ConvergenceRenderer<R>,
}

impl<R: CommandRunner> Reconciler<R> {
    pub fn new(config: RouterConfig, runner: Arc<R>) -> Self {
        let processes = Arc::new(ProcessController::new(runner, &config));
        Self {
            store: DataBagStore::new(&config),
            renderer: ConvergenceRenderer::new(Arc::clone(&processes)),
            processes,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn store(&self) -> &DataBagStore {
        &self.store
    }

    pub fn processes(&self) -> &ProcessController<R> {
        &self.processes
    }

    /// Run one reconciliation pass for a payload.
    ///
    /// Affected targets are converged even when the bag did not change,
    /// so a pass interrupted after saving is completed by a resend.
    pub async fn apply(&self, payload: CommandPayload) -> Result<PassReport, CoreError> {
        let resource = payload.resource;
        let _lock = self.store.lock(resource).await?;

        let current = self.store.load(resource)?;
        let outcome = merge::merge(&current, &payload.data)?;
        for conflict in &outcome.conflicts {
            warn!(
                %resource,
                key = %conflict.key,
                reason = %conflict.reason,
                "payload entry rejected"
            );
        }

        let changed = outcome.changed(&current);
        let mut bag = outcome.bag;
        if changed {
            self.store.save(&mut bag)?;
        }

        let options = RenderOptions::incremental(self.owns_vips()?);
        let mut renders = Vec::new();
        for target in RenderTarget::for_resource(resource) {
            renders.push(self.converge(*target, options).await?);
        }

        info!(%resource, changed, version = bag.version, "pass complete");
        Ok(PassReport {
            resource,
            changed,
            version: bag.version,
            conflicts: outcome.conflicts,
            renders,
        })
    }

    /// Converge one target from the bags currently on disk.
    pub async fn converge(
        &self,
        target: RenderTarget,
        options: RenderOptions,
    ) -> Result<RenderReport, CoreError> {
        let lock_path = self.config.lock_dir.join(format!("render-{target}.lock"));
        let _lock = FileLock::acquire(&lock_path, self.config.lock_timeout()).await?;

        let mut bags = BagSet::new();
        for resource in target.sources() {
            bags.insert(self.store.load(*resource)?);
        }
        let plan = render::plan(target, &bags, &self.config)?;
        self.renderer.converge(plan, options).await
    }

    /// Converge every target. One failing target does not stop the rest.
    pub async fn converge_all(&self, options: RenderOptions) -> Vec<TargetOutcome> {
        let mut outcomes = Vec::new();
        for target in RenderTarget::iter() {
            let outcome = match self.converge(target, options).await {
                Ok(report) => TargetOutcome {
                    target,
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    warn!(%target, error = %e, "target failed to converge");
                    TargetOutcome {
                        target,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Interface facts from the bags currently on disk.
    pub fn address_manager(&self) -> Result<AddressManager, CoreError> {
        AddressManager::new(
            &self.store.load(ResourceType::Addresses)?,
            &self.store.load(ResourceType::GuestNetwork)?,
            &self.store.load(ResourceType::CmdLine)?,
        )
    }

    /// Persisted redundancy role of this node.
    pub fn redundancy_state(&self) -> Result<RedundancyState, CoreError> {
        redundancy::read_state(&self.config.state_file)
    }

    /// VRRP addresses may be configured here: not redundant, or master.
    pub fn owns_vips(&self) -> Result<bool, CoreError> {
        if !self.address_manager()?.is_redundant() {
            return Ok(true);
        }
        Ok(self.redundancy_state()? == RedundancyState::Master)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::DryRunRunner;
    use serde_json::json;

    fn reconciler(dir: &std::path::Path) -> (Reconciler<DryRunRunner>, Arc<DryRunRunner>) {
        let runner = Arc::new(DryRunRunner::new());
        (
            Reconciler::new(RouterConfig::rooted_at(dir), Arc::clone(&runner)),
            runner,
        )
    }

    #[tokio::test]
    async fn dhcp_pass_saves_renders_and_restarts_once() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, runner) = reconciler(dir.path());
        let payload = CommandPayload::new(
            ResourceType::DhcpEntries,
            json!({"add": true, "ipv4_address": "10.0.0.5", "mac_address": "aa:bb:cc:dd:ee:ff",
                   "host_name": "vm1"}),
        );

        let report = reconciler.apply(payload.clone()).await.unwrap();
        assert!(report.changed);
        assert_eq!(report.version, 1);
        assert!(report.renders[0].changed);
        assert_eq!(runner.recorded_lines(), vec!["systemctl restart dnsmasq"]);

        runner.clear();
        let again = reconciler.apply(payload).await.unwrap();
        assert!(!again.changed);
        assert_eq!(again.version, 1);
        assert!(!again.renders[0].changed);
        assert!(runner.recorded().is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_leaves_bag_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, _runner) = reconciler(dir.path());
        let err = reconciler
            .apply(CommandPayload::new(
                ResourceType::FirewallRules,
                json!({"rules": "not-a-list"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPayload { .. }));
        assert!(reconciler.store().stored().is_empty());
    }

    #[tokio::test]
    async fn corrupt_bag_aborts_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, runner) = reconciler(dir.path());
        let path = reconciler.store().path(ResourceType::VpnUsers);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "][").unwrap();

        let err = reconciler
            .apply(CommandPayload::new(
                ResourceType::VpnUsers,
                json!({"vpn_users": [{"user": "alice", "password": "pw"}]}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BagCorrupt { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "][");
        assert!(runner.recorded().is_empty());
    }

    #[tokio::test]
    async fn converge_all_reports_each_target() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, _runner) = reconciler(dir.path());
        let outcomes = reconciler.converge_all(RenderOptions::incremental(true)).await;
        assert_eq!(outcomes.len(), RenderTarget::iter().count());
        assert!(outcomes.iter().all(|o| o.error.is_none()));
    }

    #[test]
    fn non_redundant_router_always_owns_its_addresses() {
        let dir = tempfile::tempdir().unwrap();
        let (reconciler, _runner) = reconciler(dir.path());
        assert!(reconciler.owns_vips().unwrap());
    }
}
