// ── Convergence renderer ──
//
// Rendering is split in two halves:
//   plan      pure: bags + config -> artifacts and a post-publish action
//   converge  effectful: compare, stage, validate, publish, act, roll back
//
// A target whose artifacts are unchanged is skipped entirely in
// incremental mode: no writes, no restarts.

mod dhcp;
mod dns;
mod firewall;
mod load_balancer;
mod routes;
mod secrets;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactDraft, PublishedArtifact, StagedArtifact};
use crate::config::RouterConfig;
use crate::error::CoreError;
use crate::interface::DeviceFacts;
use crate::model::{DataBag, ResourceType};
use crate::process::{CommandRunner, CommandSpec, ProcessController, ServiceAction};
use crate::routing::{self, PolicyRouting};

// ── Targets ─────────────────────────────────────────────────────────

/// One unit of convergence: a set of artifacts and the action that
/// makes the host pick them up.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RenderTarget {
    Dhcp,
    Dns,
    Firewall,
    LoadBalancer,
    Vpn,
    Monitor,
    Routing,
}

impl RenderTarget {
    /// Targets affected by a change to `resource`, in convergence order.
    pub fn for_resource(resource: ResourceType) -> &'static [Self] {
        match resource {
            ResourceType::DhcpEntries => &[Self::Dhcp],
            ResourceType::Addresses | ResourceType::GuestNetwork | ResourceType::CmdLine => {
                &[Self::Routing, Self::Dns]
            }
            ResourceType::ForwardingRules | ResourceType::FirewallRules => &[Self::Firewall],
            ResourceType::LoadBalancer => &[Self::LoadBalancer],
            ResourceType::VpnUsers => &[Self::Vpn],
            ResourceType::MonitorService => &[Self::Monitor],
        }
    }

    /// Bags a target is rendered from.
    pub fn sources(self) -> &'static [ResourceType] {
        match self {
            Self::Dhcp => &[ResourceType::DhcpEntries],
            Self::Dns | Self::Routing => &[
                ResourceType::Addresses,
                ResourceType::GuestNetwork,
                ResourceType::CmdLine,
            ],
            Self::Firewall => &[ResourceType::FirewallRules, ResourceType::ForwardingRules],
            Self::LoadBalancer => &[ResourceType::LoadBalancer],
            Self::Vpn => &[ResourceType::VpnUsers],
            Self::Monitor => &[ResourceType::MonitorService],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RenderMode {
    /// Skip targets whose artifacts already match.
    #[default]
    Incremental,
    /// Publish and act even when nothing changed.
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// Whether VRRP-managed addresses may be brought up on this node.
    pub owns_vips: bool,
}

impl RenderOptions {
    pub fn incremental(owns_vips: bool) -> Self {
        Self {
            mode: RenderMode::Incremental,
            owns_vips,
        }
    }

    pub fn forced(owns_vips: bool) -> Self {
        Self {
            mode: RenderMode::Forced,
            owns_vips,
        }
    }
}

// ── Plans ───────────────────────────────────────────────────────────

/// Bags loaded for rendering. Missing types read as empty.
#[derive(Debug, Clone, Default)]
pub struct BagSet(BTreeMap<ResourceType, DataBag>);

impl BagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bag: DataBag) {
        self.0.insert(bag.id, bag);
    }

    #[must_use]
    pub fn with(mut self, bag: DataBag) -> Self {
        self.insert(bag);
        self
    }

    pub fn get(&self, resource: ResourceType) -> Cow<'_, DataBag> {
        self.0
            .get(&resource)
            .map_or_else(|| Cow::Owned(DataBag::new(resource)), Cow::Borrowed)
    }
}

/// One file a target owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
    /// Checked against the staged copy; `{}` stands for its path.
    pub validate: Option<CommandSpec>,
    /// Pinned permission bits; otherwise the replaced file's are kept.
    pub mode: Option<u32>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, contents: String) -> Self {
        Self {
            path: path.into(),
            contents,
            validate: None,
            mode: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn validated_by(mut self, command: CommandSpec) -> Self {
        self.validate = Some(command);
        self
    }
}

/// What runs after a target's artifacts are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostAction {
    None,
    Restart(String),
    /// Load a ruleset without flushing foreign chains, then make sure
    /// each hook into it exists.
    Netfilter {
        restore: CommandSpec,
        hooks: Vec<ChainHook>,
    },
    /// Bring addresses and policy routing in line with `devices`;
    /// addresses that vanished from `state_path` are withdrawn.
    Routing {
        devices: Vec<DeviceFacts>,
        state_path: PathBuf,
    },
}

/// A jump from a built-in chain into one the ruleset owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHook {
    pub table: String,
    pub chain: String,
    pub jump: String,
}

impl ChainHook {
    pub fn new(table: &str, chain: &str, jump: &str) -> Self {
        Self {
            table: table.to_owned(),
            chain: chain.to_owned(),
            jump: jump.to_owned(),
        }
    }

    /// Exits non-zero when the hook is missing.
    pub fn check(&self) -> CommandSpec {
        CommandSpec::new("iptables").args([
            "-w", "-t", &self.table, "-C", &self.chain, "-j", &self.jump,
        ])
    }

    pub fn insert(&self) -> CommandSpec {
        CommandSpec::new("iptables").args([
            "-w", "-t", &self.table, "-I", &self.chain, "1", "-j", &self.jump,
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPlan {
    pub target: RenderTarget,
    pub artifacts: Vec<Artifact>,
    pub action: PostAction,
}

/// Build the plan for one target. Pure.
pub fn plan(
    target: RenderTarget,
    bags: &BagSet,
    config: &RouterConfig,
) -> Result<RenderPlan, CoreError> {
    match target {
        RenderTarget::Dhcp => dhcp::plan(bags, config),
        RenderTarget::Dns => dns::plan(bags, config),
        RenderTarget::Firewall => firewall::plan(bags, config),
        RenderTarget::LoadBalancer => load_balancer::plan(bags, config),
        RenderTarget::Vpn => secrets::vpn_plan(bags, config),
        RenderTarget::Monitor => secrets::monitor_plan(bags, config),
        RenderTarget::Routing => routes::plan(bags, config),
    }
}

fn decode_all<T: DeserializeOwned>(bag: &DataBag) -> Result<Vec<(String, T)>, CoreError> {
    bag.entries
        .iter()
        .map(|(key, value)| {
            serde_json::from_value(value.clone())
                .map(|entry| (key.clone(), entry))
                .map_err(|e| CoreError::InvalidEntry {
                    resource: bag.id,
                    key: key.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

// ── Converge ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    pub target: RenderTarget,
    pub mode: RenderMode,
    /// Some artifact differed from what was on disk.
    pub changed: bool,
    pub published: Vec<PathBuf>,
    /// Human-readable description of the post-publish action, if it ran.
    pub action: Option<String>,
}

impl RenderReport {
    fn skipped(target: RenderTarget, mode: RenderMode) -> Self {
        Self {
            target,
            mode,
            changed: false,
            published: Vec::new(),
            action: None,
        }
    }
}

/// Executes render plans against the filesystem and the host.
#[derive(Debug)]
pub struct ConvergenceRenderer<R> {
    processes: Arc<ProcessController<R>>,
}

impl<R: CommandRunner> ConvergenceRenderer<R> {
    pub fn new(processes: Arc<ProcessController<R>>) -> Self {
        Self { processes }
    }

    /// Converge one target. On action failure every artifact published by
    /// this call is restored before the error is returned.
    pub async fn converge(
        &self,
        plan: RenderPlan,
        options: RenderOptions,
    ) -> Result<RenderReport, CoreError> {
        let RenderPlan {
            target,
            artifacts,
            action,
        } = plan;

        let mut drafts = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            let mut draft = ArtifactDraft::prepare(&artifact.path, artifact.contents)?;
            if let Some(mode) = artifact.mode {
                draft = draft.with_mode(mode);
            }
            drafts.push((draft, artifact.validate));
        }

        let changed = drafts.iter().any(|(draft, _)| draft.is_changed());
        if drafts.is_empty() || (!changed && options.mode == RenderMode::Incremental) {
            debug!(%target, "artifacts unchanged, skipping");
            return Ok(RenderReport::skipped(target, options.mode));
        }

        let previous_state = match &action {
            PostAction::Routing { state_path, .. } => drafts
                .iter()
                .find(|(draft, _)| draft.path() == state_path)
                .and_then(|(draft, _)| draft.previous().map(str::to_owned)),
            _ => None,
        };

        let mut staged: Vec<StagedArtifact> = Vec::new();
        for (draft, validate) in drafts {
            if !draft.is_changed() && options.mode == RenderMode::Incremental {
                continue;
            }
            let artifact = draft.stage()?;
            if let Some(validator) = validate {
                self.validate(&artifact, &validator).await?;
            }
            staged.push(artifact);
        }

        let mut published: Vec<PublishedArtifact> = Vec::with_capacity(staged.len());
        for artifact in staged {
            match artifact.publish() {
                Ok(p) => published.push(p),
                Err(e) => {
                    rollback(published);
                    return Err(e);
                }
            }
        }
        let paths: Vec<PathBuf> = published.iter().map(|p| p.path().to_path_buf()).collect();

        let description = match self.act(&action, previous_state.as_deref(), options).await {
            Ok(description) => description,
            Err(e) => {
                warn!(%target, error = %e, "post-publish action failed, restoring artifacts");
                rollback(published);
                return Err(e);
            }
        };

        info!(%target, mode = %options.mode, changed, published = paths.len(), "target converged");
        Ok(RenderReport {
            target,
            mode: options.mode,
            changed,
            published: paths,
            action: description,
        })
    }

    async fn validate(
        &self,
        artifact: &StagedArtifact,
        validator: &CommandSpec,
    ) -> Result<(), CoreError> {
        let command = validator.with_path(artifact.staged_path());
        let output = self.processes.probe(&command).await?;
        if output.success() {
            return Ok(());
        }
        let reason = if output.stderr.trim().is_empty() {
            format!("`{command}` exited with status {}", output.status)
        } else {
            output.stderr.trim().to_owned()
        };
        Err(CoreError::ValidationFailed {
            path: artifact.path().to_path_buf(),
            reason,
        })
    }

    async fn act(
        &self,
        action: &PostAction,
        previous_state: Option<&str>,
        options: RenderOptions,
    ) -> Result<Option<String>, CoreError> {
        match action {
            PostAction::None => Ok(None),
            PostAction::Restart(service) => {
                self.processes
                    .service(service, ServiceAction::Restart)
                    .await?;
                Ok(Some(format!("restarted {service}")))
            }
            PostAction::Netfilter { restore, hooks } => {
                self.processes.execute(restore).await?;
                let mut inserted = 0;
                for hook in hooks {
                    if !self.processes.probe(&hook.check()).await?.success() {
                        self.processes.execute(&hook.insert()).await?;
                        inserted += 1;
                    }
                }
                Ok(Some(format!("ruleset restored, {inserted} hook(s) inserted")))
            }
            PostAction::Routing { devices, .. } => {
                let routing = PolicyRouting::new(self.processes.as_ref());
                let withdrawn = withdrawn_addresses(previous_state, devices);
                for (device, cidr) in &withdrawn {
                    self.processes
                        .execute_idempotent(&routing::address_del(device, cidr))
                        .await?;
                    if let Some((ip, _)) = cidr.split_once('/') {
                        self.processes
                            .execute_idempotent(&routing::rule_del(device, ip))
                            .await?;
                    }
                }

                let mut assigned = 0;
                for facts in devices {
                    // A backup's VRRP devices hold no addresses, so there is
                    // no source for their routes yet; promotion re-renders.
                    if facts.vrrp && !options.owns_vips {
                        debug!(device = %facts.device, "vrrp device on backup, skipped");
                        continue;
                    }
                    routing.assign_addresses(facts).await?;
                    routing.assert_device(facts).await?;
                    assigned += 1;
                }
                routing.flush_cache().await?;
                Ok(Some(format!(
                    "{assigned} device(s) assigned, {} address(es) withdrawn",
                    withdrawn.len()
                )))
            }
        }
    }
}

fn rollback(published: Vec<PublishedArtifact>) {
    for artifact in published.into_iter().rev() {
        let path = artifact.path().to_path_buf();
        if let Err(e) = artifact.rollback() {
            warn!(path = %path.display(), error = %e, "rollback failed");
        }
    }
}

/// `(device, cidr)` pairs recorded previously but no longer desired.
fn withdrawn_addresses(previous: Option<&str>, devices: &[DeviceFacts]) -> Vec<(String, String)> {
    let Some(previous) = previous else {
        return Vec::new();
    };
    let desired: BTreeSet<(String, String)> = devices
        .iter()
        .flat_map(|f| {
            f.addresses
                .iter()
                .map(|a| (f.device.clone(), a.cidr_string()))
        })
        .collect();

    previous
        .lines()
        .filter_map(routes::parse_state_line)
        .filter(|pair| !desired.contains(pair))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, DryRunRunner};
    use strum::IntoEnumIterator;

    fn renderer(runner: DryRunRunner) -> (ConvergenceRenderer<DryRunRunner>, Arc<DryRunRunner>) {
        let runner = Arc::new(runner);
        let processes = Arc::new(ProcessController::new(
            Arc::clone(&runner),
            &RouterConfig::default(),
        ));
        (ConvergenceRenderer::new(processes), runner)
    }

    fn simple_plan(path: PathBuf, contents: &str) -> RenderPlan {
        RenderPlan {
            target: RenderTarget::LoadBalancer,
            artifacts: vec![
                Artifact::new(path, contents.to_owned())
                    .validated_by(CommandSpec::new("haproxy").args(["-c", "-f", "{}"])),
            ],
            action: PostAction::Restart("haproxy".into()),
        }
    }

    #[test]
    fn every_resource_maps_to_a_target_that_reads_it() {
        for resource in ResourceType::iter() {
            let targets = RenderTarget::for_resource(resource);
            assert!(!targets.is_empty());
            for target in targets {
                assert!(target.sources().contains(&resource), "{target} / {resource}");
            }
        }
    }

    #[tokio::test]
    async fn unchanged_artifacts_cause_no_writes_or_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haproxy.cfg");
        std::fs::write(&path, "global\n").unwrap();
        let (renderer, runner) = renderer(DryRunRunner::new());

        let report = renderer
            .converge(simple_plan(path, "global\n"), RenderOptions::incremental(true))
            .await
            .unwrap();
        assert!(!report.changed);
        assert!(report.published.is_empty());
        assert!(runner.recorded().is_empty());
    }

    #[tokio::test]
    async fn forced_mode_publishes_and_restarts_anyway() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haproxy.cfg");
        std::fs::write(&path, "global\n").unwrap();
        let (renderer, runner) = renderer(DryRunRunner::new());

        let report = renderer
            .converge(simple_plan(path, "global\n"), RenderOptions::forced(true))
            .await
            .unwrap();
        assert!(!report.changed);
        assert_eq!(report.published.len(), 1);
        assert_eq!(
            runner.recorded_lines().last().unwrap(),
            "systemctl restart haproxy"
        );
    }

    #[tokio::test]
    async fn failed_validation_leaves_the_live_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haproxy.cfg");
        std::fs::write(&path, "global\n").unwrap();
        let (renderer, runner) = renderer(
            DryRunRunner::new().respond(
                &["haproxy", "-c"],
                CommandOutput::with_status(1).stderr("[ALERT] parsing error"),
            ),
        );

        let err = renderer
            .converge(simple_plan(path.clone(), "garbage\n"), RenderOptions::incremental(true))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "global\n");
        assert!(!runner
            .recorded_lines()
            .iter()
            .any(|l| l.contains("restart")));
    }

    #[tokio::test]
    async fn failed_restart_restores_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haproxy.cfg");
        std::fs::write(&path, "global\n").unwrap();
        let (renderer, _runner) = renderer(DryRunRunner::new().respond(
            &["systemctl", "restart"],
            CommandOutput::with_status(1).stderr("Job failed"),
        ));

        let err = renderer
            .converge(simple_plan(path.clone(), "global\nmaxconn 10\n"), RenderOptions::incremental(true))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "global\n");
    }

    #[test]
    fn withdrawn_addresses_come_from_previous_state() {
        let previous = "eth2 203.0.113.5/24 public\neth2 203.0.113.6/24 public\n";
        let gone = withdrawn_addresses(Some(previous), &[]);
        assert_eq!(
            gone,
            vec![
                ("eth2".to_string(), "203.0.113.5/24".to_string()),
                ("eth2".to_string(), "203.0.113.6/24".to_string()),
            ]
        );
        assert!(withdrawn_addresses(None, &[]).is_empty());
    }
}
