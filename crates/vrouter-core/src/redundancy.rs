// ── Redundancy state machine ──
//
// Two-node active/passive failover. Events arrive from VRRP notify
// scripts, the operator, peer state reports and interface self-checks;
// each is handled to completion before the next.
//
//   BACKUP ──promote──► TRANSITIONING_TO_MASTER ──ok──► MASTER
//   MASTER ──demote───► TRANSITIONING_TO_BACKUP ──ok──► BACKUP
//
// A failed transition stays in its transitioning state until the next
// matching event retries it. Split brain is reported, never resolved.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::CoreError;
use crate::process::{CommandRunner, CommandSpec};
use crate::reconciler::{Reconciler, TargetOutcome};
use crate::render::RenderOptions;
use crate::routing::PolicyRouting;
use crate::store::write_atomic;

// ── States and events ───────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RedundancyState {
    #[default]
    Backup,
    Master,
    TransitioningToMaster,
    TransitioningToBackup,
}

impl RedundancyState {
    /// Master or on the way there.
    pub fn claims_master(self) -> bool {
        matches!(self, Self::Master | Self::TransitioningToMaster)
    }
}

/// Who asked for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TriggerSource {
    Vrrp,
    Operator,
    SelfCheck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedundancyEvent {
    Promote { source: TriggerSource },
    Demote { source: TriggerSource },
    PeerState(RedundancyState),
    InterfaceCheck { device: String, reachable: bool },
}

/// What a completed transition did.
#[derive(Debug, Serialize)]
pub struct TransitionReport {
    pub from: RedundancyState,
    pub to: RedundancyState,
    pub source: TriggerSource,
    /// VRRP daemon had to be started.
    pub vrrp_started: bool,
    pub devices: Vec<String>,
    pub renders: Vec<TargetOutcome>,
}

// ── Persistence ─────────────────────────────────────────────────────

/// Persisted role, `BACKUP` when the file does not exist yet.
pub fn read_state(path: &Path) -> Result<RedundancyState, CoreError> {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().parse().map_err(|_| CoreError::Config {
            message: format!(
                "unrecognized redundancy state '{}' in {}",
                text.trim(),
                path.display()
            ),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RedundancyState::Backup),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

pub fn write_state(path: &Path, state: RedundancyState) -> Result<(), CoreError> {
    write_atomic(path, format!("{state}\n").as_bytes())
}

/// Last reported peer role lives beside the local one: `<state_file>.peer`.
pub fn peer_state_path(state_file: &Path) -> PathBuf {
    let mut name = state_file
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".peer");
    state_file.with_file_name(name)
}

/// Last reported peer role, `None` if the peer never reported.
pub fn read_peer(path: &Path) -> Result<Option<RedundancyState>, CoreError> {
    if !path.try_exists().map_err(|e| CoreError::io(path, e))? {
        return Ok(None);
    }
    read_state(path).map(Some)
}

// ── Machine ─────────────────────────────────────────────────────────

pub struct RedundancyMachine<R> {
    reconciler: Arc<Reconciler<R>>,
    state: watch::Sender<RedundancyState>,
    peer: Option<RedundancyState>,
}

impl<R: CommandRunner> RedundancyMachine<R> {
    /// Start from the persisted local role and last peer report.
    pub fn new(reconciler: Arc<Reconciler<R>>) -> Result<Self, CoreError> {
        let state_file = &reconciler.config().state_file;
        let initial = read_state(state_file)?;
        let peer = read_peer(&peer_state_path(state_file))?;
        let (state, _) = watch::channel(initial);
        Ok(Self {
            reconciler,
            state,
            peer,
        })
    }

    pub fn state(&self) -> RedundancyState {
        *self.state.borrow()
    }

    pub fn peer(&self) -> Option<RedundancyState> {
        self.peer
    }

    pub fn subscribe(&self) -> watch::Receiver<RedundancyState> {
        self.state.subscribe()
    }

    /// Handle one event to completion.
    ///
    /// `Ok(None)` means the event required no transition.
    pub async fn handle(
        &mut self,
        event: RedundancyEvent,
    ) -> Result<Option<TransitionReport>, CoreError> {
        let current = self.state();
        debug!(state = %current, ?event, "redundancy event");

        let requested = match &event {
            RedundancyEvent::Promote { .. } => Some("promote"),
            RedundancyEvent::Demote { .. } => Some("demote"),
            _ => None,
        };
        if let Some(requested) = requested {
            if !self.reconciler.address_manager()?.is_redundant() {
                return Err(CoreError::InvalidTransition {
                    state: current,
                    event: format!("{requested} on a non-redundant router"),
                });
            }
        }

        match event {
            RedundancyEvent::Promote { source } => {
                if current == RedundancyState::Master {
                    self.check_split_brain()?;
                    return Ok(None);
                }
                let report = self.enter_master(current, source).await?;
                self.check_split_brain()?;
                Ok(Some(report))
            }
            RedundancyEvent::Demote { source } => {
                if current == RedundancyState::Backup {
                    return Ok(None);
                }
                self.enter_backup(current, source).await.map(Some)
            }
            RedundancyEvent::PeerState(peer) => {
                write_state(&peer_state_path(&self.reconciler.config().state_file), peer)?;
                self.peer = Some(peer);
                self.check_split_brain()?;
                Ok(None)
            }
            RedundancyEvent::InterfaceCheck { device, reachable } => {
                if reachable || current != RedundancyState::Master {
                    return Ok(None);
                }
                let manager = self.reconciler.address_manager()?;
                if !manager.needs_vrrp(&device) {
                    return Ok(None);
                }
                warn!(%device, "VRRP interface unreachable while master, demoting");
                self.enter_backup(current, TriggerSource::SelfCheck)
                    .await
                    .map(Some)
            }
        }
    }

    /// Probe link state of every VRRP device and react to the first one
    /// that is down.
    pub async fn self_check(&mut self) -> Result<Option<TransitionReport>, CoreError> {
        if self.state() != RedundancyState::Master {
            return Ok(None);
        }
        let manager = self.reconciler.address_manager()?;
        for facts in manager.public_and_guest_devices() {
            if !facts.vrrp {
                continue;
            }
            let probe = CommandSpec::ip(["-o", "link", "show", "dev", facts.device.as_str()]);
            let output = self.reconciler.processes().probe(&probe).await?;
            let reachable = output.success() && output.stdout.contains("state UP");
            if !reachable {
                return self
                    .handle(RedundancyEvent::InterfaceCheck {
                        device: facts.device,
                        reachable,
                    })
                    .await;
            }
        }
        Ok(None)
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RedundancyEvent>,
        cancel: CancellationToken,
    ) {
        info!(state = %self.state(), "redundancy machine started");
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            match self.handle(event).await {
                Ok(Some(report)) => {
                    info!(from = %report.from, to = %report.to, source = %report.source, "transition complete");
                }
                Ok(None) => {}
                Err(CoreError::SplitBrain { local, peer }) => {
                    error!(%local, %peer, "split brain detected, operator action required");
                }
                Err(e) => warn!(state = %self.state(), error = %e, "transition failed"),
            }
        }
        info!(state = %self.state(), "redundancy machine stopped");
    }

    fn check_split_brain(&self) -> Result<(), CoreError> {
        let local = self.state();
        match self.peer {
            Some(RedundancyState::Master) if local.claims_master() => {
                error!(%local, "peer also reports MASTER");
                Err(CoreError::SplitBrain {
                    local,
                    peer: RedundancyState::Master,
                })
            }
            _ => Ok(()),
        }
    }

    fn set(&self, state: RedundancyState) {
        self.state.send_replace(state);
    }

    fn settle(&self, state: RedundancyState) -> Result<(), CoreError> {
        write_state(&self.reconciler.config().state_file, state)?;
        self.set(state);
        Ok(())
    }

    async fn enter_master(
        &self,
        from: RedundancyState,
        source: TriggerSource,
    ) -> Result<TransitionReport, CoreError> {
        info!(%from, %source, "entering MASTER");
        self.set(RedundancyState::TransitioningToMaster);

        let config = self.reconciler.config();
        let processes = self.reconciler.processes();
        let vrrp_started = processes
            .ensure_running(&config.vrrp_signature, &config.services.vrrp)
            .await?;

        let manager = self.reconciler.address_manager()?;
        let routing = PolicyRouting::new(processes);
        let mut devices = Vec::new();
        for facts in manager.public_and_guest_devices() {
            if facts.vrrp {
                routing.assign_addresses(&facts).await?;
            }
            routing.assert_device(&facts).await?;
            devices.push(facts.device);
        }

        let renders = self
            .reconciler
            .converge_all(RenderOptions::forced(true))
            .await;
        if let Some(failed) = renders.iter().find(|o| o.error.is_some()) {
            return Err(CoreError::Internal(format!(
                "forced render of {} failed during promotion: {}",
                failed.target,
                failed.error.as_deref().unwrap_or_default()
            )));
        }

        self.settle(RedundancyState::Master)?;
        Ok(TransitionReport {
            from,
            to: RedundancyState::Master,
            source,
            vrrp_started,
            devices,
            renders,
        })
    }

    async fn enter_backup(
        &self,
        from: RedundancyState,
        source: TriggerSource,
    ) -> Result<TransitionReport, CoreError> {
        info!(%from, %source, "entering BACKUP");
        self.set(RedundancyState::TransitioningToBackup);

        let config = self.reconciler.config();
        let processes = self.reconciler.processes();
        let vrrp_started = processes
            .ensure_running(&config.vrrp_signature, &config.services.vrrp)
            .await?;

        let manager = self.reconciler.address_manager()?;
        let routing = PolicyRouting::new(processes);
        let mut devices = Vec::new();
        for facts in manager.public_and_guest_devices() {
            if facts.vrrp {
                routing.withdraw_addresses(&facts).await?;
                devices.push(facts.device);
            }
        }

        self.settle(RedundancyState::Backup)?;
        Ok(TransitionReport {
            from,
            to: RedundancyState::Backup,
            source,
            vrrp_started,
            devices,
            renders: Vec::new(),
        })
    }
}
