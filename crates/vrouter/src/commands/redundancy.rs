//! Redundancy command handlers.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use vrouter_core::{
    CommandRunner, Reconciler, RedundancyEvent, RedundancyMachine, RedundancyState,
    TransitionReport, TriggerSource,
};

use crate::cli::{GlobalOpts, PeerStateArg, RedundancyArgs, RedundancyCommand, SourceArg};
use crate::error::CliError;
use crate::output;

use super::apply::yes_no;
use super::util;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusView {
    state: RedundancyState,
    peer: Option<RedundancyState>,
    redundant: bool,
    vrrp_devices: Vec<String>,
    vrrp_running: bool,
}

fn status_detail(view: &StatusView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "State:        {}", view.state);
    let peer = view.peer.map_or_else(|| "unknown".to_owned(), |p| p.to_string());
    let _ = writeln!(out, "Peer:         {peer}");
    let _ = writeln!(out, "Redundant:    {}", yes_no(view.redundant));
    let _ = writeln!(out, "VRRP daemon:  {}", if view.vrrp_running { "running" } else { "stopped" });
    let devices = if view.vrrp_devices.is_empty() {
        "-".to_owned()
    } else {
        view.vrrp_devices.join(", ")
    };
    let _ = write!(out, "VRRP devices: {devices}");
    out
}

fn transition_detail(report: &TransitionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} -> {} ({})", report.from, report.to, report.source);
    if report.vrrp_started {
        let _ = writeln!(out, "VRRP daemon started");
    }
    if !report.devices.is_empty() {
        let _ = writeln!(out, "Devices: {}", report.devices.join(", "));
    }
    if !report.renders.is_empty() {
        let _ = write!(out, "Targets re-rendered: {}", report.renders.len());
    }
    out
}

fn trigger(source: SourceArg) -> TriggerSource {
    match source {
        SourceArg::Vrrp => TriggerSource::Vrrp,
        SourceArg::Operator => TriggerSource::Operator,
    }
}

fn print_transition(
    report: Option<&TransitionReport>,
    state: RedundancyState,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match report {
        Some(report) => {
            let out = output::render_single(&global.output, report, transition_detail, |r| {
                r.to.to_string()
            })?;
            output::print_output(&out, global.quiet);
        }
        None => output::print_output(&format!("already {state}"), global.quiet),
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle<R: CommandRunner>(
    reconciler: &Arc<Reconciler<R>>,
    args: RedundancyArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut machine = RedundancyMachine::new(Arc::clone(reconciler))?;

    match args.command {
        RedundancyCommand::Status => {
            let config = reconciler.config();
            let manager = reconciler.address_manager()?;
            let view = StatusView {
                state: machine.state(),
                peer: machine.peer(),
                redundant: manager.is_redundant(),
                vrrp_devices: manager
                    .public_and_guest_devices()
                    .into_iter()
                    .filter(|facts| facts.vrrp)
                    .map(|facts| facts.device)
                    .collect(),
                vrrp_running: reconciler
                    .processes()
                    .find_process(&config.vrrp_signature)?
                    .is_some(),
            };
            let out = output::render_single(&global.output, &view, status_detail, |v| {
                v.state.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        RedundancyCommand::Promote { source } => {
            let report = machine
                .handle(RedundancyEvent::Promote {
                    source: trigger(source),
                })
                .await?;
            print_transition(report.as_ref(), machine.state(), global)
        }

        RedundancyCommand::Demote { source } => {
            if source == SourceArg::Operator
                && machine.state() != RedundancyState::Backup
                && !util::confirm(
                    "Demote this router to BACKUP? Virtual IPs will be withdrawn.",
                    global.yes,
                )?
            {
                return Ok(());
            }
            let report = machine
                .handle(RedundancyEvent::Demote {
                    source: trigger(source),
                })
                .await?;
            print_transition(report.as_ref(), machine.state(), global)
        }

        RedundancyCommand::Peer { state } => {
            let peer = match state {
                PeerStateArg::Master => RedundancyState::Master,
                PeerStateArg::Backup => RedundancyState::Backup,
            };
            machine.handle(RedundancyEvent::PeerState(peer)).await?;
            if !global.quiet {
                let color = output::should_color(&global.color);
                eprintln!(
                    "{} local {}, peer {peer}",
                    output::success("ok", color),
                    machine.state()
                );
            }
            Ok(())
        }

        RedundancyCommand::Check => {
            let report = machine.self_check().await?;
            print_transition(report.as_ref(), machine.state(), global)
        }

        RedundancyCommand::Listen => listen(machine, global).await,
    }
}

// ── Listen ──────────────────────────────────────────────────────────

/// Parse one line of the listen protocol.
fn parse_event(line: &str) -> Option<RedundancyEvent> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let arg = words.next();
    match (verb.as_str(), arg) {
        ("promote", None) => Some(RedundancyEvent::Promote {
            source: TriggerSource::Vrrp,
        }),
        ("demote", None) => Some(RedundancyEvent::Demote {
            source: TriggerSource::Vrrp,
        }),
        ("peer", Some(state)) => state.parse().ok().map(RedundancyEvent::PeerState),
        ("down" | "up", Some(device)) => Some(RedundancyEvent::InterfaceCheck {
            device: device.to_owned(),
            reachable: verb == "up",
        }),
        _ => None,
    }
}

async fn listen<R: CommandRunner>(
    machine: RedundancyMachine<R>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (tx, rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let mut watcher = machine.subscribe();

    let feed = async {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    break;
                }
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match parse_event(&line) {
                    Some(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => warn!(line = %line.trim(), "unrecognized event line"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        drop(tx);
    };

    tokio::join!(machine.run(rx, cancel.clone()), feed);

    let state = *watcher.borrow_and_update();
    output::print_output(&state.to_string(), global.quiet);
    Ok(())
}
