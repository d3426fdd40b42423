//! Clap derive structures for the `vrouter` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.
//! Only clap and clap_complete may be used here: build.rs includes this
//! file directly to generate man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vrouter -- reconcile a virtual router's OS state with its declared config
#[derive(Debug, Parser)]
#[command(
    name = "vrouter",
    version,
    about = "Reconcile virtual router configuration with the host",
    long_about = "Merges declarative configuration payloads into durable per-type data bags,\n\
        renders routing tables, DHCP, DNS, firewall, load-balancer and VPN artifacts,\n\
        and drives master/backup failover for redundant router pairs.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (default: /etc/vrouter/config.toml)
    #[arg(long, env = "VROUTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VROUTER_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Record external commands instead of running them
    #[arg(long, short = 'n', env = "VROUTER_DRY_RUN", global = true)]
    pub dry_run: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Resource & Target Enums ──────────────────────────────────────────

/// Resource types, named as in payload `type` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceArg {
    #[value(name = "addresses")]
    Addresses,
    #[value(name = "dhcpentries")]
    DhcpEntries,
    #[value(name = "forwardingrules")]
    ForwardingRules,
    #[value(name = "guestnetwork")]
    GuestNetwork,
    #[value(name = "vpnusers")]
    VpnUsers,
    #[value(name = "firewallrules")]
    FirewallRules,
    #[value(name = "loadbalancer")]
    LoadBalancer,
    #[value(name = "monitorservice")]
    MonitorService,
    #[value(name = "cmdline")]
    CmdLine,
}

/// Render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetArg {
    Dhcp,
    Dns,
    Firewall,
    LoadBalancer,
    Vpn,
    Monitor,
    Routing,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply a configuration payload (JSON file or stdin)
    Apply(ApplyArgs),

    /// Converge render targets from the stored bags
    Render(RenderArgs),

    /// Show the stored bag for one resource type
    Show(ShowArgs),

    /// List stored bags with their versions
    #[command(alias = "ls")]
    List,

    /// Master/backup role management
    #[command(alias = "ha")]
    Redundancy(RedundancyArgs),

    /// Read-only consistency checks between bags and published artifacts
    Verify(VerifyArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Apply ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// Payload file; reads stdin when omitted or "-"
    pub file: Option<PathBuf>,

    /// Resource type (overrides the payload's "type" field)
    #[arg(long = "type", short = 't')]
    pub resource: Option<ResourceArg>,
}

// ── Render ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Targets to converge (all when omitted)
    pub targets: Vec<TargetArg>,

    /// Publish and run post actions even when nothing changed
    #[arg(long, short = 'f')]
    pub force: bool,
}

// ── Show ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Resource type to show
    pub resource: ResourceArg,
}

// ── Redundancy ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RedundancyArgs {
    #[command(subcommand)]
    pub command: RedundancyCommand,
}

#[derive(Debug, Subcommand)]
pub enum RedundancyCommand {
    /// Show the persisted role and VRRP devices
    Status,

    /// Take the MASTER role
    Promote {
        /// Who is asking (vrrp notify scripts pass `vrrp`)
        #[arg(long, default_value = "operator")]
        source: SourceArg,
    },

    /// Give up the MASTER role
    Demote {
        /// Who is asking (vrrp notify scripts pass `vrrp`)
        #[arg(long, default_value = "operator")]
        source: SourceArg,
    },

    /// Report the peer's role and check for split brain
    Peer {
        /// Role the peer reports
        state: PeerStateArg,
    },

    /// Probe VRRP interfaces and demote if one is down
    Check,

    /// Read events from stdin, one per line, until EOF or Ctrl-C
    ///
    /// Lines: `promote`, `demote`, `peer master|backup`, `down <device>`,
    /// `up <device>`.
    Listen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Vrrp,
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PeerStateArg {
    Master,
    Backup,
}

// ── Verify ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(subcommand)]
    pub command: VerifyCommand,
}

#[derive(Debug, Subcommand)]
pub enum VerifyCommand {
    /// Report DHCP reservations missing from the published hosts file
    Dhcp,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path in use
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
