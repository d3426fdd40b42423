//! Command dispatch: bridges CLI args -> core reconciler -> output formatting.

pub mod apply;
pub mod bags;
pub mod config_cmd;
pub mod redundancy;
pub mod render;
pub mod util;
pub mod verify;

use std::sync::Arc;

use vrouter_core::{CommandRunner, Reconciler};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a reconciler-bound command to the appropriate handler.
pub async fn dispatch<R: CommandRunner>(
    cmd: Command,
    reconciler: &Arc<Reconciler<R>>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Apply(args) => apply::handle(reconciler, args, global).await,
        Command::Render(args) => render::handle(reconciler, args, global).await,
        Command::Show(args) => bags::show(reconciler, &args, global),
        Command::List => bags::list(reconciler, global),
        Command::Redundancy(args) => redundancy::handle(reconciler, args, global).await,
        Command::Verify(args) => verify::handle(reconciler, &args, global),
        // Config and Completions are handled before a reconciler exists
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command does not use the reconciler".into(),
        )),
    }
}
