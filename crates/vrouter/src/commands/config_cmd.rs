//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let config = vrouter_config::load_config(global.config.as_deref())?;
            let text = vrouter_config::to_toml(&config)?;
            output::print_output(text.trim_end(), global.quiet);
            Ok(())
        }
        ConfigCommand::Path => {
            let path = vrouter_config::config_path(global.config.as_deref());
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }
    }
}
