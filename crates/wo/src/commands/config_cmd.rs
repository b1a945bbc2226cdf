//! Config subcommand handlers.

use std::path::PathBuf;

use wo_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// The file `config path` reports and `config init` writes: `--config`
/// when given, otherwise the default location.
fn target_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(wo_config::config_path)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = wo_config::load_config(global.config.as_deref())?;
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| c.to_toml().unwrap_or_else(|e| format!("# {e}")),
                |_| target_path(global).display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&target_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = target_path(global);
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!("{} already exists (use --force to overwrite)", path.display()),
                });
            }
            wo_config::save_config(&Config::default(), &path)?;
            output::print_success(&format!("Wrote {}", path.display()), global.quiet);
            Ok(())
        }
    }
}
