//! Command dispatch: bridges CLI args -> `SiteManager` calls -> output formatting.

pub mod backup;
pub mod config_cmd;
pub mod php;
pub mod site;
pub mod util;

use wo_core::SiteManager;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

use self::util::Host;

/// Dispatch a command that needs the site engine.
pub async fn dispatch<H: Host>(
    cmd: Command,
    sites: &SiteManager<H>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Site(args) => site::handle(sites, args, global).await,
        Command::Backup(args) => backup::handle(sites, args, global).await,
        // Handled before an engine is built
        Command::Php(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
