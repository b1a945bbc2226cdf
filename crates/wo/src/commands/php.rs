//! PHP registry handlers.

use serde::Serialize;
use tabled::Tabled;

use wo_core::PhpVersion;

use crate::cli::{GlobalOpts, PhpArgs, PhpCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct VersionEntry {
    flag: String,
    version: String,
    default: bool,
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Flag")]
    flag: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Default")]
    default: String,
}

/// `default` is the configured default, or the newest release when no
/// config could be loaded.
pub fn handle(args: PhpArgs, default: PhpVersion, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        PhpCommand::Versions => {
            let entries: Vec<VersionEntry> = PhpVersion::all()
                .iter()
                .rev()
                .map(|v| VersionEntry {
                    flag: format!("--{}", v.key()),
                    version: v.dotted().to_owned(),
                    default: *v == default,
                })
                .collect();
            let out = output::render_list(
                &global.output,
                &entries,
                |e| VersionRow {
                    flag: e.flag.clone(),
                    version: e.version.clone(),
                    default: util::yes_no(e.default),
                },
                |e| e.version.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
