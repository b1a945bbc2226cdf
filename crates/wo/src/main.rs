mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wo_core::{PhpVersion, SiteManager, SystemHost};

use crate::cli::{BackupCommand, Cli, Command, LogFormat};
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose, cli.global.quiet, cli.global.log_format);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, quiet: bool, format: LogFormat) {
    let filter = match (quiet, verbosity) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Commands that never touch the host
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "wo", &mut std::io::stdout());
            Ok(())
        }

        Command::Php(args) => {
            let default = wo_config::load_config(cli.global.config.as_deref())
                .ok()
                .and_then(|cfg| cfg.default_php().ok())
                .unwrap_or_else(PhpVersion::latest);
            commands::php::handle(args, default, &cli.global)
        }

        Command::Backup(cli::BackupArgs {
            command: BackupCommand::Info { archive },
        }) => commands::backup::info(&archive, &cli.global),

        // Everything else needs the site engine
        cmd => {
            let engine = wo_config::load_config(cli.global.config.as_deref())?
                .to_engine_config(cli.global.root.as_deref())?;
            tracing::debug!(root = %engine.layout.root().display(), "engine configured");

            let host = SystemHost::new(&engine);
            let sites = SiteManager::open(host, engine)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &sites, &cli.global).await
        }
    }
}
