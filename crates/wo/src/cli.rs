//! Clap derive structures for the `wo` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use wo_core::{CoreError, SiteFlags};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wo -- per-site nginx + PHP-FPM provisioning
#[derive(Debug, Parser)]
#[command(
    name = "wo",
    version,
    about = "Provision and manage nginx + PHP-FPM web sites",
    long_about = "Creates, updates and removes web sites on this host.\n\n\
        Every PHP site gets its own PHP-FPM instance running as a dedicated\n\
        system user, its own nginx vhost and, where needed, a MySQL database.",
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
    /// Configuration file merged over the system and user files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Filesystem root for every host path (testing and chroots)
    #[arg(long, env = "WO_ROOT", global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "WO_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

// ── Output & Log Enums ───────────────────────────────────────────────

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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create, update and remove sites
    #[command(alias = "s")]
    Site(SiteArgs),

    /// Archive and restore sites
    #[command(alias = "b")]
    Backup(BackupArgs),

    /// PHP version registry
    Php(PhpArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SITE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Site feature flags. Any subset may be given; the combination is
/// resolved into a site type, PHP version and cache type.
#[derive(Debug, Default, Args)]
pub struct SiteFlagArgs {
    /// Static HTML site
    #[arg(long, help_heading = "Site type")]
    pub html: bool,
    /// PHP site
    #[arg(long, help_heading = "Site type")]
    pub php: bool,
    /// PHP site with a MySQL database
    #[arg(long, help_heading = "Site type")]
    pub mysql: bool,
    /// WordPress
    #[arg(long, help_heading = "Site type")]
    pub wp: bool,
    /// WordPress multisite, subdirectories
    #[arg(long, help_heading = "Site type")]
    pub wpsubdir: bool,
    /// WordPress multisite, subdomains
    #[arg(long, help_heading = "Site type")]
    pub wpsubdomain: bool,

    #[arg(long, help_heading = "PHP version")]
    pub php74: bool,
    #[arg(long, help_heading = "PHP version")]
    pub php80: bool,
    #[arg(long, help_heading = "PHP version")]
    pub php81: bool,
    #[arg(long, help_heading = "PHP version")]
    pub php82: bool,
    #[arg(long, help_heading = "PHP version")]
    pub php83: bool,
    #[arg(long, help_heading = "PHP version")]
    pub php84: bool,

    /// nginx fastcgi cache
    #[arg(long, help_heading = "Cache")]
    pub wpfc: bool,
    /// WP Super Cache
    #[arg(long, help_heading = "Cache")]
    pub wpsc: bool,
    /// Redis object and page cache
    #[arg(long, help_heading = "Cache")]
    pub wpredis: bool,
    /// WP Rocket
    #[arg(long, help_heading = "Cache")]
    pub wprocket: bool,
    /// Cache Enabler
    #[arg(long, help_heading = "Cache")]
    pub wpce: bool,
}

impl SiteFlagArgs {
    /// Names of the flags that were given.
    pub fn names(&self) -> Vec<&'static str> {
        [
            (self.html, "html"),
            (self.php, "php"),
            (self.mysql, "mysql"),
            (self.wp, "wp"),
            (self.wpsubdir, "wpsubdir"),
            (self.wpsubdomain, "wpsubdomain"),
            (self.php74, "php74"),
            (self.php80, "php80"),
            (self.php81, "php81"),
            (self.php82, "php82"),
            (self.php83, "php83"),
            (self.php84, "php84"),
            (self.wpfc, "wpfc"),
            (self.wpsc, "wpsc"),
            (self.wpredis, "wpredis"),
            (self.wprocket, "wprocket"),
            (self.wpce, "wpce"),
        ]
        .into_iter()
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
    }

    pub fn to_flags(&self) -> Result<SiteFlags, CoreError> {
        SiteFlags::parse(self.names())
    }
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    #[command(subcommand)]
    pub command: SiteCommand,
}

#[derive(Debug, Subcommand)]
pub enum SiteCommand {
    /// Create a site
    Create {
        /// Domain name (scheme, www. and trailing slash are stripped)
        domain: String,

        #[command(flatten)]
        flags: SiteFlagArgs,

        /// Reverse-proxy to an upstream instead of serving files
        #[arg(long, value_name = "HOST[:PORT]")]
        proxy: Option<String>,
    },

    /// Change a site's type, PHP version or cache
    Update {
        /// Domain name
        #[arg(required_unless_present = "all")]
        domain: Option<String>,

        /// Move every PHP site to the given PHP version
        #[arg(long, conflicts_with = "domain")]
        all: bool,

        #[command(flatten)]
        flags: SiteFlagArgs,
    },

    /// Delete a site and its pool, vhost, database and files
    #[command(alias = "rm")]
    Delete {
        domain: String,

        /// Keep the webroot on disk
        #[arg(long)]
        keep_files: bool,

        /// Keep the database and its user
        #[arg(long)]
        keep_db: bool,
    },

    /// Link the vhost into sites-enabled
    Enable { domain: String },

    /// Unlink the vhost from sites-enabled
    Disable { domain: String },

    /// Show a site and the state of its pool
    #[command(alias = "show")]
    Info { domain: String },

    /// List sites
    #[command(alias = "ls")]
    List(SiteListArgs),
}

#[derive(Debug, Args)]
pub struct SiteListArgs {
    /// Only enabled sites
    #[arg(long, conflicts_with = "disabled")]
    pub enabled: bool,

    /// Only disabled sites
    #[arg(long)]
    pub disabled: bool,

    /// Only sites with TLS
    #[arg(long)]
    pub ssl: bool,

    /// Only sites on this PHP version (e.g. 8.3)
    #[arg(long = "php", value_name = "VERSION")]
    pub php_version: Option<String>,

    /// Only sites of this type
    #[arg(long = "type", value_name = "TYPE")]
    pub site_type: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BACKUP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BackupArgs {
    #[command(subcommand)]
    pub command: BackupCommand,
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Archive a site
    Create {
        domain: String,

        /// Database dump only
        #[arg(long, conflicts_with = "files")]
        db: bool,

        /// Files and configs only
        #[arg(long)]
        files: bool,

        /// Free-form reason recorded in the archive
        #[arg(long)]
        reason: Option<String>,

        /// Extra metadata field (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// List a site's archives, newest first
    #[command(alias = "ls")]
    List { domain: String },

    /// Show the metadata of an archive
    Info { archive: PathBuf },

    /// Restore an archive into a registered site
    Restore {
        archive: PathBuf,

        /// Target site (default: the site the archive was taken from)
        #[arg(long)]
        domain: Option<String>,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PHP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PhpArgs {
    #[command(subcommand)]
    pub command: PhpCommand,
}

#[derive(Debug, Subcommand)]
pub enum PhpCommand {
    /// List supported PHP versions
    Versions,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flag_names_follow_declaration() {
        let cli = Cli::parse_from(["wo", "site", "create", "a.com", "--wp", "--php83", "--wpredis"]);
        let Command::Site(SiteArgs {
            command: SiteCommand::Create { flags, .. },
        }) = cli.command
        else {
            panic!("expected site create");
        };
        assert_eq!(flags.names(), vec!["wp", "php83", "wpredis"]);
    }
}
