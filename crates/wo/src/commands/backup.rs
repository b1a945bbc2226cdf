//! Backup subcommand handlers.

use std::collections::BTreeMap;
use std::path::Path;

use bytesize::ByteSize;
use tabled::Tabled;

use wo_core::backup::read_metadata;
use wo_core::{BackupEntry, BackupKind, BackupMetadata, BackupRequest, RestoreReport, SiteManager};

use crate::cli::{BackupArgs, BackupCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, Host};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ArchiveRow {
    #[tabled(rename = "Archive")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Path")]
    path: String,
}

impl From<&BackupEntry> for ArchiveRow {
    fn from(e: &BackupEntry) -> Self {
        Self {
            name: e.name.clone(),
            size: ByteSize::b(e.size).to_string(),
            path: e.path.display().to_string(),
        }
    }
}

fn metadata_detail(m: &BackupMetadata) -> String {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    let mut pairs = vec![
        ("site", m.sitename.clone()),
        ("type", m.site_type.clone()),
        ("php", or_dash(&m.php_version)),
        ("cache", m.cache_type.clone()),
        ("webroot", m.site_path.display().to_string()),
        ("taken", m.backup_timestamp.clone()),
        ("contents", m.backup_type.to_string()),
        ("reason", or_dash(&m.backup_reason)),
        ("db name", or_dash(&m.db_name)),
    ];
    for (key, value) in &m.extra {
        pairs.push((key.as_str(), value.to_string()));
    }
    output::detail_block(&pairs)
}

fn restore_detail(r: &RestoreReport) -> String {
    let configs = r
        .config_files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    output::detail_block(&[
        ("site", r.metadata.sitename.clone()),
        ("htdocs", util::yes_no(r.htdocs)),
        ("database", util::yes_no(r.database)),
        ("configs", if configs.is_empty() { "-".into() } else { configs }),
    ])
}

/// `backup info` reads only the archive and runs without an engine.
pub fn info(archive: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    let metadata = read_metadata(archive)?;
    let out = output::render_single(&global.output, &metadata, metadata_detail, |m| {
        m.sitename.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle<H: Host>(
    sites: &SiteManager<H>,
    args: BackupArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        BackupCommand::Create {
            domain,
            db,
            files,
            reason,
            meta,
        } => {
            let kind = if db {
                BackupKind::Database
            } else if files {
                BackupKind::Files
            } else {
                BackupKind::Full
            };
            let extra = meta
                .iter()
                .map(|pair| util::parse_meta(pair))
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            let request = BackupRequest {
                kind,
                reason,
                extra,
            };
            let archive = sites.backup(&domain, &request).await?;
            output::print_output(&archive.display().to_string(), global.quiet);
            output::print_success(&format!("Backup of {domain} written ({kind})"), global.quiet);
            Ok(())
        }

        BackupCommand::List { domain } => {
            let entries = sites.backups_of(&domain)?;
            let out = output::render_list(&global.output, &entries, |e| ArchiveRow::from(e), |e| {
                e.path.display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        BackupCommand::Info { archive } => info(&archive, global),

        BackupCommand::Restore { archive, domain } => {
            let target = domain.as_deref().unwrap_or("the archived site");
            if !util::confirm(
                &format!("Restore {} into {target}? Current files are overwritten.", archive.display()),
                "backup restore",
                global.yes,
            )? {
                return Ok(());
            }
            let report = sites.restore(&archive, domain.as_deref()).await?;
            let out = output::render_single(&global.output, &report, restore_detail, |r| {
                r.metadata.sitename.clone()
            })?;
            output::print_output(&out, global.quiet);
            output::print_success(
                &format!("Restored {} from {}", report.metadata.sitename, archive.display()),
                global.quiet,
            );
            Ok(())
        }
    }
}
