//! Site command handlers.

use tabled::Tabled;

use wo_core::{
    CreateRequest, DeleteOptions, FleetReport, PhpVersion, ProxyTarget, SiteFilter, SiteInfo,
    SiteKind, SiteManager, SiteRecord, UpdateOutcome,
};

use crate::cli::{GlobalOpts, SiteArgs, SiteCommand, SiteFlagArgs, SiteListArgs};
use crate::error::CliError;
use crate::output;

use super::util::{self, Host};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SiteRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Type")]
    site_type: String,
    #[tabled(rename = "PHP")]
    php: String,
    #[tabled(rename = "Cache")]
    cache: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "SSL")]
    ssl: String,
    #[tabled(rename = "Created")]
    created: String,
}

impl From<&SiteRecord> for SiteRow {
    fn from(r: &SiteRecord) -> Self {
        Self {
            domain: r.domain.clone(),
            site_type: r.site_type.to_string(),
            php: r.php_version.map(|v| v.to_string()).unwrap_or_default(),
            cache: r.cache_type.to_string(),
            enabled: util::yes_no(r.is_enabled),
            ssl: util::yes_no(r.is_ssl),
            created: r.created_on.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

fn record_pairs(r: &SiteRecord) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("domain", r.domain.clone()),
        ("type", r.site_type.to_string()),
        (
            "php",
            r.php_version.map_or_else(|| "-".into(), |v| v.to_string()),
        ),
        ("cache", r.cache_type.to_string()),
        ("webroot", r.site_path.display().to_string()),
        ("enabled", util::yes_no(r.is_enabled)),
        ("ssl", util::yes_no(r.is_ssl)),
        ("created", r.created_on.to_rfc3339()),
    ];
    if let Some(db) = &r.database {
        pairs.push(("db name", db.name.clone()));
        pairs.push(("db user", db.user.clone()));
        pairs.push(("db host", db.host.clone()));
    }
    pairs
}

fn record_detail(r: &SiteRecord) -> String {
    output::detail_block(&record_pairs(r))
}

fn info_detail(info: &SiteInfo) -> String {
    let mut pairs = record_pairs(&info.record);
    pairs.push(("vhost", util::yes_no(info.vhost_enabled)));
    if let Some(pool) = &info.pool {
        pairs.push(("unit", pool.unit.clone()));
        pairs.push(("socket", pool.socket.display().to_string()));
        pairs.push((
            "pool",
            if pool.active { "active" } else { "inactive" }.into(),
        ));
    }
    output::detail_block(&pairs)
}

fn fleet_detail(report: &FleetReport) -> String {
    output::detail_block(&[
        ("updated", report.updated.len().to_string()),
        ("unchanged", report.unchanged.len().to_string()),
        ("skipped", report.skipped.len().to_string()),
        ("failed", report.failed.len().to_string()),
    ])
}

fn print_record<T: serde::Serialize>(
    global: &GlobalOpts,
    data: &T,
    record: &SiteRecord,
) -> Result<(), CliError> {
    let out = output::render_single(
        &global.output,
        data,
        |_| record_detail(record),
        |_| record.domain.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn require_flags(flags: &SiteFlagArgs) -> Result<wo_core::SiteFlags, CliError> {
    let parsed = flags.to_flags()?;
    if parsed.is_empty() {
        return Err(CliError::Validation {
            field: "site options".into(),
            reason: "give at least one of the type, PHP version or cache flags".into(),
        });
    }
    Ok(parsed)
}

fn list_filter(args: &SiteListArgs) -> Result<SiteFilter, CliError> {
    let enabled = if args.enabled {
        Some(true)
    } else if args.disabled {
        Some(false)
    } else {
        None
    };
    let php_version = args
        .php_version
        .as_deref()
        .map(str::parse::<PhpVersion>)
        .transpose()?;
    let site_type = args
        .site_type
        .as_deref()
        .map(|t| {
            t.parse::<SiteKind>().map_err(|_| CliError::Validation {
                field: "type".into(),
                reason: format!("unknown site type '{t}'"),
            })
        })
        .transpose()?;
    Ok(SiteFilter {
        enabled,
        ssl: args.ssl.then_some(true),
        site_type,
        php_version,
    })
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle<H: Host>(
    sites: &SiteManager<H>,
    args: SiteArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SiteCommand::Create {
            domain,
            flags,
            proxy,
        } => {
            let proxy = proxy.as_deref().map(str::parse::<ProxyTarget>).transpose()?;
            let request = CreateRequest {
                domain,
                flags: flags.to_flags()?,
                proxy,
            };
            let record = sites.create(&request).await?;
            print_record(global, &record, &record)?;
            output::print_success(
                &format!("Site {} created ({})", record.domain, record.site_type),
                global.quiet,
            );
            Ok(())
        }

        SiteCommand::Update {
            domain: None,
            flags,
            ..
        } => {
            let report = sites.update_all(&require_flags(&flags)?).await?;
            for (domain, reason) in &report.skipped {
                output::print_warning(&format!("{domain} skipped: {reason}"));
            }
            for (domain, reason) in &report.failed {
                output::print_warning(&format!("{domain} failed: {reason}"));
            }
            let out = output::render_single(
                &global.output,
                &report,
                fleet_detail,
                |r| r.updated.join("\n"),
            )?;
            output::print_output(&out, global.quiet);
            if report.failed.is_empty() {
                Ok(())
            } else {
                Err(CliError::Internal {
                    message: format!("{} site(s) failed to update", report.failed.len()),
                })
            }
        }

        SiteCommand::Update {
            domain: Some(domain),
            flags,
            ..
        } => {
            let outcome = sites.update(&domain, &require_flags(&flags)?).await?;
            if let UpdateOutcome::Updated {
                retired: Some(report),
                ..
            } = &outcome
            {
                for failure in &report.failures {
                    output::print_warning(&format!("old pool cleanup: {failure}"));
                }
            }
            print_record(global, &outcome, outcome.record())?;
            let message = match &outcome {
                UpdateOutcome::Unchanged { record } => format!("Site {} unchanged", record.domain),
                UpdateOutcome::Updated { record, .. } => format!("Site {} updated", record.domain),
            };
            output::print_success(&message, global.quiet);
            Ok(())
        }

        SiteCommand::Delete {
            domain,
            keep_files,
            keep_db,
        } => {
            if !util::confirm(
                &format!("Delete site '{domain}'? This is destructive."),
                "site delete",
                global.yes,
            )? {
                return Ok(());
            }
            let report = sites
                .delete(&domain, DeleteOptions {
                    keep_files,
                    keep_db,
                })
                .await?;
            for warning in &report.warnings {
                output::print_warning(warning);
            }
            output::print_success(&format!("Site {} deleted", report.record.domain), global.quiet);
            Ok(())
        }

        SiteCommand::Enable { domain } => {
            let record = sites.enable(&domain).await?;
            output::print_success(&format!("Site {} enabled", record.domain), global.quiet);
            Ok(())
        }

        SiteCommand::Disable { domain } => {
            let record = sites.disable(&domain).await?;
            output::print_success(&format!("Site {} disabled", record.domain), global.quiet);
            Ok(())
        }

        SiteCommand::Info { domain } => {
            let info = sites.info(&domain).await?;
            let out = output::render_single(&global.output, &info, info_detail, |i| {
                i.record.domain.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        SiteCommand::List(list) => {
            let records = sites.list(&list_filter(&list)?)?;
            let out = output::render_list(&global.output, &records, |r| SiteRow::from(r), |r| {
                r.domain.clone()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
