//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use wo_config::ConfigError;
use wo_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const BUSY: i32 = 9;
    pub const PROVISIONING: i32 = 10;
    pub const BACKUP: i32 = 11;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(wo::not_found),
        help("Run: wo {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(
        code(wo::already_exists),
        help("Use `wo site update {identifier}` to change an existing site.")
    )]
    AlreadyExists {
        resource_type: String,
        identifier: String,
    },

    #[error("{message}")]
    #[diagnostic(
        code(wo::conflict),
        help("Pick at most one site type, one PHP version and one cache option.")
    )]
    Conflict { message: String },

    // ── Host ─────────────────────────────────────────────────────────

    #[error("{message}")]
    #[diagnostic(
        code(wo::busy),
        help("Another wo process is working on this site. Retry once it finishes.")
    )]
    Busy { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(wo::provisioning),
        help(
            "Partial changes were rolled back.\n\
             Inspect the unit with: journalctl -u {unit}"
        )
    )]
    Provisioning { message: String, unit: String },

    #[error("{message}")]
    #[diagnostic(
        code(wo::backup),
        help("No archive was written for a failed backup. Check free space and database access.")
    )]
    Backup { message: String },

    #[error("{message}")]
    #[diagnostic(code(wo::command_failed))]
    CommandFailed { message: String },

    #[error("{message}")]
    #[diagnostic(
        code(wo::timeout),
        help("Raise [timeouts] in the config file if the host is slow.")
    )]
    Timeout { message: String },

    #[error("{message}")]
    #[diagnostic(code(wo::internal))]
    Internal { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wo::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(wo::config),
        help("Check the file reported by `wo config path` and any WO_* variables.")
    )]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wo::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Output serialization failed: {0}")]
    #[diagnostic(code(wo::json))]
    Json(#[from] serde_json::Error),

    #[error("Output serialization failed: {0}")]
    #[diagnostic(code(wo::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::AlreadyExists { .. } | Self::Conflict { .. } => exit_code::CONFLICT,
            Self::Busy { .. } => exit_code::BUSY,
            Self::Provisioning { .. } => exit_code::PROVISIONING,
            Self::Backup { .. } => exit_code::BACKUP,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::Conflict { .. } | CoreError::AmbiguousCombination { .. } => {
                CliError::Conflict { message }
            }

            CoreError::UnknownPhpVersion { value } => CliError::Validation {
                field: "php version".into(),
                reason: format!("'{value}' is not supported (see `wo php versions`)"),
            },

            CoreError::Duplicate { domain } => CliError::AlreadyExists {
                resource_type: "site".into(),
                identifier: domain,
            },

            CoreError::SlugTaken { .. } => CliError::Validation {
                field: "domain".into(),
                reason: message,
            },

            CoreError::NotFound { domain } => CliError::NotFound {
                resource_type: "site".into(),
                identifier: domain,
                list_command: "site list".into(),
            },

            CoreError::Provisioning { slug, php, .. } | CoreError::Retirement { slug, php, .. } => {
                CliError::Provisioning {
                    message,
                    unit: format!("php{php}-fpm@{slug}.service"),
                }
            }

            CoreError::Backup { .. } | CoreError::Restore { .. } => CliError::Backup { message },

            CoreError::LockBusy { .. } => CliError::Busy { message },

            CoreError::CommandFailed { .. } => CliError::CommandFailed { message },

            CoreError::Timeout { .. } => CliError::Timeout { message },

            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },

            CoreError::Io { .. }
            | CoreError::Database(_)
            | CoreError::Json(_)
            | CoreError::Template(_) => CliError::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_stable_exit_codes() {
        let cases = [
            (
                CoreError::Conflict {
                    reason: "multiple cache types".into(),
                    flags: vec!["wpfc".into(), "wpredis".into()],
                },
                exit_code::CONFLICT,
            ),
            (
                CoreError::NotFound {
                    domain: "a.com".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::LockBusy {
                    scope: "site a-com".into(),
                },
                exit_code::BUSY,
            ),
            (
                CoreError::Provisioning {
                    slug: "a-com".into(),
                    php: "8.4".into(),
                    message: "unit did not start".into(),
                },
                exit_code::PROVISIONING,
            ),
            (
                CoreError::Backup {
                    domain: "a.com".into(),
                    message: "disk full".into(),
                },
                exit_code::BACKUP,
            ),
            (
                CoreError::UnknownPhpVersion {
                    value: "5.6".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::SlugTaken {
                    domain: "a.b.com".into(),
                    slug: "a-b-com".into(),
                    existing: "a-b.com".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Template("bad".into()),
                exit_code::GENERAL,
            ),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn provisioning_help_names_the_unit() {
        let err = CliError::from(CoreError::Provisioning {
            slug: "a-com".into(),
            php: "8.3".into(),
            message: "x".into(),
        });
        assert!(matches!(err, CliError::Provisioning { ref unit, .. } if unit == "php8.3-fpm@a-com.service"));
    }
}
