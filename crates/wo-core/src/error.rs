// ── Core error types ──
//
// User-facing errors from wo-core. The command layer maps these onto
// diagnostics and exit codes; core never prints anything itself.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Flag resolution ──────────────────────────────────────────────
    #[error("Conflicting site options ({reason}): {}", flags.join(", "))]
    Conflict { reason: String, flags: Vec<String> },

    /// Two equally specific combination rows disagree. Indicates a broken
    /// combination table rather than bad user input.
    #[error("Ambiguous option combination {}: matches {candidates}", flags.join(", "))]
    AmbiguousCombination {
        flags: Vec<String>,
        candidates: String,
    },

    #[error("Unknown PHP version: {value}")]
    UnknownPhpVersion { value: String },

    // ── Site registry ────────────────────────────────────────────────
    #[error("Site already exists: {domain}")]
    Duplicate { domain: String },

    #[error("Site not found: {domain}")]
    NotFound { domain: String },

    #[error("{domain} maps to identifier {slug}, already used by {existing}")]
    SlugTaken {
        domain: String,
        slug: String,
        existing: String,
    },

    // ── Host resources ───────────────────────────────────────────────
    #[error("PHP-FPM pool setup failed for {slug} (PHP {php}): {message}")]
    Provisioning {
        slug: String,
        php: String,
        message: String,
    },

    #[error("PHP-FPM pool cleanup incomplete for {slug} (PHP {php}): {message}")]
    Retirement {
        slug: String,
        php: String,
        message: String,
    },

    #[error("Backup failed for {domain}: {message}")]
    Backup { domain: String, message: String },

    #[error("Restore failed from {}: {message}", archive.display())]
    Restore { archive: PathBuf, message: String },

    #[error("Another operation holds the {scope} lock")]
    LockBusy { scope: String },

    // ── External commands ────────────────────────────────────────────
    #[error("Command `{program}` failed: {message}")]
    CommandFailed { program: String, message: String },

    #[error("Command `{program}` timed out after {timeout_secs}s")]
    Timeout { program: String, timeout_secs: u64 },

    // ── Input ────────────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Wrapped library errors ───────────────────────────────────────
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Site database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid metadata document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),
}

impl CoreError {
    /// Attach a path to an IO error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

impl From<handlebars::RenderError> for CoreError {
    fn from(err: handlebars::RenderError) -> Self {
        Self::Template(err.to_string())
    }
}

impl From<handlebars::TemplateError> for CoreError {
    fn from(err: handlebars::TemplateError) -> Self {
        Self::Template(err.to_string())
    }
}

/// Extension for tagging `std::io::Result` values with the path involved.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, CoreError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T, CoreError> {
        self.map_err(|e| CoreError::io(path.as_ref(), e))
    }
}
