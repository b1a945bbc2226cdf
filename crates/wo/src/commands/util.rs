//! Shared helpers for command handlers.

use std::io::IsTerminal;

use wo_core::backup::RESERVED_METADATA_KEYS;
use wo_core::host::{Accounts, DatabaseAdmin, ServiceManager};

use crate::error::CliError;

/// Everything a command handler needs from the host.
pub trait Host: ServiceManager + Accounts + DatabaseAdmin {}

impl<T: ServiceManager + Accounts + DatabaseAdmin> Host for T {}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` is required.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Validation {
            field: "interactive".into(),
            reason: format!("prompt failed: {e}"),
        })
}

/// Parse `key=value`. Values that parse as JSON keep their type; anything
/// else is a string.
pub fn parse_meta(pair: &str) -> Result<(String, serde_json::Value), CliError> {
    let (key, value) = pair.split_once('=').ok_or_else(|| CliError::Validation {
        field: "meta".into(),
        reason: format!("expected KEY=VALUE, got '{pair}'"),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "meta".into(),
            reason: "key must not be empty".into(),
        });
    }
    if RESERVED_METADATA_KEYS.contains(&key) {
        return Err(CliError::Validation {
            field: "meta".into(),
            reason: format!("'{key}' is a built-in metadata field"),
        });
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

pub fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.into()
}
