// ── Service manager collaborator ──

use std::future::Future;

use strum::{AsRefStr, Display};
use tracing::debug;

use super::exec::{CommandOutput, ShellExec};
use crate::error::CoreError;

/// Operations on a unit by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum UnitAction {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
    IsActive,
}

/// Starts, stops and inspects system services.
///
/// Implementations report the outcome of each call; deciding whether a
/// failed step is fatal is left to the caller.
pub trait ServiceManager {
    fn control(
        &self,
        action: UnitAction,
        unit: &str,
    ) -> impl Future<Output = Result<CommandOutput, CoreError>>;

    /// Re-read unit files after templates change on disk.
    fn daemon_reload(&self) -> impl Future<Output = Result<(), CoreError>>;

    fn is_active(&self, unit: &str) -> impl Future<Output = Result<bool, CoreError>> {
        async move {
            let output = self.control(UnitAction::IsActive, unit).await?;
            Ok(output.success && output.stdout.trim() == "active")
        }
    }

    /// Validate and reload the web server configuration.
    fn reload_nginx(&self) -> impl Future<Output = Result<(), CoreError>>;
}

/// `systemctl`-backed service manager.
#[derive(Debug, Clone)]
pub struct Systemd {
    exec: ShellExec,
}

impl Systemd {
    pub fn new(exec: ShellExec) -> Self {
        Self { exec }
    }
}

impl ServiceManager for Systemd {
    async fn control(&self, action: UnitAction, unit: &str) -> Result<CommandOutput, CoreError> {
        let output = self.exec.run("systemctl", &[action.as_ref(), unit]).await?;
        debug!(unit, %action, success = output.success, "systemctl");
        Ok(output)
    }

    async fn daemon_reload(&self) -> Result<(), CoreError> {
        self.exec.run_checked("systemctl", &["daemon-reload"]).await?;
        Ok(())
    }

    async fn reload_nginx(&self) -> Result<(), CoreError> {
        self.exec.run_checked("nginx", &["-t"]).await?;
        let output = self.control(UnitAction::Reload, "nginx").await?;
        super::exec::ensure_success("systemctl", output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_render_as_systemctl_verbs() {
        assert_eq!(UnitAction::IsActive.as_ref(), "is-active");
        assert_eq!(UnitAction::Restart.to_string(), "restart");
    }
}
