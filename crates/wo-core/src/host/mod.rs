// ── Host collaborators ──
//
// Everything that touches the operating system beyond plain file writes
// goes through these traits, so the engine can run against a recording
// fake under test.

pub mod accounts;
pub mod database;
pub mod exec;
pub mod service;

pub use accounts::{Accounts, SystemAccounts};
pub use database::{DatabaseAdmin, Mysql};
pub use exec::{CommandOutput, ShellExec};
pub use service::{ServiceManager, Systemd, UnitAction};

use std::path::Path;

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::DbCredentials;

/// The production host: systemd, shadow-utils and the MySQL clients.
#[derive(Debug, Clone)]
pub struct SystemHost {
    services: Systemd,
    accounts: SystemAccounts,
    database: Mysql,
}

impl SystemHost {
    pub fn new(config: &EngineConfig) -> Self {
        let exec = ShellExec::new(config.timeouts.command);
        Self {
            services: Systemd::new(exec.clone()),
            accounts: SystemAccounts::new(exec.clone()),
            database: Mysql::new(exec, config.timeouts.dump),
        }
    }
}

impl ServiceManager for SystemHost {
    async fn control(
        &self,
        action: UnitAction,
        unit: &str,
    ) -> Result<CommandOutput, CoreError> {
        self.services.control(action, unit).await
    }

    async fn daemon_reload(&self) -> Result<(), CoreError> {
        self.services.daemon_reload().await
    }

    async fn reload_nginx(&self) -> Result<(), CoreError> {
        self.services.reload_nginx().await
    }
}

impl Accounts for SystemHost {
    async fn ensure_pool_user(&self, user: &str, member: &str) -> Result<bool, CoreError> {
        self.accounts.ensure_pool_user(user, member).await
    }

    async fn remove_pool_user(&self, user: &str) -> Result<(), CoreError> {
        self.accounts.remove_pool_user(user).await
    }

    async fn chown(
        &self,
        path: &Path,
        owner: &str,
        recursive: bool,
    ) -> Result<(), CoreError> {
        self.accounts.chown(path, owner, recursive).await
    }
}

impl DatabaseAdmin for SystemHost {
    async fn create_database(
        &self,
        creds: &DbCredentials,
        grant_host: &str,
    ) -> Result<(), CoreError> {
        self.database.create_database(creds, grant_host).await
    }

    async fn drop_database(
        &self,
        creds: &DbCredentials,
        grant_host: &str,
    ) -> Result<(), CoreError> {
        self.database.drop_database(creds, grant_host).await
    }

    async fn dump(&self, name: &str, out: &Path) -> Result<(), CoreError> {
        self.database.dump(name, out).await
    }

    async fn load(&self, name: &str, input: &Path) -> Result<(), CoreError> {
        self.database.load(name, input).await
    }
}
