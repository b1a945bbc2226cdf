// ── OS account collaborator ──

use std::future::Future;
use std::path::Path;

use tracing::{debug, info};

use super::exec::ShellExec;
use crate::error::CoreError;

/// Creates and removes the per-site system users that own PHP pools.
pub trait Accounts {
    /// Create a system user and same-named group if absent, and add
    /// `member` (the web server user) to that group. Returns whether the
    /// user was created by this call.
    fn ensure_pool_user(
        &self,
        user: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, CoreError>>;

    /// Remove the user and its group. Absence is not an error.
    fn remove_pool_user(&self, user: &str) -> impl Future<Output = Result<(), CoreError>>;

    fn chown(
        &self,
        path: &Path,
        owner: &str,
        recursive: bool,
    ) -> impl Future<Output = Result<(), CoreError>>;
}

/// Accounts managed through the shadow-utils commands.
#[derive(Debug, Clone)]
pub struct SystemAccounts {
    exec: ShellExec,
}

impl SystemAccounts {
    pub fn new(exec: ShellExec) -> Self {
        Self { exec }
    }

    async fn exists(&self, database: &str, name: &str) -> Result<bool, CoreError> {
        Ok(self.exec.run("getent", &[database, name]).await?.success)
    }
}

impl Accounts for SystemAccounts {
    async fn ensure_pool_user(&self, user: &str, member: &str) -> Result<bool, CoreError> {
        if !self.exists("group", user).await? {
            self.exec.run_checked("groupadd", &["-r", user]).await?;
        }
        let created = if self.exists("passwd", user).await? {
            false
        } else {
            self.exec
                .run_checked(
                    "useradd",
                    &[
                        "-r",
                        "-g",
                        user,
                        "-M",
                        "-d",
                        "/nonexistent",
                        "-s",
                        "/usr/sbin/nologin",
                        user,
                    ],
                )
                .await?;
            info!(user, "created pool user");
            true
        };
        self.exec.run_checked("usermod", &["-aG", user, member]).await?;
        Ok(created)
    }

    async fn remove_pool_user(&self, user: &str) -> Result<(), CoreError> {
        if self.exists("passwd", user).await? {
            self.exec.run_checked("userdel", &[user]).await?;
        }
        if self.exists("group", user).await? {
            self.exec.run_checked("groupdel", &[user]).await?;
        }
        debug!(user, "pool user removed");
        Ok(())
    }

    async fn chown(&self, path: &Path, owner: &str, recursive: bool) -> Result<(), CoreError> {
        let spec = format!("{owner}:{owner}");
        let target = path.to_string_lossy();
        let mut args: Vec<&str> = Vec::with_capacity(3);
        if recursive {
            args.push("-R");
        }
        args.push(&spec);
        args.push(&target);
        self.exec.run_checked("chown", &args).await?;
        Ok(())
    }
}
