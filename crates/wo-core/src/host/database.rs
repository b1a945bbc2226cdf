// ── Database server collaborator ──

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use super::exec::{Redirect, ShellExec, ensure_success};
use crate::error::CoreError;
use crate::model::DbCredentials;

/// Provisions and archives per-site databases.
pub trait DatabaseAdmin {
    /// Create the database and a user with full data and schema privileges
    /// on it.
    fn create_database(
        &self,
        creds: &DbCredentials,
        grant_host: &str,
    ) -> impl Future<Output = Result<(), CoreError>>;

    /// Drop the database and its user. Absence is not an error.
    fn drop_database(
        &self,
        creds: &DbCredentials,
        grant_host: &str,
    ) -> impl Future<Output = Result<(), CoreError>>;

    /// Write a logical dump of `name` to `out`.
    fn dump(&self, name: &str, out: &Path) -> impl Future<Output = Result<(), CoreError>>;

    /// Replay a dump into `name`.
    fn load(&self, name: &str, input: &Path) -> impl Future<Output = Result<(), CoreError>>;
}

/// MySQL / MariaDB through the command-line clients, authenticating with
/// the invoking user's option files.
#[derive(Debug, Clone)]
pub struct Mysql {
    exec: ShellExec,
    dump_timeout: Duration,
}

impl Mysql {
    pub fn new(exec: ShellExec, dump_timeout: Duration) -> Self {
        Self { exec, dump_timeout }
    }

    async fn execute(&self, sql: &str) -> Result<(), CoreError> {
        self.exec.run_checked("mysql", &["-e", sql]).await?;
        Ok(())
    }
}

const SITE_PRIVILEGES: &str = "SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, REFERENCES, INDEX, \
     ALTER, CREATE TEMPORARY TABLES, LOCK TABLES, EXECUTE, CREATE VIEW, SHOW VIEW, CREATE ROUTINE, \
     ALTER ROUTINE, EVENT, TRIGGER";

/// Quote an identifier with backticks.
fn ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl DatabaseAdmin for Mysql {
    async fn create_database(&self, creds: &DbCredentials, grant_host: &str) -> Result<(), CoreError> {
        let db = ident(&creds.name);
        let user = format!("{}@{}", ident(&creds.user), ident(grant_host));
        self.execute(&format!("CREATE DATABASE IF NOT EXISTS {db}"))
            .await?;
        self.execute(&format!(
            "CREATE USER IF NOT EXISTS {user} IDENTIFIED BY {}",
            literal(creds.password.expose_secret())
        ))
        .await?;
        self.execute(&format!("GRANT {SITE_PRIVILEGES} ON {db}.* TO {user}"))
            .await?;
        self.execute("FLUSH PRIVILEGES").await?;
        info!(database = %creds.name, user = %creds.user, "database created");
        Ok(())
    }

    async fn drop_database(&self, creds: &DbCredentials, grant_host: &str) -> Result<(), CoreError> {
        self.execute(&format!("DROP DATABASE IF EXISTS {}", ident(&creds.name)))
            .await?;
        self.execute(&format!(
            "DROP USER IF EXISTS {}@{}",
            ident(&creds.user),
            ident(grant_host)
        ))
        .await?;
        debug!(database = %creds.name, "database dropped");
        Ok(())
    }

    async fn dump(&self, name: &str, out: &Path) -> Result<(), CoreError> {
        let output = self
            .exec
            .run_redirected(
                "mysqldump",
                &["--single-transaction", "--hex-blob", name],
                Redirect {
                    stdin: None,
                    stdout: Some(out),
                },
                self.dump_timeout,
            )
            .await?;
        ensure_success("mysqldump", output)?;
        Ok(())
    }

    async fn load(&self, name: &str, input: &Path) -> Result<(), CoreError> {
        self.execute(&format!("CREATE DATABASE IF NOT EXISTS {}", ident(name)))
            .await?;
        let output = self
            .exec
            .run_redirected(
                "mysql",
                &[name],
                Redirect {
                    stdin: Some(input),
                    stdout: None,
                },
                self.dump_timeout,
            )
            .await?;
        ensure_success("mysql", output)?;
        Ok(())
    }
}
