// ── PHP-FPM pool lifecycle ──
//
// One isolated FPM instance per (site, PHP version): a dedicated system
// user, a templated systemd instance, a master config and a pool config.
// `provision` either leaves an active pool or undoes everything it did;
// `retire` is best-effort and never fails the caller.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{Layout, PoolSettings};
use crate::error::{CoreError, IoContext};
use crate::fsutil;
use crate::host::{Accounts, ServiceManager, UnitAction, exec::ensure_success};
use crate::model::Slug;
use crate::php::PhpVersion;
use crate::template::{RenderContext, Template, TemplateRenderer};

/// An active pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolHandle {
    pub slug: Slug,
    pub php: PhpVersion,
    pub unit: String,
    pub socket: PathBuf,
    pub user: String,
}

/// Outcome of a retirement. Failures are collected, not raised.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetireReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl RetireReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, step: &str, err: &CoreError) {
        warn!(step, error = %err, "pool retirement step failed");
        self.failures.push(format!("{step}: {err}"));
    }
}

/// A file this provisioning run changed, and what it held before.
struct Written {
    path: PathBuf,
    previous: Option<Vec<u8>>,
}

/// Undo log of a provisioning run.
#[derive(Default)]
struct Journal {
    files: Vec<Written>,
    dirs: Vec<PathBuf>,
    user_created: bool,
    unit_touched: bool,
}

impl Journal {
    fn write(&mut self, path: &Path, contents: &str) -> Result<(), CoreError> {
        let previous = fsutil::read_optional(path)?;
        fsutil::write_atomic(path, contents.as_bytes())?;
        self.files.push(Written {
            path: path.to_path_buf(),
            previous,
        });
        Ok(())
    }

    fn replaced_existing(&self) -> bool {
        self.files.iter().any(|w| w.previous.is_some())
    }
}

pub struct PoolProvisioner<'a, H> {
    host: &'a H,
    renderer: &'a dyn TemplateRenderer,
    layout: &'a Layout,
    settings: &'a PoolSettings,
    web_user: &'a str,
}

impl<'a, H: ServiceManager + Accounts> PoolProvisioner<'a, H> {
    pub fn new(
        host: &'a H,
        renderer: &'a dyn TemplateRenderer,
        layout: &'a Layout,
        settings: &'a PoolSettings,
        web_user: &'a str,
    ) -> Self {
        Self {
            host,
            renderer,
            layout,
            settings,
            web_user,
        }
    }

    /// Whether a pool config exists for the pair.
    pub fn is_provisioned(&self, slug: &Slug, php: PhpVersion) -> bool {
        self.layout.pool_conf(php, slug).is_file()
    }

    /// Create (or rewrite) the pool for `slug` on `php` and wait until the
    /// instance reports active. On failure, partial state is undone before
    /// the error is returned; no other version's pool is touched.
    pub async fn provision(
        &self,
        slug: &Slug,
        php: PhpVersion,
        webroot: &Path,
    ) -> Result<PoolHandle, CoreError> {
        let mut journal = Journal::default();
        let result = self.try_provision(slug, php, webroot, &mut journal).await;
        match result {
            Ok(handle) => {
                info!(slug = %slug, php = %php, unit = %handle.unit, "pool active");
                Ok(handle)
            }
            Err(err) => {
                warn!(slug = %slug, php = %php, error = %err, "pool setup failed, rolling back");
                self.rollback(slug, php, journal).await;
                Err(match err {
                    err @ CoreError::Provisioning { .. } => err,
                    other => CoreError::Provisioning {
                        slug: slug.to_string(),
                        php: php.to_string(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    async fn try_provision(
        &self,
        slug: &Slug,
        php: PhpVersion,
        webroot: &Path,
        journal: &mut Journal,
    ) -> Result<PoolHandle, CoreError> {
        let user = slug.pool_user();
        journal.user_created = self.host.ensure_pool_user(&user, self.web_user).await?;

        let log_dir = self.layout.php_log_dir(php, slug);
        if !log_dir.is_dir() {
            std::fs::create_dir_all(&log_dir).at(&log_dir)?;
            journal.dirs.push(log_dir.clone());
        }
        self.host.chown(&log_dir, &user, true).await?;

        let socket = self.layout.php_socket(php, slug);
        let pool_conf = self.layout.pool_conf(php, slug);
        let ctx = RenderContext::new()
            .set("slug", slug.as_str())
            .set("php_version", php.dotted())
            .set("php_ver", php.short())
            .set("pool_user", user.as_str())
            .set_path("socket", &socket)
            .set_path("pid_file", &self.layout.php_pid(php, slug))
            .set_path("log_dir", &log_dir)
            .set_path("pool_conf", &pool_conf)
            .set_path("webroot", webroot)
            .set("pm_max_children", self.settings.pm_max_children)
            .set("pm_start_servers", self.settings.pm_start_servers)
            .set("pm_min_spare_servers", self.settings.pm_min_spare_servers)
            .set("pm_max_spare_servers", self.settings.pm_max_spare_servers);

        let unit_template = self.layout.unit_template(php);
        if !unit_template.is_file() {
            let text = self.renderer.render(Template::PhpFpmUnit, &ctx)?;
            journal.write(&unit_template, &text)?;
        }
        let master = self.renderer.render(Template::PhpFpmMaster, &ctx)?;
        journal.write(&self.layout.master_conf(php, slug), &master)?;
        let pool = self.renderer.render(Template::PhpFpmPool, &ctx)?;
        journal.write(&pool_conf, &pool)?;

        let unit = Layout::unit_name(php, slug);
        journal.unit_touched = true;
        self.host.daemon_reload().await?;
        for action in [UnitAction::Enable, UnitAction::Restart] {
            let output = self.host.control(action, &unit).await?;
            ensure_success("systemctl", output)?;
        }
        self.wait_active(&unit).await?;

        Ok(PoolHandle {
            slug: slug.clone(),
            php,
            unit,
            socket,
            user,
        })
    }

    async fn wait_active(&self, unit: &str) -> Result<(), CoreError> {
        let deadline = Instant::now() + self.settings.activation_timeout;
        loop {
            if self.host.is_active(unit).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CoreError::Timeout {
                    program: format!("systemctl is-active {unit}"),
                    timeout_secs: self.settings.activation_timeout.as_secs(),
                });
            }
            debug!(unit, "waiting for pool to become active");
            sleep(self.settings.poll_interval).await;
        }
    }

    /// Undo a failed run. Previous file contents come back; a pool that
    /// was running before is restarted on its old config.
    async fn rollback(&self, slug: &Slug, php: PhpVersion, journal: Journal) {
        let unit = Layout::unit_name(php, slug);
        let was_running = journal.replaced_existing();

        if journal.unit_touched && !was_running {
            for action in [UnitAction::Stop, UnitAction::Disable] {
                if let Err(e) = self.host.control(action, &unit).await {
                    warn!(unit, %action, error = %e, "rollback step failed");
                }
            }
        }

        for written in journal.files.into_iter().rev() {
            let restored = match written.previous {
                Some(bytes) => fsutil::write_atomic(&written.path, &bytes),
                None => fsutil::remove_path(&written.path).map(|_| ()),
            };
            if let Err(e) = restored {
                warn!(path = %written.path.display(), error = %e, "rollback could not restore file");
            }
        }
        for dir in journal.dirs.into_iter().rev() {
            if let Err(e) = fsutil::remove_path(&dir) {
                warn!(path = %dir.display(), error = %e, "rollback could not remove directory");
            }
        }

        if journal.unit_touched {
            if let Err(e) = self.host.daemon_reload().await {
                warn!(error = %e, "daemon-reload during rollback failed");
            }
            if was_running {
                if let Err(e) = self.host.control(UnitAction::Restart, &unit).await {
                    warn!(unit, error = %e, "could not restart previous pool");
                }
            }
        }

        if journal.user_created {
            if let Err(e) = self.host.remove_pool_user(&slug.pool_user()).await {
                warn!(slug = %slug, error = %e, "could not remove pool user");
            }
        }
    }

    /// Stop and remove the pool for `slug` on `php`. The pool user is only
    /// removed with `remove_user`, since a replacement pool on another
    /// version runs as the same user.
    pub async fn retire(&self, slug: &Slug, php: PhpVersion, remove_user: bool) -> RetireReport {
        let mut report = RetireReport::default();
        let unit = Layout::unit_name(php, slug);

        for action in [UnitAction::Stop, UnitAction::Disable] {
            match self.host.control(action, &unit).await {
                Ok(out) if !out.success => {
                    debug!(unit, %action, output = out.message(), "ignored unit failure");
                }
                Ok(_) => {}
                Err(e) => report.fail(action.as_ref(), &e),
            }
        }

        let paths = [
            self.layout.master_conf(php, slug),
            self.layout.pool_conf(php, slug),
            self.layout.php_log_dir(php, slug),
            self.layout.php_socket(php, slug),
            self.layout.php_pid(php, slug),
        ];
        for path in paths {
            match fsutil::remove_path(&path) {
                Ok(true) => report.removed.push(path),
                Ok(false) => {}
                Err(e) => report.fail("remove", &e),
            }
        }

        if let Err(e) = self.host.daemon_reload().await {
            report.fail("daemon-reload", &e);
        }
        if remove_user {
            if let Err(e) = self.host.remove_pool_user(&slug.pool_user()).await {
                report.fail("remove-user", &e);
            }
        }

        if report.is_clean() {
            info!(slug = %slug, php = %php, "pool retired");
        }
        report
    }
}
