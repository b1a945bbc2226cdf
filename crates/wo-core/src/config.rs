// ── Runtime engine configuration ──
//
// These types describe where host resources live and how long external
// steps may take. The CLI constructs an `EngineConfig` and hands it in;
// core never reads config files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Slug;
use crate::php::PhpVersion;

/// Host filesystem layout. Every path is anchored at `root`, which is `/`
/// in production and a scratch directory under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn at(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.root.join(rel)
    }

    // ── PHP-FPM pool resources ──

    /// `/run/php/php84-fpm-<slug>.sock`
    pub fn php_socket(&self, php: PhpVersion, slug: &Slug) -> PathBuf {
        self.at(format!("run/php/php{}-fpm-{slug}.sock", php.short()))
    }

    /// `/run/php/php8.4-fpm-<slug>.pid`
    pub fn php_pid(&self, php: PhpVersion, slug: &Slug) -> PathBuf {
        self.at(format!("run/php/php{}-fpm-{slug}.pid", php.dotted()))
    }

    /// `/etc/php/8.4/fpm`
    pub fn fpm_dir(&self, php: PhpVersion) -> PathBuf {
        self.at(format!("etc/php/{}/fpm", php.dotted()))
    }

    /// `/etc/php/8.4/fpm/pool.d/<slug>.conf`
    pub fn pool_conf(&self, php: PhpVersion, slug: &Slug) -> PathBuf {
        self.fpm_dir(php).join("pool.d").join(format!("{slug}.conf"))
    }

    /// `/etc/php/8.4/fpm/php-fpm-<slug>.conf`
    pub fn master_conf(&self, php: PhpVersion, slug: &Slug) -> PathBuf {
        self.fpm_dir(php).join(format!("php-fpm-{slug}.conf"))
    }

    /// `/var/log/php/8.4/<slug>`
    pub fn php_log_dir(&self, php: PhpVersion, slug: &Slug) -> PathBuf {
        self.at(format!("var/log/php/{}/{slug}", php.dotted()))
    }

    /// `/etc/systemd/system/php8.4-fpm@.service`, shared by every site on
    /// that version.
    pub fn unit_template(&self, php: PhpVersion) -> PathBuf {
        self.at(format!("etc/systemd/system/php{}-fpm@.service", php.dotted()))
    }

    /// `php8.4-fpm@<slug>.service`
    pub fn unit_name(php: PhpVersion, slug: &Slug) -> String {
        format!("php{}-fpm@{slug}.service", php.dotted())
    }

    // ── Nginx ──

    pub fn nginx_available(&self, domain: &str) -> PathBuf {
        self.at("etc/nginx/sites-available").join(domain)
    }

    pub fn nginx_enabled(&self, domain: &str) -> PathBuf {
        self.at("etc/nginx/sites-enabled").join(domain)
    }

    // ── Sites and state ──

    /// `/var/www/<domain>`, containing `htdocs/`, `logs/` and `conf/nginx/`.
    pub fn webroot(&self, domain: &str) -> PathBuf {
        self.at("var/www").join(domain)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.at("var/lib/wo")
    }

    pub fn default_site_db(&self) -> PathBuf {
        self.state_dir().join("dbase.db")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.state_dir().join("locks")
    }

    /// Resolve an absolute configured path beneath the root.
    pub fn rebase(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("/") {
            Ok(rel) => self.at(rel),
            Err(_) => path.to_path_buf(),
        }
    }
}

impl Default for Layout {
    fn default() -> Self {
        Self::new("/")
    }
}

/// PHP-FPM pool tuning and activation checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// How long a freshly started instance has to report active.
    pub activation_timeout: Duration,
    pub poll_interval: Duration,
    pub pm_max_children: u32,
    pub pm_start_servers: u32,
    pub pm_min_spare_servers: u32,
    pub pm_max_spare_servers: u32,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            pm_max_children: 10,
            pm_start_servers: 2,
            pm_min_spare_servers: 1,
            pm_max_spare_servers: 3,
        }
    }
}

/// Upper bounds for external commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub command: Duration,
    /// Database dumps and loads, which scale with site size.
    pub dump: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command: Duration::from_secs(60),
            dump: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlSettings {
    /// Host recorded in site credentials.
    pub host: String,
    /// Host part of granted database users.
    pub grant_host: String,
}

impl Default for MysqlSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            grant_host: "localhost".into(),
        }
    }
}

/// Everything the engine needs to run.
///
/// Built by the CLI, passed to `SiteManager`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub layout: Layout,
    /// Directory whose files shadow built-in templates by name.
    pub templates_dir: Option<PathBuf>,
    /// Backup archive root. `None` keeps backups under each site's webroot.
    pub backup_root: Option<PathBuf>,
    /// Site registry file. `None` uses the layout default.
    pub site_db: Option<PathBuf>,
    pub default_php: PhpVersion,
    pub pool: PoolSettings,
    pub timeouts: Timeouts,
    /// Web server user, added to every pool group.
    pub web_user: String,
    pub mysql: MysqlSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: Layout::default(),
            templates_dir: None,
            backup_root: None,
            site_db: None,
            default_php: PhpVersion::latest(),
            pool: PoolSettings::default(),
            timeouts: Timeouts::default(),
            web_user: "www-data".into(),
            mysql: MysqlSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn site_db_path(&self) -> PathBuf {
        self.site_db
            .as_deref()
            .map_or_else(|| self.layout.default_site_db(), |p| self.layout.rebase(p))
    }

    /// Backup directory for one site: `<backup_root>/<domain>`.
    pub fn backup_dir(&self, domain: &str, site_path: &Path) -> PathBuf {
        let root = self.backup_root.as_deref().map_or_else(
            || site_path.join("backup"),
            |p| self.layout.rebase(p),
        );
        root.join(domain)
    }
}
