//! Configuration for the `wo` CLI.
//!
//! Layered TOML files plus `WO_` environment variables, merged with
//! figment and translated to `wo_core::EngineConfig`. The engine itself
//! never reads configuration; the CLI builds it here and hands it over.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use wo_core::{EngineConfig, Layout, MysqlSettings, PhpVersion, PoolSettings, Timeouts};

/// System-wide configuration file.
pub const SYSTEM_CONFIG: &str = "/etc/wo/wo.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "WO_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: Paths,
    pub php: Php,
    pub pool: Pool,
    pub timeouts: TimeoutSecs,
    pub web: Web,
    pub mysql: Mysql,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Paths {
    /// Prefix for every host path. `/` in production.
    pub root: PathBuf,

    /// Directory of template overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,

    /// Backup root. Unset keeps archives under each site's webroot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_root: Option<PathBuf>,

    /// Site registry file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            templates: None,
            backup_root: None,
            database: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Php {
    /// Dotted version used when a site needs PHP but names none.
    #[serde(deserialize_with = "version_string")]
    pub default_version: String,
}

/// `WO_PHP__DEFAULT_VERSION=8.3` reaches serde as a float, not a string.
fn version_string<'de, D: serde::Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(u64),
        Float(f64),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => format!("{f:.1}"),
    })
}

impl Default for Php {
    fn default() -> Self {
        Self {
            default_version: PhpVersion::latest().dotted().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Pool {
    pub activation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub pm_max_children: u32,
    pub pm_start_servers: u32,
    pub pm_min_spare_servers: u32,
    pub pm_max_spare_servers: u32,
}

impl Default for Pool {
    fn default() -> Self {
        let settings = PoolSettings::default();
        Self {
            activation_timeout_secs: settings.activation_timeout.as_secs(),
            poll_interval_ms: u64::try_from(settings.poll_interval.as_millis()).unwrap_or(250),
            pm_max_children: settings.pm_max_children,
            pm_start_servers: settings.pm_start_servers,
            pm_min_spare_servers: settings.pm_min_spare_servers,
            pm_max_spare_servers: settings.pm_max_spare_servers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutSecs {
    pub command_secs: u64,
    pub dump_secs: u64,
}

impl Default for TimeoutSecs {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            command_secs: timeouts.command.as_secs(),
            dump_secs: timeouts.dump.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Web {
    /// Web server user, added to every pool group.
    pub user: String,
}

impl Default for Web {
    fn default() -> Self {
        Self {
            user: "www-data".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Mysql {
    pub host: String,
    pub grant_host: String,
}

impl Default for Mysql {
    fn default() -> Self {
        let settings = MysqlSettings::default();
        Self {
            host: settings.host,
            grant_host: settings.grant_host,
        }
    }
}

// ── Config file paths ───────────────────────────────────────────────

/// Per-user config file via XDG / platform conventions.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "wo").map(|dirs| dirs.config_dir().join("wo.toml"))
}

/// The file `wo config init` writes and `wo config path` reports:
/// `$WO_CONFIG`, else the system file when running as root or when it
/// already exists, else the per-user file.
pub fn config_path() -> PathBuf {
    if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(explicit);
    }
    let system = PathBuf::from(SYSTEM_CONFIG);
    if system.exists() || is_root() {
        return system;
    }
    user_config_path().unwrap_or(system)
}

fn is_root() -> bool {
    std::env::var("USER").is_ok_and(|u| u == "root")
}

// ── Config loading ──────────────────────────────────────────────────

fn figment(explicit: Option<&Path>) -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(SYSTEM_CONFIG));
    if let Some(user) = user_config_path() {
        figment = figment.merge(Toml::file(user));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        figment = figment.merge(Toml::file(PathBuf::from(path)));
    }
    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("WO_").ignore(&["config"]).split("__"))
}

/// Load the merged config: defaults, system file, user file,
/// `$WO_CONFIG`, `explicit`, then `WO_` environment variables.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(invalid(
                "config",
                format!("{} does not exist", path.display()),
            ));
        }
    }
    let config: Config = figment(explicit).extract()?;
    config.validate()?;
    Ok(config)
}

/// Parse a single TOML document over the defaults, without touching the
/// filesystem or environment.
pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::string(text))
        .extract()?;
    config.validate()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, cfg.to_toml()?)?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn default_php(&self) -> Result<PhpVersion, ConfigError> {
        self.php.default_version.parse().map_err(|_| {
            invalid(
                "php.default_version",
                format!("unknown PHP version '{}'", self.php.default_version),
            )
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.paths.root.is_absolute() {
            return Err(invalid("paths.root", "must be an absolute path"));
        }
        self.default_php()?;
        if self.pool.activation_timeout_secs == 0 {
            return Err(invalid("pool.activation_timeout_secs", "must be positive"));
        }
        if self.pool.poll_interval_ms == 0 {
            return Err(invalid("pool.poll_interval_ms", "must be positive"));
        }
        if self.pool.pm_max_children == 0 {
            return Err(invalid("pool.pm_max_children", "must be positive"));
        }
        if self.timeouts.command_secs == 0 || self.timeouts.dump_secs == 0 {
            return Err(invalid("timeouts", "must be positive"));
        }
        if self.web.user.trim().is_empty() {
            return Err(invalid("web.user", "must not be empty"));
        }
        Ok(())
    }

    /// Build the engine config, with an optional root override from the
    /// command line.
    pub fn to_engine_config(&self, root: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        self.validate()?;
        let root = root.unwrap_or(&self.paths.root);
        Ok(EngineConfig {
            layout: Layout::new(root),
            templates_dir: self.paths.templates.clone(),
            backup_root: self.paths.backup_root.clone(),
            site_db: self.paths.database.clone(),
            default_php: self.default_php()?,
            pool: PoolSettings {
                activation_timeout: Duration::from_secs(self.pool.activation_timeout_secs),
                poll_interval: Duration::from_millis(self.pool.poll_interval_ms),
                pm_max_children: self.pool.pm_max_children,
                pm_start_servers: self.pool.pm_start_servers,
                pm_min_spare_servers: self.pool.pm_min_spare_servers,
                pm_max_spare_servers: self.pool.pm_max_spare_servers,
            },
            timeouts: Timeouts {
                command: Duration::from_secs(self.timeouts.command_secs),
                dump: Duration::from_secs(self.timeouts.dump_secs),
            },
            web_user: self.web.user.clone(),
            mysql: MysqlSettings {
                host: self.mysql.host.clone(),
                grant_host: self.mysql.grant_host.clone(),
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_engine_defaults() {
        let engine = Config::default().to_engine_config(None).unwrap();
        let expected = EngineConfig::default();
        assert_eq!(engine.layout, expected.layout);
        assert_eq!(engine.pool, expected.pool);
        assert_eq!(engine.timeouts, expected.timeouts);
        assert_eq!(engine.default_php, PhpVersion::latest());
        assert_eq!(engine.web_user, "www-data");
    }

    #[test]
    fn toml_overrides_sections() {
        let cfg = from_toml_str(
            r#"
            [paths]
            root = "/srv/sandbox"
            backup_root = "/var/backups/wo"

            [php]
            default_version = "8.2"

            [pool]
            pm_max_children = 25

            [web]
            user = "nginx"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pool.pm_max_children, 25);
        assert_eq!(cfg.pool.pm_start_servers, 2);

        let engine = cfg.to_engine_config(None).unwrap();
        assert_eq!(engine.layout.root(), Path::new("/srv/sandbox"));
        assert_eq!(engine.default_php.dotted(), "8.2");
        assert_eq!(engine.web_user, "nginx");
        assert_eq!(
            engine.backup_dir("a.com", Path::new("/unused")),
            PathBuf::from("/srv/sandbox/var/backups/wo/a.com")
        );
    }

    #[test]
    fn root_override_wins() {
        let engine = Config::default()
            .to_engine_config(Some(Path::new("/tmp/wo-root")))
            .unwrap();
        assert_eq!(engine.layout.root(), Path::new("/tmp/wo-root"));
    }

    #[test]
    fn rejects_unknown_php_version() {
        let err = from_toml_str("[php]\ndefault_version = \"5.6\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "php.default_version"));
    }

    #[test]
    fn numeric_version_is_accepted() {
        let cfg = from_toml_str("[php]\ndefault_version = 8.0").unwrap();
        assert_eq!(cfg.default_php().unwrap().key(), "php80");
    }

    #[test]
    fn rejects_relative_root() {
        assert!(from_toml_str("[paths]\nroot = \"srv\"").is_err());
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/wo.toml");
        let mut cfg = Config::default();
        cfg.mysql.grant_host = "%".into();
        cfg.paths.templates = Some(PathBuf::from("/etc/wo/templates"));
        save_config(&cfg, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/wo.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "config"));
    }
}
