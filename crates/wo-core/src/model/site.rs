// ── Site domain types ──

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use super::slug::Slug;
use crate::error::CoreError;
use crate::php::PhpVersion;

// ── Site type ───────────────────────────────────────────────────────

/// Canonical category of a site, governing which vhost snippets apply.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SiteKind {
    Html,
    Php,
    Mysql,
    Wp,
    Wpsubdir,
    Wpsubdomain,
    Proxy,
}

impl SiteKind {
    /// Served through a PHP-FPM pool.
    pub fn needs_php(self) -> bool {
        !matches!(self, Self::Html | Self::Proxy)
    }

    /// Gets a dedicated database and user.
    pub fn needs_database(self) -> bool {
        matches!(
            self,
            Self::Mysql | Self::Wp | Self::Wpsubdir | Self::Wpsubdomain
        )
    }

    pub fn is_wordpress(self) -> bool {
        matches!(self, Self::Wp | Self::Wpsubdir | Self::Wpsubdomain)
    }

    pub fn is_multisite(self) -> bool {
        matches!(self, Self::Wpsubdir | Self::Wpsubdomain)
    }

    /// Ordering used to reject downgrades on update. `None` for proxies,
    /// which never change type.
    pub fn tier(self) -> Option<u8> {
        match self {
            Self::Html => Some(0),
            Self::Php => Some(1),
            Self::Mysql => Some(2),
            Self::Wp => Some(3),
            Self::Wpsubdir | Self::Wpsubdomain => Some(4),
            Self::Proxy => None,
        }
    }
}

/// A site kind, optionally qualified by the PHP version that selected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteType {
    #[serde(rename = "site_type")]
    pub kind: SiteKind,
    #[serde(rename = "php_version")]
    pub php: Option<PhpVersion>,
}

impl SiteType {
    pub fn new(kind: SiteKind) -> Self {
        Self { kind, php: None }
    }

    pub fn tagged(kind: SiteKind, php: PhpVersion) -> Self {
        Self {
            kind,
            php: Some(php),
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.php {
            Some(php) => write!(f, "{} ({})", self.kind, php.key()),
            None => write!(f, "{}", self.kind),
        }
    }
}

// ── Cache type ──────────────────────────────────────────────────────

/// Page caching mechanism. At most one per site.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheType {
    #[default]
    Basic,
    Wpfc,
    Wpsc,
    Wpredis,
    Wprocket,
    Wpce,
}

impl CacheType {
    /// Cache types selectable by a feature flag (everything except `basic`).
    pub fn flagged() -> impl Iterator<Item = CacheType> {
        <Self as strum::IntoEnumIterator>::iter().filter(|c| *c != Self::Basic)
    }

    pub fn from_flag(flag: &str) -> Option<CacheType> {
        Self::from_str(flag).ok().filter(|c| *c != Self::Basic)
    }
}

// ── Proxy target ────────────────────────────────────────────────────

/// Upstream of a reverse-proxy site (`host[:port]`, port defaults to 80).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
}

impl FromStr for ProxyTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.split_once(':') {
            Some((host, port)) => {
                let port = port.trim().parse().map_err(|_| {
                    CoreError::validation(format!("invalid proxy port in '{s}'"))
                })?;
                (host.trim(), port)
            }
            None => (s, 80),
        };
        if host.is_empty() {
            return Err(CoreError::validation(
                "proxy target requires a host name or address",
            ));
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Site record ─────────────────────────────────────────────────────

/// Database credentials of a site. The password never serializes.
#[derive(Debug, Clone, Serialize)]
pub struct DbCredentials {
    pub name: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: SecretString,
    pub host: String,
}

/// A persisted site, as the registry believes it is deployed.
#[derive(Debug, Clone, Serialize)]
pub struct SiteRecord {
    pub id: i64,
    pub domain: String,
    pub site_type: SiteKind,
    pub cache_type: CacheType,
    pub site_path: PathBuf,
    pub created_on: DateTime<Utc>,
    pub is_enabled: bool,
    pub is_ssl: bool,
    pub database: Option<DbCredentials>,
    pub php_version: Option<PhpVersion>,
    pub storage_fs: String,
    pub storage_db: String,
}

impl SiteRecord {
    pub fn slug(&self) -> Slug {
        Slug::new(&self.domain)
    }

    pub fn htdocs(&self) -> PathBuf {
        self.site_path.join("htdocs")
    }
}

/// Fields of a site about to be registered. `id` and `created_on` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub domain: String,
    pub site_type: SiteKind,
    pub cache_type: CacheType,
    pub site_path: PathBuf,
    pub is_enabled: bool,
    pub is_ssl: bool,
    pub database: Option<DbCredentials>,
    pub php_version: Option<PhpVersion>,
    pub storage_fs: String,
    pub storage_db: String,
}

impl NewSite {
    pub fn new(domain: impl Into<String>, site_type: SiteKind, site_path: PathBuf) -> Self {
        Self {
            domain: domain.into(),
            site_type,
            cache_type: CacheType::Basic,
            site_path,
            is_enabled: true,
            is_ssl: false,
            database: None,
            php_version: None,
            storage_fs: "ext4".into(),
            storage_db: "mysql".into(),
        }
    }
}

/// Partial update of a site record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SitePatch {
    pub site_type: Option<SiteKind>,
    pub cache_type: Option<CacheType>,
    pub site_path: Option<PathBuf>,
    pub is_enabled: Option<bool>,
    pub is_ssl: Option<bool>,
    pub database: Option<Option<DbCredentials>>,
    pub php_version: Option<Option<PhpVersion>>,
}

impl SitePatch {
    pub fn apply(&self, record: &mut SiteRecord) {
        if let Some(kind) = self.site_type {
            record.site_type = kind;
        }
        if let Some(cache) = self.cache_type {
            record.cache_type = cache;
        }
        if let Some(ref path) = self.site_path {
            record.site_path.clone_from(path);
        }
        if let Some(enabled) = self.is_enabled {
            record.is_enabled = enabled;
        }
        if let Some(ssl) = self.is_ssl {
            record.is_ssl = ssl;
        }
        if let Some(ref db) = self.database {
            record.database.clone_from(db);
        }
        if let Some(php) = self.php_version {
            record.php_version = php;
        }
    }
}

/// Criteria for listing sites. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SiteFilter {
    pub enabled: Option<bool>,
    pub ssl: Option<bool>,
    pub site_type: Option<SiteKind>,
    pub php_version: Option<PhpVersion>,
}

impl SiteFilter {
    pub fn matches(&self, record: &SiteRecord) -> bool {
        self.enabled.is_none_or(|e| record.is_enabled == e)
            && self.ssl.is_none_or(|s| record.is_ssl == s)
            && self.site_type.is_none_or(|t| record.site_type == t)
            && self
                .php_version
                .is_none_or(|v| record.php_version == Some(v))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_strings() {
        for kind in <SiteKind as strum::IntoEnumIterator>::iter() {
            let parsed: SiteKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!(SiteKind::Wpsubdomain.as_ref(), "wpsubdomain");
    }

    #[test]
    fn only_wordpress_and_mysql_get_databases() {
        assert!(SiteKind::Mysql.needs_database());
        assert!(SiteKind::Wpsubdir.needs_database());
        assert!(!SiteKind::Php.needs_database());
        assert!(!SiteKind::Proxy.needs_php());
        assert!(!SiteKind::Html.needs_php());
    }

    #[test]
    fn basic_is_not_a_cache_flag() {
        assert_eq!(CacheType::from_flag("wpredis"), Some(CacheType::Wpredis));
        assert_eq!(CacheType::from_flag("basic"), None);
        assert_eq!(CacheType::flagged().count(), 5);
    }

    #[test]
    fn proxy_target_defaults_to_port_80() {
        let t: ProxyTarget = "10.0.0.5".parse().unwrap();
        assert_eq!(t.port, 80);
        let t: ProxyTarget = "backend.local:8080".parse().unwrap();
        assert_eq!(t.to_string(), "backend.local:8080");
        assert!(":8080".parse::<ProxyTarget>().is_err());
        assert!("host:http".parse::<ProxyTarget>().is_err());
    }

    #[test]
    fn tagged_site_type_display() {
        let php = PhpVersion::from_key("php83").unwrap();
        assert_eq!(SiteType::tagged(SiteKind::Wp, php).to_string(), "wp (php83)");
        assert_eq!(SiteType::new(SiteKind::Html).to_string(), "html");
    }
}
