// ── Site manager ──
//
// Facade tying resolution, pool provisioning, vhosts, databases, the
// registry and backups together. Every mutating operation holds the
// domain lock for its duration; fleet operations also hold the global
// lock. Creation and type changes undo their partial host state when a
// step fails.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use crate::backup::{
    BackupEntry, BackupOrchestrator, BackupRequest, RestoreReport, RestoreTarget, list_archives,
    read_metadata,
};
use crate::config::{EngineConfig, Layout};
use crate::error::{CoreError, IoContext};
use crate::fsutil;
use crate::host::{Accounts, DatabaseAdmin, ServiceManager};
use crate::lock::{LockScope, OpLock};
use crate::model::{
    CacheType, DbCredentials, FlagClass, NewSite, ProxyTarget, SiteFilter, SiteFlags, SiteKind,
    SitePatch, SiteRecord, Slug, normalize_domain,
};
use crate::php::PhpVersion;
use crate::provision::{PoolProvisioner, RetireReport};
use crate::resolve::{Resolution, resolve, resolve_proxy};
use crate::store::SiteStore;
use crate::template::{HandlebarsRenderer, RenderContext, Template, TemplateRenderer};
use crate::token::{ALPHANUMERIC, TokenGenerator};

// ── Requests and reports ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub domain: String,
    pub flags: SiteFlags,
    pub proxy: Option<ProxyTarget>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub keep_files: bool,
    pub keep_db: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub record: SiteRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Unchanged { record: SiteRecord },
    Updated {
        record: SiteRecord,
        /// Retirement of the previous PHP version's pool, if it changed.
        retired: Option<RetireReport>,
    },
}

impl UpdateOutcome {
    pub fn record(&self) -> &SiteRecord {
        match self {
            Self::Unchanged { record } | Self::Updated { record, .. } => record,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub unit: String,
    pub socket: PathBuf,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteInfo {
    #[serde(flatten)]
    pub record: SiteRecord,
    pub vhost_enabled: bool,
    pub pool: Option<PoolStatus>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FleetReport {
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<(String, String)>,
    pub failed: Vec<(String, String)>,
}

// ── Undo log for multi-step changes ─────────────────────────────────

#[derive(Default)]
struct Undo {
    webroot: Option<PathBuf>,
    database: Option<DbCredentials>,
    /// Pool created by this operation; retired on failure.
    pool: Option<(Slug, PhpVersion, bool)>,
    /// Vhost path and its content before this operation.
    vhost: Option<(String, Option<Vec<u8>>)>,
}

// ── Manager ─────────────────────────────────────────────────────────

pub struct SiteManager<H> {
    host: H,
    renderer: Box<dyn TemplateRenderer>,
    store: SiteStore,
    config: EngineConfig,
}

impl<H: ServiceManager + Accounts + DatabaseAdmin> SiteManager<H> {
    /// Open the registry and templates named by `config`.
    pub fn open(host: H, config: EngineConfig) -> Result<Self, CoreError> {
        let renderer = HandlebarsRenderer::with_overrides(config.templates_dir.as_deref())?;
        let store = SiteStore::open(&config.site_db_path())?;
        Ok(Self::from_parts(host, Box::new(renderer), store, config))
    }

    pub fn from_parts(
        host: H,
        renderer: Box<dyn TemplateRenderer>,
        store: SiteStore,
        config: EngineConfig,
    ) -> Self {
        Self {
            host,
            renderer,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SiteStore {
        &self.store
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn layout(&self) -> &Layout {
        &self.config.layout
    }

    fn provisioner(&self) -> PoolProvisioner<'_, H> {
        PoolProvisioner::new(
            &self.host,
            self.renderer.as_ref(),
            &self.config.layout,
            &self.config.pool,
            &self.config.web_user,
        )
    }

    fn backups(&self) -> BackupOrchestrator<'_, H> {
        BackupOrchestrator::new(&self.host, &self.config)
    }

    fn lock(&self, scope: LockScope) -> Result<OpLock, CoreError> {
        OpLock::acquire(&self.layout().lock_dir(), scope)
    }

    // ── Create ──

    /// Resolve flags and bring up a new site. On any failure the partial
    /// state is removed and nothing is registered.
    pub async fn create(&self, request: &CreateRequest) -> Result<SiteRecord, CoreError> {
        let domain = normalize_domain(&request.domain)?;
        let resolution = match request.proxy {
            Some(_) => resolve_proxy(&request.flags)?,
            None => resolve(&request.flags)?,
        };
        let _lock = self.lock(LockScope::domain(&domain))?;

        if self.store.exists(&domain)? {
            return Err(CoreError::Duplicate { domain });
        }
        // Pools, units and database names key off the slug
        let slug = Slug::new(&domain);
        if let Some(other) = self
            .store
            .list(&SiteFilter::default())?
            .into_iter()
            .find(|r| r.slug() == slug)
        {
            return Err(CoreError::SlugTaken {
                domain,
                slug: slug.to_string(),
                existing: other.domain,
            });
        }
        let webroot = self.layout().webroot(&domain);
        if webroot.exists() {
            return Err(CoreError::validation(format!(
                "webroot {} already exists",
                webroot.display()
            )));
        }

        let kind = resolution.kind();
        let php = kind
            .needs_php()
            .then(|| resolution.php().unwrap_or(self.config.default_php));

        let mut undo = Undo::default();
        let result = self
            .try_create(&domain, &resolution, php, request.proxy.as_ref(), &webroot, &mut undo)
            .await;
        match result {
            Ok(record) => {
                info!(domain = %domain, site_type = %record.site_type, php = ?record.php_version, "site created");
                Ok(record)
            }
            Err(err) => {
                warn!(domain = %domain, error = %err, "site creation failed, cleaning up");
                self.undo(undo).await;
                Err(err)
            }
        }
    }

    async fn try_create(
        &self,
        domain: &str,
        resolution: &Resolution,
        php: Option<PhpVersion>,
        proxy: Option<&ProxyTarget>,
        webroot: &Path,
        undo: &mut Undo,
    ) -> Result<SiteRecord, CoreError> {
        let kind = resolution.kind();
        undo.webroot = Some(webroot.to_path_buf());
        for sub in ["htdocs", "logs", "conf/nginx"] {
            let dir = webroot.join(sub);
            std::fs::create_dir_all(&dir).at(&dir)?;
        }

        let database = if kind.needs_database() {
            let creds = self.new_credentials(domain)?;
            self.host
                .create_database(&creds, &self.config.mysql.grant_host)
                .await?;
            undo.database = Some(creds.clone());
            Some(creds)
        } else {
            None
        };

        let slug = Slug::new(domain);
        if let Some(php) = php {
            self.provisioner().provision(&slug, php, webroot).await?;
            undo.pool = Some((slug.clone(), php, true));
            self.host
                .chown(&webroot.join("htdocs"), &slug.pool_user(), true)
                .await?;
        }

        let vhost = VhostSpec {
            domain,
            kind,
            cache: resolution.cache_type,
            php,
            proxy,
            webroot,
        };
        self.write_vhost(&vhost, true, undo).await?;

        let mut site = NewSite::new(domain, kind, webroot.to_path_buf());
        site.cache_type = resolution.cache_type;
        site.php_version = php;
        site.database = database;
        self.store.create(&site)
    }

    fn new_credentials(&self, domain: &str) -> Result<DbCredentials, CoreError> {
        let base: String = domain
            .chars()
            .map(|c| if c == '.' || c == '-' { '_' } else { c })
            .collect();
        let suffix = TokenGenerator::new().alphabet("abcdefghijklmnopqrstuvwxyz0123456789");
        let name = format!(
            "{}_{}",
            truncate(&base, 32),
            suffix.clone().length(8).generate()?
        );
        let user = format!("{}{}", truncate(&base, 12), suffix.length(4).generate()?);
        let password = TokenGenerator::new().alphabet(ALPHANUMERIC).generate()?;
        Ok(DbCredentials {
            name,
            user,
            password: SecretString::from(password),
            host: self.config.mysql.host.clone(),
        })
    }

    // ── Update ──

    /// Apply new flags to an existing site. PHP version changes bring the
    /// new pool up and point the vhost at it before the old pool is
    /// retired.
    pub async fn update(&self, domain: &str, flags: &SiteFlags) -> Result<UpdateOutcome, CoreError> {
        let domain = normalize_domain(domain)?;
        let _lock = self.lock(LockScope::domain(&domain))?;
        self.update_locked(&domain, flags).await
    }

    async fn update_locked(
        &self,
        domain: &str,
        flags: &SiteFlags,
    ) -> Result<UpdateOutcome, CoreError> {
        let record = self.store.get(domain)?;
        let target = self.plan_update(&record, flags)?;

        if target.kind == record.site_type
            && target.cache == record.cache_type
            && target.php == record.php_version
        {
            return Ok(UpdateOutcome::Unchanged { record });
        }

        let mut undo = Undo::default();
        let result = self.try_update(&record, &target, &mut undo).await;
        match result {
            Ok((record, retired)) => {
                info!(domain, site_type = %record.site_type, php = ?record.php_version, "site updated");
                Ok(UpdateOutcome::Updated { record, retired })
            }
            Err(err) => {
                warn!(domain, error = %err, "site update failed, restoring previous state");
                self.undo(undo).await;
                Err(err)
            }
        }
    }

    fn plan_update(&self, record: &SiteRecord, flags: &SiteFlags) -> Result<Target, CoreError> {
        if record.site_type == SiteKind::Proxy {
            return Err(CoreError::validation("proxy sites cannot be updated"));
        }
        let resolution = resolve(flags)?;
        let classes: Vec<FlagClass> = flags.iter().filter_map(FlagClass::of).collect();
        let names_type = classes.iter().any(|c| matches!(c, FlagClass::Type(_)));
        let names_cache = classes.iter().any(|c| matches!(c, FlagClass::Cache(_)));
        let names_version = classes.iter().any(|c| matches!(c, FlagClass::Version(_)));

        // A version on a site without PHP is a request to add PHP
        let kind = if names_type
            || (names_cache && !record.site_type.is_wordpress())
            || (names_version && !record.site_type.needs_php())
        {
            resolution.kind()
        } else {
            record.site_type
        };
        let cache = if names_cache {
            resolution.cache_type
        } else if names_type && !kind.is_wordpress() {
            CacheType::Basic
        } else {
            record.cache_type
        };
        let php = if kind.needs_php() {
            resolution
                .php()
                .or(record.php_version)
                .or(Some(self.config.default_php))
        } else {
            None
        };

        check_transition(record.site_type, kind)?;
        Ok(Target { kind, cache, php })
    }

    async fn try_update(
        &self,
        record: &SiteRecord,
        target: &Target,
        undo: &mut Undo,
    ) -> Result<(SiteRecord, Option<RetireReport>), CoreError> {
        let slug = record.slug();
        let mut patch = SitePatch {
            site_type: Some(target.kind),
            cache_type: Some(target.cache),
            php_version: Some(target.php),
            ..SitePatch::default()
        };

        if target.kind.needs_database() && record.database.is_none() {
            let creds = self.new_credentials(&record.domain)?;
            self.host
                .create_database(&creds, &self.config.mysql.grant_host)
                .await?;
            undo.database = Some(creds.clone());
            patch.database = Some(Some(creds));
        }

        let switching = target.php != record.php_version;
        if let (true, Some(php)) = (switching, target.php) {
            self.provisioner()
                .provision(&slug, php, &record.site_path)
                .await?;
            // The pool user already exists when the site had a pool.
            undo.pool = Some((slug.clone(), php, record.php_version.is_none()));
        }

        let vhost = VhostSpec {
            domain: &record.domain,
            kind: target.kind,
            cache: target.cache,
            php: target.php,
            proxy: None,
            webroot: &record.site_path,
        };
        self.write_vhost(&vhost, record.is_enabled, undo).await?;

        let updated = self.store.update(&record.domain, &patch)?;

        let retired = match (switching, record.php_version) {
            (true, Some(old)) => Some(self.provisioner().retire(&slug, old, false).await),
            _ => None,
        };
        Ok((updated, retired))
    }

    /// Migrate every PHP site to the version named in `flags`. Sites whose
    /// lock is held elsewhere are skipped.
    pub async fn update_all(&self, flags: &SiteFlags) -> Result<FleetReport, CoreError> {
        let classes: Vec<FlagClass> = flags.iter().filter_map(FlagClass::of).collect();
        let [FlagClass::Version(php)] = classes.as_slice() else {
            return Err(CoreError::validation(
                "fleet updates take exactly one PHP version flag",
            ));
        };
        let _global = self.lock(LockScope::Global)?;

        let mut report = FleetReport::default();
        for site in self.store.list(&SiteFilter::default())? {
            if !site.site_type.needs_php() {
                continue;
            }
            if site.php_version == Some(*php) {
                report.unchanged.push(site.domain);
                continue;
            }
            let lock = match self.lock(LockScope::domain(&site.domain)) {
                Ok(lock) => lock,
                Err(CoreError::LockBusy { .. }) => {
                    report
                        .skipped
                        .push((site.domain, "locked by another operation".into()));
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.update_locked(&site.domain, flags).await {
                Ok(UpdateOutcome::Updated { .. }) => report.updated.push(site.domain),
                Ok(UpdateOutcome::Unchanged { .. }) => report.unchanged.push(site.domain),
                Err(e) => report.failed.push((site.domain, e.to_string())),
            }
            drop(lock);
        }
        info!(
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            php = %php,
            "fleet update finished"
        );
        Ok(report)
    }

    // ── Delete ──

    pub async fn delete(&self, domain: &str, options: DeleteOptions) -> Result<DeleteReport, CoreError> {
        let domain = normalize_domain(domain)?;
        let _lock = self.lock(LockScope::domain(&domain))?;
        let record = self.store.get(&domain)?;
        let mut warnings = Vec::new();

        let available = self.layout().nginx_available(&domain);
        let enabled = self.layout().nginx_enabled(&domain);
        for path in [&enabled, &available] {
            if let Err(e) = fsutil::remove_path(path) {
                warnings.push(e.to_string());
            }
        }
        if let Err(e) = self.host.reload_nginx().await {
            warnings.push(format!("nginx reload: {e}"));
        }

        if let Some(php) = record.php_version {
            let report = self.provisioner().retire(&record.slug(), php, true).await;
            warnings.extend(report.failures);
        }

        if let (false, Some(creds)) = (options.keep_db, &record.database) {
            if let Err(e) = self
                .host
                .drop_database(creds, &self.config.mysql.grant_host)
                .await
            {
                warnings.push(format!("database: {e}"));
            }
        }

        if !options.keep_files {
            if let Err(e) = fsutil::remove_path(&record.site_path) {
                warnings.push(e.to_string());
            }
        }

        let record = self.store.delete(&domain)?;
        for warning in &warnings {
            warn!(domain, warning, "site deletion incomplete");
        }
        info!(domain, "site deleted");
        Ok(DeleteReport { record, warnings })
    }

    // ── Enable / disable ──

    pub async fn enable(&self, domain: &str) -> Result<SiteRecord, CoreError> {
        self.set_enabled(domain, true).await
    }

    pub async fn disable(&self, domain: &str) -> Result<SiteRecord, CoreError> {
        self.set_enabled(domain, false).await
    }

    async fn set_enabled(&self, domain: &str, enabled: bool) -> Result<SiteRecord, CoreError> {
        let domain = normalize_domain(domain)?;
        let _lock = self.lock(LockScope::domain(&domain))?;
        let record = self.store.get(&domain)?;

        let available = self.layout().nginx_available(&domain);
        let link = self.layout().nginx_enabled(&domain);
        if enabled {
            if !available.is_file() {
                return Err(CoreError::validation(format!(
                    "no vhost at {}",
                    available.display()
                )));
            }
            fsutil::symlink(&available, &link)?;
        } else {
            fsutil::remove_path(&link)?;
        }
        self.host.reload_nginx().await?;

        let patch = SitePatch {
            is_enabled: Some(enabled),
            ..SitePatch::default()
        };
        let record = self.store.update(&record.domain, &patch)?;
        info!(domain, enabled, "site toggled");
        Ok(record)
    }

    // ── Queries ──

    pub async fn info(&self, domain: &str) -> Result<SiteInfo, CoreError> {
        let domain = normalize_domain(domain)?;
        let record = self.store.get(&domain)?;
        let vhost_enabled = self.layout().nginx_enabled(&domain).exists();
        let pool = match record.php_version {
            Some(php) => {
                let slug = record.slug();
                let unit = Layout::unit_name(php, &slug);
                let active = self.host.is_active(&unit).await.unwrap_or(false);
                Some(PoolStatus {
                    socket: self.layout().php_socket(php, &slug),
                    unit,
                    active,
                })
            }
            None => None,
        };
        Ok(SiteInfo {
            record,
            vhost_enabled,
            pool,
        })
    }

    pub fn list(&self, filter: &SiteFilter) -> Result<Vec<SiteRecord>, CoreError> {
        self.store.list(filter)
    }

    // ── Backups ──

    pub async fn backup(&self, domain: &str, request: &BackupRequest) -> Result<PathBuf, CoreError> {
        let domain = normalize_domain(domain)?;
        let _lock = self.lock(LockScope::domain(&domain))?;
        let record = self.store.get(&domain)?;
        self.backups().create(&record, request).await
    }

    /// Archives for `domain`, newest first. Works for deleted sites when a
    /// backup root is configured.
    pub fn backups_of(&self, domain: &str) -> Result<Vec<BackupEntry>, CoreError> {
        let domain = normalize_domain(domain)?;
        match self.store.find(&domain)? {
            Some(record) => self.backups().list(&record),
            None if self.config.backup_root.is_some() => {
                let dir = self.config.backup_dir(&domain, Path::new("/"));
                list_archives(&dir)
            }
            None => Err(CoreError::NotFound { domain }),
        }
    }

    /// Restore an archive into a registered site, by default the one it
    /// was taken from.
    pub async fn restore(
        &self,
        archive: &Path,
        domain: Option<&str>,
    ) -> Result<RestoreReport, CoreError> {
        let metadata = read_metadata(archive)?;
        let domain = normalize_domain(domain.unwrap_or(&metadata.sitename))?;
        let _lock = self.lock(LockScope::domain(&domain))?;
        let record = self.store.get(&domain)?;

        let target = RestoreTarget {
            site_path: record.site_path.clone(),
            database: record.database.as_ref().map(|d| d.name.clone()),
        };
        let report = self.backups().restore(archive, &target).await?;
        if report.htdocs && record.php_version.is_some() {
            self.host
                .chown(&record.htdocs(), &record.slug().pool_user(), true)
                .await?;
        }
        Ok(report)
    }

    // ── Vhost plumbing ──

    async fn write_vhost(
        &self,
        spec: &VhostSpec<'_>,
        enable: bool,
        undo: &mut Undo,
    ) -> Result<(), CoreError> {
        let available = self.layout().nginx_available(spec.domain);
        let previous = fsutil::read_optional(&available)?;
        let text = self.renderer.render(Template::NginxVhost, &spec.context(self.layout()))?;
        undo.vhost = Some((spec.domain.to_owned(), previous));
        fsutil::write_atomic(&available, text.as_bytes())?;
        if enable {
            fsutil::symlink(&available, &self.layout().nginx_enabled(spec.domain))?;
        }
        self.host.reload_nginx().await
    }

    /// Best-effort reversal of a failed create or update.
    async fn undo(&self, undo: Undo) {
        if let Some((domain, previous)) = undo.vhost {
            let available = self.layout().nginx_available(&domain);
            let restored = match previous {
                Some(bytes) => fsutil::write_atomic(&available, &bytes),
                None => fsutil::remove_path(&self.layout().nginx_enabled(&domain))
                    .and_then(|_| fsutil::remove_path(&available))
                    .map(|_| ()),
            };
            if let Err(e) = restored {
                warn!(domain, error = %e, "could not restore vhost");
            }
            if let Err(e) = self.host.reload_nginx().await {
                warn!(error = %e, "nginx reload during cleanup failed");
            }
        }
        if let Some((slug, php, remove_user)) = undo.pool {
            let report = self.provisioner().retire(&slug, php, remove_user).await;
            if !report.is_clean() {
                warn!(slug = %slug, failures = ?report.failures, "pool cleanup incomplete");
            }
        }
        if let Some(creds) = undo.database {
            if let Err(e) = self
                .host
                .drop_database(&creds, &self.config.mysql.grant_host)
                .await
            {
                warn!(database = %creds.name, error = %e, "could not drop database");
            }
        }
        if let Some(webroot) = undo.webroot {
            if let Err(e) = fsutil::remove_path(&webroot) {
                warn!(path = %webroot.display(), error = %e, "could not remove webroot");
            }
        }
    }
}

/// Desired state computed for an update.
struct Target {
    kind: SiteKind,
    cache: CacheType,
    php: Option<PhpVersion>,
}

/// Reject downgrades and sideways moves between multisite modes.
fn check_transition(from: SiteKind, to: SiteKind) -> Result<(), CoreError> {
    if from == to {
        return Ok(());
    }
    let allowed = match (from.tier(), to.tier()) {
        (Some(a), Some(b)) => b > a,
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Conflict {
            reason: format!("cannot change site type from {from} to {to}"),
            flags: vec![to.to_string()],
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Everything the vhost template needs.
struct VhostSpec<'a> {
    domain: &'a str,
    kind: SiteKind,
    cache: CacheType,
    php: Option<PhpVersion>,
    proxy: Option<&'a ProxyTarget>,
    webroot: &'a Path,
}

impl VhostSpec<'_> {
    fn context(&self, layout: &Layout) -> RenderContext {
        let slug = Slug::new(self.domain);
        let mut ctx = RenderContext::new()
            .set("domain", self.domain)
            .set("site_type", self.kind.as_ref())
            .set("cache_type", self.cache.as_ref())
            .set_path("webroot", self.webroot)
            .set("wordpress", self.kind.is_wordpress())
            .set("multisite", self.kind.is_multisite())
            .set("multisite_subdomain", self.kind == SiteKind::Wpsubdomain)
            .set("proxy", self.proxy.map(ToString::to_string).unwrap_or_default());
        match self.php {
            Some(php) => {
                ctx = ctx.set_path("php_socket", &layout.php_socket(php, &slug));
                if self.kind.is_wordpress() {
                    let cache: &'static str = match self.cache {
                        CacheType::Basic => "wpcommon",
                        other => other.into(),
                    };
                    ctx = ctx.set("cache_include", format!("{cache}-php{}", php.short()));
                } else {
                    ctx = ctx.set("cache_include", "");
                }
            }
            None => ctx = ctx.set("php_socket", "").set("cache_include", ""),
        }
        ctx
    }
}
