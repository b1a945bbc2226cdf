//! Site provisioning engine behind the `wo` CLI.
//!
//! This crate owns the domain model and every host-side effect of managing
//! a site:
//!
//! - **[`SiteManager`]**: facade for create / update / delete / enable /
//!   disable / backup / restore. Each mutating call holds a per-domain
//!   [`OpLock`]; fleet updates also hold the global one.
//!
//! - **Resolution** ([`resolve`]): maps a set of feature flags
//!   (`--wp --php83 --wpredis`) onto a [`SiteType`] and [`CacheType`]
//!   through a combination table generated from the PHP registry.
//!
//! - **[`PoolProvisioner`]**: one isolated PHP-FPM instance per
//!   (site, PHP version) with its own system user, systemd unit, master
//!   config and pool config. Provisioning is transactional; retirement is
//!   best-effort.
//!
//! - **[`SiteStore`]**: the SQLite site registry.
//!
//! - **[`BackupOrchestrator`]**: tar.gz archives of htdocs, configs and a
//!   database dump, with a JSON metadata document.
//!
//! - **Host collaborators** ([`host`]): systemd, account management and the
//!   MySQL client tools behind traits, so tests can substitute a fake.
//!
//! Configuration is built by the CLI and passed in as [`EngineConfig`];
//! this crate never reads config files.

pub mod backup;
pub mod config;
pub mod error;
mod fsutil;
pub mod host;
pub mod lock;
pub mod model;
pub mod php;
pub mod provision;
pub mod resolve;
pub mod site;
pub mod store;
pub mod template;
pub mod token;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backup::{
    BackupEntry, BackupKind, BackupMetadata, BackupOrchestrator, BackupRequest, RestoreReport,
    RestoreTarget,
};
pub use config::{EngineConfig, Layout, MysqlSettings, PoolSettings, Timeouts};
pub use error::CoreError;
pub use host::SystemHost;
pub use lock::{LockScope, OpLock};
pub use model::{
    CacheType, DbCredentials, FlagClass, NewSite, ProxyTarget, SiteFilter, SiteFlags, SiteKind,
    SitePatch, SiteRecord, SiteType, Slug, normalize_domain, slug,
};
pub use php::PhpVersion;
pub use provision::{PoolHandle, PoolProvisioner, RetireReport};
pub use resolve::{Resolution, resolve, resolve_proxy};
pub use site::{
    CreateRequest, DeleteOptions, DeleteReport, FleetReport, PoolStatus, SiteInfo, SiteManager,
    UpdateOutcome,
};
pub use store::SiteStore;
pub use template::{HandlebarsRenderer, RenderContext, Template, TemplateRenderer};
pub use token::TokenGenerator;
