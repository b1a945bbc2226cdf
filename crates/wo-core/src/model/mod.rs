// ── Domain model ──

pub mod flags;
pub mod site;
pub mod slug;

pub use flags::{FlagClass, SiteFlags};
pub use site::{
    CacheType, DbCredentials, NewSite, ProxyTarget, SiteFilter, SiteKind, SitePatch, SiteRecord,
    SiteType,
};
pub use slug::{Slug, normalize_domain, slug};
