// Integration tests for `SiteManager` against a temporary root and a
// recording fake host.

mod common;

use std::path::Path;

use common::{FakeHost, manager, php, unit};
use pretty_assertions::assert_eq;
use wo_core::{
    CacheType, CoreError, CreateRequest, DeleteOptions, LockScope, OpLock, SiteFilter, SiteFlags,
    SiteKind, SiteManager, SiteRecord, Slug, UpdateOutcome,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn flags(names: &[&str]) -> SiteFlags {
    SiteFlags::parse(names.iter().copied()).unwrap()
}

fn request(domain: &str, names: &[&str]) -> CreateRequest {
    CreateRequest {
        domain: domain.to_owned(),
        flags: flags(names),
        proxy: None,
    }
}

async fn create(sites: &SiteManager<FakeHost>, domain: &str, names: &[&str]) -> SiteRecord {
    sites.create(&request(domain, names)).await.unwrap()
}

fn vhost(sites: &SiteManager<FakeHost>, domain: &str) -> String {
    std::fs::read_to_string(sites.config().layout.nginx_available(domain)).unwrap()
}

fn socket(sites: &SiteManager<FakeHost>, key: &str, domain: &str) -> String {
    sites
        .config()
        .layout
        .php_socket(php(key), &Slug::new(domain))
        .display()
        .to_string()
}

// ── Create ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_create_wordpress_site() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let record = create(&sites, "https://Example.COM/", &["wp", "wpredis"]).await;

    assert_eq!(record.domain, "example.com");
    assert_eq!(record.site_type, SiteKind::Wp);
    assert_eq!(record.cache_type, CacheType::Wpredis);
    assert_eq!(record.php_version, Some(php("php84")));
    assert!(record.is_enabled);
    assert!(record.htdocs().is_dir());
    assert!(record.site_path.join("logs").is_dir());
    assert!(record.site_path.join("conf/nginx").is_dir());

    let creds = record.database.as_ref().unwrap();
    assert!(creds.name.starts_with("example_com_"));
    assert_eq!(creds.name.len(), "example_com_".len() + 8);
    assert!(creds.user.starts_with("example_com"));

    let text = vhost(&sites, "example.com");
    assert!(text.contains(&format!("fastcgi_pass unix:{};", socket(&sites, "php84", "example.com"))));
    assert!(text.contains("include common/wpredis-php84.conf;"));
    assert!(sites.config().layout.nginx_enabled("example.com").exists());

    let state = sites.host().state();
    assert!(state.active.contains(&unit("php84", "example-com")));
    assert!(state.databases.contains_key(&creds.name));
    assert!(state.users.contains("php-example-com"));
}

#[tokio::test]
async fn test_create_resolves_version_and_cache() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let record = create(&sites, "shop.example.com", &["php84", "mysql", "html", "wpredis"]).await;
    assert_eq!(record.site_type, SiteKind::Mysql);
    assert_eq!(record.php_version, Some(php("php84")));
    assert_eq!(record.cache_type, CacheType::Wpredis);

    let record = create(&sites, "multi.example.com", &["wpsubdir", "php83", "wprocket"]).await;
    assert_eq!(record.site_type, SiteKind::Wpsubdir);
    assert_eq!(record.php_version, Some(php("php83")));
    assert!(vhost(&sites, "multi.example.com").contains("include common/wpsubdir.conf;"));
}

#[tokio::test]
async fn test_create_html_site_has_no_pool() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let record = create(&sites, "static.org", &[]).await;
    assert_eq!(record.site_type, SiteKind::Html);
    assert_eq!(record.php_version, None);
    assert!(record.database.is_none());
    assert!(!vhost(&sites, "static.org").contains("fastcgi_pass"));
    assert!(sites.host().state().users.is_empty());
}

#[tokio::test]
async fn test_create_proxy_site() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let record = sites
        .create(&CreateRequest {
            domain: "app.example.com".into(),
            flags: SiteFlags::new(),
            proxy: Some("127.0.0.1:8080".parse().unwrap()),
        })
        .await
        .unwrap();
    assert_eq!(record.site_type, SiteKind::Proxy);
    assert_eq!(record.php_version, None);
    assert!(vhost(&sites, "app.example.com").contains("proxy_pass http://127.0.0.1:8080;"));

    let err = sites
        .create(&CreateRequest {
            domain: "api.example.com".into(),
            flags: flags(&["wp"]),
            proxy: Some("127.0.0.1".parse().unwrap()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));
}

#[tokio::test]
async fn test_create_rejects_duplicates_case_insensitively() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    create(&sites, "example.com", &["php"]).await;
    let err = sites
        .create(&request("EXAMPLE.com", &["php"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Duplicate { ref domain } if domain == "example.com"));
}

#[tokio::test]
async fn test_create_rejects_domains_sharing_a_slug() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    let first = create(&sites, "a-b.com", &["php"]).await;
    let events_before = sites.host().events().len();

    let err = sites.create(&request("a.b.com", &["php"])).await.unwrap_err();
    assert!(
        matches!(err, CoreError::SlugTaken { ref existing, .. } if existing == "a-b.com"),
        "got {err:?}"
    );
    assert!(!sites.store().exists("a.b.com").unwrap());
    assert!(!sites.config().layout.webroot("a.b.com").exists());
    assert_eq!(sites.host().events().len(), events_before);

    assert!(sites.host().state().active.contains(&unit("php84", "a-b-com")));
    let kept = sites.store().get("a-b.com").unwrap();
    assert_eq!(kept.php_version, first.php_version);
    assert_eq!(kept.site_path, first.site_path);
}

#[tokio::test]
async fn test_create_rejects_conflicting_flags_before_touching_host() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let err = sites
        .create(&request("example.com", &["wpfc", "wpredis"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));
    assert!(sites.host().events().is_empty());
    assert!(!sites.config().layout.webroot("example.com").exists());
}

#[tokio::test]
async fn test_create_rolls_back_when_pool_fails() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    sites.host().break_unit(&unit("php84", "shop-example-com"));

    let err = sites
        .create(&request("shop.example.com", &["mysql"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Provisioning { .. }));

    let layout = &sites.config().layout;
    assert!(!sites.store().exists("shop.example.com").unwrap());
    assert!(!layout.webroot("shop.example.com").exists());
    assert!(!layout.nginx_available("shop.example.com").exists());

    let state = sites.host().state();
    assert!(state.databases.is_empty());
    assert!(state.users.is_empty());
    assert!(state.enabled.is_empty());
}

#[tokio::test]
async fn test_create_rolls_back_when_nginx_rejects_vhost() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    sites.host().state().broken_nginx = true;

    let err = sites
        .create(&request("blog.example.com", &["wp"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CommandFailed { .. }));

    let layout = &sites.config().layout;
    assert!(!layout.nginx_available("blog.example.com").exists());
    assert!(!layout.nginx_enabled("blog.example.com").exists());
    assert!(!layout.webroot("blog.example.com").exists());
    assert!(!layout.pool_conf(php("php84"), &Slug::new("blog.example.com")).exists());

    let state = sites.host().state();
    assert!(state.databases.is_empty());
    assert!(state.users.is_empty());
    assert!(state.active.is_empty());
}

// ── Update ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_version_switch_activates_new_pool_before_retiring_old() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "blog.example.com", &["php", "php83"]).await;

    let outcome = sites
        .update("blog.example.com", &flags(&["php84"]))
        .await
        .unwrap();
    let UpdateOutcome::Updated { record, retired } = outcome else {
        panic!("expected an update");
    };
    assert_eq!(record.php_version, Some(php("php84")));
    assert!(retired.unwrap().is_clean());

    let host = sites.host();
    let new_active = host
        .position(&format!("is-active {} = true", unit("php84", "blog-example-com")))
        .unwrap();
    let old_stopped = host
        .position(&format!("stop {}", unit("php83", "blog-example-com")))
        .unwrap();
    assert!(new_active < old_stopped);

    let layout = &sites.config().layout;
    let slug = Slug::new("blog.example.com");
    assert!(layout.pool_conf(php("php84"), &slug).is_file());
    assert!(!layout.pool_conf(php("php83"), &slug).exists());
    assert!(vhost(&sites, "blog.example.com").contains(&socket(&sites, "php84", "blog.example.com")));
    // Same user serves the new pool.
    assert!(host.state().users.contains("php-blog-example-com"));
}

#[tokio::test]
async fn test_failed_switch_leaves_old_pool_serving() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "blog.example.com", &["php", "php83"]).await;
    sites.host().break_unit(&unit("php84", "blog-example-com"));

    sites
        .update("blog.example.com", &flags(&["php84"]))
        .await
        .unwrap_err();

    let record = sites.store().get("blog.example.com").unwrap();
    assert_eq!(record.php_version, Some(php("php83")));
    assert!(vhost(&sites, "blog.example.com").contains(&socket(&sites, "php83", "blog.example.com")));
    let state = sites.host().state();
    assert!(state.active.contains(&unit("php83", "blog-example-com")));
    assert!(state.users.contains("php-blog-example-com"));
}

#[tokio::test]
async fn test_update_with_same_flags_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["php", "php83"]).await;

    let outcome = sites.update("example.com", &flags(&["php83"])).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Unchanged { .. }));
}

#[tokio::test]
async fn test_update_upgrade_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["php"]).await;

    let outcome = sites.update("example.com", &flags(&["wp", "wpfc"])).await.unwrap();
    let record = outcome.record();
    assert_eq!(record.site_type, SiteKind::Wp);
    assert_eq!(record.cache_type, CacheType::Wpfc);
    let creds = record.database.as_ref().unwrap();
    assert!(sites.host().state().databases.contains_key(&creds.name));
    assert!(vhost(&sites, "example.com").contains("include common/wpfc-php84.conf;"));
}

#[tokio::test]
async fn test_update_cache_only_keeps_wordpress_type() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["wpsubdomain"]).await;

    let outcome = sites.update("example.com", &flags(&["wpsc"])).await.unwrap();
    assert_eq!(outcome.record().site_type, SiteKind::Wpsubdomain);
    assert_eq!(outcome.record().cache_type, CacheType::Wpsc);
}

#[tokio::test]
async fn test_update_version_adds_php_to_html_site() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "static.org", &[]).await;

    let outcome = sites.update("static.org", &flags(&["php83"])).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    let record = outcome.record();
    assert_eq!(record.site_type, SiteKind::Php);
    assert_eq!(record.php_version, Some(php("php83")));
    assert!(record.database.is_none());

    assert!(sites.host().state().active.contains(&unit("php83", "static-org")));
    assert!(vhost(&sites, "static.org").contains(&format!(
        "fastcgi_pass unix:{};",
        socket(&sites, "php83", "static.org")
    )));
}

#[tokio::test]
async fn test_update_rejects_downgrade() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["wp"]).await;

    let err = sites.update("example.com", &flags(&["html"])).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict { .. }));
    assert_eq!(sites.store().get("example.com").unwrap().site_type, SiteKind::Wp);

    let err = sites.update("missing.example", &flags(&["php"])).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

// ── Fleet ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fleet_update_skips_busy_sites() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "a.com", &["php", "php83"]).await;
    create(&sites, "b.com", &["php", "php83"]).await;
    create(&sites, "c.com", &["php", "php84"]).await;
    create(&sites, "d.com", &["html"]).await;

    let lock_dir = sites.config().layout.lock_dir();
    let held = OpLock::acquire(&lock_dir, LockScope::domain("b.com")).unwrap();

    let report = sites.update_all(&flags(&["php84"])).await.unwrap();
    assert_eq!(report.updated, vec!["a.com".to_owned()]);
    assert_eq!(report.unchanged, vec!["c.com".to_owned()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "b.com");
    assert!(report.failed.is_empty());
    drop(held);

    let b = sites.store().get("b.com").unwrap();
    assert_eq!(b.php_version, Some(php("php83")));
    let d = sites.store().get("d.com").unwrap();
    assert_eq!(d.php_version, None);
}

#[tokio::test]
async fn test_fleet_update_needs_exactly_one_version() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());

    let err = sites.update_all(&flags(&["wp"])).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let _global = OpLock::acquire(&sites.config().layout.lock_dir(), LockScope::Global).unwrap();
    let err = sites.update_all(&flags(&["php82"])).await.unwrap_err();
    assert!(matches!(err, CoreError::LockBusy { .. }));
}

// ── Delete / enable / info ──────────────────────────────────────────

#[tokio::test]
async fn test_delete_removes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    let record = create(&sites, "example.com", &["wp"]).await;

    let report = sites
        .delete("example.com", DeleteOptions::default())
        .await
        .unwrap();
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.record.id, record.id);

    let layout = &sites.config().layout;
    assert!(!record.site_path.exists());
    assert!(!layout.nginx_available("example.com").exists());
    assert!(!layout.nginx_enabled("example.com").exists());
    assert!(!sites.store().exists("example.com").unwrap());

    let state = sites.host().state();
    assert!(state.databases.is_empty());
    assert!(state.users.is_empty());
    assert!(state.enabled.is_empty());
}

#[tokio::test]
async fn test_delete_can_keep_files_and_database() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    let record = create(&sites, "example.com", &["mysql"]).await;

    sites
        .delete(
            "example.com",
            DeleteOptions {
                keep_files: true,
                keep_db: true,
            },
        )
        .await
        .unwrap();
    assert!(record.htdocs().is_dir());
    assert_eq!(sites.host().state().databases.len(), 1);

    let err = sites
        .delete("example.com", DeleteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_disable_and_enable_toggle_symlink() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["html"]).await;
    let link = sites.config().layout.nginx_enabled("example.com");

    let record = sites.disable("example.com").await.unwrap();
    assert!(!record.is_enabled);
    assert!(!link.exists());
    assert_eq!(
        sites.list(&SiteFilter {
            enabled: Some(true),
            ..SiteFilter::default()
        })
        .unwrap()
        .len(),
        0
    );

    let record = sites.enable("example.com").await.unwrap();
    assert!(record.is_enabled);
    assert_eq!(
        std::fs::read_link(&link).unwrap(),
        sites.config().layout.nginx_available("example.com")
    );
}

#[tokio::test]
async fn test_info_reports_pool_state() {
    let dir = tempfile::tempdir().unwrap();
    let sites = manager(dir.path());
    create(&sites, "example.com", &["php", "php82"]).await;

    let info = sites.info("example.com").await.unwrap();
    let pool = info.pool.unwrap();
    assert!(info.vhost_enabled);
    assert!(pool.active);
    assert_eq!(pool.unit, unit("php82", "example-com"));
    assert!(pool.socket.starts_with(dir.path()));
    assert!(Path::new(&pool.socket).ends_with("run/php/php82-fpm-example-com.sock"));
}
