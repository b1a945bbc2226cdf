// ── Site registry ──
//
// Single-file SQLite table of sites keyed by domain. Every mutation is a
// single statement or a single transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::error::{CoreError, IoContext};
use crate::model::{
    CacheType, DbCredentials, NewSite, SiteFilter, SiteKind, SitePatch, SiteRecord,
};
use crate::php::PhpVersion;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sites (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    sitename     TEXT    NOT NULL UNIQUE COLLATE NOCASE,
    site_type    TEXT    NOT NULL,
    cache_type   TEXT    NOT NULL,
    site_path    TEXT    NOT NULL,
    created_on   TEXT    NOT NULL,
    is_enabled   INTEGER NOT NULL DEFAULT 1,
    is_ssl       INTEGER NOT NULL DEFAULT 0,
    storage_fs   TEXT    NOT NULL,
    storage_db   TEXT    NOT NULL,
    db_name      TEXT,
    db_user      TEXT,
    db_password  TEXT,
    db_host      TEXT,
    php_version  TEXT
);
";

const COLUMNS: &str = "id, sitename, site_type, cache_type, site_path, created_on, is_enabled, \
                       is_ssl, storage_fs, storage_db, db_name, db_user, db_password, db_host, \
                       php_version";

/// CRUD over the persisted site registry.
pub struct SiteStore {
    conn: Connection,
    path: PathBuf,
}

impl SiteStore {
    /// Open (creating if needed) the registry at `path`.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Self::init(conn, path.to_path_buf())
    }

    /// Ephemeral registry for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self, CoreError> {
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "site registry ready");
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a new site. Fails with `Duplicate` if the domain exists.
    pub fn create(&self, site: &NewSite) -> Result<SiteRecord, CoreError> {
        let created_on = Utc::now();
        let db = site.database.as_ref();
        let inserted = self.conn.execute(
            "INSERT INTO sites (sitename, site_type, cache_type, site_path, created_on, \
             is_enabled, is_ssl, storage_fs, storage_db, db_name, db_user, db_password, \
             db_host, php_version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                site.domain,
                site.site_type.as_ref(),
                site.cache_type.as_ref(),
                site.site_path.to_string_lossy(),
                created_on,
                site.is_enabled,
                site.is_ssl,
                site.storage_fs,
                site.storage_db,
                db.map(|d| d.name.as_str()),
                db.map(|d| d.user.as_str()),
                db.map(|d| d.password.expose_secret()),
                db.map(|d| d.host.as_str()),
                site.php_version.map(PhpVersion::dotted),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                return Err(CoreError::Duplicate {
                    domain: site.domain.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }
        info!(domain = %site.domain, site_type = %site.site_type, "site registered");
        self.get(&site.domain)
    }

    pub fn find(&self, domain: &str) -> Result<Option<SiteRecord>, CoreError> {
        let sql = format!("SELECT {COLUMNS} FROM sites WHERE sitename = ?1");
        self.conn
            .query_row(&sql, [domain], read_row)
            .optional()?
            .transpose()
    }

    pub fn get(&self, domain: &str) -> Result<SiteRecord, CoreError> {
        self.find(domain)?.ok_or_else(|| CoreError::NotFound {
            domain: domain.to_owned(),
        })
    }

    pub fn exists(&self, domain: &str) -> Result<bool, CoreError> {
        Ok(self.find(domain)?.is_some())
    }

    /// Apply `patch` to the site. Fails with `NotFound` if absent.
    pub fn update(&self, domain: &str, patch: &SitePatch) -> Result<SiteRecord, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let sql = format!("SELECT {COLUMNS} FROM sites WHERE sitename = ?1");
        let mut record = tx
            .query_row(&sql, [domain], read_row)
            .optional()?
            .transpose()?
            .ok_or_else(|| CoreError::NotFound {
                domain: domain.to_owned(),
            })?;
        patch.apply(&mut record);

        let db = record.database.as_ref();
        tx.execute(
            "UPDATE sites SET site_type = ?2, cache_type = ?3, site_path = ?4, is_enabled = ?5, \
             is_ssl = ?6, db_name = ?7, db_user = ?8, db_password = ?9, db_host = ?10, \
             php_version = ?11 WHERE id = ?1",
            params![
                record.id,
                record.site_type.as_ref(),
                record.cache_type.as_ref(),
                record.site_path.to_string_lossy(),
                record.is_enabled,
                record.is_ssl,
                db.map(|d| d.name.as_str()),
                db.map(|d| d.user.as_str()),
                db.map(|d| d.password.expose_secret()),
                db.map(|d| d.host.as_str()),
                record.php_version.map(PhpVersion::dotted),
            ],
        )?;
        tx.commit()?;
        debug!(domain, "site updated");
        Ok(record)
    }

    /// Remove the site, returning its last state.
    pub fn delete(&self, domain: &str) -> Result<SiteRecord, CoreError> {
        let record = self.get(domain)?;
        self.conn
            .execute("DELETE FROM sites WHERE id = ?1", [record.id])?;
        info!(domain, "site removed from registry");
        Ok(record)
    }

    /// Sites matching `filter`, ordered by domain.
    pub fn list(&self, filter: &SiteFilter) -> Result<Vec<SiteRecord>, CoreError> {
        let sql = format!("SELECT {COLUMNS} FROM sites ORDER BY sitename");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], read_row)?;
        let mut sites = Vec::new();
        for row in rows {
            let record = row??;
            if filter.matches(&record) {
                sites.push(record);
            }
        }
        Ok(sites)
    }
}

/// Decode a row. Column values that fail to parse surface as the inner
/// error so a corrupt row does not masquerade as an SQL failure.
fn read_row(row: &Row<'_>) -> rusqlite::Result<Result<SiteRecord, CoreError>> {
    let site_type: String = row.get(2)?;
    let cache_type: String = row.get(3)?;
    let site_path: String = row.get(4)?;
    let created_on: DateTime<Utc> = row.get(5)?;
    let db_name: Option<String> = row.get(10)?;
    let db_user: Option<String> = row.get(11)?;
    let db_password: Option<String> = row.get(12)?;
    let db_host: Option<String> = row.get(13)?;
    let php_version: Option<String> = row.get(14)?;

    let partial = parse_columns(&site_type, &cache_type, php_version.as_deref());
    let (site_type, cache_type, php_version) = match partial {
        Ok(parts) => parts,
        Err(e) => return Ok(Err(e)),
    };

    let database = match (db_name, db_user) {
        (Some(name), Some(user)) => Some(DbCredentials {
            name,
            user,
            password: SecretString::from(db_password.unwrap_or_default()),
            host: db_host.unwrap_or_else(|| "localhost".into()),
        }),
        _ => None,
    };

    Ok(Ok(SiteRecord {
        id: row.get(0)?,
        domain: row.get(1)?,
        site_type,
        cache_type,
        site_path: PathBuf::from(site_path),
        created_on,
        is_enabled: row.get(6)?,
        is_ssl: row.get(7)?,
        database,
        php_version,
        storage_fs: row.get(8)?,
        storage_db: row.get(9)?,
    }))
}

fn parse_columns(
    site_type: &str,
    cache_type: &str,
    php_version: Option<&str>,
) -> Result<(SiteKind, CacheType, Option<PhpVersion>), CoreError> {
    let site_type: SiteKind = site_type
        .parse()
        .map_err(|_| CoreError::validation(format!("unknown site type '{site_type}'")))?;
    let cache_type: CacheType = cache_type
        .parse()
        .map_err(|_| CoreError::validation(format!("unknown cache type '{cache_type}'")))?;
    let php_version = php_version
        .filter(|v| !v.is_empty())
        .map(str::parse::<PhpVersion>)
        .transpose()?;
    Ok((site_type, cache_type, php_version))
}
