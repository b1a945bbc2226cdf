// ── Site backups ──
//
// Archives are gzip-compressed tarballs at
// `<backup_root>/<domain>/<YYYY-mm-dd_HH-MM-SS>.tar.gz`, holding one
// top-level directory named after the timestamp:
//
//   <ts>/vhost.json        metadata document
//   <ts>/htdocs/           document root (full, files)
//   <ts>/<domain>          nginx vhost (full, files)
//   <ts>/*-config.php      site config files (full, files)
//   <ts>/<domain>.sql      database dump (full, db)
//
// The archive is written under a `.partial` name and renamed into place,
// so a failed backup never leaves an archive behind.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{CoreError, IoContext};
use crate::fsutil;
use crate::host::DatabaseAdmin;
use crate::model::SiteRecord;

const ARCHIVE_EXT: &str = ".tar.gz";
const METADATA_FILE: &str = "vhost.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = "YYYY-mm-dd_HH-MM-SS".len();

/// Field names of [`BackupMetadata`]. Extra metadata may not reuse them.
pub const RESERVED_METADATA_KEYS: &[&str] = &[
    "id",
    "sitename",
    "site_type",
    "cache_type",
    "site_path",
    "created_on",
    "is_enabled",
    "is_ssl",
    "db_name",
    "db_user",
    "db_host",
    "php_version",
    "backup_timestamp",
    "backup_type",
    "backup_reason",
];

/// What goes into an archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackupKind {
    #[default]
    Full,
    #[serde(rename = "db")]
    #[strum(serialize = "db")]
    Database,
    Files,
}

impl BackupKind {
    fn includes_files(self) -> bool {
        matches!(self, Self::Full | Self::Files)
    }

    fn includes_database(self) -> bool {
        matches!(self, Self::Full | Self::Database)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    pub kind: BackupKind,
    pub reason: Option<String>,
    /// Caller-supplied fields merged into the metadata document.
    pub extra: BTreeMap<String, Value>,
}

/// Metadata document embedded in every archive. Never carries the
/// database password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub id: i64,
    pub sitename: String,
    pub site_type: String,
    pub cache_type: String,
    pub site_path: PathBuf,
    pub created_on: String,
    pub is_enabled: bool,
    pub is_ssl: bool,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_host: Option<String>,
    pub php_version: Option<String>,
    pub backup_timestamp: String,
    pub backup_type: BackupKind,
    pub backup_reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BackupMetadata {
    fn snapshot(record: &SiteRecord, timestamp: &str, request: &BackupRequest) -> Self {
        let db = record.database.as_ref();
        Self {
            id: record.id,
            sitename: record.domain.clone(),
            site_type: record.site_type.to_string(),
            cache_type: record.cache_type.to_string(),
            site_path: record.site_path.clone(),
            created_on: record.created_on.to_rfc3339(),
            is_enabled: record.is_enabled,
            is_ssl: record.is_ssl,
            db_name: db.map(|d| d.name.clone()),
            db_user: db.map(|d| d.user.clone()),
            db_host: db.map(|d| d.host.clone()),
            php_version: record.php_version.map(|v| v.to_string()),
            backup_timestamp: timestamp.to_owned(),
            backup_type: request.kind,
            backup_reason: request.reason.clone(),
            extra: request.extra.clone(),
        }
    }
}

/// One archive on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Where and how to restore.
#[derive(Debug, Clone)]
pub struct RestoreTarget {
    /// Webroot receiving `htdocs/` and config files.
    pub site_path: PathBuf,
    /// Database to load the dump into; falls back to the archived name.
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub metadata: BackupMetadata,
    pub htdocs: bool,
    pub database: bool,
    pub config_files: Vec<PathBuf>,
}

pub struct BackupOrchestrator<'a, D> {
    db: &'a D,
    config: &'a EngineConfig,
}

impl<'a, D: DatabaseAdmin> BackupOrchestrator<'a, D> {
    pub fn new(db: &'a D, config: &'a EngineConfig) -> Self {
        Self { db, config }
    }

    /// Directory holding the archives of one site.
    pub fn site_dir(&self, record: &SiteRecord) -> PathBuf {
        self.config.backup_dir(&record.domain, &record.site_path)
    }

    /// Create an archive and return its path.
    pub async fn create(
        &self,
        record: &SiteRecord,
        request: &BackupRequest,
    ) -> Result<PathBuf, CoreError> {
        let fail = |message: String| CoreError::Backup {
            domain: record.domain.clone(),
            message,
        };

        if request.kind == BackupKind::Database && record.database.is_none() {
            return Err(fail("site has no database".into()));
        }
        if let Some(key) = request
            .extra
            .keys()
            .find(|k| RESERVED_METADATA_KEYS.contains(&k.as_str()))
        {
            return Err(fail(format!("metadata key '{key}' is reserved")));
        }

        let dir = self.site_dir(record);
        std::fs::create_dir_all(&dir).at(&dir)?;
        let timestamp = unique_timestamp(&dir);
        let archive = dir.join(format!("{timestamp}{ARCHIVE_EXT}"));
        let partial = dir.join(format!("{timestamp}{ARCHIVE_EXT}.partial"));

        // Dropped (and removed) on every exit path.
        let scratch = tempfile::Builder::new()
            .prefix(".wo-backup-")
            .tempdir_in(&dir)
            .at(&dir)?;

        let dump = match (&record.database, request.kind.includes_database()) {
            (Some(creds), true) => {
                let path = scratch.path().join(format!("{}.sql", record.domain));
                self.db
                    .dump(&creds.name, &path)
                    .await
                    .map_err(|e| fail(format!("database dump failed: {e}")))?;
                Some(path)
            }
            _ => None,
        };

        let metadata = BackupMetadata::snapshot(record, &timestamp, request);
        let packed = self.pack(record, &timestamp, &metadata, dump.as_deref(), request.kind, &partial);
        if let Err(e) = packed {
            let _ = fsutil::remove_path(&partial);
            return Err(fail(e.to_string()));
        }
        std::fs::rename(&partial, &archive).at(&archive)?;

        info!(domain = %record.domain, archive = %archive.display(), kind = %request.kind, "backup created");
        Ok(archive)
    }

    fn pack(
        &self,
        record: &SiteRecord,
        timestamp: &str,
        metadata: &BackupMetadata,
        dump: Option<&Path>,
        kind: BackupKind,
        out: &Path,
    ) -> Result<(), CoreError> {
        let file = File::create(out).at(out)?;
        let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        tar.follow_symlinks(false);
        let top = Path::new(timestamp);

        let doc = serde_json::to_vec_pretty(metadata)?;
        let mut header = tar::Header::new_gnu();
        header.set_size(u64::try_from(doc.len()).unwrap_or(u64::MAX));
        header.set_mode(0o600);
        header.set_mtime(u64::try_from(Utc::now().timestamp()).unwrap_or_default());
        header.set_cksum();
        tar.append_data(&mut header, top.join(METADATA_FILE), doc.as_slice())
            .at(out)?;

        if kind.includes_files() {
            let htdocs = record.htdocs();
            if htdocs.is_dir() {
                tar.append_dir_all(top.join("htdocs"), &htdocs).at(&htdocs)?;
            }
            let vhost = self.config.layout.nginx_available(&record.domain);
            if vhost.is_file() {
                tar.append_path_with_name(&vhost, top.join(&record.domain))
                    .at(&vhost)?;
            }
            for config in site_config_files(&record.site_path)? {
                if let Some(name) = config.file_name() {
                    tar.append_path_with_name(&config, top.join(name)).at(&config)?;
                }
            }
        }

        if let Some(dump) = dump {
            tar.append_path_with_name(dump, top.join(format!("{}.sql", record.domain)))
                .at(dump)?;
        }

        let encoder = tar.into_inner().at(out)?;
        let file = encoder.finish().at(out)?;
        file.sync_all().at(out)?;
        Ok(())
    }

    /// Archives of one site, newest first.
    pub fn list(&self, record: &SiteRecord) -> Result<Vec<BackupEntry>, CoreError> {
        list_archives(&self.site_dir(record))
    }

    /// Unpack `archive` into `target`. The database dump is loaded only
    /// when the archive holds one and a database name is known.
    pub async fn restore(
        &self,
        archive: &Path,
        target: &RestoreTarget,
    ) -> Result<RestoreReport, CoreError> {
        let fail = |message: String| CoreError::Restore {
            archive: archive.to_path_buf(),
            message,
        };
        let metadata = read_metadata(archive)?;

        std::fs::create_dir_all(&target.site_path).at(&target.site_path)?;
        let scratch = tempfile::Builder::new()
            .prefix(".wo-restore-")
            .tempdir_in(&target.site_path)
            .at(&target.site_path)?;

        let file = File::open(archive).at(archive)?;
        tar::Archive::new(GzDecoder::new(file))
            .unpack(scratch.path())
            .map_err(|e| fail(format!("unpack failed: {e}")))?;
        let staged = scratch.path().join(&metadata.backup_timestamp);
        if !staged.is_dir() {
            return Err(fail("archive has no timestamp directory".into()));
        }

        let mut report = RestoreReport {
            metadata,
            htdocs: false,
            database: false,
            config_files: Vec::new(),
        };

        let staged_htdocs = staged.join("htdocs");
        if staged_htdocs.is_dir() {
            swap_in_dir(&staged_htdocs, &target.site_path.join("htdocs"))?;
            report.htdocs = true;
        }

        for config in site_config_files(&staged)? {
            if let Some(name) = config.file_name() {
                let dest = target.site_path.join(name);
                std::fs::copy(&config, &dest).at(&dest)?;
                report.config_files.push(dest);
            }
        }

        let dump = staged.join(format!("{}.sql", report.metadata.sitename));
        if dump.is_file() {
            let name = target
                .database
                .clone()
                .or_else(|| report.metadata.db_name.clone());
            match name {
                Some(name) => {
                    self.db
                        .load(&name, &dump)
                        .await
                        .map_err(|e| fail(format!("database load failed: {e}")))?;
                    report.database = true;
                }
                None => warn!(archive = %archive.display(), "dump present but no database to load into"),
            }
        }

        info!(
            archive = %archive.display(),
            site_path = %target.site_path.display(),
            htdocs = report.htdocs,
            database = report.database,
            "backup restored"
        );
        Ok(report)
    }
}

/// Archives in `dir`, newest first. A missing directory has none.
pub fn list_archives(dir: &Path) -> Result<Vec<BackupEntry>, CoreError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CoreError::io(dir, e)),
    };
    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.at(dir)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(ARCHIVE_EXT) {
            continue;
        }
        let meta = entry.metadata().at(entry.path())?;
        if meta.is_file() {
            archives.push(BackupEntry {
                name,
                path: entry.path(),
                size: meta.len(),
            });
        }
    }
    archives.sort_by(|a, b| archive_order(&b.name).cmp(&archive_order(&a.name)));
    Ok(archives)
}

/// Sort key of an archive name: its timestamp, then the collision suffix
/// added by `unique_timestamp`.
fn archive_order(name: &str) -> (&str, u32) {
    let stem = name.strip_suffix(ARCHIVE_EXT).unwrap_or(name);
    match stem.split_at_checked(TIMESTAMP_LEN) {
        Some((ts, rest)) => (ts, rest.trim_start_matches('-').parse().unwrap_or(0)),
        None => (stem, 0),
    }
}

/// Read the metadata document without unpacking the rest.
pub fn read_metadata(archive: &Path) -> Result<BackupMetadata, CoreError> {
    let fail = |message: String| CoreError::Restore {
        archive: archive.to_path_buf(),
        message,
    };
    let file = File::open(archive).at(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    for entry in tar.entries().map_err(|e| fail(e.to_string()))? {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let path = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();
        if path.components().count() == 2 && path.ends_with(METADATA_FILE) {
            let mut doc = String::new();
            entry
                .read_to_string(&mut doc)
                .map_err(|e| fail(e.to_string()))?;
            debug!(archive = %archive.display(), "metadata found");
            return Ok(serde_json::from_str(&doc)?);
        }
    }
    Err(fail(format!("no {METADATA_FILE} in archive")))
}

/// `*-config.php` files directly inside `dir`.
fn site_config_files(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| CoreError::validation(e.to_string()))?;
        let is_config = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with("-config.php"));
        if is_config && entry.file_type().is_file() {
            found.push(entry.into_path());
        }
    }
    found.sort();
    Ok(found)
}

/// Replace `dest` with `src`, keeping the old tree until the new one is
/// in place.
fn swap_in_dir(src: &Path, dest: &Path) -> Result<(), CoreError> {
    let old = dest.with_extension("wo-restore-old");
    fsutil::remove_path(&old)?;
    let had_old = dest.exists();
    if had_old {
        std::fs::rename(dest, &old).at(dest)?;
    }
    if let Err(e) = std::fs::rename(src, dest) {
        if had_old {
            let _ = std::fs::rename(&old, dest);
        }
        return Err(CoreError::io(dest, e));
    }
    if had_old {
        fsutil::remove_path(&old)?;
    }
    Ok(())
}

fn unique_timestamp(dir: &Path) -> String {
    let base = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let taken = |ts: &str| {
        dir.join(format!("{ts}{ARCHIVE_EXT}")).exists()
            || dir.join(format!("{ts}{ARCHIVE_EXT}.partial")).exists()
    };
    if !taken(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|ts| !taken(ts))
        .unwrap_or(base)
}
