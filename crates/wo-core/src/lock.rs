// ── Cross-invocation locks ──
//
// Advisory `flock` locks: one per domain, plus a global lock held by
// fleet-wide operations. Acquisition never blocks; a held lock fails fast
// with `LockBusy`. Locks are released when the guard drops.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{CoreError, IoContext};
use crate::model::Slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    Global,
    Domain(Slug),
}

impl LockScope {
    pub fn domain(domain: &str) -> Self {
        Self::Domain(Slug::new(domain))
    }

    fn file_name(&self) -> String {
        match self {
            Self::Global => "global.lock".into(),
            Self::Domain(slug) => format!("site-{slug}.lock"),
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Domain(slug) => write!(f, "site {slug}"),
        }
    }
}

/// A held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct OpLock {
    file: File,
    path: PathBuf,
    scope: LockScope,
}

impl OpLock {
    /// Try to take `scope` under `dir` without waiting.
    pub fn acquire(dir: &Path, scope: LockScope) -> Result<Self, CoreError> {
        std::fs::create_dir_all(dir).at(dir)?;
        let path = dir.join(scope.file_name());
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .at(&path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            debug!(scope = %scope, error = %e, "lock busy");
            return Err(CoreError::LockBusy {
                scope: scope.to_string(),
            });
        }

        // Owner pid for diagnostics; the lock itself is what matters.
        let owner = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()));
        if let Err(e) = owner {
            debug!(path = %path.display(), error = %e, "could not record lock owner");
        }
        debug!(scope = %scope, path = %path.display(), "lock acquired");
        Ok(Self { file, path, scope })
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for OpLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!(scope = %self.scope, "lock released"),
            Err(e) => debug!(scope = %self.scope, error = %e, "unlock failed, closing releases it"),
        }
    }
}
