// ── Filesystem helpers ──

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CoreError, IoContext};

/// Replace `path` with `contents` via a sibling temp file and rename, so
/// readers never observe a half-written file. Creates parent directories.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CoreError> {
    let parent = path
        .parent()
        .ok_or_else(|| CoreError::validation(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(parent).at(parent)?;

    let mut tmp = NamedTempFile::new_in(parent).at(parent)?;
    tmp.write_all(contents).at(tmp.path())?;
    tmp.as_file().sync_all().at(tmp.path())?;
    tmp.persist(path).map_err(|e| CoreError::io(path, e.error))?;
    Ok(())
}

/// Current contents of a file, `None` when it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

/// Remove a file, symlink or directory tree. Returns whether anything was
/// there.
pub(crate) fn remove_path(path: &Path) -> Result<bool, CoreError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(CoreError::io(path, e)),
    };
    let result = if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

/// Point `link` at `target`, replacing an existing link.
pub(crate) fn symlink(target: &Path, link: &Path) -> Result<(), CoreError> {
    remove_path(link)?;
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).at(parent)?;
    }
    std::os::unix::fs::symlink(target, link).at(link)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.conf");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn remove_path_handles_every_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        let tree = dir.path().join("t/nested");
        std::fs::write(&file, b"x").unwrap();
        std::fs::create_dir_all(&tree).unwrap();
        let link = dir.path().join("l");
        symlink(&file, &link).unwrap();

        assert!(remove_path(&link).unwrap());
        assert!(file.exists());
        assert!(remove_path(&dir.path().join("t")).unwrap());
        assert!(remove_path(&file).unwrap());
        assert!(!remove_path(&file).unwrap());
        assert_eq!(read_optional(&file).unwrap(), None);
    }
}
