//! Advisory locks on database files.
//!
//! Writable handles take an exclusive lock, read-only handles a shared one.
//! The lock lives on a dedicated handle so that files rewritten through a
//! temporary file and rename can be locked again with [`LockedFile::relock`].

use polydbm_core::{Error, OpenFlags, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

/// A file handle holding an advisory lock for the lifetime of an engine.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
    flags: OpenFlags,
}

impl LockedFile {
    /// Opens `path` according to `flags` and locks it.
    ///
    /// Writable opens create the file unless `no_create` is set; read-only
    /// opens of a missing file fail with `NotFound`.
    pub fn open(path: &Path, flags: &OpenFlags) -> Result<Self> {
        let file = Self::open_handle(path, flags)?;
        Self::lock(&file, path, flags)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            flags: *flags,
        })
    }

    fn open_handle(path: &Path, flags: &OpenFlags) -> Result<File> {
        let result = if flags.writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(!flags.no_create)
                .truncate(false)
                .open(path)
        } else {
            File::open(path)
        };
        result.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("no such file: {}", path.display()))
            }
            _ => Error::Io(e),
        })
    }

    fn lock(file: &File, path: &Path, flags: &OpenFlags) -> Result<()> {
        if flags.no_lock {
            return Ok(());
        }
        if flags.no_wait {
            let attempt = if flags.writable {
                file.try_lock()
            } else {
                file.try_lock_shared()
            };
            return match attempt {
                Ok(()) => Ok(()),
                Err(TryLockError::WouldBlock) => Err(Error::FileLock(format!(
                    "file is locked: {}",
                    path.display()
                ))),
                Err(TryLockError::Error(e)) => Err(Error::Io(e)),
            };
        }
        tracing::debug!(path = %path.display(), exclusive = flags.writable, "Waiting for file lock");
        if flags.writable {
            file.lock()?;
        } else {
            file.lock_shared()?;
        }
        Ok(())
    }

    /// Locks the file now found at the path, after it was replaced.
    pub fn relock(&mut self) -> Result<()> {
        let file = Self::open_handle(&self.path, &self.flags)?;
        Self::lock(&file, &self.path, &self.flags)?;
        // the old handle, and its lock on the replaced inode, drop here
        self.file = file;
        Ok(())
    }

    /// The locked handle.
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Current length of the file.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Returns true if the file is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Path of the scratch file used while rewriting `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polydbm_core::StatusCode;
    use tempfile::tempdir;

    fn flags(writable: bool, no_wait: bool) -> OpenFlags {
        OpenFlags {
            writable,
            no_wait,
            ..Default::default()
        }
    }

    #[test]
    fn test_writable_open_creates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.tkh");
        let locked = LockedFile::open(&path, &flags(true, false)).unwrap();
        assert!(path.exists());
        assert!(locked.is_empty().unwrap());
    }

    #[test]
    fn test_missing_file_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.tkh");
        let err = LockedFile::open(&path, &flags(false, false)).unwrap_err();
        assert!(err.is_not_found());
        let no_create = OpenFlags {
            writable: true,
            no_create: true,
            ..Default::default()
        };
        assert!(LockedFile::open(&path, &no_create).unwrap_err().is_not_found());
    }

    #[test]
    fn test_no_wait_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.tkh");
        let _held = LockedFile::open(&path, &flags(true, false)).unwrap();
        let err = LockedFile::open(&path, &flags(true, true)).unwrap_err();
        assert_eq!(err.code(), StatusCode::FileLock);
        let err = LockedFile::open(&path, &flags(false, true)).unwrap_err();
        assert_eq!(err.code(), StatusCode::FileLock);
    }

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.tkh");
        std::fs::write(&path, b"").unwrap();
        let _a = LockedFile::open(&path, &flags(false, true)).unwrap();
        let _b = LockedFile::open(&path, &flags(false, true)).unwrap();
        let err = LockedFile::open(&path, &flags(true, true)).unwrap_err();
        assert_eq!(err.code(), StatusCode::FileLock);
    }

    #[test]
    fn test_no_lock_skips_locking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.tkh");
        let _held = LockedFile::open(&path, &flags(true, false)).unwrap();
        let free = OpenFlags {
            writable: true,
            no_lock: true,
            ..Default::default()
        };
        assert!(LockedFile::open(&path, &free).is_ok());
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(temp_path(Path::new("/x/a.tkh")), PathBuf::from("/x/a.tkh.tmp"));
    }
}
