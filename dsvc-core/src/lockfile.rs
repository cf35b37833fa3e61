//! atomic file writes via a temp-file-then-rename discipline, used by the loose
//! object backend and by ref/merge-state file writes.

use crate::error::DsvcResult;
use anyhow::Context;
use std::fs::File;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

const LOCK_FILE_EXT: &str = "lock";

/// guards writes to `path` by first writing into `<path>.lock`, then renaming
/// it over `path` on success. if the closure errors, the lockfile is removed
/// and `path` is left untouched.
pub struct Lockfile {
    lockfile: File,
    path: PathBuf,
    lockfile_path: PathBuf,
    committed: bool,
}

impl Write for Lockfile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lockfile.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lockfile.flush()
    }
}

impl Lockfile {
    fn open(path: impl AsRef<Path>) -> DsvcResult<Self> {
        let path = path.as_ref();
        let lockfile_path = path.with_extension(LOCK_FILE_EXT);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let lockfile = File::create(&lockfile_path)
            .with_context(|| format!("failed to create lockfile `{}`", lockfile_path.display()))?;
        Ok(Self { lockfile, path: path.to_path_buf(), lockfile_path, committed: false })
    }

    /// runs `f` with write access to the lockfile; commits (renames into place) on
    /// success, discards the lockfile on error.
    pub fn with_mut<R>(path: impl AsRef<Path>, f: impl FnOnce(&mut Self) -> DsvcResult<R>) -> DsvcResult<R> {
        let mut lockfile = Self::open(path)?;
        match f(&mut lockfile) {
            Ok(r) => {
                lockfile.commit()?;
                Ok(r)
            }
            Err(err) => {
                lockfile.rollback();
                Err(err)
            }
        }
    }

    /// convenience for the common "just write these bytes atomically" case.
    pub fn write_all_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> DsvcResult<()> {
        Self::with_mut(path, |lockfile| Ok(lockfile.write_all(bytes)?))
    }

    fn commit(&mut self) -> DsvcResult<()> {
        self.lockfile.flush()?;
        std::fs::rename(&self.lockfile_path, &self.path).with_context(|| {
            format!(
                "failed to commit lockfile `{}` to `{}`",
                self.lockfile_path.display(),
                self.path.display()
            )
        })?;
        self.committed = true;
        Ok(())
    }

    fn rollback(&mut self) {
        let _ = std::fs::remove_file(&self.lockfile_path);
        self.committed = true; // prevent Drop from trying again
    }
}

impl Drop for Lockfile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.lockfile_path);
        }
    }
}
