//! repository init/open (spec §10.1): creating and locating the `.dsvc`
//! control directory that backs a [`Repository`]'s object store and refs.
//!
//! grounded in the teacher's control-directory discovery walk and dual
//! `.git`/`.bit` recognition (`BitRepo::find`/`load_with_bitdir`,
//! `libbit/src/repo.rs`), trimmed to a single convention since this crate
//! has no git-compatibility requirement to honor.

use crate::error::{CoreError, DsvcResult};
use crate::odb::LooseObjectStore;
use crate::refs::RefValue;
use std::path::{Path, PathBuf};

/// the control directory name this crate recognizes (analogous to git's
/// `.git`, but this crate keeps no git-compatibility obligation so it picks
/// its own name, matching the `.dsvcconfig` global config file).
pub const CONTROL_DIR_NAME: &str = ".dsvc";

const DEFAULT_BRANCH: &str = "master";

/// creates a new repository's control directory (`objects/`, plus `HEAD`
/// pointing at `refs/heads/master`) under `path`. `path` itself need not
/// yet exist; fails if a control directory is already present there.
pub fn init(path: impl AsRef<Path>) -> DsvcResult<PathBuf> {
    let path = path.as_ref();
    let control_dir = path.join(CONTROL_DIR_NAME);
    anyhow::ensure!(
        !control_dir.exists(),
        CoreError::InvalidOperation(format!("`{}` is already a repository", path.display()))
    );
    std::fs::create_dir_all(control_dir.join("objects"))?;
    crate::refs::RefDb::new(&control_dir)
        .write("HEAD", RefValue::Symbolic(format!("refs/heads/{}", DEFAULT_BRANCH)))?;
    Ok(control_dir)
}

/// walks upward from `start` looking for a `.dsvc` control directory,
/// mirroring the teacher's repository-discovery walk.
pub fn discover_control_dir(start: impl AsRef<Path>) -> DsvcResult<PathBuf> {
    let mut dir = std::fs::canonicalize(start.as_ref())?;
    loop {
        let candidate = dir.join(CONTROL_DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }
        if !dir.pop() {
            anyhow::bail!(CoreError::NotFound(format!(
                "not a {} repository (or any parent up to the filesystem root): {}",
                CONTROL_DIR_NAME,
                start.as_ref().display()
            )));
        }
    }
}

/// opens the [`LooseObjectStore`] and control directory for the repository
/// found above `start`, ready to hand to [`crate::repo::Repository::new`].
pub fn open(start: impl AsRef<Path>) -> DsvcResult<(LooseObjectStore, PathBuf)> {
    let control_dir = discover_control_dir(start)?;
    let store = LooseObjectStore::new(control_dir.join("objects"));
    Ok((store, control_dir))
}
