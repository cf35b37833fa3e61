//! loose refs: `HEAD` plus `refs/heads/<branch>`, stored as flat files under the
//! repo control directory, matching git's on-disk layout (no packed-refs).

use crate::error::{CoreError, DsvcResult};
use crate::hash::Oid;
use crate::lockfile::Lockfile;
use crate::serialize::{Deserialize, Serialize};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::str::FromStr;

lazy_static! {
    /// a ref name is invalid if any of these hold (mirrors git's `check-ref-format`):
    /// a path component starts with `.`, contains `..`, contains any of
    /// `* : ? [ \ ^ ~ <space> <tab>`, ends with `/` or `.lock`, or contains `@{`.
    static ref INVALID_REF_REGEX: Regex =
        Regex::new(r#"^\.|/\.|\.\.|\*|:|\?|\[|\\|\^|~| |\t|/$|\.lock$|@\{"#).unwrap();
}

pub fn is_valid_branch_name(s: &str) -> bool {
    !s.is_empty() && !INVALID_REF_REGEX.is_match(s)
}

/// a resolved reference value: either a direct oid or a symbolic pointer to
/// another ref (as `HEAD` usually is, pointing at `refs/heads/<branch>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(Oid),
    Symbolic(String),
}

impl Display for RefValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RefValue::Direct(oid) => write!(f, "{}", oid),
            RefValue::Symbolic(path) => write!(f, "ref: {}", path),
        }
    }
}

impl Serialize for RefValue {
    fn serialize(&self, writer: &mut dyn Write) -> DsvcResult<()> {
        writeln!(writer, "{}", self)?;
        Ok(())
    }
}

impl Deserialize for RefValue {
    fn deserialize(reader: &mut dyn BufRead) -> DsvcResult<Self> {
        let mut s = String::new();
        reader.read_to_string(&mut s)?;
        s.trim().parse()
    }
}

impl FromStr for RefValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> DsvcResult<Self> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("ref: ") {
            return Ok(Self::Symbolic(path.to_owned()));
        }
        Ok(Self::Direct(Oid::from_str(s)?))
    }
}

/// resolves and updates loose ref files rooted at a repo's control directory.
pub struct RefDb {
    control_dir: PathBuf,
}

impl RefDb {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self { control_dir: control_dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        if name == "HEAD" { self.control_dir.join("HEAD") } else { self.control_dir.join(name) }
    }

    /// reads the raw (possibly symbolic) value stored at `name`, without
    /// following symbolic links.
    pub fn read(&self, name: &str) -> DsvcResult<Option<RefValue>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(Some(contents.trim().parse()?))
    }

    /// follows symbolic refs until a direct oid is reached.
    pub fn resolve(&self, name: &str) -> DsvcResult<Oid> {
        let mut current = name.to_owned();
        for _ in 0..32 {
            match self.read(&current)? {
                Some(RefValue::Direct(oid)) => return Ok(oid),
                Some(RefValue::Symbolic(target)) => current = target,
                None => anyhow::bail!(CoreError::NotFound(name.to_owned())),
            }
        }
        anyhow::bail!(CoreError::Bug(format!("symbolic ref cycle starting at `{}`", name)))
    }

    pub fn write(&self, name: &str, value: RefValue) -> DsvcResult<()> {
        anyhow::ensure!(
            name == "HEAD" || is_valid_branch_name(name.trim_start_matches("refs/heads/")),
            CoreError::ValueError(format!("invalid ref name `{}`", name))
        );
        let path = self.path_for(name);
        Lockfile::write_all_atomic(&path, format!("{}\n", value).as_bytes())
    }

    pub fn update_direct(&self, name: &str, oid: Oid) -> DsvcResult<()> {
        self.write(name, RefValue::Direct(oid))
    }

    pub fn delete(&self, name: &str) -> DsvcResult<()> {
        let path = self.path_for(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn branch_ref_name(branch: &str) -> String {
        format!("refs/heads/{}", branch)
    }

    /// `HEAD`'s target branch name, if it is symbolic (the common case).
    pub fn current_branch(&self) -> DsvcResult<Option<String>> {
        match self.read("HEAD")? {
            Some(RefValue::Symbolic(path)) => {
                Ok(path.strip_prefix("refs/heads/").map(str::to_owned))
            }
            _ => Ok(None),
        }
    }

    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_branch_names() {
        assert!(!is_valid_branch_name(".hidden"));
        assert!(!is_valid_branch_name("a..b"));
        assert!(!is_valid_branch_name("a.lock"));
        assert!(is_valid_branch_name("feature/x"));
    }

    #[test]
    fn write_then_resolve_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let refdb = RefDb::new(dir.path());
        let oid = Oid::from_str("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        refdb.update_direct("refs/heads/master", oid).unwrap();
        refdb.write("HEAD", RefValue::Symbolic("refs/heads/master".into())).unwrap();
        assert_eq!(refdb.resolve("HEAD").unwrap(), oid);
        assert_eq!(refdb.current_branch().unwrap().as_deref(), Some("master"));
    }
}
