//! repository-relative paths.
//!
//! the teacher interns paths into a global, `'static`, `Copy` arena for
//! performance on worktree-scale directory walks. this crate never walks
//! anywhere near that scale (a handful of dataset roots, not millions of
//! working-tree files), so `RepoPath` is just a thin `String` wrapper -
//! simpler to reason about and perfectly adequate here.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoPath(String);

impl RepoPath {
    pub const SNO_TABLE: &'static str = ".sno-table";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn join(&self, segment: impl AsRef<str>) -> Self {
        if self.0.is_empty() {
            Self(segment.as_ref().to_owned())
        } else {
            Self(format!("{}/{}", self.0, segment.as_ref()))
        }
    }

    /// splits off the first path component, returning (head, rest)
    pub fn split_first(&self) -> (&str, Option<&str>) {
        match self.0.split_once('/') {
            Some((head, rest)) => (head, Some(rest)),
            None => (&self.0, None),
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix).map(|rest| rest.strip_prefix('/').unwrap_or(rest))
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0 == prefix || self.0.starts_with(&format!("{}/", prefix))
    }
}

impl Borrow<str> for RepoPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for RepoPath {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RepoPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for RepoPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for RepoPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_builds_slash_separated_path() {
        let p = RepoPath::new("widgets").join(RepoPath::SNO_TABLE).join("meta");
        assert_eq!(p.as_str(), "widgets/.sno-table/meta");
    }

    #[test]
    fn strip_prefix_drops_separator() {
        let p = RepoPath::new("widgets/.sno-table/meta/schema.json");
        assert_eq!(p.strip_prefix("widgets/.sno-table"), Some("meta/schema.json"));
    }
}
