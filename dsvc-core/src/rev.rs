//! revision and diff-spec grammar (spec §4.3/§6/§10.5).
//!
//! `Revspec` covers `<ref>`, `<rev>^<n>?` (nth parent) and `<rev>~<n>?` (nth
//! first-parent ancestor), grounded in the teacher's hand-rolled recursive
//! parser (`libbit/src/rev.rs`) but without its reflog (`@{n}`) and partial-oid
//! syntax, neither of which this spec's surface needs. `DiffSpec` is new:
//! the `A..B` / `A...B` range grammar the teacher never had (it has no diff
//! subcommand operating over revision ranges).

use crate::error::{CoreError, DsvcGenericError, DsvcResult};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Revspec {
    /// a bare ref name, branch name, or hex oid string
    Name(String),
    /// `<rev>^<n>` - the n-th parent (n defaults to 1)
    Parent(Box<Revspec>, usize),
    /// `<rev>~<n>` - the n-th generation first-parent ancestor
    Ancestor(Box<Revspec>, usize),
}

impl Revspec {
    pub const HEAD: &'static str = "HEAD";

    pub fn head() -> Self {
        Self::Name(Self::HEAD.to_owned())
    }
}

impl Display for Revspec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Revspec::Name(s) => write!(f, "{}", s),
            Revspec::Parent(inner, 1) => write!(f, "{}^", inner),
            Revspec::Parent(inner, n) => write!(f, "{}^{}", inner, n),
            Revspec::Ancestor(inner, 1) => write!(f, "{}~", inner),
            Revspec::Ancestor(inner, n) => write!(f, "{}~{}", inner, n),
        }
    }
}

impl FromStr for Revspec {
    type Err = DsvcGenericError;

    fn from_str(s: &str) -> DsvcResult<Self> {
        anyhow::ensure!(!s.is_empty(), CoreError::InvalidOperation("empty revspec".to_owned()));
        parse_suffixes(s)
    }
}

/// peels trailing `^<n>`/`~<n>` suffixes off the back of the string, innermost
/// (leftmost) first, so `a^2~3` parses as `Ancestor(Parent(Name("a"), 2), 3)`.
fn parse_suffixes(s: &str) -> DsvcResult<Revspec> {
    if let Some(idx) = s.rfind(['^', '~']) {
        let (head, suffix) = s.split_at(idx);
        let marker = &suffix[..1];
        let digits = &suffix[1..];
        let n = if digits.is_empty() {
            1
        } else {
            digits.parse().map_err(|_| anyhow::anyhow!("invalid revspec suffix `{}`", suffix))?
        };
        let inner = parse_suffixes(head)?;
        return Ok(match marker {
            "^" => Revspec::Parent(Box::new(inner), n),
            _ => Revspec::Ancestor(Box::new(inner), n),
        });
    }
    Ok(Revspec::Name(s.to_owned()))
}

/// `A..B` / `A...B`, with either side defaulting to `HEAD` (spec §4.3/§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffSpec {
    /// `A..B` diffs `merge_base(A, B)` against `B`
    TwoDot(Revspec, Revspec),
    /// `A...B` diffs `A` against `B` directly
    ThreeDot(Revspec, Revspec),
    /// a single rev with no range operator: diffs it against the working copy
    Single(Revspec),
}

impl FromStr for DiffSpec {
    type Err = DsvcGenericError;

    fn from_str(s: &str) -> DsvcResult<Self> {
        let side = |s: &str| -> DsvcResult<Revspec> {
            if s.is_empty() { Ok(Revspec::head()) } else { s.parse() }
        };

        // look for the longest run of dots first so `...` isn't misread as `..` + `.`
        if let Some(idx) = s.find("...") {
            let (a, b) = (&s[..idx], &s[idx + 3..]);
            return Ok(Self::ThreeDot(side(a)?, side(b)?));
        }
        if let Some(idx) = s.find("..") {
            let (a, b) = (&s[..idx], &s[idx + 2..]);
            return Ok(Self::TwoDot(side(a)?, side(b)?));
        }
        Ok(Self::Single(side(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_name() {
        assert_eq!("master".parse::<Revspec>().unwrap(), Revspec::Name("master".into()));
    }

    #[test]
    fn parses_parent_and_ancestor_suffixes() {
        assert_eq!(
            "master^2".parse::<Revspec>().unwrap(),
            Revspec::Parent(Box::new(Revspec::Name("master".into())), 2)
        );
        assert_eq!(
            "master~3".parse::<Revspec>().unwrap(),
            Revspec::Ancestor(Box::new(Revspec::Name("master".into())), 3)
        );
        assert_eq!(
            "master^~2".parse::<Revspec>().unwrap(),
            Revspec::Ancestor(Box::new(Revspec::Parent(Box::new(Revspec::Name("master".into())), 1)), 2)
        );
    }

    #[test]
    fn two_dot_vs_three_dot() {
        assert_eq!(
            "master..branch".parse::<DiffSpec>().unwrap(),
            DiffSpec::TwoDot(Revspec::Name("master".into()), Revspec::Name("branch".into()))
        );
        assert_eq!(
            "master...branch".parse::<DiffSpec>().unwrap(),
            DiffSpec::ThreeDot(Revspec::Name("master".into()), Revspec::Name("branch".into()))
        );
    }

    #[test]
    fn empty_side_defaults_to_head() {
        assert_eq!(
            "master..".parse::<DiffSpec>().unwrap(),
            DiffSpec::TwoDot(Revspec::Name("master".into()), Revspec::head())
        );
    }
}
