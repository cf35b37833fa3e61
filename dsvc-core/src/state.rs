//! persisted merge state (spec §4.5.4): which merge is in progress, and
//! which conflicts it left behind awaiting resolution. grounded in the
//! teacher's `RepoState`/`MERGE_HEAD` (`libbit/src/repo.rs`): repo state is
//! derived from file presence under the control directory, not tracked in
//! memory, so a crash mid-merge leaves the repository in a state a later
//! process can still inspect.

use crate::error::{CoreError, DsvcResult};
use crate::feature::{Feature, Pk};
use crate::hash::Oid;
use crate::lockfile::Lockfile;
use crate::repo::Repository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const MERGE_HEAD: &str = "MERGE_HEAD";
const MERGE_BRANCH: &str = "MERGE_BRANCH";
const MERGE_MSG: &str = "MERGE_MSG";
const MERGE_INDEX: &str = "MERGE_INDEX";

/// whether a repository is mid-merge. derived from `MERGE_HEAD`'s presence,
/// mirroring the teacher's `repo_state()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Normal,
    Merging,
}

/// one side of a conflicting change to a single feature, recorded so a
/// resolution can be applied without re-reading the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSide {
    pub base: Option<Feature>,
    pub ours: Option<Feature>,
    pub theirs: Option<Feature>,
}

/// a single conflicting primary key within one dataset, plus (once the
/// caller has decided) how it should be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub dataset_path: String,
    pub pk: Pk,
    pub sides: ConflictSide,
    pub resolution: Option<Resolution>,
}

/// how a conflicting feature is to be resolved: keep one side verbatim, or
/// replace it with caller-supplied content (`None` meaning "delete").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Resolution {
    UseOurs,
    UseTheirs,
    Manual(Option<Feature>),
}

/// the persisted `MERGE_INDEX`: every conflict from a stalled merge, plus
/// the diff already merged cleanly (so `merge --continue` doesn't have to
/// recompute the whole three-way merge, only splice in resolutions).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeIndex {
    pub clean: crate::diff::RepoDiff,
    pub conflicts: Vec<ConflictEntry>,
}

impl MergeIndex {
    pub fn is_fully_resolved(&self) -> bool {
        self.conflicts.iter().all(|c| c.resolution.is_some())
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &ConflictEntry> {
        self.conflicts.iter().filter(|c| c.resolution.is_none())
    }

    /// folds every resolution into `clean`, producing the [`crate::diff::RepoDiff`]
    /// ready to pass to [`Repository::commit`]. fails if any conflict is
    /// still unresolved.
    pub fn into_resolved_diff(self) -> DsvcResult<crate::diff::RepoDiff> {
        let unresolved: Vec<_> = self.conflicts.iter().filter(|c| c.resolution.is_none()).map(|c| {
            format!("{}:{}", c.dataset_path, c.pk)
        }).collect();
        if !unresolved.is_empty() {
            anyhow::bail!(CoreError::Conflict(unresolved.into_iter().collect()));
        }

        let mut out = self.clean;
        let mut by_dataset: BTreeMap<String, crate::diff::DatasetDiff> = BTreeMap::new();
        for entry in self.conflicts {
            let resolved = match entry.resolution.unwrap() {
                Resolution::UseOurs => entry.sides.ours,
                Resolution::UseTheirs => entry.sides.theirs,
                Resolution::Manual(feature) => feature,
            };
            let ds_diff = by_dataset.entry(entry.dataset_path).or_default();
            match (entry.sides.base, resolved) {
                (None, Some(new)) => {
                    ds_diff.inserts.insert(entry.pk, new);
                }
                (Some(old), Some(new)) if old != new => {
                    ds_diff.updates.insert(entry.pk.clone(), crate::diff::Update { new_pk: entry.pk, old, new });
                }
                (Some(_), Some(_)) => {} // resolved back to the base value -> noop
                (Some(old), None) => {
                    ds_diff.deletes.insert(entry.pk, old);
                }
                (None, None) => {} // never existed, resolved to absent -> noop
            }
        }
        for (path, diff) in by_dataset {
            out.insert(path, diff);
        }
        Ok(out)
    }
}

/// manages the four persisted files under a repository's control directory
/// that record an in-progress merge.
pub struct MergeState {
    control_dir: PathBuf,
}

impl MergeState {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self { control_dir: control_dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.control_dir.join(name)
    }

    pub fn repo_state(&self) -> RepoState {
        if self.path(MERGE_HEAD).exists() { RepoState::Merging } else { RepoState::Normal }
    }

    pub fn ensure_normal(&self) -> DsvcResult<()> {
        anyhow::ensure!(
            self.repo_state() == RepoState::Normal,
            CoreError::InvalidOperation("a merge is already in progress (see MERGE_HEAD)".to_owned())
        );
        Ok(())
    }

    pub fn ensure_merging(&self) -> DsvcResult<()> {
        anyhow::ensure!(
            self.repo_state() == RepoState::Merging,
            CoreError::InvalidOperation("no merge is in progress".to_owned())
        );
        Ok(())
    }

    pub fn merge_head(&self) -> DsvcResult<Option<Oid>> {
        read_optional(&self.path(MERGE_HEAD))?.map(|s| Oid::from_str(s.trim())).transpose()
    }

    pub fn merge_branch(&self) -> DsvcResult<Option<String>> {
        read_optional(&self.path(MERGE_BRANCH))
    }

    pub fn merge_msg(&self) -> DsvcResult<Option<String>> {
        read_optional(&self.path(MERGE_MSG))
    }

    pub fn merge_index(&self) -> DsvcResult<Option<MergeIndex>> {
        match read_optional(&self.path(MERGE_INDEX))? {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// begins a merge: writes all four files, entering `RepoState::Merging`.
    pub fn start(&self, their_head: Oid, their_branch: &str, message: &str, index: &MergeIndex) -> DsvcResult<()> {
        self.ensure_normal()?;
        Lockfile::write_all_atomic(self.path(MERGE_HEAD), format!("{}\n", their_head).as_bytes())?;
        Lockfile::write_all_atomic(self.path(MERGE_BRANCH), their_branch.as_bytes())?;
        Lockfile::write_all_atomic(self.path(MERGE_MSG), message.as_bytes())?;
        self.write_index(index)
    }

    pub fn write_index(&self, index: &MergeIndex) -> DsvcResult<()> {
        Lockfile::write_all_atomic(self.path(MERGE_INDEX), serde_json::to_vec_pretty(index)?.as_slice())
    }

    /// clears all four files, returning to `RepoState::Normal`. used by both
    /// a successful `merge --continue` and `merge --abort`.
    pub fn clear(&self) -> DsvcResult<()> {
        for name in [MERGE_HEAD, MERGE_BRANCH, MERGE_MSG, MERGE_INDEX] {
            let path = self.path(name);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn read_optional(path: &Path) -> DsvcResult<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(std::fs::read_to_string(path)?))
}

impl<'s> Repository<'s> {
    pub fn merge_state(&self) -> MergeState {
        MergeState::new(self.refs().control_dir())
    }

    pub fn repo_state(&self) -> RepoState {
        self.merge_state().repo_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn feature(v: i64) -> Feature {
        let mut f = Feature::new();
        f.set("fid", Value::Integer(v));
        f
    }

    #[test]
    fn starts_in_normal_state_and_transitions_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let state = MergeState::new(dir.path());
        assert_eq!(state.repo_state(), RepoState::Normal);

        let head = Oid::EMPTY_BLOB;
        state.start(head, "feature", "Merge branch 'feature'", &MergeIndex::default()).unwrap();
        assert_eq!(state.repo_state(), RepoState::Merging);
        assert_eq!(state.merge_head().unwrap(), Some(head));
        assert_eq!(state.merge_branch().unwrap().as_deref(), Some("feature"));

        state.clear().unwrap();
        assert_eq!(state.repo_state(), RepoState::Normal);
    }

    #[test]
    fn into_resolved_diff_rejects_unresolved_conflicts() {
        let mut index = MergeIndex::default();
        index.conflicts.push(ConflictEntry {
            dataset_path: "widgets".into(),
            pk: Pk::Integer(1),
            sides: ConflictSide { base: Some(feature(1)), ours: Some(feature(2)), theirs: Some(feature(3)) },
            resolution: None,
        });
        assert!(index.into_resolved_diff().is_err());
    }

    #[test]
    fn into_resolved_diff_applies_use_theirs() {
        let mut index = MergeIndex::default();
        index.conflicts.push(ConflictEntry {
            dataset_path: "widgets".into(),
            pk: Pk::Integer(1),
            sides: ConflictSide { base: Some(feature(1)), ours: Some(feature(2)), theirs: Some(feature(3)) },
            resolution: Some(Resolution::UseTheirs),
        });
        let diff = index.into_resolved_diff().unwrap();
        let ds_diff = diff.get("widgets").unwrap();
        assert_eq!(
            ds_diff.updates.get(&Pk::Integer(1)),
            Some(&crate::diff::Update { new_pk: Pk::Integer(1), old: feature(1), new: feature(3) })
        );
    }
}
