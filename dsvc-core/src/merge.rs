//! three-way merge (spec §4.5): fast-forward detection, merge-base
//! computation, and diff-algebra-based combination of two diverging
//! histories into either a fast-forward, a clean merge commit, or a
//! conflict index left for later resolution.
//!
//! grounded in the teacher's merge-base walk (`mergebase.rs`, itself ported
//! from `libbit/src/merge.rs`) for history traversal, but the actual merge
//! step is new: the teacher merges worktree files with `xdiff`, this merges
//! structured feature diffs through [`crate::diff::DatasetDiff::concat`].

use crate::diff::{DatasetDiff, RepoDiff};
use crate::error::{CoreError, DsvcResult};
use crate::feature::{Feature, Pk};
use crate::hash::Oid;
use crate::mergebase::{merge_base, reachable};
use crate::obj::Commit;
use crate::repo::{RepoPkFilter, Repository};
use crate::rev::Revspec;
use crate::state::{ConflictEntry, ConflictSide, MergeIndex};
use std::collections::BTreeSet;

/// how a possible fast-forward should be handled (spec §4.5.2, the CLI's
/// `--ff`/`--ff-only`/`--no-ff` flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfMode {
    /// fast-forward when possible, otherwise merge commit (the default).
    Allow,
    /// fail unless a fast-forward is possible.
    FfOnly,
    /// always create a merge commit, even when a fast-forward is possible.
    NoFf,
}

/// the result of a [`Repository::merge`] call, including the `--dry-run`
/// variants that report what *would* happen without mutating anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    WouldFastForward(Oid),
    FastForward(Oid),
    WouldMerge,
    Merged(Oid),
    WouldConflict(usize),
    Conflicts(usize),
}

impl MergeOutcome {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::WouldFastForward(..) | Self::WouldMerge | Self::WouldConflict(..))
    }
}

impl<'s> Repository<'s> {
    /// merges `their_rev` into the current branch (spec §4.5): already up to
    /// date, fast-forward, clean merge commit, or a persisted conflict index
    /// awaiting `merge --continue`/`merge --abort`. `dry_run` computes and
    /// reports the outcome without writing anything.
    pub fn merge(
        &self,
        their_rev: &Revspec,
        ff: FfMode,
        message: Option<String>,
        dry_run: bool,
    ) -> DsvcResult<MergeOutcome> {
        self.merge_state().ensure_normal()?;

        let store = self.store();
        let ours = self.head_oid()?;
        let theirs = self.resolve_to_oid(their_rev)?;

        if reachable(store, theirs, ours)? {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let can_ff = reachable(store, ours, theirs)?;
        if ff == FfMode::FfOnly && !can_ff {
            anyhow::bail!(CoreError::InvalidOperation(
                "not a fast-forward merge, and `--ff-only` was requested".to_owned()
            ));
        }

        if can_ff && ff != FfMode::NoFf {
            if dry_run {
                return Ok(MergeOutcome::WouldFastForward(theirs));
            }
            self.move_branch_to(theirs)?;
            return Ok(MergeOutcome::FastForward(theirs));
        }

        let base = merge_base(store, ours, theirs)?.ok_or_else(|| {
            anyhow::anyhow!(CoreError::InvalidOperation(format!(
                "`{}` and current branch share no common history",
                their_rev
            )))
        })?;
        let base_view = self.lookup_oid(base)?;
        let ours_view = self.lookup_oid(ours)?;
        let theirs_view = self.lookup_oid(theirs)?;

        let diff_ours = self.repo_diff(&base_view, &ours_view, &RepoPkFilter::Unfiltered)?;
        let diff_theirs = self.repo_diff(&base_view, &theirs_view, &RepoPkFilter::Unfiltered)?;

        let (clean, conflicts) = concat_collecting_conflicts(&diff_ours, &diff_theirs)?;

        if conflicts.is_empty() {
            if dry_run {
                return Ok(MergeOutcome::WouldMerge);
            }
            let message = message.unwrap_or_else(|| self.default_merge_message(their_rev));
            let commit_oid = self.commit_merge(base, &clean, ours, theirs, message)?;
            return Ok(MergeOutcome::Merged(commit_oid));
        }

        if dry_run {
            return Ok(MergeOutcome::WouldConflict(conflicts.len()));
        }

        let entries = conflicts
            .into_iter()
            .map(|(dataset_path, pk)| {
                let ours_ds_diff = diff_ours.get(&dataset_path).expect("conflicting dataset must appear in ours diff");
                let theirs_ds_diff =
                    diff_theirs.get(&dataset_path).expect("conflicting dataset must appear in theirs diff");
                let (base_feature, ours_feature) = feature_state(ours_ds_diff, &pk);
                let (_, theirs_feature) = feature_state(theirs_ds_diff, &pk);
                ConflictEntry {
                    dataset_path,
                    pk,
                    sides: ConflictSide { base: base_feature, ours: ours_feature, theirs: theirs_feature },
                    resolution: None,
                }
            })
            .collect::<Vec<_>>();
        let conflict_count = entries.len();
        let index = MergeIndex { clean, conflicts: entries };

        let message = message.unwrap_or_else(|| self.default_merge_message(their_rev));
        self.merge_state().start(theirs, &their_rev.to_string(), &message, &index)?;
        Ok(MergeOutcome::Conflicts(conflict_count))
    }

    /// resumes a merge left mid-way by a previous [`Repository::merge`] call,
    /// once every conflict in `MERGE_INDEX` carries a resolution. fails
    /// `CoreError::Conflict` (same as the initial merge attempt) if any
    /// conflict remains unresolved.
    pub fn merge_continue(&self) -> DsvcResult<Oid> {
        let state = self.merge_state();
        state.ensure_merging()?;

        let index = state
            .merge_index()?
            .ok_or_else(|| anyhow::anyhow!(CoreError::Bug("MERGE_HEAD exists but MERGE_INDEX is missing".to_owned())))?;
        let theirs = state
            .merge_head()?
            .ok_or_else(|| anyhow::anyhow!(CoreError::Bug("MERGE_HEAD exists but is unreadable".to_owned())))?;
        let message = state.merge_msg()?.unwrap_or_else(|| "Merge".to_owned());
        let ours = self.head_oid()?;

        let diff = index.into_resolved_diff()?;

        let base = merge_base(self.store(), ours, theirs)?.ok_or_else(|| {
            anyhow::anyhow!(CoreError::Bug("merge base vanished between merge and merge --continue".to_owned()))
        })?;

        let commit_oid = self.commit_merge(base, &diff, ours, theirs, message)?;
        state.clear()?;
        Ok(commit_oid)
    }

    /// discards an in-progress merge, clearing all four persisted files and
    /// leaving `HEAD` untouched.
    pub fn merge_abort(&self) -> DsvcResult<()> {
        let state = self.merge_state();
        state.ensure_merging()?;
        state.clear()
    }

    /// `Merge branch "<their_name>" into <our_name>` (spec §4.5 step 6);
    /// `our_name` falls back to `HEAD` when the current branch is detached.
    fn default_merge_message(&self, their_rev: &Revspec) -> String {
        let our_name = self.refs().current_branch().ok().flatten().unwrap_or_else(|| "HEAD".to_owned());
        format!("Merge branch \"{}\" into {}", their_rev, our_name)
    }

    fn commit_merge(
        &self,
        base: Oid,
        diff: &RepoDiff,
        ours: Oid,
        theirs: Oid,
        message: impl Into<String>,
    ) -> DsvcResult<Oid> {
        let base_view = self.lookup_oid(base)?;
        let new_tree = self.apply_diff_to_tree(&base_view, diff)?;

        let author = self.default_signature()?;
        let committer = self.default_signature()?;
        let commit = Commit { tree: new_tree, parents: vec![ours, theirs], author, committer, message: message.into() };
        let commit_oid = self.store().create_commit(&commit)?;
        self.move_branch_to(commit_oid)?;
        Ok(commit_oid)
    }
}

/// per-dataset concatenation of two base-relative diffs, collecting
/// conflicting `(dataset_path, pk)` pairs instead of bailing (unlike
/// [`RepoDiff::concat`], which a three-way merge can't use directly: it needs
/// to inspect conflicts before deciding whether to commit or persist them).
fn concat_collecting_conflicts(ours: &RepoDiff, theirs: &RepoDiff) -> DsvcResult<(RepoDiff, Vec<(String, Pk)>)> {
    let mut clean = RepoDiff::new();
    let mut conflicts = vec![];

    let paths: BTreeSet<&str> = ours.iter().map(|(p, _)| p).chain(theirs.iter().map(|(p, _)| p)).collect();
    for path in paths {
        let merged = match (ours.get(path), theirs.get(path)) {
            (Some(a), Some(b)) => {
                let (merged, ds_conflicts) = a.concat(b)?;
                for pk_str in ds_conflicts {
                    let pk = a
                        .touched_pks()
                        .into_iter()
                        .chain(b.touched_pks())
                        .find(|pk| pk.to_string() == pk_str)
                        .expect("a conflicting pk must be touched by at least one side");
                    conflicts.push((path.to_owned(), pk));
                }
                merged
            }
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => unreachable!("path came from the union of both diffs' dataset sets"),
        };
        clean.insert(path.to_owned(), merged);
    }
    Ok((clean, conflicts))
}

/// the `(base, new)` feature state a base-relative [`DatasetDiff`] records
/// for `pk`. only meaningful for a pk the diff actually touches.
fn feature_state(diff: &DatasetDiff, pk: &Pk) -> (Option<Feature>, Option<Feature>) {
    if let Some(new) = diff.inserts.get(pk) {
        return (None, Some(new.clone()));
    }
    if let Some(u) = diff.updates.get(pk) {
        return (Some(u.old.clone()), Some(u.new.clone()));
    }
    if let Some(old) = diff.deletes.get(pk) {
        return (Some(old.clone()), None);
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Column, Feature, Schema};
    use crate::obj::{Commit, FileMode};
    use crate::odb::{MemoryObjectStore, ObjectStore, TreeIndex};
    use crate::path::RepoPath;
    use crate::pk::{self, SchemaVersion};
    use crate::refs::RefValue;
    use crate::signature::{EpochTime, Signature, TzOffset};
    use crate::value::Value;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                Column { name: "fid".into(), type_name: "integer".into() },
                Column { name: "name".into(), type_name: "text".into() },
            ],
            pk_column: 0,
            geometry_column: None,
        }
    }

    fn feature(v: i64) -> Feature {
        let mut f = Feature::new();
        f.set("fid", Value::Integer(v)).set("name", Value::Text(format!("row{}", v)));
        f
    }

    fn seed_tree(store: &MemoryObjectStore, pks: &[i64]) -> Oid {
        let mut table_index = TreeIndex::default();
        for &pk in pks {
            let path = pk::encode_pk_to_path(SchemaVersion::V1, &Pk::Integer(pk));
            let rel = path.strip_prefix(RepoPath::SNO_TABLE).unwrap();
            let bytes = serde_json::to_vec(&feature(pk)).unwrap();
            let oid = store.create_blob(bytes).unwrap();
            table_index.add(rel.to_owned(), FileMode::Blob, oid);
        }
        table_index.add("meta/version", FileMode::Blob, store.create_blob(b"1".to_vec()).unwrap());
        table_index
            .add("meta/schema.json", FileMode::Blob, store.create_blob(serde_json::to_vec(&schema()).unwrap()).unwrap());
        let table_oid = table_index.write_tree(store).unwrap();

        let mut ds_index = TreeIndex::default();
        ds_index.add(RepoPath::SNO_TABLE, FileMode::Tree, table_oid);
        let ds_root = ds_index.write_tree(store).unwrap();

        let mut repo_index = TreeIndex::default();
        repo_index.add("widgets".to_owned(), FileMode::Tree, ds_root);
        repo_index.write_tree(store).unwrap()
    }

    fn sig() -> Signature {
        Signature { name: "t".into(), email: "t@example.com".into(), time: EpochTime::new(0), offset: TzOffset::new(0) }
    }

    fn seed_repo(pks: &[i64]) -> (MemoryObjectStore, Oid) {
        let store = MemoryObjectStore::new();
        let tree = seed_tree(&store, pks);
        let commit =
            store.create_commit(&Commit { tree, parents: vec![], author: sig(), committer: sig(), message: "base".into() }).unwrap();
        (store, commit)
    }

    fn repo_at<'s>(store: &'s MemoryObjectStore, dir: &tempfile::TempDir, head: Oid) -> Repository<'s> {
        let repo = Repository::new(store, dir.path());
        repo.refs().update_direct("refs/heads/master", head).unwrap();
        repo.refs().write("HEAD", RefValue::Symbolic("refs/heads/master".into())).unwrap();
        crate::config::Config::new(dir.path()).set(false, "user.name", "Tess").unwrap();
        crate::config::Config::new(dir.path()).set(false, "user.email", "tess@example.com").unwrap();
        repo
    }

    #[test]
    fn fast_forward_when_theirs_descends_from_ours() {
        let (store, base) = seed_repo(&[1, 2]);
        let tree2 = seed_tree(&store, &[1, 2, 3]);
        let theirs =
            store.create_commit(&Commit { tree: tree2, parents: vec![base], author: sig(), committer: sig(), message: "c2".into() }).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = repo_at(&store, &dir, base);

        let outcome = repo.merge(&"master".parse().unwrap(), FfMode::Allow, None, false).unwrap();
        assert_eq!(outcome, MergeOutcome::AlreadyUpToDate); // theirs == ours here, nothing to merge

        let other_branch = "refs/heads/feature";
        repo.refs().update_direct(other_branch, theirs).unwrap();
        let outcome = repo.merge(&"feature".parse().unwrap(), FfMode::Allow, None, false).unwrap();
        assert!(matches!(outcome, MergeOutcome::FastForward(oid) if oid == theirs));
        assert_eq!(repo.head_oid().unwrap(), theirs);
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let (store, base) = seed_repo(&[1, 2]);

        let ours_tree = seed_tree(&store, &[1, 2, 3]);
        let ours =
            store.create_commit(&Commit { tree: ours_tree, parents: vec![base], author: sig(), committer: sig(), message: "ours".into() }).unwrap();

        let theirs_tree = seed_tree(&store, &[1, 2, 4]);
        let theirs = store
            .create_commit(&Commit { tree: theirs_tree, parents: vec![base], author: sig(), committer: sig(), message: "theirs".into() })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = repo_at(&store, &dir, ours);
        repo.refs().update_direct("refs/heads/feature", theirs).unwrap();

        let outcome = repo.merge(&"feature".parse().unwrap(), FfMode::Allow, None, false).unwrap();
        let commit_oid = match outcome {
            MergeOutcome::Merged(oid) => oid,
            other => panic!("expected a clean merge, got {:?}", other),
        };

        let view = repo.lookup_oid(commit_oid).unwrap();
        let ds = view.get("widgets").unwrap().unwrap();
        assert_eq!(ds.iter_features(&store).unwrap().len(), 4);
        assert_eq!(repo.repo_state(), crate::state::RepoState::Normal);

        let commit = store.read_commit(commit_oid).unwrap();
        assert_eq!(commit.message, "Merge branch \"feature\" into master");
    }

    #[test]
    fn conflicting_edits_persist_merge_state() {
        let (store, base) = seed_repo(&[1]);

        let mut ours_table = TreeIndex::default();
        let path = pk::encode_pk_to_path(SchemaVersion::V1, &Pk::Integer(1));
        let rel = path.strip_prefix(RepoPath::SNO_TABLE).unwrap();
        let mut ours_feature = feature(1);
        ours_feature.set("name", Value::Text("ours".into()));
        ours_table.add(rel.to_owned(), FileMode::Blob, store.create_blob(serde_json::to_vec(&ours_feature).unwrap()).unwrap());
        ours_table.add("meta/version", FileMode::Blob, store.create_blob(b"1".to_vec()).unwrap());
        ours_table
            .add("meta/schema.json", FileMode::Blob, store.create_blob(serde_json::to_vec(&schema()).unwrap()).unwrap());
        let ours_table_oid = ours_table.write_tree(&store).unwrap();
        let mut ours_ds_index = TreeIndex::default();
        ours_ds_index.add(RepoPath::SNO_TABLE, FileMode::Tree, ours_table_oid);
        let ours_ds_root = ours_ds_index.write_tree(&store).unwrap();
        let mut ours_repo_index = TreeIndex::default();
        ours_repo_index.add("widgets".to_owned(), FileMode::Tree, ours_ds_root);
        let ours_tree = ours_repo_index.write_tree(&store).unwrap();
        let ours = store
            .create_commit(&Commit { tree: ours_tree, parents: vec![base], author: sig(), committer: sig(), message: "ours".into() })
            .unwrap();

        let mut theirs_table = TreeIndex::default();
        let mut theirs_feature = feature(1);
        theirs_feature.set("name", Value::Text("theirs".into()));
        theirs_table
            .add(rel.to_owned(), FileMode::Blob, store.create_blob(serde_json::to_vec(&theirs_feature).unwrap()).unwrap());
        theirs_table.add("meta/version", FileMode::Blob, store.create_blob(b"1".to_vec()).unwrap());
        theirs_table
            .add("meta/schema.json", FileMode::Blob, store.create_blob(serde_json::to_vec(&schema()).unwrap()).unwrap());
        let theirs_table_oid = theirs_table.write_tree(&store).unwrap();
        let mut theirs_ds_index = TreeIndex::default();
        theirs_ds_index.add(RepoPath::SNO_TABLE, FileMode::Tree, theirs_table_oid);
        let theirs_ds_root = theirs_ds_index.write_tree(&store).unwrap();
        let mut theirs_repo_index = TreeIndex::default();
        theirs_repo_index.add("widgets".to_owned(), FileMode::Tree, theirs_ds_root);
        let theirs_tree = theirs_repo_index.write_tree(&store).unwrap();
        let theirs = store
            .create_commit(&Commit { tree: theirs_tree, parents: vec![base], author: sig(), committer: sig(), message: "theirs".into() })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = repo_at(&store, &dir, ours);
        repo.refs().update_direct("refs/heads/feature", theirs).unwrap();

        let outcome = repo.merge(&"feature".parse().unwrap(), FfMode::Allow, None, false).unwrap();
        assert_eq!(outcome, MergeOutcome::Conflicts(1));
        assert_eq!(repo.repo_state(), crate::state::RepoState::Merging);

        // resolve by accepting theirs, then continue
        let mut index = repo.merge_state().merge_index().unwrap().unwrap();
        index.conflicts[0].resolution = Some(crate::state::Resolution::UseTheirs);
        repo.merge_state().write_index(&index).unwrap();

        let commit_oid = repo.merge_continue().unwrap();
        assert_eq!(repo.repo_state(), crate::state::RepoState::Normal);
        let view = repo.lookup_oid(commit_oid).unwrap();
        let merged_feature = view.get("widgets").unwrap().unwrap().get_feature(&store, &Pk::Integer(1)).unwrap();
        assert_eq!(merged_feature, theirs_feature);
    }

    #[test]
    fn abort_clears_state_without_committing() {
        let (store, base) = seed_repo(&[1]);
        let ours_tree = seed_tree(&store, &[1, 2]);
        let ours =
            store.create_commit(&Commit { tree: ours_tree, parents: vec![base], author: sig(), committer: sig(), message: "ours".into() }).unwrap();
        let theirs_tree = seed_tree(&store, &[1, 3]);
        let theirs = store
            .create_commit(&Commit { tree: theirs_tree, parents: vec![base], author: sig(), committer: sig(), message: "theirs".into() })
            .unwrap();

        // force a conflict: both sides insert distinct new rows under the same dataset
        // but we also directly fabricate a conflicting update to exercise --abort.
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_at(&store, &dir, ours);
        repo.refs().update_direct("refs/heads/feature", theirs).unwrap();

        // these two diverge without conflicting, so force Merging state manually to test abort in isolation
        repo.merge_state().start(theirs, "feature", "Merge", &MergeIndex::default()).unwrap();
        assert_eq!(repo.repo_state(), crate::state::RepoState::Merging);
        repo.merge_abort().unwrap();
        assert_eq!(repo.repo_state(), crate::state::RepoState::Normal);
        assert_eq!(repo.head_oid().unwrap(), ours);
    }
}
