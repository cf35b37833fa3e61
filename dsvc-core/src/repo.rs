//! the repository view (spec §4.3): enumerates datasets inside a tree,
//! resolves refs/commits/trees to a view, combines per-dataset diffs into a
//! repository diff, and produces new commits from a working-copy diff.
//!
//! grounded in the teacher's `BitRepo`/revision-walking split (`repo.rs`,
//! `rev.rs`) for the shape of ref resolution, but the dataset-discovery walk
//! and the diff/commit operations are new - the teacher has no notion of a
//! dataset living at an arbitrary tree path.

use crate::config::Config;
use crate::dataset::{Dataset, PkFilter};
use crate::diff::{DatasetDiff, RepoDiff};
use crate::error::{CoreError, DsvcResult};
use crate::hash::Oid;
use crate::obj::{FileMode, Object};
use crate::odb::{ObjectStore, TreeIndex};
use crate::path::RepoPath;
use crate::refs::RefDb;
use crate::rev::{DiffSpec, Revspec};
use crate::signature::Signature;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;

/// which (dataset, PK) pairs a repository-wide operation should consider.
/// `Unfiltered` accepts every dataset and every PK within it; `Only` restricts
/// to the named datasets, each with its own [`PkFilter`].
#[derive(Debug, Clone)]
pub enum RepoPkFilter {
    Unfiltered,
    Only(BTreeMap<String, PkFilter>),
}

impl RepoPkFilter {
    pub fn for_dataset(&self, path: &str) -> PkFilter {
        match self {
            RepoPkFilter::Unfiltered => PkFilter::Unfiltered,
            RepoPkFilter::Only(map) => {
                map.get(path).cloned().unwrap_or_else(|| PkFilter::Only(BTreeSet::new()))
            }
        }
    }

    /// the set of dataset paths this filter admits, or `None` for unfiltered
    /// (every dataset admitted).
    pub fn dataset_paths(&self) -> Option<BTreeSet<&str>> {
        match self {
            RepoPkFilter::Unfiltered => None,
            RepoPkFilter::Only(map) => Some(map.keys().map(String::as_str).collect()),
        }
    }
}

/// breadth-first(-ish) walk of `root`, stopping descent at the first
/// `.sno-table` marker seen along each branch; that subtree becomes a
/// dataset rooted at the accumulated path. datasets cannot nest inside one
/// another under this rule, so recursion order doesn't affect the result.
pub fn discover_datasets(store: &dyn ObjectStore, path: RepoPath, root: Oid) -> DsvcResult<Vec<Dataset>> {
    let tree = store.read_tree(root)?;
    if tree.entries.iter().any(|e| e.name == RepoPath::SNO_TABLE) {
        return Ok(vec![Dataset::from_root(store, path, root)?]);
    }

    let mut out = vec![];
    for entry in &tree.entries {
        if entry.mode.is_tree() {
            out.extend(discover_datasets(store, path.join(&entry.name), entry.oid)?);
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

/// a repository tree (and, usually, the commit it came from), ready to have
/// its datasets enumerated or diffed against another view.
pub struct RepoView<'s> {
    store: &'s dyn ObjectStore,
    commit: Option<Oid>,
    tree: Oid,
}

impl<'s> RepoView<'s> {
    pub fn tree_oid(&self) -> Oid {
        self.tree
    }

    pub fn commit_oid(&self) -> Option<Oid> {
        self.commit
    }

    pub fn datasets(&self) -> DsvcResult<Vec<Dataset>> {
        discover_datasets(self.store, RepoPath::new(""), self.tree)
    }

    pub fn get(&self, path: &str) -> DsvcResult<Option<Dataset>> {
        Ok(self.datasets()?.into_iter().find(|d| d.path.as_str() == path))
    }

    pub fn contains(&self, path: &str) -> DsvcResult<bool> {
        Ok(self.get(path)?.is_some())
    }
}

impl PartialEq for RepoView<'_> {
    /// approximates the spec's `(repo_id, oid)` equality for a single-repo
    /// context: same backing store, same tree.
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.store, other.store) && self.tree == other.tree
    }
}

/// the repository view: ref/revspec resolution, dataset discovery, diffing
/// and committing, all against one borrowed [`ObjectStore`].
pub struct Repository<'s> {
    store: &'s dyn ObjectStore,
    refs: RefDb,
    config: Config,
}

impl<'s> Repository<'s> {
    pub fn new(store: &'s dyn ObjectStore, control_dir: impl Into<PathBuf>) -> Self {
        let control_dir = control_dir.into();
        Self { store, refs: RefDb::new(control_dir.clone()), config: Config::new(control_dir) }
    }

    pub fn store(&self) -> &'s dyn ObjectStore {
        self.store
    }

    pub fn refs(&self) -> &RefDb {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// resolves a bare name: a full hex oid present in the object store,
    /// otherwise a ref (tried as given, then as `refs/heads/<name>`).
    pub fn resolve_name(&self, name: &str) -> DsvcResult<Oid> {
        if let Ok(oid) = Oid::from_str(name) {
            if self.store.contains(oid)? {
                return Ok(oid);
            }
        }
        if let Ok(oid) = self.refs.resolve(name) {
            return Ok(oid);
        }
        self.refs.resolve(&RefDb::branch_ref_name(name))
    }

    /// resolves a parsed [`Revspec`] to an oid, walking `^`/`~` suffixes
    /// through commit parents.
    pub fn resolve_to_oid(&self, rev: &Revspec) -> DsvcResult<Oid> {
        match rev {
            Revspec::Name(name) => self.resolve_name(name),
            Revspec::Parent(inner, n) => {
                let oid = self.resolve_to_oid(inner)?;
                if *n == 0 {
                    return Ok(oid);
                }
                let commit = self
                    .store
                    .read_commit(oid)
                    .map_err(|_| anyhow::anyhow!(CoreError::NoCommit(inner.to_string())))?;
                commit.parents.get(n - 1).copied().ok_or_else(|| {
                    anyhow::anyhow!(CoreError::InvalidOperation(format!(
                        "`{}` has no parent number {}",
                        inner, n
                    )))
                })
            }
            Revspec::Ancestor(inner, n) => {
                let mut oid = self.resolve_to_oid(inner)?;
                for generation in 1..=*n {
                    let commit = self
                        .store
                        .read_commit(oid)
                        .map_err(|_| anyhow::anyhow!(CoreError::NoCommit(inner.to_string())))?;
                    oid = *commit.parents.first().ok_or_else(|| {
                        anyhow::anyhow!(CoreError::InvalidOperation(format!(
                            "`{}` has no ancestor at generation {} (ran out at {})",
                            inner, n, generation
                        )))
                    })?;
                }
                Ok(oid)
            }
        }
    }

    /// peels an oid to either a commit (preferred) or a bare tree; fails
    /// *NoCommit* on a blob, which has neither.
    pub fn lookup_oid(&self, oid: Oid) -> DsvcResult<RepoView<'s>> {
        match self.store.read_object(oid)? {
            Object::Commit(commit) => Ok(RepoView { store: self.store, commit: Some(oid), tree: commit.tree }),
            Object::Tree(_) => Ok(RepoView { store: self.store, commit: None, tree: oid }),
            Object::Blob(_) => anyhow::bail!(CoreError::NoCommit(oid.to_string())),
        }
    }

    pub fn lookup(&self, rev: &Revspec) -> DsvcResult<RepoView<'s>> {
        self.lookup_oid(self.resolve_to_oid(rev)?)
    }

    pub fn head_oid(&self) -> DsvcResult<Oid> {
        self.refs.resolve(Revspec::HEAD)
    }

    pub fn head(&self) -> DsvcResult<RepoView<'s>> {
        self.lookup_oid(self.head_oid()?)
    }

    /// union of per-dataset diffs over `datasets(base) ∪ datasets(target)`,
    /// intersected with `filter`'s dataset paths when filtered.
    pub fn repo_diff(
        &self,
        base: &RepoView<'s>,
        target: &RepoView<'s>,
        filter: &RepoPkFilter,
    ) -> DsvcResult<RepoDiff> {
        let base_datasets: BTreeMap<String, Dataset> =
            base.datasets()?.into_iter().map(|d| (d.path.as_str().to_owned(), d)).collect();
        let target_datasets: BTreeMap<String, Dataset> =
            target.datasets()?.into_iter().map(|d| (d.path.as_str().to_owned(), d)).collect();

        let mut paths: BTreeSet<String> = base_datasets.keys().chain(target_datasets.keys()).cloned().collect();
        if let Some(allowed) = filter.dataset_paths() {
            paths.retain(|p| allowed.contains(p.as_str()));
        }

        let mut out = RepoDiff::new();
        for path in paths {
            let pk_filter = filter.for_dataset(&path);
            let diff = match (base_datasets.get(&path), target_datasets.get(&path)) {
                (Some(b), Some(t)) => b.diff(self.store, Some(t), &pk_filter)?,
                (Some(b), None) => b.diff(self.store, None, &pk_filter)?,
                (None, Some(t)) => t.diff(self.store, None, &pk_filter)?.invert()?,
                (None, None) => unreachable!("path came from the union of both dataset maps"),
            };
            out.insert(path, diff);
        }
        Ok(out)
    }

    /// two-segment composition for one dataset: `base<>target` from the
    /// object store, then `target<>working_copy` from the working-copy
    /// adapter, concatenated via the diff algebra. surfaces write-time
    /// conflicts as `"{dataset_path}:{pk}"` keys, matching [`RepoDiff::concat`].
    pub fn dataset_diff(
        &self,
        base: &RepoView<'s>,
        target: &RepoView<'s>,
        working_copy: Option<&dyn crate::workingcopy::WorkingCopy>,
        dataset_path: &str,
        pk_filter: &PkFilter,
    ) -> DsvcResult<DatasetDiff> {
        let base_ds = base.get(dataset_path)?;
        let target_ds = target.get(dataset_path)?;
        let store_diff = match (&base_ds, &target_ds) {
            (Some(b), Some(t)) => b.diff(self.store, Some(t), pk_filter)?,
            (Some(b), None) => b.diff(self.store, None, pk_filter)?,
            (None, Some(t)) => t.diff(self.store, None, pk_filter)?.invert()?,
            (None, None) => DatasetDiff::default(),
        };

        let wc = match working_copy {
            Some(wc) => wc,
            None => return Ok(store_diff),
        };

        let target_tree = target_ds.as_ref().map(|d| d.root);
        let mut only = BTreeMap::new();
        only.insert(dataset_path.to_owned(), pk_filter.clone());
        let wc_repo_diff = wc.diff_to_tree(self.store, target_tree, &RepoPkFilter::Only(only))?;
        let wc_diff = wc_repo_diff.get(dataset_path).cloned().unwrap_or_default();

        let (combined, conflicts) = store_diff.concat(&wc_diff)?;
        if !conflicts.is_empty() {
            let keys = conflicts.into_iter().map(|pk| format!("{}:{}", dataset_path, pk)).collect();
            anyhow::bail!(CoreError::Conflict(keys));
        }
        Ok(combined)
    }

    /// resolves a [`DiffSpec`] to the `(base, target)` pair `repo_diff` should
    /// be called with. `A..B` additionally requires both sides to resolve to
    /// a commit, since `merge_base` has nothing to walk from a bare tree
    /// (spec §4.3/§10.5); `A...B` and a bare single revision carry no such
    /// requirement.
    pub fn resolve_diff_spec(&self, spec: &DiffSpec) -> DsvcResult<(RepoView<'s>, RepoView<'s>)> {
        match spec {
            DiffSpec::TwoDot(a, b) => {
                let a_view = self.lookup(a)?;
                let b_view = self.lookup(b)?;
                let a_commit = a_view.commit_oid().ok_or_else(|| {
                    anyhow::anyhow!(CoreError::InvalidOperation(format!(
                        "`{}..{}` requires both sides to be commits, not bare trees",
                        a, b
                    )))
                })?;
                let b_commit = b_view.commit_oid().ok_or_else(|| {
                    anyhow::anyhow!(CoreError::InvalidOperation(format!(
                        "`{}..{}` requires both sides to be commits, not bare trees",
                        a, b
                    )))
                })?;
                let base = crate::mergebase::merge_base(self.store, a_commit, b_commit)?.ok_or_else(|| {
                    anyhow::anyhow!(CoreError::InvalidOperation(format!("`{}` and `{}` share no common history", a, b)))
                })?;
                Ok((self.lookup_oid(base)?, b_view))
            }
            DiffSpec::ThreeDot(a, b) => Ok((self.lookup(a)?, self.lookup(b)?)),
            DiffSpec::Single(rev) => Ok((self.lookup(rev)?, self.head()?)),
        }
    }

    pub(crate) fn default_signature(&self) -> DsvcResult<Signature> {
        let name = self
            .config
            .name()?
            .ok_or_else(|| anyhow::anyhow!(CoreError::InvalidOperation("user.name is not configured".to_owned())))?;
        let email = self
            .config
            .email()?
            .ok_or_else(|| anyhow::anyhow!(CoreError::InvalidOperation("user.email is not configured".to_owned())))?;
        Ok(Signature::now(name, email))
    }

    /// moves `HEAD` forward: the current branch if `HEAD` is symbolic,
    /// otherwise `HEAD` itself (detached).
    pub(crate) fn move_branch_to(&self, oid: Oid) -> DsvcResult<()> {
        match self.refs.current_branch()? {
            Some(branch) => self.refs.update_direct(&RefDb::branch_ref_name(&branch), oid),
            None => self.refs.update_direct("HEAD", oid),
        }
    }

    /// applies a [`RepoDiff`] to `base`'s tree, dataset by dataset (§4.2's
    /// `write_to_index` per touched dataset), splicing each new dataset root
    /// into a repo-wide tree-building index seeded from `base`.
    pub(crate) fn apply_diff_to_tree(&self, base: &RepoView<'s>, diff: &RepoDiff) -> DsvcResult<Oid> {
        let mut repo_index = TreeIndex::from_tree(self.store, Some(base.tree_oid()))?;

        for (path, ds_diff) in diff.iter() {
            if ds_diff.is_empty() {
                continue;
            }
            let dataset = base
                .get(path)?
                .ok_or_else(|| anyhow::anyhow!(CoreError::NotFound(format!("dataset `{}`", path))))?;

            let mut ds_index = TreeIndex::from_tree(self.store, Some(dataset.root))?;
            dataset.write_to_index(self.store, &mut ds_index, ds_diff)?;
            let new_root = ds_index.write_tree(self.store)?;

            splice_dataset_root(&mut repo_index, path, new_root);
        }

        repo_index.write_tree(self.store)
    }

    /// applies the working-copy diff to the current head tree and creates a
    /// single-parent commit, advancing the current branch ref (spec §4.6).
    pub fn commit(
        &self,
        wc_diff: &RepoDiff,
        message: impl Into<String>,
        author: Option<Signature>,
        committer: Option<Signature>,
    ) -> DsvcResult<Oid> {
        let head_oid = self.head_oid()?;
        let head_view = self.lookup_oid(head_oid)?;
        let new_tree = self.apply_diff_to_tree(&head_view, wc_diff)?;

        let author = match author {
            Some(sig) => sig,
            None => self.default_signature()?,
        };
        let committer = match committer {
            Some(sig) => sig,
            None => self.default_signature()?,
        };

        let commit =
            crate::obj::Commit { tree: new_tree, parents: vec![head_oid], author, committer, message: message.into() };
        let commit_oid = self.store.create_commit(&commit)?;
        self.move_branch_to(commit_oid)?;
        Ok(commit_oid)
    }
}

/// prunes every flat entry under `path/` from `index`, then splices in a
/// single literal `Tree` entry at `path` pointing at `new_root`. pruning
/// first is required: [`TreeIndex::write_tree`]'s bottom-up grouping only
/// treats a flat `Tree`-mode entry as already-built when no other flat entry
/// shares its path prefix.
fn splice_dataset_root(index: &mut TreeIndex, path: &str, new_root: Oid) {
    let prefix = format!("{}/", path);
    let stale: Vec<String> =
        index.iter().filter(|(p, _, _)| p.starts_with(&prefix)).map(|(p, _, _)| p.to_owned()).collect();
    for key in stale {
        let _ = index.remove(&key);
    }
    index.add(path.to_owned(), FileMode::Tree, new_root);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Column, Feature, Schema};
    use crate::obj::Commit;
    use crate::odb::MemoryObjectStore;
    use crate::pk::{self, SchemaVersion};
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

    /// builds a `widgets` dataset (with schema/version meta) plus a repo root
    /// tree containing it at the given path, returning the repo tree oid.
    fn seed_repo(store: &MemoryObjectStore, dataset_path: &str, pks: &[i64]) -> Oid {
        let mut table_index = TreeIndex::default();
        for &pk in pks {
            let path = pk::encode_pk_to_path(SchemaVersion::V1, &crate::feature::Pk::Integer(pk));
            let rel = path.strip_prefix(RepoPath::SNO_TABLE).unwrap();
            let bytes = serde_json::to_vec(&feature(pk)).unwrap();
            let oid = store.create_blob(bytes).unwrap();
            table_index.add(rel.to_owned(), FileMode::Blob, oid);
        }
        table_index.add("meta/version", FileMode::Blob, store.create_blob(b"1".to_vec()).unwrap());
        table_index.add(
            "meta/schema.json",
            FileMode::Blob,
            store.create_blob(serde_json::to_vec(&schema()).unwrap()).unwrap(),
        );
        let table_oid = table_index.write_tree(store).unwrap();

        let mut ds_index = TreeIndex::default();
        ds_index.add(RepoPath::SNO_TABLE, FileMode::Tree, table_oid);
        let ds_root = ds_index.write_tree(store).unwrap();

        let mut repo_index = TreeIndex::default();
        repo_index.add(dataset_path.to_owned(), FileMode::Tree, ds_root);
        repo_index.write_tree(store).unwrap()
    }

    fn sig() -> Signature {
        Signature { name: "t".into(), email: "t@example.com".into(), time: EpochTime::new(0), offset: TzOffset::new(0) }
    }

    #[test]
    fn discover_datasets_finds_table_at_nested_path() {
        let store = MemoryObjectStore::new();
        let tree = seed_repo(&store, "layers/widgets", &[1, 2, 3]);
        let datasets = discover_datasets(&store, RepoPath::new(""), tree).unwrap();
        assert_eq!(datasets.len(), 1);
        assert_eq!(datasets[0].path.as_str(), "layers/widgets");
        assert_eq!(datasets[0].iter_features(&store).unwrap().len(), 3);
    }

    #[test]
    fn resolve_to_oid_walks_parent_and_ancestor_suffixes() {
        let store = MemoryObjectStore::new();
        let tree = seed_repo(&store, "widgets", &[1]);
        let c1 = store.create_commit(&Commit { tree, parents: vec![], author: sig(), committer: sig(), message: "c1".into() }).unwrap();
        let c2 = store.create_commit(&Commit { tree, parents: vec![c1], author: sig(), committer: sig(), message: "c2".into() }).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(&store, dir.path());
        repo.refs().update_direct("refs/heads/master", c2).unwrap();
        repo.refs().write("HEAD", crate::refs::RefValue::Symbolic("refs/heads/master".into())).unwrap();

        assert_eq!(repo.resolve_to_oid(&"HEAD".parse().unwrap()).unwrap(), c2);
        assert_eq!(repo.resolve_to_oid(&"HEAD^".parse().unwrap()).unwrap(), c1);
        assert_eq!(repo.resolve_to_oid(&"HEAD~1".parse().unwrap()).unwrap(), c1);
    }

    #[test]
    fn two_dot_diff_spec_rejects_bare_trees() {
        let store = MemoryObjectStore::new();
        let tree = seed_repo(&store, "widgets", &[1]);
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(&store, dir.path());
        repo.refs().update_direct("refs/heads/master", {
            store.create_commit(&Commit { tree, parents: vec![], author: sig(), committer: sig(), message: "c1".into() }).unwrap()
        }).unwrap();
        repo.refs().write("HEAD", crate::refs::RefValue::Symbolic("refs/heads/master".into())).unwrap();

        let bare_tree_hex = tree.to_hex();
        let spec: crate::rev::DiffSpec = format!("{}..HEAD", bare_tree_hex).parse().unwrap();
        assert!(repo.resolve_diff_spec(&spec).is_err());
    }

    #[test]
    fn commit_applies_wc_diff_and_advances_branch() {
        let store = MemoryObjectStore::new();
        let tree = seed_repo(&store, "widgets", &[1, 2]);
        let c1 =
            store.create_commit(&Commit { tree, parents: vec![], author: sig(), committer: sig(), message: "c1".into() }).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::new(&store, dir.path());
        repo.refs().update_direct("refs/heads/master", c1).unwrap();
        repo.refs().write("HEAD", crate::refs::RefValue::Symbolic("refs/heads/master".into())).unwrap();
        crate::config::Config::new(dir.path()).set(false, "user.name", "Tess").unwrap();
        crate::config::Config::new(dir.path()).set(false, "user.email", "tess@example.com").unwrap();

        let mut diff = DatasetDiff::default();
        diff.inserts.insert(crate::feature::Pk::Integer(3), feature(3));
        let wc_diff = RepoDiff::from_single("widgets", diff);

        let new_commit = repo.commit(&wc_diff, "insert row 3", None, None).unwrap();
        assert_eq!(repo.head_oid().unwrap(), new_commit);

        let view = repo.lookup_oid(new_commit).unwrap();
        let ds = view.get("widgets").unwrap().unwrap();
        assert_eq!(ds.iter_features(&store).unwrap().len(), 3);
    }
}
