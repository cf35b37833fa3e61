//! the narrow object-store interface consumed by the dataset/repository/merge
//! layers (spec §6), plus the tree-diffing and tree-building machinery built
//! on top of it that doesn't care which concrete backend is in use.

pub mod loose;
pub mod memory;

pub use loose::LooseObjectStore;
pub use memory::MemoryObjectStore;

use crate::error::{CoreError, DsvcResult};
use crate::hash::Oid;
use crate::obj::{Blob, Commit, FileMode, Object, ObjKind, Tree, TreeEntry, WritableObject};
use crate::path::RepoPath;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// read/write access to commits, trees and blobs, keyed by content hash.
/// implemented by [`LooseObjectStore`] (a real, git-compatible on-disk
/// backend) and [`MemoryObjectStore`] (for tests and embedding).
pub trait ObjectStore {
    fn read_object(&self, oid: Oid) -> DsvcResult<Object>;
    fn write_object(&self, obj: &dyn WritableObject) -> DsvcResult<Oid>;
    fn contains(&self, oid: Oid) -> DsvcResult<bool>;

    fn read_tree(&self, oid: Oid) -> DsvcResult<Tree> {
        self.read_object(oid)?.into_tree()
    }

    fn read_commit(&self, oid: Oid) -> DsvcResult<Commit> {
        self.read_object(oid)?.into_commit()
    }

    fn read_blob(&self, oid: Oid) -> DsvcResult<Blob> {
        self.read_object(oid)?.into_blob()
    }

    fn create_blob(&self, bytes: impl Into<Vec<u8>>) -> DsvcResult<Oid> {
        self.write_object(&Blob::new(bytes.into()))
    }

    fn create_commit(&self, commit: &Commit) -> DsvcResult<Oid> {
        self.write_object(commit)
    }
}

/// the status of one path-level change between two trees; copy/rename/typechange
/// deltas are not produced (spec §6: treated as *NotImplemented* at the diff layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaStatus {
    Added,
    Deleted,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeDelta {
    pub status: DeltaStatus,
    pub old_path: Option<RepoPath>,
    pub new_path: Option<RepoPath>,
}

impl TreeDelta {
    fn added(path: RepoPath) -> Self {
        Self { status: DeltaStatus::Added, old_path: None, new_path: Some(path) }
    }

    fn deleted(path: RepoPath) -> Self {
        Self { status: DeltaStatus::Deleted, old_path: Some(path), new_path: None }
    }

    fn modified(path: RepoPath) -> Self {
        Self { status: DeltaStatus::Modified, old_path: Some(path.clone()), new_path: Some(path) }
    }
}

/// recursively diffs two (possibly absent) trees, producing a flat list of
/// blob-level deltas in path order. directories whose oid is unchanged are
/// skipped without being descended into, mirroring the teacher's
/// `on_matched`/`TreeDiffDriver` tree-skip optimisation (`diff/tree_diff.rs`).
pub fn diff_trees(
    store: &dyn ObjectStore,
    old: Option<Oid>,
    new: Option<Oid>,
) -> DsvcResult<Vec<TreeDelta>> {
    let mut out = vec![];
    diff_trees_at(store, RepoPath::new(""), old, new, &mut out)?;
    Ok(out)
}

fn diff_trees_at(
    store: &dyn ObjectStore,
    prefix: RepoPath,
    old: Option<Oid>,
    new: Option<Oid>,
    out: &mut Vec<TreeDelta>,
) -> DsvcResult<()> {
    if old == new {
        return Ok(());
    }
    let old_tree = old.map(|oid| store.read_tree(oid)).transpose()?.unwrap_or_default();
    let new_tree = new.map(|oid| store.read_tree(oid)).transpose()?.unwrap_or_default();

    let old_entries: Vec<_> = old_tree.entries.iter().collect();
    let new_entries: Vec<_> = new_tree.entries.iter().collect();
    let (mut i, mut j) = (0, 0);

    while i < old_entries.len() || j < new_entries.len() {
        let ord = match (old_entries.get(i), new_entries.get(j)) {
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.name.cmp(&b.name),
        };
        match ord {
            Ordering::Less => {
                let entry = old_entries[i];
                recurse_one(store, &prefix, entry, true, out)?;
                i += 1;
            }
            Ordering::Greater => {
                let entry = new_entries[j];
                recurse_one(store, &prefix, entry, false, out)?;
                j += 1;
            }
            Ordering::Equal => {
                let (old_e, new_e) = (old_entries[i], new_entries[j]);
                let path = prefix.join(&old_e.name);
                match (old_e.mode, new_e.mode) {
                    (FileMode::Tree, FileMode::Tree) => {
                        diff_trees_at(store, path, Some(old_e.oid), Some(new_e.oid), out)?;
                    }
                    (FileMode::Tree, _) => {
                        diff_trees_at(store, path.clone(), Some(old_e.oid), None, out)?;
                        out.push(TreeDelta::added(path));
                    }
                    (_, FileMode::Tree) => {
                        out.push(TreeDelta::deleted(path.clone()));
                        diff_trees_at(store, path, None, Some(new_e.oid), out)?;
                    }
                    _ if old_e.oid == new_e.oid => {}
                    _ => out.push(TreeDelta::modified(path)),
                }
                i += 1;
                j += 1;
            }
        }
    }
    Ok(())
}

fn recurse_one(
    store: &dyn ObjectStore,
    prefix: &RepoPath,
    entry: &TreeEntry,
    is_old: bool,
    out: &mut Vec<TreeDelta>,
) -> DsvcResult<()> {
    let path = prefix.join(&entry.name);
    if entry.mode.is_tree() {
        if is_old {
            diff_trees_at(store, path, Some(entry.oid), None, out)
        } else {
            diff_trees_at(store, path, None, Some(entry.oid), out)
        }
    } else {
        out.push(if is_old { TreeDelta::deleted(path) } else { TreeDelta::added(path) });
        Ok(())
    }
}

/// a mutable, in-memory staging area for building a new tree incrementally
/// (spec §6's `IndexHandle` + `index_add`/`index_remove`/`index_contains`/`write_tree`).
/// seeded from an existing tree (or empty), flattened to a `path -> (mode, oid)`
/// map, then written back out as nested [`Tree`] objects on [`Self::write_tree`].
#[derive(Debug, Default)]
pub struct TreeIndex {
    entries: BTreeMap<String, (FileMode, Oid)>,
}

impl TreeIndex {
    pub fn from_tree(store: &dyn ObjectStore, oid: Option<Oid>) -> DsvcResult<Self> {
        let mut entries = BTreeMap::new();
        if let Some(oid) = oid {
            Self::flatten(store, RepoPath::new(""), oid, &mut entries)?;
        }
        Ok(Self { entries })
    }

    fn flatten(
        store: &dyn ObjectStore,
        prefix: RepoPath,
        oid: Oid,
        out: &mut BTreeMap<String, (FileMode, Oid)>,
    ) -> DsvcResult<()> {
        let tree = store.read_tree(oid)?;
        for entry in &tree.entries {
            let path = prefix.join(&entry.name);
            if entry.mode.is_tree() {
                Self::flatten(store, path, entry.oid, out)?;
            } else {
                out.insert(path.as_str().to_owned(), (entry.mode, entry.oid));
            }
        }
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<(FileMode, Oid)> {
        self.entries.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FileMode, Oid)> {
        self.entries.iter().map(|(path, &(mode, oid))| (path.as_str(), mode, oid))
    }

    pub fn add(&mut self, path: impl Into<String>, mode: FileMode, oid: Oid) {
        self.entries.insert(path.into(), (mode, oid));
    }

    pub fn remove(&mut self, path: &str) -> DsvcResult<()> {
        anyhow::ensure!(
            self.entries.remove(path).is_some(),
            CoreError::Bug(format!("removed nonexistent index path `{}`", path))
        );
        Ok(())
    }

    /// rebuilds nested trees bottom-up from the flat entry map and writes them
    /// all through `store`, returning the oid of the root tree.
    pub fn write_tree(&self, store: &dyn ObjectStore) -> DsvcResult<Oid> {
        build_subtree(store, &self.entries, "")
    }
}

/// recursively groups `entries` whose path starts with `prefix` by their next
/// path component, writing child trees before the parent that contains them.
fn build_subtree(
    store: &dyn ObjectStore,
    entries: &BTreeMap<String, (FileMode, Oid)>,
    prefix: &str,
) -> DsvcResult<Oid> {
    let mut children: BTreeMap<&str, Vec<(&str, FileMode, Oid)>> = BTreeMap::new();
    for (path, &(mode, oid)) in entries {
        let rest = if prefix.is_empty() {
            path.as_str()
        } else {
            match path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            }
        };
        let (head, tail) = match rest.split_once('/') {
            Some((h, t)) => (h, Some(t)),
            None => (rest, None),
        };
        children.entry(head).or_default().push((tail.unwrap_or(""), mode, oid));
    }

    let mut tree_entries = std::collections::BTreeSet::new();
    for (name, items) in children {
        let child_prefix = if prefix.is_empty() { name.to_owned() } else { format!("{}/{}", prefix, name) };
        if items.len() == 1 && items[0].0.is_empty() {
            let (_, mode, oid) = items[0];
            tree_entries.insert(TreeEntry { mode, name: name.to_owned(), oid });
        } else {
            let oid = build_subtree(store, entries, &child_prefix)?;
            tree_entries.insert(TreeEntry { mode: FileMode::Tree, name: name.to_owned(), oid });
        }
    }
    let tree = Tree { entries: tree_entries };
    store.write_object(&tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Oid;

    fn blob_oid(store: &dyn ObjectStore, bytes: &[u8]) -> Oid {
        store.create_blob(bytes.to_vec()).unwrap()
    }

    #[test]
    fn diff_trees_reports_added_deleted_modified() {
        let store = MemoryObjectStore::new();
        let a = blob_oid(&store, b"a");
        let a2 = blob_oid(&store, b"a2");
        let b = blob_oid(&store, b"b");
        let c = blob_oid(&store, b"c");

        let mut old_idx = TreeIndex::default();
        old_idx.add("x/a", FileMode::Blob, a);
        old_idx.add("x/b", FileMode::Blob, b);
        let old_tree = old_idx.write_tree(&store).unwrap();

        let mut new_idx = TreeIndex::default();
        new_idx.add("x/a", FileMode::Blob, a2);
        new_idx.add("x/c", FileMode::Blob, c);
        let new_tree = new_idx.write_tree(&store).unwrap();

        let mut deltas = diff_trees(&store, Some(old_tree), Some(new_tree)).unwrap();
        deltas.sort_by_key(|d| d.new_path.clone().or_else(|| d.old_path.clone()).unwrap().as_str().to_owned());

        assert_eq!(deltas.len(), 3);
        assert_eq!(deltas[0].status, DeltaStatus::Modified);
        assert_eq!(deltas[0].old_path.as_ref().unwrap().as_str(), "x/a");
        assert_eq!(deltas[1].status, DeltaStatus::Added);
        assert_eq!(deltas[1].new_path.as_ref().unwrap().as_str(), "x/c");
        assert_eq!(deltas[2].status, DeltaStatus::Deleted);
        assert_eq!(deltas[2].old_path.as_ref().unwrap().as_str(), "x/b");
    }

    #[test]
    fn index_write_tree_roundtrips_seeded_tree() {
        let store = MemoryObjectStore::new();
        let a = blob_oid(&store, b"a");
        let mut idx = TreeIndex::default();
        idx.add("x/a", FileMode::Blob, a);
        let tree_oid = idx.write_tree(&store).unwrap();

        let seeded = TreeIndex::from_tree(&store, Some(tree_oid)).unwrap();
        assert!(seeded.contains("x/a"));
        assert_eq!(seeded.write_tree(&store).unwrap(), tree_oid);
    }
}
