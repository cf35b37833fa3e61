//! the working-copy adapter's narrow interface (spec §6): the real working
//! copy is an external SQL database tracking some tree, mutated by whatever
//! application embeds this core. consumed here only as a source of
//! `(old, new)` feature pairs plus a tree-match assertion - the teacher has
//! no analogue since its worktree is always real files on disk.

use crate::dataset::PkFilter;
use crate::diff::{DatasetDiff, RepoDiff};
use crate::error::{CoreError, DsvcResult};
use crate::hash::Oid;
use crate::odb::ObjectStore;
use crate::repo::RepoPkFilter;
use std::cell::RefCell;

/// the working copy, consumed through exactly two operations (spec §6.1):
/// a filtered diff against some tree, and an assertion that the tree it is
/// tracking matches an expectation. any SQL-backed implementation of this
/// trait lives outside this crate.
pub trait WorkingCopy {
    /// the diff between the rows presently in the working copy's tables and
    /// `target_tree` (the tree it is meant to be tracking), restricted to
    /// `filter`. implementations should call [`WorkingCopy::assert_db_tree_match`]
    /// first when `target_tree` is `Some`.
    fn diff_to_tree(
        &self,
        store: &dyn ObjectStore,
        target_tree: Option<Oid>,
        filter: &RepoPkFilter,
    ) -> DsvcResult<RepoDiff>;

    /// fails unless the working copy's own record of which tree it tracks
    /// matches `tree`.
    fn assert_db_tree_match(&self, tree: Oid) -> DsvcResult<()>;
}

/// an in-memory fake of the SQL working copy, for tests and for embedding
/// this core without a real database: holds the tree it claims to track plus
/// a fixed [`RepoDiff`] standing in for whatever edits are presently in its
/// tables.
pub struct MemoryWorkingCopy {
    tracked_tree: RefCell<Oid>,
    diff: RepoDiff,
}

impl MemoryWorkingCopy {
    pub fn new(tracked_tree: Oid, diff: RepoDiff) -> Self {
        Self { tracked_tree: RefCell::new(tracked_tree), diff }
    }

    /// simulates a checkout or commit moving the working copy onto a new tree.
    pub fn set_tracked_tree(&self, tree: Oid) {
        *self.tracked_tree.borrow_mut() = tree;
    }
}

impl WorkingCopy for MemoryWorkingCopy {
    fn diff_to_tree(
        &self,
        _store: &dyn ObjectStore,
        target_tree: Option<Oid>,
        filter: &RepoPkFilter,
    ) -> DsvcResult<RepoDiff> {
        if let Some(tree) = target_tree {
            self.assert_db_tree_match(tree)?;
        }
        let mut out = RepoDiff::new();
        for (path, diff) in self.diff.iter() {
            out.insert(path.to_owned(), filter_dataset_diff(diff, &filter.for_dataset(path)));
        }
        Ok(out)
    }

    fn assert_db_tree_match(&self, tree: Oid) -> DsvcResult<()> {
        anyhow::ensure!(
            *self.tracked_tree.borrow() == tree,
            CoreError::InvalidOperation(format!(
                "working copy is tracking `{}`, not the expected `{}`",
                *self.tracked_tree.borrow(),
                tree
            ))
        );
        Ok(())
    }
}

fn filter_dataset_diff(diff: &DatasetDiff, filter: &PkFilter) -> DatasetDiff {
    DatasetDiff {
        meta: diff.meta.clone(),
        inserts: diff.inserts.iter().filter(|(pk, _)| filter.contains(pk)).map(|(pk, f)| (pk.clone(), f.clone())).collect(),
        updates: diff.updates.iter().filter(|(pk, _)| filter.contains(pk)).map(|(pk, v)| (pk.clone(), v.clone())).collect(),
        deletes: diff.deletes.iter().filter(|(pk, _)| filter.contains(pk)).map(|(pk, f)| (pk.clone(), f.clone())).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{Feature, Pk};
    use crate::odb::MemoryObjectStore;
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn feature(v: i64) -> Feature {
        let mut f = Feature::new();
        f.set("fid", Value::Integer(v));
        f
    }

    #[test]
    fn assert_db_tree_match_fails_on_mismatch() {
        let wc = MemoryWorkingCopy::new(Oid::EMPTY_TREE, RepoDiff::new());
        assert!(wc.assert_db_tree_match(Oid::EMPTY_BLOB).is_err());
        assert!(wc.assert_db_tree_match(Oid::EMPTY_TREE).is_ok());
    }

    #[test]
    fn diff_to_tree_filters_by_pk() {
        let mut diff = DatasetDiff::default();
        diff.inserts.insert(Pk::Integer(1), feature(1));
        diff.inserts.insert(Pk::Integer(2), feature(2));
        let wc = MemoryWorkingCopy::new(Oid::EMPTY_TREE, RepoDiff::from_single("widgets", diff));

        let mut only = BTreeMap::new();
        only.insert("widgets".to_owned(), PkFilter::Only(["1".to_owned()].into_iter().collect()));
        let filter = RepoPkFilter::Only(only);

        let store = MemoryObjectStore::new();
        let result = wc.diff_to_tree(&store, Some(Oid::EMPTY_TREE), &filter).unwrap();
        let ds_diff = result.get("widgets").unwrap();
        assert_eq!(ds_diff.inserts.len(), 1);
        assert!(ds_diff.inserts.contains_key(&Pk::Integer(1)));
    }
}
