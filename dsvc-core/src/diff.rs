//! the diff value and its algebra (spec §3/§4.4): union (`|`), concatenation
//! (`+`), inversion (`~`), cardinality, filter projection, conflict
//! detection. grounded directly in the original `sno/diff.py`'s `Diff`
//! class - in particular its `_add` classmethod, whose nine-case
//! (insert/update/delete) × (insert/update/delete/none) combination table is
//! ported here unchanged in meaning (see DESIGN.md).
//!
//! unlike the source, which keys everything by `str(pk)`, this module keys
//! directly by [`Pk`] - it orders the same way (numeric PKs sort numerically,
//! not lexically as strings would) and avoids a round trip through `Display`
//! for every lookup.

use crate::error::CoreError;
use crate::feature::{Feature, Pk};
use crate::macros::bug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `(old, new)` byte values for a single meta key. every algebraic operator
/// and `write_to_index` reject a [`DatasetDiff`] whose `meta` is non-empty
/// (spec §9's threaded-but-rejected decision) - the type exists so a future
/// implementer has somewhere to put meta changes without restructuring.
pub type MetaDiff = BTreeMap<String, (Option<Vec<u8>>, Option<Vec<u8>>)>;

/// one updated row, keyed in [`DatasetDiff::updates`] under its *old* PK.
/// `new_pk` is carried alongside `old`/`new` (rather than assumed equal to
/// the map key) so a PK-renaming update has somewhere to record its
/// resulting identity - needed so [`DatasetDiff::concat`] can chain a second
/// rename against the first without a [`crate::feature::Schema`] on hand to
/// re-derive a PK from a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub new_pk: Pk,
    pub old: Feature,
    pub new: Feature,
}

/// the diff for a single dataset: inserts, updates (keyed by the *old* PK,
/// so a renaming update still has a stable key to concatenate against),
/// deletes, and meta changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDiff {
    pub meta: MetaDiff,
    pub inserts: BTreeMap<Pk, Feature>,
    pub updates: BTreeMap<Pk, Update>,
    pub deletes: BTreeMap<Pk, Feature>,
}

impl DatasetDiff {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.meta.len() + self.inserts.len() + self.updates.len() + self.deletes.len()
    }

    fn assert_meta_empty(&self, other: &Self) -> crate::error::DsvcResult<()> {
        if !self.meta.is_empty() || !other.meta.is_empty() {
            anyhow::bail!(CoreError::NotYetImplemented("meta changes in a diff".to_owned()));
        }
        Ok(())
    }

    /// `~` - swap inserts/deletes, swap old/new within updates.
    pub fn invert(&self) -> crate::error::DsvcResult<Self> {
        if !self.meta.is_empty() {
            anyhow::bail!(CoreError::NotYetImplemented("inverting meta changes".to_owned()));
        }
        Ok(Self {
            meta: MetaDiff::new(),
            inserts: self.deletes.clone(),
            deletes: self.inserts.clone(),
            // an update keyed by its old PK, recording its new PK, inverts
            // into an update keyed by that new PK, recording the old one.
            updates: self
                .updates
                .iter()
                .map(|(pk, u)| (u.new_pk.clone(), Update { new_pk: pk.clone(), old: u.new.clone(), new: u.old.clone() }))
                .collect(),
        })
    }

    /// `to_filter()` - the set of PKs this dataset's diff touches, both
    /// sides of a renaming update included (spec §4.4 Projection).
    pub fn touched_pks(&self) -> BTreeSet<Pk> {
        let mut pks: BTreeSet<Pk> = self.inserts.keys().chain(self.deletes.keys()).cloned().collect();
        for (pk, u) in &self.updates {
            pks.insert(pk.clone());
            pks.insert(u.new_pk.clone());
        }
        pks
    }

    /// `+` for a single dataset: the nine-case combination table from
    /// SPEC_FULL.md §4.4, applied by consuming matching entries out of `b`'s
    /// I/U/D as `a`'s I/U/D are walked. returns the combined diff plus the
    /// set of conflicting PKs (stringified, matching `CoreError::Conflict`'s
    /// shape) - empty when there were none.
    pub fn concat(&self, other: &Self) -> crate::error::DsvcResult<(Self, BTreeSet<String>)> {
        self.assert_meta_empty(other)?;

        let mut conflicts = BTreeSet::new();

        let mut b_inserts = other.inserts.clone();
        let mut b_updates = other.updates.clone();
        let mut b_deletes = other.deletes.clone();

        let mut out_inserts = BTreeMap::new();
        let mut out_updates = BTreeMap::new();
        let mut out_deletes = BTreeMap::new();

        for (pk, o) in &self.inserts {
            if b_inserts.remove(pk).is_some() {
                conflicts.insert(pk.to_string());
                continue;
            }
            if let Some(b_u) = b_updates.remove(pk) {
                // `a` inserted at `pk`; `b` then updates (possibly renaming)
                // that same row - the combined effect is still a fresh
                // insert, just at `b`'s resulting identity.
                out_inserts.insert(b_u.new_pk, b_u.new);
                continue;
            }
            if b_deletes.remove(pk).is_some() {
                continue; // inserted then deleted before either landed -> noop
            }
            out_inserts.insert(pk.clone(), o.clone());
        }

        for (pk, a_u) in &self.updates {
            // `b`'s maps are keyed relative to the post-`a` tree, where this
            // row lives under `a_u.new_pk` (not the key `pk` it's stored
            // under here, which is its *pre-a* identity) - matters when `a`
            // itself renamed the row and `b` continues the rename chain.
            if b_inserts.remove(&a_u.new_pk).is_some() {
                conflicts.insert(pk.to_string());
                continue;
            }
            if let Some(b_u) = b_updates.remove(&a_u.new_pk) {
                if a_u.old != b_u.new {
                    out_updates.insert(pk.clone(), Update { new_pk: b_u.new_pk, old: a_u.old.clone(), new: b_u.new });
                } // else changed back to the original -> noop
                continue;
            }
            if b_deletes.remove(&a_u.new_pk).is_some() {
                out_deletes.insert(pk.clone(), a_u.old.clone());
                continue;
            }
            out_updates.insert(pk.clone(), a_u.clone());
        }

        for (pk, o) in &self.deletes {
            if b_deletes.remove(pk).is_some() {
                conflicts.insert(pk.to_string());
                continue;
            }
            if b_updates.remove(pk).is_some() {
                conflicts.insert(pk.to_string());
                continue;
            }
            if let Some(b_ins) = b_inserts.remove(pk) {
                if &b_ins != o {
                    out_updates.insert(pk.clone(), Update { new_pk: pk.clone(), old: o.clone(), new: b_ins });
                } // else deleted then re-inserted identically -> noop
                continue;
            }
            out_deletes.insert(pk.clone(), o.clone());
        }

        let total_before = out_inserts.len() + out_updates.len() + out_deletes.len()
            + b_inserts.len() + b_updates.len() + b_deletes.len();
        let mut all_keys: BTreeSet<&Pk> = BTreeSet::new();
        all_keys.extend(out_inserts.keys());
        all_keys.extend(out_updates.keys());
        all_keys.extend(out_deletes.keys());
        all_keys.extend(b_inserts.keys());
        all_keys.extend(b_updates.keys());
        all_keys.extend(b_deletes.keys());
        if all_keys.len() != total_before {
            bug!("unexpected key overlap while concatenating dataset diffs");
        }

        out_inserts.extend(b_inserts);
        out_updates.extend(b_updates);
        out_deletes.extend(b_deletes);

        Ok((Self { meta: MetaDiff::new(), inserts: out_inserts, updates: out_updates, deletes: out_deletes }, conflicts))
    }
}

/// a repository-wide diff: map from dataset path to that dataset's diff.
/// datasets with an empty per-dataset diff may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoDiff(BTreeMap<String, DatasetDiff>);

impl RepoDiff {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_single(dataset_path: impl Into<String>, diff: DatasetDiff) -> Self {
        let mut map = BTreeMap::new();
        if !diff.is_empty() {
            map.insert(dataset_path.into(), diff);
        }
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(DatasetDiff::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(DatasetDiff::len).sum()
    }

    pub fn get(&self, dataset_path: &str) -> Option<&DatasetDiff> {
        self.0.get(dataset_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatasetDiff)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn insert(&mut self, dataset_path: impl Into<String>, diff: DatasetDiff) {
        if !diff.is_empty() {
            self.0.insert(dataset_path.into(), diff);
        }
    }

    /// `|` - requires disjoint dataset-path sets; fails `ValueError` otherwise.
    pub fn union(self, other: Self) -> crate::error::DsvcResult<Self> {
        let mine: BTreeSet<&String> = self.0.keys().collect();
        let theirs: BTreeSet<&String> = other.0.keys().collect();
        let overlap: Vec<_> = mine.intersection(&theirs).collect();
        if !overlap.is_empty() {
            anyhow::bail!(CoreError::ValueError(format!(
                "same dataset appears in both diffs, did you mean concatenation? {:?}",
                overlap
            )));
        }
        let mut merged = self.0;
        merged.extend(other.0);
        Ok(Self(merged))
    }

    /// `+` - per-dataset concatenation; datasets present on only one side
    /// carry through unchanged. conflicts from every dataset are pooled into
    /// a single `CoreError::Conflict` if any occurred.
    pub fn concat(&self, other: &Self) -> crate::error::DsvcResult<Self> {
        let mut result = BTreeMap::new();
        let mut conflicts = BTreeSet::new();

        let all_paths: BTreeSet<&String> = self.0.keys().chain(other.0.keys()).collect();
        for path in all_paths {
            let combined = match (self.0.get(path), other.0.get(path)) {
                (Some(a), Some(b)) => {
                    let (merged, ds_conflicts) = a.concat(b)?;
                    for pk in ds_conflicts {
                        conflicts.insert(format!("{}:{}", path, pk));
                    }
                    merged
                }
                (Some(a), None) => a.clone(),
                (None, Some(b)) => b.clone(),
                (None, None) => unreachable!(),
            };
            if !combined.is_empty() {
                result.insert(path.clone(), combined);
            }
        }

        if !conflicts.is_empty() {
            anyhow::bail!(CoreError::Conflict(conflicts));
        }
        Ok(Self(result))
    }

    /// `~` - invert every dataset's diff.
    pub fn invert(&self) -> crate::error::DsvcResult<Self> {
        let mut out = BTreeMap::new();
        for (path, diff) in &self.0 {
            out.insert(path.clone(), diff.invert()?);
        }
        Ok(Self(out))
    }

    /// `to_filter()` - per-dataset set of PKs touched.
    pub fn to_filter(&self) -> BTreeMap<String, BTreeSet<Pk>> {
        self.0.iter().map(|(path, diff)| (path.clone(), diff.touched_pks())).collect()
    }
}
