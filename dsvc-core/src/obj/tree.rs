use crate::error::DsvcResult;
use crate::hash::Oid;
use crate::obj::FileMode;
use crate::serialize::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io::prelude::*;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub oid: Oid,
}

impl TreeEntry {
    /// git sorts tree entries as if directory names had a trailing `/`, so that e.g.
    /// `foo` (a file) sorts before `foo.txt`, which sorts before `foo/` (a directory).
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode.is_tree() {
            key.push(b'/');
        }
        key
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// an immutable, content-addressed directory. entries are kept in git's sort
/// order so that two trees with the same entries always serialize (and
/// therefore hash) identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: BTreeSet<TreeEntry>,
}

impl Tree {
    pub fn new(entries: impl IntoIterator<Item = TreeEntry>) -> Self {
        Self { entries: entries.into_iter().collect() }
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Tree {
    fn serialize(&self, writer: &mut dyn Write) -> DsvcResult<()> {
        for entry in &self.entries {
            write!(writer, "{} {}\0", entry.mode.as_str(), entry.name)?;
            writer.write_all(entry.oid.as_bytes())?;
        }
        Ok(())
    }
}

impl Deserialize for Tree {
    fn deserialize(reader: &mut dyn BufRead) -> DsvcResult<Self> {
        let mut entries = BTreeSet::new();
        loop {
            let mut mode_buf = vec![];
            let n = reader.read_until(b' ', &mut mode_buf)?;
            if n == 0 {
                break;
            }
            mode_buf.pop(); // trailing space
            let mode = FileMode::from_str(std::str::from_utf8(&mode_buf)?)?;

            let mut name_buf = vec![];
            reader.read_until(0, &mut name_buf)?;
            name_buf.pop(); // trailing nul
            let name = String::from_utf8(name_buf)?;

            let mut oid_buf = [0u8; 20];
            reader.read_exact(&mut oid_buf)?;
            entries.insert(TreeEntry { mode, name, oid: Oid::new(oid_buf) });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::WritableObject;

    fn entry(name: &str, mode: FileMode) -> TreeEntry {
        TreeEntry { mode, name: name.to_owned(), oid: Oid::EMPTY_BLOB }
    }

    #[test]
    fn files_sort_before_directories_with_shared_prefix() {
        let tree = Tree::new([entry("foo.txt", FileMode::Blob), entry("foo", FileMode::Tree)]);
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["foo.txt", "foo"]);
    }

    #[test]
    fn serialize_then_deserialize_roundtrips() {
        let tree = Tree::new([
            entry("a", FileMode::Blob),
            entry("b", FileMode::Tree),
            entry("c", FileMode::Exec),
        ]);
        let mut buf = vec![];
        tree.serialize(&mut buf).unwrap();
        let parsed = Tree::deserialize(&mut &buf[..]).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn same_entries_hash_identically_regardless_of_insertion_order() {
        let a = Tree::new([entry("b", FileMode::Blob), entry("a", FileMode::Blob)]);
        let b = Tree::new([entry("a", FileMode::Blob), entry("b", FileMode::Blob)]);
        assert_eq!(a.oid().unwrap(), b.oid().unwrap());
    }
}
