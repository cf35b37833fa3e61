use crate::error::DsvcResult;
use crate::hash::Oid;
use crate::serialize::{Deserialize, Serialize};
use crate::signature::Signature;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::io::prelude::*;
use std::str::FromStr;

/// immutable (tree, parents, author, committer, message), per spec §3. unlike the
/// teacher (which only ever builds single-parent commits) `parents` is a `Vec`
/// so merge commits (§4.5 step 6, two parents) are representable directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut buf = vec![];
        self.serialize(&mut buf).unwrap();
        write!(f, "{}", std::str::from_utf8(&buf).unwrap())
    }
}

impl Serialize for Commit {
    fn serialize(&self, writer: &mut dyn Write) -> DsvcResult<()> {
        writeln!(writer, "tree {}", self.tree)?;
        for parent in &self.parents {
            writeln!(writer, "parent {}", parent)?;
        }
        writeln!(writer, "author {}", self.author)?;
        writeln!(writer, "committer {}", self.committer)?;
        writeln!(writer)?;
        write!(writer, "{}", self.message)?;
        Ok(())
    }
}

impl Deserialize for Commit {
    fn deserialize(reader: &mut dyn BufRead) -> DsvcResult<Self> {
        let mut attrs: HashMap<String, Vec<String>> = HashMap::new();
        let mut lines = reader.lines();
        let mut message_lines = vec![];

        while let Some(line) = lines.next() {
            let line = line?;
            if line.is_empty() {
                break;
            }
            let (k, v) = line
                .split_once(' ')
                .ok_or_else(|| anyhow::anyhow!("malformed commit header line `{}`", line))?;
            attrs.entry(k.to_owned()).or_default().push(v.to_owned());
        }
        for line in lines {
            message_lines.push(line?);
        }

        let tree = attrs
            .get("tree")
            .and_then(|v| v.first())
            .ok_or_else(|| anyhow::anyhow!("commit missing `tree` header"))?
            .parse()?;
        let parents = attrs
            .get("parent")
            .map(|ps| ps.iter().map(|p| Oid::from_str(p)).collect::<DsvcResult<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();
        let author = attrs
            .get("author")
            .and_then(|v| v.first())
            .ok_or_else(|| anyhow::anyhow!("commit missing `author` header"))?
            .parse()?;
        let committer = attrs
            .get("committer")
            .and_then(|v| v.first())
            .ok_or_else(|| anyhow::anyhow!("commit missing `committer` header"))?
            .parse()?;
        let message = message_lines.join("\n");

        Ok(Self { tree, parents, author, committer, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{EpochTime, Signature, TzOffset};

    fn sig() -> Signature {
        Signature {
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            time: EpochTime::new(0),
            offset: TzOffset::new(0),
        }
    }

    #[test]
    fn serialize_then_deserialize_roundtrips_multi_parent() {
        let commit = Commit {
            tree: Oid::EMPTY_TREE,
            parents: vec![Oid::EMPTY_BLOB, Oid::EMPTY_TREE],
            author: sig(),
            committer: sig(),
            message: "Merge branch \"theirs\" into ours".to_owned(),
        };
        let mut buf = vec![];
        commit.serialize(&mut buf).unwrap();
        let parsed = Commit::deserialize(&mut &buf[..]).unwrap();
        assert_eq!(parsed, commit);
        assert!(parsed.is_merge());
    }
}
