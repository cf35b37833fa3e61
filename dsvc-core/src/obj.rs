//! git-compatible object encodings: the header framing, file modes, and the
//! small enum distinguishing which kind of object an oid names.

pub mod blob;
pub mod commit;
pub mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use tree::{Tree, TreeEntry};

use crate::error::DsvcResult;
use crate::hash::Oid;
use crate::serialize::Serialize;
use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::str::FromStr;

/// the mode bits git records against a tree entry. declaration order is
/// significant: it is used (indirectly, via [`TreeEntry::sort_key`]) to keep
/// files sorting before directories with the same name prefix, matching
/// git's tree entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Blob,
    Exec,
    Tree,
}

impl FileMode {
    pub fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }

    /// the octal mode string as it appears in a serialized tree entry
    pub fn as_str(self) -> &'static str {
        match self {
            FileMode::Blob => "100644",
            FileMode::Exec => "100755",
            FileMode::Tree => "40000",
        }
    }
}

impl FromStr for FileMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "100644" => Ok(FileMode::Blob),
            "100755" => Ok(FileMode::Exec),
            "40000" => Ok(FileMode::Tree),
            _ => anyhow::bail!("unrecognised file mode `{}`", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjKind {
    Commit = 1,
    Tree = 2,
    Blob = 3,
}

impl Display for ObjKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ObjKind::Commit => write!(f, "commit"),
            ObjKind::Tree => write!(f, "tree"),
            ObjKind::Blob => write!(f, "blob"),
        }
    }
}

impl FromStr for ObjKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "commit" => Ok(ObjKind::Commit),
            "tree" => Ok(ObjKind::Tree),
            "blob" => Ok(ObjKind::Blob),
            _ => anyhow::bail!("unrecognised object type `{}`", s),
        }
    }
}

/// a decoded object of unknown-until-matched kind, as returned by the object store
#[derive(Debug, Clone)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
}

impl Object {
    pub fn kind(&self) -> ObjKind {
        match self {
            Object::Commit(..) => ObjKind::Commit,
            Object::Tree(..) => ObjKind::Tree,
            Object::Blob(..) => ObjKind::Blob,
        }
    }

    pub fn into_commit(self) -> DsvcResult<Commit> {
        match self {
            Object::Commit(c) => Ok(c),
            other => anyhow::bail!("expected commit, found {}", other.kind()),
        }
    }

    pub fn into_tree(self) -> DsvcResult<Tree> {
        match self {
            Object::Tree(t) => Ok(t),
            other => anyhow::bail!("expected tree, found {}", other.kind()),
        }
    }

    pub fn into_blob(self) -> DsvcResult<Blob> {
        match self {
            Object::Blob(b) => Ok(b),
            other => anyhow::bail!("expected blob, found {}", other.kind()),
        }
    }
}

/// anything that can be framed with git's `"<type> <size>\0<body>"` object header
/// before being hashed and stored.
pub trait WritableObject: Serialize {
    fn kind(&self) -> ObjKind;

    fn serialize_with_headers(&self) -> DsvcResult<Vec<u8>> {
        let mut body = vec![];
        self.serialize(&mut body)?;
        let mut buf = Vec::with_capacity(body.len() + 16);
        write!(buf, "{} {}\0", self.kind(), body.len())?;
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    fn oid(&self) -> DsvcResult<Oid> {
        Ok(crate::hash::hash_bytes(&self.serialize_with_headers()?))
    }
}

impl WritableObject for Commit {
    fn kind(&self) -> ObjKind {
        ObjKind::Commit
    }
}

impl WritableObject for Tree {
    fn kind(&self) -> ObjKind {
        ObjKind::Tree
    }
}

impl WritableObject for Blob {
    fn kind(&self) -> ObjKind {
        ObjKind::Blob
    }
}
