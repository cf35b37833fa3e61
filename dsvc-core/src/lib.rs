//! versioned dataset core: a content-addressed object store reused for
//! versioned tabular/geospatial rows, a structured per-dataset diff algebra,
//! and a three-way merge built on top of it.
//!
//! modules are layered leaves-first, matching the component design:
//! [`hash`]/[`obj`]/[`odb`] (object store), [`path`]/[`pk`] (path codec),
//! [`feature`]/[`value`] (row model), [`dataset`] (dataset view),
//! [`diff`] (diff value & algebra), [`repo`]/[`repo_open`] (repository view,
//! commit, init/discovery), [`merge`]/[`state`] (three-way merge & persisted
//! merge state), [`workingcopy`] (the external SQL mirror's narrow interface).

#[macro_use]
mod macros;

pub mod config;
pub mod dataset;
pub mod diff;
pub mod error;
pub mod feature;
pub mod hash;
pub mod lockfile;
pub mod merge;
pub mod mergebase;
pub mod obj;
pub mod odb;
pub mod path;
pub mod pk;
pub mod refs;
pub mod repo;
pub mod repo_open;
pub mod rev;
pub mod serialize;
pub mod signature;
pub mod state;
pub mod value;
pub mod workingcopy;

pub use dataset::{Dataset, PkFilter};
pub use diff::{DatasetDiff, RepoDiff};
pub use error::{CoreError, DsvcErrorExt, DsvcGenericError, DsvcResult, DsvcResultExt};
pub use feature::{Feature, Pk, Schema};
pub use hash::Oid;
pub use merge::{FfMode, MergeOutcome};
pub use repo::{Repository, RepoPkFilter, RepoView};
pub use rev::{DiffSpec, Revspec};
pub use state::{ConflictEntry, MergeIndex, Resolution, RepoState};
pub use workingcopy::{MemoryWorkingCopy, WorkingCopy};
