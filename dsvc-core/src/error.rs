use crate::hash::Oid;
use owo_colors::OwoColorize;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter, Write as _};
use thiserror::Error;

/// generic result alias used pervasively through the core; most call sites don't
/// need to match on the error kind and just want `?` plus context
pub type DsvcResult<T> = Result<T, DsvcGenericError>;
pub type DsvcGenericError = anyhow::Error;

/// structured error kinds a caller may need to match on (see spec §7).
/// everything else bubbles up as an opaque `anyhow` chain.
#[derive(Debug, Error)]
#[cfg_attr(test, derive(PartialEq))]
pub enum CoreError {
    #[error("ref `{0}` could not be resolved")]
    NotFound(String),
    #[error("ref `{0}` does not resolve to a commit")]
    NoCommit(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("not yet implemented: {0}")]
    NotYetImplemented(String),
    /// carries the set of conflicting primary keys (stringified), per dataset path
    #[error("conflicting changes to {0:?}")]
    Conflict(BTreeSet<String>),
    #[error("patch does not apply: {0}")]
    PatchDoesNotApply(String),
    #[error("{0}")]
    ValueError(String),
    #[error("malformed feature path `{0}`")]
    MalformedPath(String),
    /// internal post-condition violation; should never fire in correct code
    #[error("BUG: {0}")]
    Bug(String),
}

pub trait DsvcErrorExt {
    fn try_into_core_error(self) -> DsvcResult<CoreError>;
    fn try_into_conflict(self) -> DsvcResult<BTreeSet<String>>;
}

impl DsvcErrorExt for DsvcGenericError {
    fn try_into_core_error(self) -> DsvcResult<CoreError> {
        self.downcast::<CoreError>()
    }

    fn try_into_conflict(self) -> DsvcResult<BTreeSet<String>> {
        match self.try_into_core_error()? {
            CoreError::Conflict(pks) => Ok(pks),
            err => Err(anyhow::anyhow!(err)),
        }
    }
}

pub trait DsvcResultExt {
    fn is_not_found_err(&self) -> bool;
    fn is_conflict(&self) -> bool;
}

macro_rules! error_ext_is_method {
    ($method:ident) => {
        fn $method(&self) -> bool {
            match self {
                Ok(..) => false,
                Err(err) => err.$method(),
            }
        }
    };
}

impl<T> DsvcResultExt for DsvcResult<T> {
    error_ext_is_method!(is_not_found_err);

    error_ext_is_method!(is_conflict);
}

impl DsvcResultExt for DsvcGenericError {
    fn is_not_found_err(&self) -> bool {
        matches!(self.downcast_ref::<CoreError>(), Some(CoreError::NotFound(..) | CoreError::NoCommit(..)))
    }

    fn is_conflict(&self) -> bool {
        matches!(self.downcast_ref::<CoreError>(), Some(CoreError::Conflict(..)))
    }
}

/// raised when an object cannot be found under the oid it was requested with
#[derive(Debug, Error)]
#[error("object `{0}` not found in object store")]
pub struct ObjectNotFound(pub Oid);

macro_rules! write_hint {
    ($f:expr, $($args:tt)*) => {{
        write!($f, "{}: ", "hint".yellow())?;
        writeln!($f, $($args)*)
    }};
}

pub(crate) use write_hint;

impl CoreError {
    /// renders additional context a CLI frontend may want below the primary message
    pub fn hint(&self) -> Option<String> {
        match self {
            CoreError::Conflict(pks) => {
                let mut buf = String::new();
                let f = &mut buf;
                write_hint!(f, "{} conflicting feature(s); resolve then `merge --continue`, or `merge --abort`", pks.len()).ok()?;
                Some(buf)
            }
            _ => None,
        }
    }
}

impl Display for ObjectNotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "object `{}` not found", self.0)
    }
}
