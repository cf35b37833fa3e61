//! feature column values (spec §3/§9). a small type-tagged sum rather than a
//! trait object: the column types a dataset can carry are closed and known up
//! front (git's object model has no analogue; this is new relative to the
//! teacher).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// a single column's value. equality is always byte-level - no implicit
/// numeric coercion between `Integer`/`Float`, and geometry is compared as
/// raw WKB bytes (see SPEC_FULL.md §9's open-question decision).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    /// well-known-binary encoded geometry; opaque beyond byte comparison.
    Geometry(Vec<u8>),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Geometry(_) => "geometry",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// `f64` has no total order/`Eq`, so `Value` can't derive `Eq`; the byte-level
// comparison the spec asks for is exactly what `#[derive(PartialEq)]`
// produces (bitwise NaN inequality and all), so no manual impl is needed.

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<blob:{} bytes>", b.len()),
            Value::Geometry(b) => write!(f, "<geometry:{} bytes>", b.len()),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_do_not_coerce() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
    }

    #[test]
    fn geometry_equality_is_byte_level() {
        let a = Value::Geometry(vec![0, 1, 2]);
        let b = Value::Geometry(vec![0, 1, 2]);
        let c = Value::Geometry(vec![0, 1, 3]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nan_is_not_equal_to_itself_per_byte_semantics() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }
}
