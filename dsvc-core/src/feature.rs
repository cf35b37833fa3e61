//! rows and their schema (spec §3/§4.2). grounded in the original
//! `sno/structure.py`'s meta/feature accessors for the shape of the data
//! (schema lives under `.sno-table/meta/`, rows under `.sno-table/<fanout>/…`)
//! but the representation itself is new: the teacher has no row/table model.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// an opaque primary key. stringified form (via `Display`) is the canonical
/// diff key used throughout `diff.rs`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pk {
    Integer(i64),
    Text(String),
}

impl Display for Pk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pk::Integer(i) => write!(f, "{}", i),
            Pk::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Pk {
    fn from(i: i64) -> Self {
        Pk::Integer(i)
    }
}

impl From<&str> for Pk {
    fn from(s: &str) -> Self {
        Pk::Text(s.to_owned())
    }
}

/// a row: an ordered column-name -> value mapping (insertion order is column
/// order, matching how the schema declares them). serializes as a plain JSON
/// object so a feature blob round-trips byte-for-byte through the object
/// store (`dataset.rs`'s `encode_feature`/`decode_feature`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Feature(IndexMap<String, Value>);

impl Feature {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.0.insert(column.into(), value);
        self
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// column-by-column equality excluding `exclude` (spec §4.2's
    /// write-conflict check deliberately skips the geometry column).
    pub fn eq_excluding(&self, other: &Feature, exclude: &str) -> bool {
        let mine: Vec<_> = self.0.iter().filter(|(k, _)| k.as_str() != exclude).collect();
        let theirs: Vec<_> = other.0.iter().filter(|(k, _)| k.as_str() != exclude).collect();
        mine == theirs
    }
}

impl FromIterator<(String, Value)> for Feature {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// column name + declared type, in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
}

/// minimal dataset schema: the column list plus which columns are the
/// primary key and the geometry column (if any). real schemas also carry an
/// SRS and column widths/precision, which this core never inspects. this is
/// the exact shape stored (as JSON) at `.sno-table/meta/schema.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub pk_column: usize,
    pub geometry_column: Option<usize>,
}

impl Schema {
    pub fn pk_column_name(&self) -> &str {
        &self.columns[self.pk_column].name
    }

    pub fn geometry_column_name(&self) -> Option<&str> {
        self.geometry_column.map(|i| self.columns[i].name.as_str())
    }

    pub fn pk_of(&self, feature: &Feature) -> Option<Pk> {
        match feature.get(self.pk_column_name())? {
            Value::Integer(i) => Some(Pk::Integer(*i)),
            Value::Text(s) => Some(Pk::Text(s.clone())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema {
            columns: vec![
                Column { name: "fid".into(), type_name: "integer".into() },
                Column { name: "name".into(), type_name: "text".into() },
                Column { name: "geom".into(), type_name: "geometry".into() },
            ],
            pk_column: 0,
            geometry_column: Some(2),
        }
    }

    #[test]
    fn pk_of_reads_declared_pk_column() {
        let schema = schema();
        let mut f = Feature::new();
        f.set("fid", Value::Integer(42)).set("name", Value::Text("a".into()));
        assert_eq!(schema.pk_of(&f), Some(Pk::Integer(42)));
    }

    #[test]
    fn eq_excluding_ignores_named_column() {
        let mut a = Feature::new();
        a.set("fid", Value::Integer(1)).set("geom", Value::Geometry(vec![1, 2]));
        let mut b = Feature::new();
        b.set("fid", Value::Integer(1)).set("geom", Value::Geometry(vec![9, 9]));
        assert!(a.eq_excluding(&b, "geom"));
        assert!(!a.eq_excluding(&b, "fid"));
    }

    #[test]
    fn pk_display_matches_stringification_used_as_diff_key() {
        assert_eq!(Pk::Integer(10).to_string(), "10");
        assert_eq!(Pk::Text("abc".into()).to_string(), "abc");
    }
}
