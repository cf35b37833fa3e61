//! path codec (spec §4.1): a bijection between a primary key value and a blob
//! path under `<dataset>/.sno-table/…`, plus classification of a repo path
//! into `(dataset, feature|meta, identifier)`.
//!
//! the original `sno/structure.py` distinguishes feature paths from meta
//! paths (read for grounding), but the two concrete per-version encodings
//! (`dataset1.py`/`dataset2.py`) are not present in the retrieved source -
//! only `structure.py`'s dispatch on them is. the fan-out schemes below are
//! therefore an original design against this module's contract: a single-hex
//! fan-out for V1, a two-level fan-out for V2 (matching the teacher's own
//! loose-object fan-out idiom in `hash.rs`, just with a deeper second level
//! so larger V2 datasets don't pile every blob into one of 256 directories).

use crate::error::{CoreError, DsvcResult};
use crate::feature::Pk;
use crate::hash::MakeHash;
use crate::path::RepoPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    fn codec(self) -> &'static dyn PkCodec {
        match self {
            SchemaVersion::V1 => &V1,
            SchemaVersion::V2 => &V2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Feature(Pk),
    Meta(String),
}

trait PkCodec {
    /// number of fan-out directory components between `.sno-table/` and the
    /// encoded identifier itself.
    fn fanout_depth(&self) -> usize;
    fn fanout_dirs(&self, encoded: &str) -> Vec<String>;
}

struct V1;

impl PkCodec for V1 {
    fn fanout_depth(&self) -> usize {
        1
    }

    fn fanout_dirs(&self, encoded: &str) -> Vec<String> {
        let hash = encoded.mk_fx_hash();
        vec![format!("{:02x}", hash as u8)]
    }
}

struct V2;

impl PkCodec for V2 {
    fn fanout_depth(&self) -> usize {
        2
    }

    fn fanout_dirs(&self, encoded: &str) -> Vec<String> {
        let hash = encoded.mk_fx_hash();
        vec![format!("{:02x}", hash as u8), format!("{:02x}", (hash >> 8) as u8)]
    }
}

fn escape(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F")
}

fn unescape(encoded: &str) -> String {
    encoded.replace("%2F", "/").replace("%25", "%")
}

fn pk_to_encoded(pk: &Pk) -> String {
    escape(&pk.to_string())
}

fn encoded_to_pk(encoded: &str) -> Pk {
    let raw = unescape(encoded);
    match raw.parse::<i64>() {
        Ok(i) => Pk::Integer(i),
        Err(_) => Pk::Text(raw),
    }
}

/// `encode_pk_to_path(pk) → relpath` - deterministic, injective; the path
/// starts with `.sno-table/`.
pub fn encode_pk_to_path(version: SchemaVersion, pk: &Pk) -> RepoPath {
    let codec = version.codec();
    let encoded = pk_to_encoded(pk);
    let mut path = RepoPath::new(RepoPath::SNO_TABLE);
    for dir in codec.fanout_dirs(&encoded) {
        path = path.join(dir);
    }
    path.join(encoded)
}

/// splits a relative path under a dataset root into feature vs. meta,
/// decoding the primary key for feature paths. fails `MalformedPath` on
/// anything not rooted at `.sno-table/`, or on a feature path whose
/// component count doesn't match `version`'s fan-out depth.
pub fn classify(version: SchemaVersion, relpath: &str) -> DsvcResult<Classification> {
    let rest = relpath
        .strip_prefix(RepoPath::SNO_TABLE)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| anyhow::anyhow!(CoreError::MalformedPath(relpath.to_owned())))?;

    if let Some(name) = rest.strip_prefix("meta/") {
        return Ok(Classification::Meta(name.to_owned()));
    }

    let codec = version.codec();
    let components: Vec<&str> = rest.split('/').collect();
    if components.len() != codec.fanout_depth() + 1 {
        anyhow::bail!(CoreError::MalformedPath(relpath.to_owned()));
    }
    let encoded = components[codec.fanout_depth()];
    Ok(Classification::Feature(encoded_to_pk(encoded)))
}

/// `decode_path_to_pk(relpath) → pk` - inverse of [`encode_pk_to_path`];
/// fails `MalformedPath` on a meta path or anything not under `.sno-table/`.
pub fn decode_path_to_pk(version: SchemaVersion, relpath: &str) -> DsvcResult<Pk> {
    match classify(version, relpath)? {
        Classification::Feature(pk) => Ok(pk),
        Classification::Meta(_) => anyhow::bail!(CoreError::MalformedPath(relpath.to_owned())),
    }
}

pub fn meta_path(name: &str) -> RepoPath {
    RepoPath::new(RepoPath::SNO_TABLE).join("meta").join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_roundtrips_integer_pk() {
        let pk = Pk::Integer(2143);
        let path = encode_pk_to_path(SchemaVersion::V1, &pk);
        assert!(path.starts_with(RepoPath::SNO_TABLE));
        assert_eq!(decode_path_to_pk(SchemaVersion::V1, path.as_str()).unwrap(), pk);
    }

    #[test]
    fn v2_roundtrips_text_pk_with_slash() {
        let pk = Pk::Text("a/b".into());
        let path = encode_pk_to_path(SchemaVersion::V2, &pk);
        assert_eq!(decode_path_to_pk(SchemaVersion::V2, path.as_str()).unwrap(), pk);
    }

    #[test]
    fn v1_and_v2_fanout_depths_differ() {
        let pk = Pk::Integer(1);
        let v1 = encode_pk_to_path(SchemaVersion::V1, &pk);
        let v2 = encode_pk_to_path(SchemaVersion::V2, &pk);
        assert_eq!(v1.components().count(), 3); // .sno-table / fanout / pk
        assert_eq!(v2.components().count(), 4); // .sno-table / fanout / fanout / pk
    }

    #[test]
    fn classify_distinguishes_meta_from_feature() {
        assert_eq!(
            classify(SchemaVersion::V1, ".sno-table/meta/schema.json").unwrap(),
            Classification::Meta("schema.json".into())
        );
        let feature_path = encode_pk_to_path(SchemaVersion::V1, &Pk::Integer(7));
        assert!(matches!(
            classify(SchemaVersion::V1, feature_path.as_str()).unwrap(),
            Classification::Feature(Pk::Integer(7))
        ));
    }

    #[test]
    fn classify_rejects_paths_outside_sno_table() {
        assert!(classify(SchemaVersion::V1, "other/thing").is_err());
    }
}
