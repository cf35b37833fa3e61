//! real, on-disk, git-compatible loose-object backend: each object is framed
//! with git's `"<type> <size>\0<payload>"` header, SHA-1 hashed, zlib-deflated
//! and written atomically under `<bitdir>/objects/<2-hex>/<38-hex>` (spec
//! §10.1). no packfile reader/writer and no delta compression.

use super::ObjectStore;
use crate::error::{CoreError, DsvcResult};
use crate::hash::{self, Oid};
use crate::lockfile::Lockfile;
use crate::obj::{self, Object, ObjKind, WritableObject};
use crate::serialize::DeserializeSized;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{prelude::*, BufReader};
use std::path::PathBuf;

pub struct LooseObjectStore {
    objects_path: PathBuf,
}

impl LooseObjectStore {
    pub fn new(objects_path: impl Into<PathBuf>) -> Self {
        Self { objects_path: objects_path.into() }
    }

    fn obj_path(&self, oid: Oid) -> PathBuf {
        self.objects_path.join(oid.fanout_dir()).join(oid.fanout_file())
    }

    fn read_stream(&self, oid: Oid) -> DsvcResult<impl BufRead> {
        let path = self.obj_path(oid);
        let file = File::open(&path)
            .map_err(|_| anyhow::anyhow!(CoreError::NotFound(oid.to_string())))?;
        Ok(BufReader::new(ZlibDecoder::new(file)))
    }
}

/// `"<type> <size>\0"` header as written by [`WritableObject::serialize_with_headers`].
struct ObjHeader {
    kind: ObjKind,
    size: u64,
}

fn read_header(reader: &mut impl BufRead) -> DsvcResult<ObjHeader> {
    let mut type_buf = vec![];
    reader.read_until(b' ', &mut type_buf)?;
    type_buf.pop();
    let kind: ObjKind = std::str::from_utf8(&type_buf)?.parse()?;

    let mut size_buf = vec![];
    reader.read_until(0, &mut size_buf)?;
    size_buf.pop();
    let size: u64 = std::str::from_utf8(&size_buf)?.parse()?;

    Ok(ObjHeader { kind, size })
}

impl ObjectStore for LooseObjectStore {
    fn read_object(&self, oid: Oid) -> DsvcResult<Object> {
        let mut stream = self.read_stream(oid)?;
        let header = read_header(&mut stream)?;
        Ok(match header.kind {
            ObjKind::Commit =>
                Object::Commit(obj::Commit::deserialize_sized(&mut stream, header.size)?),
            ObjKind::Tree => Object::Tree(obj::Tree::deserialize_sized(&mut stream, header.size)?),
            ObjKind::Blob => Object::Blob(obj::Blob::deserialize_sized(&mut stream, header.size)?),
        })
    }

    fn write_object(&self, obj: &dyn WritableObject) -> DsvcResult<Oid> {
        let bytes = obj.serialize_with_headers()?;
        let oid = hash::hash_bytes(&bytes);
        let path = self.obj_path(oid);

        if path.exists() {
            return Ok(oid);
        }

        Lockfile::with_mut(&path, |lockfile| {
            let mut encoder = ZlibEncoder::new(lockfile, Compression::default());
            encoder.write_all(&bytes)?;
            encoder.finish()?;
            Ok(())
        })?;
        Ok(oid)
    }

    fn contains(&self, oid: Oid) -> DsvcResult<bool> {
        Ok(self.obj_path(oid).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::Blob;

    #[test]
    fn write_then_read_roundtrips_through_zlib() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseObjectStore::new(dir.path());
        let blob = Blob::new(b"hello world".to_vec());
        let oid = store.write_object(&blob).unwrap();
        assert!(store.contains(oid).unwrap());
        assert_eq!(store.read_blob(oid).unwrap(), blob);
    }

    #[test]
    fn empty_blob_hash_matches_git() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseObjectStore::new(dir.path());
        let oid = store.write_object(&Blob::new(Vec::new())).unwrap();
        assert_eq!(oid, Oid::EMPTY_BLOB);
    }
}
