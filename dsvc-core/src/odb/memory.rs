//! in-memory [`ObjectStore`], used by the test suite and by anything embedding
//! the core without touching a filesystem (spec §10.1).

use super::ObjectStore;
use crate::error::{CoreError, DsvcResult};
use crate::hash::{self, Oid};
use crate::obj::{Object, WritableObject};
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RefCell<HashMap<Oid, Object>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn read_object(&self, oid: Oid) -> DsvcResult<Object> {
        self.objects
            .borrow()
            .get(&oid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(CoreError::NotFound(oid.to_string())))
    }

    fn write_object(&self, obj: &dyn WritableObject) -> DsvcResult<Oid> {
        let bytes = obj.serialize_with_headers()?;
        let oid = hash::hash_bytes(&bytes);
        let decoded = match obj.kind() {
            crate::obj::ObjKind::Commit => Object::Commit(obj_downcast_commit(obj)?),
            crate::obj::ObjKind::Tree => Object::Tree(obj_downcast_tree(obj)?),
            crate::obj::ObjKind::Blob => Object::Blob(obj_downcast_blob(obj)?),
        };
        self.objects.borrow_mut().insert(oid, decoded);
        Ok(oid)
    }

    fn contains(&self, oid: Oid) -> DsvcResult<bool> {
        Ok(self.objects.borrow().contains_key(&oid))
    }
}

// `write_object` takes `&dyn WritableObject` for backend-agnosticism (matches the
// loose backend, which only ever needs the serialized bytes); the in-memory
// backend additionally wants the structured value, so it re-parses the body it
// just serialized rather than widening the trait for one backend's convenience.
fn obj_downcast_commit(obj: &dyn WritableObject) -> DsvcResult<crate::obj::Commit> {
    use crate::serialize::Deserialize;
    let mut body = vec![];
    obj.serialize(&mut body)?;
    crate::obj::Commit::deserialize(&mut &body[..])
}

fn obj_downcast_tree(obj: &dyn WritableObject) -> DsvcResult<crate::obj::Tree> {
    use crate::serialize::Deserialize;
    let mut body = vec![];
    obj.serialize(&mut body)?;
    crate::obj::Tree::deserialize(&mut &body[..])
}

fn obj_downcast_blob(obj: &dyn WritableObject) -> DsvcResult<crate::obj::Blob> {
    use crate::serialize::Deserialize;
    let mut body = vec![];
    obj.serialize(&mut body)?;
    crate::obj::Blob::deserialize(&mut &body[..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obj::Blob;

    #[test]
    fn write_then_read_roundtrips() {
        let store = MemoryObjectStore::new();
        let blob = Blob::new(b"hello".to_vec());
        let oid = store.write_object(&blob).unwrap();
        assert_eq!(store.read_blob(oid).unwrap(), blob);
        assert!(store.contains(oid).unwrap());
    }
}
