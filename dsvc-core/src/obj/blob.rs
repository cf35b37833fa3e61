use crate::error::DsvcResult;
use crate::serialize::{Deserialize, Serialize};
use std::io::prelude::*;

/// an opaque byte string: a feature column value, a meta item, or any other leaf payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Serialize for Blob {
    fn serialize(&self, writer: &mut dyn Write) -> DsvcResult<()> {
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for Blob {
    fn deserialize(reader: &mut dyn BufRead) -> DsvcResult<Self> {
        let mut buf = vec![];
        reader.read_to_end(&mut buf)?;
        Ok(Self(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_bytes() {
        let blob = Blob::new(b"hello".to_vec());
        let mut buf = vec![];
        blob.serialize(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }
}
