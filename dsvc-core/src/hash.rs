use crate::error::DsvcGenericError;
use rustc_hash::FxHasher;
use rustc_hex::{FromHex, ToHex};
use serde::{Deserialize, Serialize};
use sha1::digest::Output;
use sha1::{Digest, Sha1};
use std::convert::TryInto;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hasher;
use std::str::FromStr;

/// content-address of a git-compatible object (commit, tree, or blob).
#[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Copy, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Oid(#[serde(with = "hex_bytes")] [u8; 20]);

mod hex_bytes {
    use rustc_hex::{FromHex, ToHex};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&bytes.to_hex::<String>())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(d)?;
        let v: Vec<u8> = s.from_hex().map_err(serde::de::Error::custom)?;
        v.try_into().map_err(|_| serde::de::Error::custom("expected 20 bytes"))
    }
}

impl From<Output<Sha1>> for Oid {
    fn from(bytes: Output<Sha1>) -> Self {
        Self::new(bytes.as_slice().try_into().unwrap())
    }
}

#[cfg(test)]
impl<'a> From<&'a str> for Oid {
    fn from(s: &'a str) -> Self {
        Self::from_str(s).unwrap()
    }
}

impl Oid {
    /// hash of an empty blob: e69de29bb2d1d6434b8b29ae775ad8c2e48c5391
    pub const EMPTY_BLOB: Self = Self([
        0xe6, 0x9d, 0xe2, 0x9b, 0xb2, 0xd1, 0xd6, 0x43, 0x4b, 0x8b, 0x29, 0xae, 0x77, 0x5a, 0xd8,
        0xc2, 0xe4, 0x8c, 0x53, 0x91,
    ]);
    /// hash of an empty tree: 4b825dc642cb6eb9a060e54bf8d69288fbee4904
    pub const EMPTY_TREE: Self = Self([
        0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
        0x88, 0xfb, 0xee, 0x49, 0x04,
    ]);
    /// placeholder for "not yet computed"; like libgit2, never a real sha1 output in practice
    pub const UNKNOWN: Self = Self([0; 20]);

    #[inline]
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    #[inline]
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }

    #[inline]
    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// first two hex chars, used as the loose-object fan-out directory
    pub fn fanout_dir(&self) -> String {
        self.to_hex()[..2].to_owned()
    }

    /// remaining 38 hex chars, used as the loose-object filename
    pub fn fanout_file(&self) -> String {
        self.to_hex()[2..].to_owned()
    }

    pub fn short(&self) -> String {
        self.to_hex()[0..7].to_owned()
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Oid {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        Self((0..20).map(|_| u8::arbitrary(g)).collect::<Vec<_>>().try_into().unwrap())
    }
}

impl FromStr for Oid {
    type Err = DsvcGenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end();
        anyhow::ensure!(s.len() == 40, "creating an oid from invalid hex string (expected 40 hex chars, got {})", s.len());
        let bytes: Vec<u8> = s.from_hex().map_err(|e| anyhow::anyhow!("invalid hex: {}", e))?;
        Ok(Self(bytes.try_into().unwrap()))
    }
}

impl AsRef<[u8]> for Oid {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for Oid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let hex = self.0.to_hex::<String>();
        if f.alternate() { write!(f, "{}", &hex[..7]) } else { write!(f, "{}", hex) }
    }
}

pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> Oid {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    Oid::new(hasher.finalize().as_slice().try_into().unwrap())
}

pub trait MakeHash {
    fn mk_fx_hash(&self) -> u64;
}

impl<H: std::hash::Hash + ?Sized> MakeHash for H {
    #[inline]
    fn mk_fx_hash(&self) -> u64 {
        let mut state = FxHasher::default();
        self.hash(&mut state);
        state.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_roundtrips_through_hex() {
        let oid = hash_bytes(b"hello world");
        let s = oid.to_hex();
        assert_eq!(Oid::from_str(&s).unwrap(), oid);
    }

    #[test]
    fn empty_blob_constant_matches_git() {
        assert_eq!(hash_bytes(b"blob 0\0").to_hex(), Oid::EMPTY_BLOB.to_hex());
    }
}
