use crate::error::DsvcResult;
use std::io::{prelude::*, BufReader};

pub trait Serialize {
    fn serialize(&self, writer: &mut dyn Write) -> DsvcResult<()>;
}

/// object-safe counterpart to `std::str::FromStr`/serde for our own wire formats
/// (git object bodies, not the `Value`/config serde types).
pub trait Deserialize {
    fn deserialize(reader: &mut dyn BufRead) -> DsvcResult<Self>
    where
        Self: Sized;

    fn deserialize_unbuffered(reader: impl Read) -> DsvcResult<Self>
    where
        Self: Sized,
    {
        Self::deserialize(&mut BufReader::new(reader))
    }
}

/// like `Deserialize` but where the exact byte length of the encoded value is already
/// known up front (as in git's `"<type> <size>\0"` object header).
pub trait DeserializeSized {
    fn deserialize_sized(reader: &mut dyn BufRead, size: u64) -> DsvcResult<Self>
    where
        Self: Sized;

    fn deserialize_sized_unbuffered(reader: impl Read, size: u64) -> DsvcResult<Self>
    where
        Self: Sized,
    {
        Self::deserialize_sized(&mut BufReader::new(reader), size)
    }
}

impl<D: Deserialize> DeserializeSized for D {
    fn deserialize_sized(reader: &mut dyn BufRead, _size: u64) -> DsvcResult<Self>
    where
        Self: Sized,
    {
        Self::deserialize(reader)
    }
}
