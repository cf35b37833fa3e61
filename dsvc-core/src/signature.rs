//! commit author/committer identity, matching git's `name <email> epoch tz` wire format.

use crate::error::{DsvcGenericError, DsvcResult};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(PartialEq, Clone, Copy, Debug, Hash, Ord, PartialOrd, Eq)]
pub struct EpochTime(i64);

impl EpochTime {
    pub fn new(secs: i64) -> Self {
        Self(secs)
    }

    pub fn now() -> Self {
        // deterministic under test so commit oids are comparable across runs
        if cfg!(test) { Self(0) } else { Self(chrono::Utc::now().timestamp()) }
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }
}

/// timezone offset in minutes from UTC, e.g. `+1300` is `780`.
#[derive(PartialEq, Clone, Copy, Debug, Hash, Ord, PartialOrd, Eq)]
pub struct TzOffset(i32);

impl TzOffset {
    pub fn new(minutes: i32) -> Self {
        Self(minutes)
    }

    pub fn local() -> Self {
        if cfg!(test) {
            Self(0)
        } else {
            Self(chrono::Local::now().offset().local_minus_utc() / 60)
        }
    }
}

#[derive(PartialEq, Clone, Debug, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: EpochTime,
    pub offset: TzOffset,
}

impl Signature {
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self { name: name.into(), email: email.into(), time: EpochTime::now(), offset: TzOffset::local() }
    }
}

impl FromStr for TzOffset {
    type Err = DsvcGenericError;

    /// format: `(+|-)HHMM`
    fn from_str(s: &str) -> DsvcResult<Self> {
        anyhow::ensure!(s.len() == 5, "malformed timezone offset `{}`", s);
        let sign = match &s[0..1] {
            "+" => 1,
            "-" => -1,
            _ => anyhow::bail!("malformed timezone offset `{}`", s),
        };
        let hours: i32 = s[1..3].parse()?;
        let minutes: i32 = s[3..5].parse()?;
        Ok(Self(sign * (hours * 60 + minutes)))
    }
}

impl FromStr for EpochTime {
    type Err = DsvcGenericError;

    fn from_str(s: &str) -> DsvcResult<Self> {
        Ok(Self(s.parse()?))
    }
}

impl FromStr for Signature {
    type Err = DsvcGenericError;

    /// `Ada Lovelace <ada@example.com> 1616061862 +1300`
    fn from_str(s: &str) -> DsvcResult<Self> {
        let email_start = s.find('<').ok_or_else(|| anyhow::anyhow!("malformed signature `{}`", s))?;
        let email_end = s.find('>').ok_or_else(|| anyhow::anyhow!("malformed signature `{}`", s))?;
        let name = s[..email_start.saturating_sub(1)].to_owned();
        let email = s[email_start + 1..email_end].to_owned();
        let mut rest = s[email_end + 1..].trim().split_ascii_whitespace();
        let time = rest.next().ok_or_else(|| anyhow::anyhow!("signature missing timestamp"))?.parse()?;
        let offset = rest.next().ok_or_else(|| anyhow::anyhow!("signature missing timezone"))?.parse()?;
        Ok(Self { name, email, time, offset })
    }
}

impl Display for EpochTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for TzOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.0 >= 0 { '+' } else { '-' };
        let abs = self.0.abs();
        write!(f, "{}{:02}{:02}", sign, abs / 60, abs % 60)
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}> {} {}", self.name, self.email, self.time, self.offset)
    }
}
