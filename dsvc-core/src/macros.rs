/// internal assertion for states the algebra guarantees can't happen; firing one is a bug in
/// this crate, not a user-facing error (spec §7's "internal AssertionError")
macro_rules! bug {
    ($($arg:tt)*) => {
        return Err(anyhow::anyhow!(crate::error::CoreError::Bug(format!($($arg)*))))
    };
}

pub(crate) use bug;
