//! Canonical JSON encoding of test fixtures.
use serde::Serialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(display("failed to serialize value as JSON"))]
pub struct Error {
    source: serde_json::Error,
}

/// Serializes `value` as compact JSON.
pub fn to_json<T>(value: &T) -> Result<Vec<u8>, Error>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).context(Snafu)
}

/// Serializes `value` as compact JSON and panics if that fails.
///
/// Fixtures that can't be encoded are a bug in the test itself, not a
/// condition a test should handle.
pub fn to_json_or_die<T>(value: &T) -> Vec<u8>
where
    T: Serialize + ?Sized,
{
    to_json(value).expect("test fixture must be serializable as JSON")
}
