//! Stream identification, partitioning, and positioning types.
//!
//! This module defines strong types for addressing a stream (`StreamId`, `Partition`)
//! and the two position axes tracked by the engine: `StreamPosition` (per-stream,
//! 1-based) and `GlobalPosition` (engine-wide, assigned at insert time).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for `StreamId` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid stream id: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for a stream (aggregate instance) within a partition.
///
/// # Examples
///
/// ```
/// use emt_core::stream::StreamId;
///
/// let id = StreamId::new("cart-C1");
/// assert_eq!(id.as_str(), "cart-C1");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a new `StreamId` from a string. No validation is performed; use this
    /// for application-controlled identifiers.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the stream id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("stream id cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Tenant (or other isolation-boundary) identifier. Streams in different partitions
/// never interact: reads, versions, and concurrency checks are scoped per partition.
///
/// Defaults to `"default_partition"` when the caller supplies none, matching the
/// engine's documented default.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition(String);

/// The partition used when the caller does not specify one.
pub const DEFAULT_PARTITION: &str = "default_partition";

impl Partition {
    /// Create a new `Partition` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the partition as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self(DEFAULT_PARTITION.to_string())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Partition {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Partition {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Partition {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Per-stream 1-based event index.
///
/// `StreamPosition::ZERO` means "no events yet" and is the version of a stream that
/// does not exist. The first appended event lands at position `1`.
///
/// # Examples
///
/// ```
/// use emt_core::stream::StreamPosition;
///
/// let zero = StreamPosition::ZERO;
/// assert!(zero.is_zero());
/// assert_eq!(zero.advance_by(3), StreamPosition::new(3));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamPosition(u64);

impl StreamPosition {
    /// The position of a stream with no events.
    pub const ZERO: Self = Self(0);

    /// Create a new `StreamPosition` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw position value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next position (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Advance this position by `n` events, as happens when a batch of `n` events
    /// is appended starting right after this position.
    #[must_use]
    pub const fn advance_by(self, n: u64) -> Self {
        Self(self.0 + n)
    }

    /// Whether this is the zero position (stream does not exist / is empty).
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamPosition {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<StreamPosition> for u64 {
    fn from(position: StreamPosition) -> Self {
        position.0
    }
}

/// Engine-wide monotonically increasing position, assigned at insert time from the
/// `emt_global_message_position` sequence. Unique per message but **not** guaranteed
/// gap-free across concurrent transactions (see the design notes on `global_position`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlobalPosition(i64);

impl GlobalPosition {
    /// Create a new `GlobalPosition` from a raw sequence value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw position value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GlobalPosition {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<GlobalPosition> for i64 {
    fn from(position: GlobalPosition) -> Self {
        position.0
    }
}

/// Policy for the optimistic-concurrency check performed by `append_to_stream`.
///
/// Distinguishes the three sentinels the engine accepts in addition to an exact
/// expected version, mirroring `NO_CONCURRENCY_CHECK`, `STREAM_EXISTS`, and
/// `STREAM_DOES_NOT_EXIST`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ExpectedVersion {
    /// No optimistic-concurrency check is performed (`NO_CONCURRENCY_CHECK`, also the
    /// default when the caller supplies no expectation at all).
    #[default]
    NoConcurrencyCheck,
    /// Require the stream to already exist, at any version.
    StreamExists,
    /// Require the stream not to exist yet.
    StreamDoesNotExist,
    /// Require the stream's current version to equal exactly this value.
    Exact(StreamPosition),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_position_advances() {
        let v0 = StreamPosition::ZERO;
        assert!(v0.is_zero());
        assert_eq!(v0.next(), StreamPosition::new(1));
        assert_eq!(v0.advance_by(5), StreamPosition::new(5));
    }

    #[test]
    fn stream_position_ordering() {
        assert!(StreamPosition::new(1) < StreamPosition::new(2));
    }

    #[test]
    fn partition_defaults() {
        assert_eq!(Partition::default().as_str(), DEFAULT_PARTITION);
    }

    #[test]
    fn stream_id_parse_rejects_empty() {
        assert!("".parse::<StreamId>().is_err());
        assert!("cart-1".parse::<StreamId>().is_ok());
    }

    #[test]
    fn expected_version_default_is_no_check() {
        assert_eq!(ExpectedVersion::default(), ExpectedVersion::NoConcurrencyCheck);
    }
}
