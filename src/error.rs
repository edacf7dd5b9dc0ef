use thiserror::Error;

/// Contract and consistency failures.
///
/// Mutating operations on [`RangeTower`](crate::RangeTower) treat an
/// [`Error::Overflow`] as a caller bug and panic with its message; callers
/// that build ranges from untrusted arithmetic can run
/// [`RangeTower::check_range`](crate::RangeTower::check_range) first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("range [{start}, {start} + {width}) extends past the last addressable bit")]
    Overflow { start: u64, width: u64 },
    #[error("invariant violated: {0}")]
    Invariant(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("the tower handle is no longer valid")]
    ResourceNotAvailable,
    #[error("the passed tower handle was null")]
    NullHandle,
}
