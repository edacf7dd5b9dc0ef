//! # range-tower
//!
//! A sparse bitmap over `[0, u64::MAX)` that, besides setting and clearing
//! ranges, can insert, delete and relocate ranges of bits, shifting
//! everything after the edit point, in logarithmic time.
//!
//! ```rust
//! use range_tower::{RangeTower, Run, UNBOUNDED};
//!
//! let mut tower = RangeTower::new();
//! tower.set1(2, 3);
//! assert!(tower.contains(4));
//! assert_eq!(tower.scan(0), 2);
//!
//! tower.insert0(2, 2);
//! assert_eq!(tower.first(), Some(Run::new(4, 3)));
//! assert_eq!(tower.scan(7), UNBOUNDED);
//! ```
//!
//! The tower is built on [`abt::Abt`], a general AA-tree whose nodes carry
//! caller-maintained aggregates.

pub mod abt;
mod cache;
mod error;
pub mod pool;
pub mod range_tower;
pub mod run;

#[cfg(test)]
mod oracle;

pub use self::error::{Error, PoolError};
pub use self::pool::{Pool, TowerHandle};
pub use self::range_tower::{NodeSpan, RangeTower};
pub use self::run::{Run, Runs};

/// Reserved position meaning "no such bit". Never a valid bit index; also
/// the total width every tower spans.
pub const UNBOUNDED: u64 = u64::MAX;
