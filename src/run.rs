use std::iter::FusedIterator;

use crate::RangeTower;
use crate::abt::NodeId;

/// A maximal run of set bits, `[start, start + width)`.
///
/// Runs handed out by a [`RangeTower`] never touch each other: there is at
/// least one clear bit between consecutive runs.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Run {
    pub start: u64,
    pub width: u64,
}

impl Run {
    pub fn new(start: u64, width: u64) -> Self {
        Self { start, width }
    }

    /// One past the last bit of the run.
    pub fn end(&self) -> u64 {
        self.start + self.width
    }

    pub fn contains(&self, position: u64) -> bool {
        (self.start..self.end()).contains(&position)
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Lazy walk over the set runs of a tower, from either end.
///
/// Tracks absolute positions as it goes, so each step is amortized O(1).
pub struct Runs<'a> {
    tower: &'a RangeTower,
    front: Option<NodeId>,
    /// Where the zeros of `front` begin.
    front_pos: u64,
    back: Option<NodeId>,
    /// Where the ones of `back` end.
    back_pos: u64,
}

impl<'a> Runs<'a> {
    pub(crate) fn new(tower: &'a RangeTower) -> Self {
        let tree = tower.tree();
        Self {
            tower,
            front: tree.first(),
            front_pos: 0,
            back: tree.last(),
            back_pos: tree.root().map_or(0, |r| tree[r].subtree_width),
        }
    }
}

impl Iterator for Runs<'_> {
    type Item = Run;

    fn next(&mut self) -> Option<Run> {
        let tree = self.tower.tree();
        loop {
            if self.front_pos >= self.back_pos {
                return None;
            }
            let id = self.front?;
            let node = tree[id];
            let ones_start = self.front_pos + node.zeros;
            self.front = tree.next(id);
            self.front_pos = ones_start + node.ones;
            if node.ones > 0 {
                return Some(Run::new(ones_start, node.ones));
            }
        }
    }
}

impl DoubleEndedIterator for Runs<'_> {
    fn next_back(&mut self) -> Option<Run> {
        let tree = self.tower.tree();
        loop {
            if self.front_pos >= self.back_pos {
                return None;
            }
            let id = self.back?;
            let node = tree[id];
            let end = self.back_pos;
            self.back = tree.prev(id);
            self.back_pos = end - node.ones - node.zeros;
            if node.ones > 0 {
                return Some(Run::new(end - node.ones, node.ones));
            }
        }
    }
}

impl FusedIterator for Runs<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_bounds() {
        let run = Run::new(3, 4);

        assert_eq!(run.end(), 7);
        assert!(!run.contains(2));
        assert!(run.contains(3));
        assert!(run.contains(6));
        assert!(!run.contains(7));
        assert_eq!(format!("{run:?}"), "[3, 7)");
    }

    #[test]
    fn test_walk_from_both_ends() {
        let tower = RangeTower::from_iter([Run::new(1, 2), Run::new(5, 1), Run::new(9, 3)]);

        let mut runs = tower.iter();
        assert_eq!(runs.next(), Some(Run::new(1, 2)));
        assert_eq!(runs.next_back(), Some(Run::new(9, 3)));
        assert_eq!(runs.next_back(), Some(Run::new(5, 1)));
        assert_eq!(runs.next(), None);
        assert_eq!(runs.next_back(), None);

        assert_eq!(
            tower.iter().rev().collect::<Vec<_>>(),
            vec![Run::new(9, 3), Run::new(5, 1), Run::new(1, 2)]
        );
    }

    #[test]
    fn test_empty_tower_has_no_runs() {
        let tower = RangeTower::new();

        assert_eq!(tower.iter().next(), None);
        assert_eq!(tower.iter().next_back(), None);
    }

    #[test]
    fn test_run_reaching_the_top() {
        let mut tower = RangeTower::new();
        tower.set1(crate::UNBOUNDED - 2, 2);

        assert_eq!(
            tower.iter().collect::<Vec<_>>(),
            vec![Run::new(crate::UNBOUNDED - 2, 2)]
        );
        assert_eq!(tower.iter().next_back(), Some(Run::new(crate::UNBOUNDED - 2, 2)));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Run::new(4, 2)).unwrap();
        assert_eq!(json, r#"{"start":4,"width":2}"#);
        assert_eq!(serde_json::from_str::<Run>(&json).unwrap(), Run::new(4, 2));
    }
}
