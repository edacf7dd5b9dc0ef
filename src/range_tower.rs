//! Sparse bitmap over `[0, UNBOUNDED)` that supports shifting bits around.
//!
//! The bitmap is stored as a sequence of nodes, each holding a run of clear
//! bits followed by a run of set bits. Nodes never record their absolute
//! position: each caches the total width of its subtree, and positions are
//! recovered by an order-statistics descent. Inserting or deleting bits
//! therefore only touches the nodes at the edit point, never everything
//! after it.
//!
//! Node shape invariants, in position order:
//! - the widths of all nodes sum to exactly [`UNBOUNDED`];
//! - only the first node may have `zeros == 0`;
//! - only the last node may have `ones == 0` (the trailing clear region);
//! - an empty tower is the single node `(UNBOUNDED, 0)`.
//!
//! Together these mean no two adjacent runs share a value, so there is one
//! node per set run (plus at most one trailing node).

use std::cell::Cell;

use tracing::trace;

use crate::abt::{Abt, Augment, NodeId};
use crate::cache::Cache;
use crate::pool::{Pool, TowerHandle};
use crate::run::{Run, Runs};
use crate::{Error, UNBOUNDED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TowerNode {
    pub(crate) zeros: u64,
    pub(crate) ones: u64,
    pub(crate) subtree_width: u64,
}

impl TowerNode {
    fn new(zeros: u64, ones: u64) -> Self {
        Self {
            zeros,
            ones,
            subtree_width: zeros + ones,
        }
    }

    fn width(&self) -> u64 {
        self.zeros + self.ones
    }
}

/// Keeps `subtree_width` equal to the node's own width plus its children's.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Widths;

impl Augment<TowerNode> for Widths {
    fn reaugment(&self, node: &mut TowerNode, left: Option<&TowerNode>, right: Option<&TowerNode>) {
        node.subtree_width = node.width()
            + left.map_or(0, |l| l.subtree_width)
            + right.map_or(0, |r| r.subtree_width);
    }
}

/// Where a node's runs lie: clear bits over `[zeros_start, ones_start)`, set
/// bits over `[ones_start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpan {
    pub zeros_start: u64,
    pub ones_start: u64,
    pub end: u64,
}

#[derive(Clone)]
pub struct RangeTower {
    tree: Abt<TowerNode, Widths>,
    cache: Cell<Cache>,
}

impl RangeTower {
    pub fn new() -> Self {
        let mut tree = Abt::new(Widths);
        tree.insert_after(None, TowerNode::new(UNBOUNDED, 0));
        Self {
            tree,
            cache: Cell::new(Cache::EMPTY),
        }
    }

    /// Creates an empty tower owned by `pool`.
    pub fn new_in(pool: &mut Pool) -> TowerHandle {
        pool.insert(Self::new())
    }

    /// Deep-copies this tower into `pool`.
    pub fn clone_in(&self, pool: &mut Pool) -> TowerHandle {
        pool.insert(self.clone())
    }

    /// `start + width`, or [`Error::Overflow`] if the range would run past
    /// the last addressable bit.
    pub fn check_range(start: u64, width: u64) -> Result<u64, Error> {
        start
            .checked_add(width)
            .ok_or(Error::Overflow { start, width })
    }

    /// True when no bit is set. O(1).
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 1 && self.tree.root().is_some_and(|r| self.tree[r].ones == 0)
    }

    /// Number of maximal set runs.
    pub fn count_runs(&self) -> usize {
        match self.tree.last() {
            Some(last) if self.tree[last].ones == 0 => self.tree.len() - 1,
            _ => self.tree.len(),
        }
    }

    /// Sets every bit in `[start, start + width)`.
    pub fn set1(&mut self, start: u64, width: u64) {
        trace!(start, width, "set1");
        self.set(start, width, true);
    }

    /// Clears every bit in `[start, start + width)`.
    pub fn set0(&mut self, start: u64, width: u64) {
        trace!(start, width, "set0");
        self.set(start, width, false);
    }

    /// Opens `width` set bits at `start`, shifting everything at or after
    /// `start` up by `width`. Bits pushed past the top are discarded.
    pub fn insert1(&mut self, start: u64, width: u64) {
        trace!(start, width, "insert1");
        self.insert(start, width, true);
    }

    /// Opens `width` clear bits at `start`, shifting everything at or after
    /// `start` up by `width`. Bits pushed past the top are discarded.
    pub fn insert0(&mut self, start: u64, width: u64) {
        trace!(start, width, "insert0");
        self.insert(start, width, false);
    }

    /// Removes `[start, start + width)`, shifting everything after it down by
    /// `width`. Clear bits fill in at the top.
    pub fn delete(&mut self, start: u64, width: u64) {
        trace!(start, width, "delete");
        assert_range(start, width);
        if width == 0 {
            return;
        }

        self.invalidate_cache();
        self.remove_span(start, width);
        self.insert_span(UNBOUNDED - width, width, false);
        self.after_mutation();
    }

    /// Relocates the `width` bits at `old_start` so that they begin at
    /// `new_start`, closing the gap they leave and shifting the bits in
    /// between to make room.
    ///
    /// Costs O(k log n) for k runs inside the moved region.
    pub fn move_range(&mut self, old_start: u64, new_start: u64, width: u64) {
        trace!(old_start, new_start, width, "move");
        assert_range(old_start, width);
        assert_range(new_start, width);
        if width == 0 || old_start == new_start {
            return;
        }

        self.invalidate_cache();
        let pieces = self.pieces(old_start, width);
        self.remove_span(old_start, width);
        let mut position = new_start;
        for (value, len) in pieces {
            self.insert_span(position, len, value);
            position += len;
        }
        self.after_mutation();
    }

    /// Resizes the `old_width` bits at `start` to `new_width` bits in place.
    ///
    /// The first `min(old_width, new_width)` bits keep their content. Growing
    /// opens bits at `start + old_width` that continue the value of the bit
    /// just before them (clear when `old_width == 0`); shrinking deletes the
    /// excess from the end of the region.
    pub fn splice(&mut self, start: u64, old_width: u64, new_width: u64) {
        trace!(start, old_width, new_width, "splice");
        assert_range(start, old_width);
        assert_range(start, new_width);

        let end = start + old_width;
        if new_width > old_width {
            let value = old_width > 0 && self.contains(end - 1);
            self.insert(end, new_width - old_width, value);
        } else if new_width < old_width {
            self.delete(start + new_width, old_width - new_width);
        }
    }

    /// Whether the bit at `position` is set.
    ///
    /// # Panics
    ///
    /// If `position` is [`UNBOUNDED`], which is never a bit index.
    pub fn contains(&self, position: u64) -> bool {
        assert!(position < UNBOUNDED, "{position} is not a bit index");
        if let Some(value) = self.cache.get().get(position) {
            return value;
        }

        let span = self.lookup(position);
        let value = position >= span.ones_start;
        self.cache.set(if value {
            Cache::new(span.ones_start, span.end, true)
        } else {
            Cache::new(span.zeros_start, span.ones_start, false)
        });
        value
    }

    /// The first set bit at or after `start`, or [`UNBOUNDED`] if there is
    /// none.
    pub fn scan(&self, start: u64) -> u64 {
        if start == UNBOUNDED {
            return UNBOUNDED;
        }
        if self.cache.get().get(start) == Some(true) {
            return start;
        }

        let span = self.lookup(start);
        if start >= span.ones_start {
            self.cache.set(Cache::new(span.ones_start, span.end, true));
            start
        } else if span.ones_start == span.end {
            UNBOUNDED
        } else {
            self.cache
                .set(Cache::new(span.zeros_start, span.ones_start, false));
            span.ones_start
        }
    }

    /// The node bracketing `position`: the set run that would hold it, and
    /// the clear run in front of that.
    ///
    /// # Panics
    ///
    /// If `position` is [`UNBOUNDED`].
    pub fn lookup(&self, position: u64) -> NodeSpan {
        let (id, zeros_start) = self
            .locate(position)
            .unwrap_or_else(|| panic!("{position} is not a bit index"));
        self.span(id, zeros_start)
    }

    pub fn first(&self) -> Option<Run> {
        self.iter().next()
    }

    pub fn last(&self) -> Option<Run> {
        self.iter().next_back()
    }

    /// The run after `run`, which must be a run of this tower.
    pub fn next(&self, run: &Run) -> Option<Run> {
        let end = run.end();
        if end == UNBOUNDED {
            return None;
        }
        let (id, zeros_start) = self.locate(end)?;
        let span = self.span(id, zeros_start);
        (span.ones_start < span.end).then(|| Run::new(span.ones_start, span.end - span.ones_start))
    }

    /// The run before `run`, which must be a run of this tower.
    pub fn prev(&self, run: &Run) -> Option<Run> {
        let (id, _) = self.locate(run.start)?;
        let prev = self.tree.prev(id)?;
        let span = self.span(prev, self.zeros_start(prev));
        Some(Run::new(span.ones_start, span.end - span.ones_start))
    }

    pub fn iter(&self) -> Runs<'_> {
        Runs::new(self)
    }

    /// Forgets the cached run. Never changes any query result.
    pub fn invalidate_cache(&self) {
        self.cache.set(Cache::EMPTY);
    }

    /// Checks the tree's balance and width bookkeeping and the node shape
    /// invariants listed in the module docs.
    pub fn validate(&self) -> Result<(), Error> {
        self.tree.validate()?;

        let total = self.tree.root().map_or(0, |r| self.tree[r].subtree_width);
        if total != UNBOUNDED {
            return Err(Error::Invariant(format!("tower spans {total} bits")));
        }

        let n = self.tree.len();
        for (i, (_, node)) in self.tree.iter().enumerate() {
            if i > 0 && node.zeros == 0 {
                return Err(Error::Invariant(format!("node {i} has no leading zeros")));
            }
            if i + 1 < n && node.ones == 0 {
                return Err(Error::Invariant(format!("node {i} has no ones")));
            }
        }
        Ok(())
    }

    pub(crate) fn tree(&self) -> &Abt<TowerNode, Widths> {
        &self.tree
    }

    fn set(&mut self, start: u64, width: u64, value: bool) {
        let end = assert_range(start, width);
        if width == 0 {
            return;
        }

        let span = self.lookup(start);
        let covered = if value {
            start >= span.ones_start && end <= span.end
        } else {
            end <= span.ones_start
        };
        if covered {
            return;
        }

        self.invalidate_cache();
        self.remove_span(start, width);
        self.insert_span(start, width, value);
        self.after_mutation();
    }

    fn insert(&mut self, start: u64, width: u64, value: bool) {
        assert_range(start, width);
        if width == 0 {
            return;
        }

        self.invalidate_cache();
        self.remove_span(UNBOUNDED - width, width);
        self.insert_span(start, width, value);
        self.after_mutation();
    }

    /// Removes `[start, start + width)` outright, shrinking the tower.
    fn remove_span(&mut self, start: u64, mut width: u64) {
        while width > 0 {
            let (id, zeros_start) = self
                .locate(start)
                .expect("removed span lies inside the tower");
            let node = self.tree[id];
            let offset = start - zeros_start;

            let taken = if offset < node.zeros {
                let taken = width.min(node.zeros - offset);
                self.update(id, |n| n.zeros -= taken);
                taken
            } else {
                let taken = width.min(node.width() - offset);
                self.update(id, |n| n.ones -= taken);
                taken
            };
            width -= taken;
            self.coalesce(id);
        }
    }

    /// Opens `width` bits of `value` at `start`, growing the tower.
    fn insert_span(&mut self, start: u64, width: u64, value: bool) {
        if width == 0 {
            return;
        }
        let Some(last) = self.tree.last() else {
            let node = if value {
                TowerNode::new(0, width)
            } else {
                TowerNode::new(width, 0)
            };
            self.tree.insert_after(None, node);
            return;
        };

        let (id, offset) = match self.locate(start) {
            Some((id, zeros_start)) => (id, start - zeros_start),
            None => (last, self.tree[last].width()),
        };
        let node = self.tree[id];

        if value {
            if offset >= node.zeros {
                self.update(id, |n| n.ones += width);
            } else if offset > 0 {
                self.update(id, |n| n.zeros -= offset);
                self.tree.insert_before(Some(id), TowerNode::new(offset, width));
            } else if let Some(prev) = self.tree.prev(id) {
                self.update(prev, |n| n.ones += width);
            } else {
                self.tree.insert_before(Some(id), TowerNode::new(0, width));
            }
        } else if offset <= node.zeros {
            self.update(id, |n| n.zeros += width);
        } else {
            let tail = node.width() - offset;
            self.update(id, |n| n.ones -= tail);
            self.tree.insert_after(Some(id), TowerNode::new(width, tail));
        }
    }

    /// Restores the node shape invariants after `id` lost bits, folding it
    /// into a neighbour when one of its runs emptied out.
    fn coalesce(&mut self, id: NodeId) {
        let TowerNode { zeros, ones, .. } = self.tree[id];
        if ones == 0 {
            if let Some(next) = self.tree.next(id) {
                self.tree.delete(id);
                self.update(next, |n| n.zeros += zeros);
            } else if zeros == 0 {
                self.tree.delete(id);
            }
        } else if zeros == 0 {
            if let Some(prev) = self.tree.prev(id) {
                self.tree.delete(id);
                self.update(prev, |n| n.ones += ones);
            }
        }
    }

    /// The runs covering `[start, start + width)` as `(value, len)` pieces.
    fn pieces(&self, start: u64, width: u64) -> Vec<(bool, u64)> {
        let end = start + width;
        let mut pieces = Vec::new();
        let (mut id, mut zeros_start) = self
            .locate(start)
            .expect("moved span lies inside the tower");

        let mut position = start;
        while position < end {
            let span = self.span(id, zeros_start);
            if position < span.ones_start {
                let len = span.ones_start.min(end) - position;
                pieces.push((false, len));
                position += len;
            }
            if position < end && position < span.end {
                let len = span.end.min(end) - position;
                pieces.push((true, len));
                position += len;
            }
            if position < end {
                id = self.tree.next(id).expect("moved span lies inside the tower");
                zeros_start = span.end;
            }
        }
        pieces
    }

    /// The node whose `[zeros_start, end)` holds `position`, with its
    /// `zeros_start`.
    fn locate(&self, mut position: u64) -> Option<(NodeId, u64)> {
        let mut node = self.tree.root();
        let mut base = 0;
        while let Some(n) = node {
            let left_width = self.left_width(n);
            if position < left_width {
                node = self.tree.left(n);
                continue;
            }
            let skipped = left_width + self.tree[n].width();
            if position < skipped {
                return Some((n, base + left_width));
            }
            position -= skipped;
            base += skipped;
            node = self.tree.right(n);
        }
        None
    }

    fn zeros_start(&self, id: NodeId) -> u64 {
        let mut start = self.left_width(id);
        let mut node = id;
        while let Some(up) = self.tree.parent(node) {
            if self.tree.right(up) == Some(node) {
                start += self.left_width(up) + self.tree[up].width();
            }
            node = up;
        }
        start
    }

    fn span(&self, id: NodeId, zeros_start: u64) -> NodeSpan {
        let node = self.tree[id];
        NodeSpan {
            zeros_start,
            ones_start: zeros_start + node.zeros,
            end: zeros_start + node.width(),
        }
    }

    fn left_width(&self, id: NodeId) -> u64 {
        self.tree
            .left(id)
            .map_or(0, |l| self.tree[l].subtree_width)
    }

    fn update(&mut self, id: NodeId, f: impl FnOnce(&mut TowerNode)) {
        if let Some(node) = self.tree.get_mut(id) {
            f(node);
        }
        self.tree.reaugmented(id);
    }

    #[cfg(feature = "validate")]
    fn after_mutation(&self) {
        if let Err(err) = self.validate() {
            panic!("{err}");
        }
    }

    #[cfg(not(feature = "validate"))]
    fn after_mutation(&self) {}
}

fn assert_range(start: u64, width: u64) -> u64 {
    match RangeTower::check_range(start, width) {
        Ok(end) => end,
        Err(err) => panic!("{err}"),
    }
}

impl Default for RangeTower {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for RangeTower {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for RangeTower {}

impl std::fmt::Debug for RangeTower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Extend<Run> for RangeTower {
    fn extend<I: IntoIterator<Item = Run>>(&mut self, runs: I) {
        for run in runs {
            self.set1(run.start, run.width);
        }
    }
}

impl FromIterator<Run> for RangeTower {
    fn from_iter<I: IntoIterator<Item = Run>>(runs: I) -> Self {
        let mut tower = Self::new();
        tower.extend(runs);
        tower
    }
}
