//! Augmented AA-tree.
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeId`], so a
//! rotation is a handful of index reassignments. Every node carries caller
//! data `T`; an [`Augment`] implementation recomputes whatever aggregate `T`
//! caches about its subtree whenever a node's children change.

use std::cmp::Ordering;

use slotmap::{SlotMap, new_key_type};

use crate::Error;

new_key_type! {
    /// Handle to a node of an [`Abt`]. Stale after the node is deleted.
    pub struct NodeId;
}

/// Recomputes a node's subtree aggregate.
///
/// The tree only reaugments the nodes a rotation touches and relies on
/// every ancestor's aggregate being unchanged by that rotation. An
/// implementation must therefore be a pure function of `node`'s own data and
/// the aggregates already stored in `left` and `right`: the result may not
/// depend on the shape of the subtree (sums, counts, minima qualify; depth
/// does not).
pub trait Augment<T> {
    fn reaugment(&self, node: &mut T, left: Option<&T>, right: Option<&T>);
}

/// Ordering used by [`Abt::insert`], [`Abt::find`] and [`Abt::changed`].
/// Trees that are only ever built positionally do not need one.
pub trait Compare<T>: Augment<T> {
    fn compare(&self, a: &T, b: &T) -> Ordering;
}

#[derive(Debug, Clone)]
struct Node<T> {
    up: Option<NodeId>,
    down: [Option<NodeId>; 2],
    level: u32,
    data: T,
}

#[derive(Debug, Clone)]
pub struct Abt<T, A> {
    nodes: SlotMap<NodeId, Node<T>>,
    root: Option<NodeId>,
    aug: A,
}

impl<T, A: Augment<T>> Abt<T, A> {
    pub fn new(aug: A) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            aug,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(id).map(|n| &n.data)
    }

    /// Mutable access to a node's data. If the change affects the
    /// augmentation, follow up with [`Abt::reaugmented`].
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.nodes.get_mut(id).map(|n| &mut n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].up
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].down[0]
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].down[1]
    }

    pub fn level(&self, id: NodeId) -> u32 {
        self.nodes[id].level
    }

    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|r| self.extreme(r, 0))
    }

    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|r| self.extreme(r, 1))
    }

    /// In-order successor, `None` past the last node.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.step(id, 1)
    }

    /// In-order predecessor, `None` before the first node.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.step(id, 0)
    }

    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            tree: self,
            front: self.first(),
            back: self.last(),
            remaining: self.len(),
        }
    }

    /// Inserts `data` immediately after `prev` in order, or as the first node
    /// when `prev` is `None`.
    pub fn insert_after(&mut self, prev: Option<NodeId>, data: T) -> NodeId {
        self.insert_beside(prev, 1, data)
    }

    /// Inserts `data` immediately before `next` in order, or as the last node
    /// when `next` is `None`.
    pub fn insert_before(&mut self, next: Option<NodeId>, data: T) -> NodeId {
        self.insert_beside(next, 0, data)
    }

    /// Unlinks `id` and returns its data.
    pub fn delete(&mut self, id: NodeId) -> T {
        let Node {
            up,
            down: [left, right],
            level,
            ..
        } = self.nodes[id];

        let fix_from = match right {
            None => {
                self.replace_child(up, id, left);
                if let Some(l) = left {
                    self.nodes[l].up = up;
                }
                up
            }
            Some(r) if self.nodes[r].down[0].is_none() => {
                self.nodes[r].down[0] = left;
                if let Some(l) = left {
                    self.nodes[l].up = Some(r);
                }
                self.replace_child(up, id, Some(r));
                self.nodes[r].up = up;
                self.nodes[r].level = level;
                Some(r)
            }
            Some(r) => {
                // Swap in the in-order successor, the leftmost node of the
                // right subtree.
                let s = self.extreme(r, 0);
                let s_up = self.nodes[s].up.expect("successor is below the right child");
                let s_right = self.nodes[s].down[1];
                self.nodes[s_up].down[0] = s_right;
                if let Some(x) = s_right {
                    self.nodes[x].up = Some(s_up);
                }

                self.nodes[s].down = [left, right];
                if let Some(l) = left {
                    self.nodes[l].up = Some(s);
                }
                self.nodes[r].up = Some(s);
                self.replace_child(up, id, Some(s));
                self.nodes[s].up = up;
                self.nodes[s].level = level;
                Some(s_up)
            }
        };

        let node = self.nodes.remove(id).expect("deleted node is live");
        if let Some(p) = fix_from {
            self.reaugmented(p);
            self.rebalance_after_delete(p);
        }
        node.data
    }

    /// Recomputes the augmentation of `id` and every ancestor of it. Call
    /// after changing augmentation-relevant data through [`Abt::get_mut`].
    pub fn reaugmented(&mut self, id: NodeId) {
        let mut node = Some(id);
        while let Some(n) = node {
            self.reaugment(n);
            node = self.nodes[n].up;
        }
    }

    pub fn height(&self) -> usize {
        fn depth<T, A>(tree: &Abt<T, A>, node: Option<NodeId>) -> usize {
            match node {
                None => 0,
                Some(n) => {
                    let [l, r] = tree.nodes[n].down;
                    1 + depth(tree, l).max(depth(tree, r))
                }
            }
        }
        depth(self, self.root)
    }

    fn insert_beside(&mut self, anchor: Option<NodeId>, dir: usize, data: T) -> NodeId {
        let id = self.nodes.insert(Node {
            up: None,
            down: [None, None],
            level: 1,
            data,
        });

        // `dir == 1`: after `anchor`; `dir == 0`: before it.
        let other = 1 - dir;
        match anchor {
            None => match self.root {
                None => self.root = Some(id),
                Some(r) => {
                    let edge = self.extreme(r, other);
                    self.link(edge, other, id);
                }
            },
            Some(a) => match self.nodes[a].down[dir] {
                None => self.link(a, dir, id),
                Some(child) => {
                    let edge = self.extreme(child, other);
                    self.link(edge, other, id);
                }
            },
        }

        self.rebalance_after_insert(id);
        id
    }

    fn rebalance_after_insert(&mut self, id: NodeId) {
        self.reaugmented(id);
        let mut node = id;
        while let Some(up) = self.nodes[node].up {
            node = self.skew(up);
            node = self.split(node);
        }
    }

    fn rebalance_after_delete(&mut self, from: NodeId) {
        let mut cursor = Some(from);
        while let Some(mut p) = cursor {
            let level = self.nodes[p].level;
            let [left, right] = self.nodes[p].down;
            if self.level_of(left) + 1 < level || self.level_of(right) + 1 < level {
                let level = level - 1;
                self.nodes[p].level = level;
                if let Some(r) = right {
                    if self.nodes[r].level > level {
                        self.nodes[r].level = level;
                    }
                }

                p = self.skew(p);
                if let Some(r) = self.nodes[p].down[1] {
                    let r = self.skew(r);
                    if let Some(rr) = self.nodes[r].down[1] {
                        self.skew(rr);
                    }
                }
                p = self.split(p);
                if let Some(r) = self.nodes[p].down[1] {
                    self.split(r);
                }
            }
            cursor = self.nodes[p].up;
        }
    }

    /// Rotates right if `a` has a left child on its own level.
    fn skew(&mut self, a: NodeId) -> NodeId {
        let Some(b) = self.nodes[a].down[0] else {
            return a;
        };
        if self.nodes[b].level != self.nodes[a].level {
            return a;
        }

        let up = self.nodes[a].up;
        let inner = self.nodes[b].down[1];
        self.nodes[a].down[0] = inner;
        if let Some(c) = inner {
            self.nodes[c].up = Some(a);
        }
        self.replace_child(up, a, Some(b));
        self.nodes[b].down[1] = Some(a);
        self.nodes[b].up = up;
        self.nodes[a].up = Some(b);

        self.reaugment(a);
        self.reaugment(b);
        b
    }

    /// Rotates left and promotes if `a` starts two right links on its level.
    fn split(&mut self, a: NodeId) -> NodeId {
        let Some(b) = self.nodes[a].down[1] else {
            return a;
        };
        let Some(c) = self.nodes[b].down[1] else {
            return a;
        };
        if self.nodes[c].level != self.nodes[a].level {
            return a;
        }

        let up = self.nodes[a].up;
        let inner = self.nodes[b].down[0];
        self.nodes[a].down[1] = inner;
        if let Some(d) = inner {
            self.nodes[d].up = Some(a);
        }
        self.replace_child(up, a, Some(b));
        self.nodes[b].down[0] = Some(a);
        self.nodes[b].up = up;
        self.nodes[a].up = Some(b);
        self.nodes[b].level += 1;

        self.reaugment(a);
        self.reaugment(b);
        b
    }

    fn reaugment(&mut self, id: NodeId) {
        let aug = &self.aug;
        let down = self.nodes[id].down;
        match down {
            [None, None] => aug.reaugment(&mut self.nodes[id].data, None, None),
            [Some(l), None] => {
                let [node, l] = self
                    .nodes
                    .get_disjoint_mut([id, l])
                    .expect("children are live and distinct");
                aug.reaugment(&mut node.data, Some(&l.data), None)
            }
            [None, Some(r)] => {
                let [node, r] = self
                    .nodes
                    .get_disjoint_mut([id, r])
                    .expect("children are live and distinct");
                aug.reaugment(&mut node.data, None, Some(&r.data))
            }
            [Some(l), Some(r)] => {
                let [node, l, r] = self
                    .nodes
                    .get_disjoint_mut([id, l, r])
                    .expect("children are live and distinct");
                aug.reaugment(&mut node.data, Some(&l.data), Some(&r.data))
            }
        }
    }

    fn link(&mut self, parent: NodeId, dir: usize, child: NodeId) {
        self.nodes[parent].down[dir] = Some(child);
        self.nodes[child].up = Some(parent);
    }

    /// Points whatever referred to `old` (its parent, or the root) at `new`.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                let down = &mut self.nodes[p].down;
                if down[0] == Some(old) {
                    down[0] = new;
                } else {
                    debug_assert_eq!(down[1], Some(old));
                    down[1] = new;
                }
            }
        }
    }

    fn extreme(&self, mut id: NodeId, dir: usize) -> NodeId {
        while let Some(child) = self.nodes[id].down[dir] {
            id = child;
        }
        id
    }

    fn step(&self, id: NodeId, dir: usize) -> Option<NodeId> {
        if let Some(child) = self.nodes[id].down[dir] {
            return Some(self.extreme(child, 1 - dir));
        }
        let mut node = id;
        while let Some(up) = self.nodes[node].up {
            if self.nodes[up].down[1 - dir] == Some(node) {
                return Some(up);
            }
            node = up;
        }
        None
    }

    fn level_of(&self, id: Option<NodeId>) -> u32 {
        id.map_or(0, |n| self.nodes[n].level)
    }
}

impl<T, A: Compare<T>> Abt<T, A> {
    /// Inserts `data` in comparator order. If an equal node already exists
    /// nothing is inserted and the existing node is returned with `data`.
    pub fn insert(&mut self, data: T) -> Result<NodeId, (NodeId, T)> {
        let mut parent = None;
        let mut node = self.root;
        while let Some(n) = node {
            let dir = match self.aug.compare(&data, &self.nodes[n].data) {
                Ordering::Less => 0,
                Ordering::Greater => 1,
                Ordering::Equal => return Err((n, data)),
            };
            parent = Some((n, dir));
            node = self.nodes[n].down[dir];
        }

        let id = self.nodes.insert(Node {
            up: None,
            down: [None, None],
            level: 1,
            data,
        });
        match parent {
            None => self.root = Some(id),
            Some((p, dir)) => self.link(p, dir, id),
        }
        self.rebalance_after_insert(id);
        Ok(id)
    }

    pub fn find(&self, probe: &T) -> Option<NodeId> {
        let mut node = self.root;
        while let Some(n) = node {
            node = match self.aug.compare(probe, &self.nodes[n].data) {
                Ordering::Less => self.nodes[n].down[0],
                Ordering::Greater => self.nodes[n].down[1],
                Ordering::Equal => return Some(n),
            };
        }
        None
    }

    /// Repositions `id` after its key was changed through [`Abt::get_mut`].
    /// The node is reinserted under a new id; on a collision the node is
    /// dropped from the tree and handed back with the node it collided with.
    pub fn changed(&mut self, id: NodeId) -> Result<NodeId, (NodeId, T)> {
        let data = self.delete(id);
        self.insert(data)
    }
}

impl<T: Clone + PartialEq + std::fmt::Debug, A: Augment<T>> Abt<T, A> {
    /// Checks the AA level discipline, parent links and every node's
    /// augmentation.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(root) = self.root {
            if self.nodes[root].up.is_some() {
                return Err(Error::Invariant("root has a parent".into()));
            }
        }

        let mut seen = 0;
        for (id, node) in self.nodes.iter() {
            let Node {
                up,
                down: [left, right],
                level,
                ..
            } = *node;
            let reachable = match up {
                None => self.root == Some(id),
                Some(p) => self.nodes.get(p).is_some_and(|p| p.down.contains(&Some(id))),
            };
            if !reachable {
                return Err(Error::Invariant(format!("{id:?} is not linked from its parent")));
            }
            for child in [left, right].into_iter().flatten() {
                if self.nodes[child].up != Some(id) {
                    return Err(Error::Invariant(format!("{child:?} has a stale parent")));
                }
            }

            if level == 0 {
                return Err(Error::Invariant(format!("{id:?} has level 0")));
            }
            if self.level_of(left) >= level {
                return Err(Error::Invariant(format!("{id:?} has a left horizontal link")));
            }
            if self.level_of(right) > level {
                return Err(Error::Invariant(format!("{id:?} has a taller right child")));
            }
            if let Some(r) = right {
                if self.level_of(self.nodes[r].down[1]) >= level {
                    return Err(Error::Invariant(format!(
                        "{id:?} starts two right horizontal links"
                    )));
                }
            }

            let mut expected = node.data.clone();
            self.aug.reaugment(
                &mut expected,
                left.map(|l| &self.nodes[l].data),
                right.map(|r| &self.nodes[r].data),
            );
            if expected != node.data {
                return Err(Error::Invariant(format!(
                    "{id:?} holds {:?}, expected {expected:?}",
                    node.data
                )));
            }
            seen += 1;
        }

        if self.iter().count() != seen {
            return Err(Error::Invariant("in-order walk misses nodes".into()));
        }
        Ok(())
    }
}

impl<T, A: Augment<T>> std::ops::Index<NodeId> for Abt<T, A> {
    type Output = T;

    fn index(&self, id: NodeId) -> &T {
        &self.nodes[id].data
    }
}

pub struct Iter<'a, T, A> {
    tree: &'a Abt<T, A>,
    front: Option<NodeId>,
    back: Option<NodeId>,
    remaining: usize,
}

impl<'a, T, A: Augment<T>> Iterator for Iter<'a, T, A> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.front?;
        self.remaining -= 1;
        self.front = self.tree.next(id);
        Some((id, &self.tree.nodes[id].data))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, A: Augment<T>> DoubleEndedIterator for Iter<'_, T, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.back?;
        self.remaining -= 1;
        self.back = self.tree.prev(id);
        Some((id, &self.tree.nodes[id].data))
    }
}

impl<T, A: Augment<T>> ExactSizeIterator for Iter<'_, T, A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::collections::BTreeSet;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        key: u32,
        count: usize,
    }

    impl Item {
        fn new(key: u32) -> Self {
            Self { key, count: 1 }
        }
    }

    #[derive(Debug, Clone, Copy)]
    struct Counted;

    impl Augment<Item> for Counted {
        fn reaugment(&self, node: &mut Item, left: Option<&Item>, right: Option<&Item>) {
            node.count = 1 + left.map_or(0, |l| l.count) + right.map_or(0, |r| r.count);
        }
    }

    impl Compare<Item> for Counted {
        fn compare(&self, a: &Item, b: &Item) -> Ordering {
            a.key.cmp(&b.key)
        }
    }

    type Tree = Abt<Item, Counted>;

    /// Order-statistics descent over the `count` augmentation.
    fn nth(tree: &Tree, mut idx: usize) -> Option<NodeId> {
        let mut node = tree.root();
        while let Some(n) = node {
            let left_count = tree.left(n).map_or(0, |l| tree[l].count);
            match idx.cmp(&left_count) {
                Ordering::Less => node = tree.left(n),
                Ordering::Equal => return Some(n),
                Ordering::Greater => {
                    idx -= left_count + 1;
                    node = tree.right(n);
                }
            }
        }
        None
    }

    fn keys(tree: &Tree) -> Vec<u32> {
        tree.iter().map(|(_, item)| item.key).collect()
    }

    fn assert_balanced(tree: &Tree) {
        tree.validate().unwrap();
        let bound = 2 * ((tree.len() + 1) as f64).log2().ceil() as usize + 1;
        assert!(tree.height() <= bound, "height {} > {bound}", tree.height());
    }

    #[test]
    fn test_empty() {
        let tree = Tree::new(Counted);

        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.first(), None);
        assert_eq!(tree.last(), None);
        assert_eq!(tree.height(), 0);
        tree.validate().unwrap();
    }

    #[test]
    fn test_insert_ascending() {
        let mut tree = Tree::new(Counted);
        for key in 0..200 {
            tree.insert(Item::new(key)).unwrap();
            assert_balanced(&tree);
        }

        assert_eq!(keys(&tree), Vec::from_iter(0..200));
        assert_eq!(tree[tree.root().unwrap()].count, 200);
    }

    #[test]
    fn test_insert_duplicate() {
        let mut tree = Tree::new(Counted);
        let id = tree.insert(Item::new(7)).unwrap();

        let (existing, item) = tree.insert(Item::new(7)).unwrap_err();
        assert_eq!(existing, id);
        assert_eq!(item.key, 7);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_next_prev_walk_off_the_ends() {
        let mut tree = Tree::new(Counted);
        for key in [5, 1, 9] {
            tree.insert(Item::new(key)).unwrap();
        }

        let first = tree.first().unwrap();
        let last = tree.last().unwrap();
        assert_eq!(tree[first].key, 1);
        assert_eq!(tree[last].key, 9);
        assert_eq!(tree.prev(first), None);
        assert_eq!(tree.next(last), None);
        assert_eq!(tree[tree.next(first).unwrap()].key, 5);
        assert_eq!(tree[tree.prev(last).unwrap()].key, 5);

        let reversed: Vec<u32> = tree.iter().rev().map(|(_, i)| i.key).collect();
        assert_eq!(reversed, vec![9, 5, 1]);
    }

    #[test]
    fn test_insert_after_and_before() {
        let mut tree = Tree::new(Counted);
        let b = tree.insert_after(None, Item::new(2));
        tree.insert_after(Some(b), Item::new(3));
        tree.insert_before(Some(b), Item::new(1));
        tree.insert_after(None, Item::new(0));
        tree.insert_before(None, Item::new(4));

        assert_eq!(keys(&tree), vec![0, 1, 2, 3, 4]);
        assert_balanced(&tree);
    }

    #[test]
    fn test_delete_everything() {
        let mut tree = Tree::new(Counted);
        let ids: Vec<NodeId> = (0..64).map(|k| tree.insert(Item::new(k)).unwrap()).collect();

        for (i, id) in ids.into_iter().enumerate().rev() {
            assert_eq!(tree.delete(id).key, i as u32);
            assert_balanced(&tree);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_find_and_changed() {
        let mut tree = Tree::new(Counted);
        for key in [10, 20, 30, 40] {
            tree.insert(Item::new(key)).unwrap();
        }

        let id = tree.find(&Item::new(20)).unwrap();
        tree.get_mut(id).unwrap().key = 35;
        let id = tree.changed(id).unwrap();

        assert_eq!(tree[id].key, 35);
        assert_eq!(keys(&tree), vec![10, 30, 35, 40]);
        assert_eq!(tree.find(&Item::new(20)), None);
        assert_balanced(&tree);

        let clash = tree.find(&Item::new(35)).unwrap();
        tree.get_mut(clash).unwrap().key = 40;
        let (existing, item) = tree.changed(clash).unwrap_err();
        assert_eq!(tree[existing].key, 40);
        assert_eq!(item.key, 40);
        assert_eq!(keys(&tree), vec![10, 30, 40]);
    }

    #[test]
    fn test_reaugmented_after_get_mut() {
        let mut tree = Tree::new(Counted);
        for key in 0..10 {
            tree.insert(Item::new(key)).unwrap();
        }
        let leaf = tree.first().unwrap();
        tree.get_mut(leaf).unwrap().count = 99;
        assert!(tree.validate().is_err());

        tree.reaugmented(leaf);
        tree.validate().unwrap();
    }

    #[quickcheck]
    fn prop_set_model(ops: Vec<(bool, u8)>) {
        let mut model = BTreeSet::new();
        let mut tree = Tree::new(Counted);

        for (insert, key) in ops {
            let key = key as u32 % 64;
            if insert {
                assert_eq!(model.insert(key), tree.insert(Item::new(key)).is_ok());
            } else if let Some(id) = tree.find(&Item::new(key)) {
                assert!(model.remove(&key));
                tree.delete(id);
            } else {
                assert!(!model.contains(&key));
            }
            assert_balanced(&tree);
        }

        assert_eq!(keys(&tree), Vec::from_iter(model));
    }

    #[quickcheck]
    fn prop_vec_model(ops: Vec<(u8, usize, u32)>) {
        let mut model = Vec::new();
        let mut tree = Tree::new(Counted);

        for (instruction, idx, value) in ops {
            match instruction % 3 {
                0 => {
                    let idx = idx % (model.len() + 1);
                    model.insert(idx, value);
                    let prev = idx.checked_sub(1).and_then(|i| nth(&tree, i));
                    tree.insert_after(prev, Item::new(value));
                }
                1 => {
                    let idx = idx % (model.len() + 1);
                    model.insert(idx, value);
                    tree.insert_before(nth(&tree, idx), Item::new(value));
                }
                _ => {
                    if model.is_empty() {
                        continue;
                    }
                    let idx = idx % model.len();
                    let removed = model.remove(idx);
                    let id = nth(&tree, idx).unwrap();
                    assert_eq!(tree.delete(id).key, removed);
                }
            }
            assert_balanced(&tree);
        }

        assert_eq!(keys(&tree), model);
    }
}
