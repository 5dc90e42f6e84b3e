//! Self-balancing BST of items keyed by `item_lcn`, per spec.md §4.2.
//!
//! The source implementation links items with raw owning pointers; here the
//! arena owns every `Item` in a `Vec` and the tree links are `ItemId`
//! indices into it (spec.md §9).

use crate::item::{Item, ItemId};
use crate::types::{Direction, Lcn};

const REBALANCE_INTERVAL: u32 = 1000;

pub struct ItemTree {
    arena: Vec<Item>,
    root: Option<ItemId>,
    inserts_since_balance: u32,
}

impl ItemTree {
    pub fn new() -> Self {
        Self { arena: Vec::new(), root: None, inserts_since_balance: 0 }
    }

    pub fn get(&self, id: ItemId) -> &Item {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: ItemId) -> &mut Item {
        &mut self.arena[id.0]
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn root(&self) -> Option<ItemId> {
        self.root
    }

    fn lcn_of(&self, id: ItemId) -> Lcn {
        self.arena[id.0].item_lcn()
    }

    /// Adds `item` to the arena and inserts it into the tree, keyed by
    /// `item_lcn`. Equal keys are allowed; ties are broken by insertion
    /// order (invariant 3). Rebalances every 1000 inserts (spec.md §4.2).
    pub fn insert(&mut self, item: Item) -> ItemId {
        let id = ItemId(self.arena.len());
        self.arena.push(item);
        let new_lcn = self.lcn_of(id);

        let mut parent = None;
        let mut cursor = self.root;
        let mut insert_as_smaller = false;

        while let Some(here) = cursor {
            parent = Some(here);
            let here_lcn = self.lcn_of(here);
            if here_lcn > new_lcn {
                insert_as_smaller = true;
                cursor = self.arena[here.0].tree_smaller;
            } else {
                insert_as_smaller = false;
                cursor = self.arena[here.0].tree_bigger;
            }
        }

        self.arena[id.0].tree_parent = parent;
        match parent {
            None => self.root = Some(id),
            Some(p) if insert_as_smaller => self.arena[p.0].tree_smaller = Some(id),
            Some(p) => self.arena[p.0].tree_bigger = Some(id),
        }

        self.inserts_since_balance += 1;
        if self.inserts_since_balance >= REBALANCE_INTERVAL {
            self.inserts_since_balance = 0;
            self.rebalance();
        }

        id
    }

    /// Re-inserts an item whose LCN changed (e.g. after a move) by detaching
    /// and inserting it again; it genuinely moves to a new place in the tree.
    pub fn relocate(&mut self, id: ItemId) {
        self.detach(id);
        let new_lcn = self.lcn_of(id);

        let mut parent = None;
        let mut cursor = self.root;
        let mut insert_as_smaller = false;
        while let Some(here) = cursor {
            parent = Some(here);
            let here_lcn = self.lcn_of(here);
            if here_lcn > new_lcn {
                insert_as_smaller = true;
                cursor = self.arena[here.0].tree_smaller;
            } else {
                insert_as_smaller = false;
                cursor = self.arena[here.0].tree_bigger;
            }
        }
        self.arena[id.0].tree_parent = parent;
        self.arena[id.0].tree_smaller = None;
        self.arena[id.0].tree_bigger = None;
        match parent {
            None => self.root = Some(id),
            Some(p) if insert_as_smaller => self.arena[p.0].tree_smaller = Some(id),
            Some(p) => self.arena[p.0].tree_bigger = Some(id),
        }
    }

    pub fn smallest(&self, top: Option<ItemId>) -> Option<ItemId> {
        let mut cur = top?;
        while let Some(s) = self.arena[cur.0].tree_smaller {
            cur = s;
        }
        Some(cur)
    }

    pub fn biggest(&self, top: Option<ItemId>) -> Option<ItemId> {
        let mut cur = top?;
        while let Some(b) = self.arena[cur.0].tree_bigger {
            cur = b;
        }
        Some(cur)
    }

    pub fn next(&self, here: ItemId) -> Option<ItemId> {
        if let Some(bigger) = self.arena[here.0].tree_bigger {
            return self.smallest(Some(bigger));
        }
        let mut cur = here;
        loop {
            let parent = self.arena[cur.0].tree_parent?;
            if self.arena[parent.0].tree_bigger == Some(cur) {
                cur = parent;
                continue;
            }
            return Some(parent);
        }
    }

    pub fn prev(&self, here: ItemId) -> Option<ItemId> {
        if let Some(smaller) = self.arena[here.0].tree_smaller {
            return self.biggest(Some(smaller));
        }
        let mut cur = here;
        loop {
            let parent = self.arena[cur.0].tree_parent?;
            if self.arena[parent.0].tree_smaller == Some(cur) {
                cur = parent;
                continue;
            }
            return Some(parent);
        }
    }

    pub fn next_prev(&self, here: ItemId, direction: Direction) -> Option<ItemId> {
        match direction {
            Direction::Above => self.next(here),
            Direction::Below => self.prev(here),
        }
    }

    pub fn first(&self, direction: Direction) -> Option<ItemId> {
        match direction {
            Direction::Above => self.smallest(self.root),
            Direction::Below => self.biggest(self.root),
        }
    }

    /// In-order traversal of the whole tree.
    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        let mut stack = Vec::new();
        let mut cur = self.root;
        std::iter::from_fn(move || loop {
            if let Some(c) = cur {
                stack.push(c);
                cur = self.arena[c.0].tree_smaller;
                continue;
            }
            let Some(top) = stack.pop() else { return None };
            cur = self.arena[top.0].tree_bigger;
            return Some(top);
        })
    }

    /// Unlinks `item` from the tree (does not remove it from the arena).
    /// Implements the three standard BST-delete cases (spec.md §4.2).
    pub fn detach(&mut self, item: ItemId) {
        let parent = self.arena[item.0].tree_parent;
        let smaller = self.arena[item.0].tree_smaller;
        let bigger = self.arena[item.0].tree_bigger;

        let replace_in_parent = |tree: &mut Self, replacement: Option<ItemId>| {
            match parent {
                Some(p) if tree.arena[p.0].tree_smaller == Some(item) => {
                    tree.arena[p.0].tree_smaller = replacement;
                }
                Some(p) => tree.arena[p.0].tree_bigger = replacement,
                None => tree.root = replacement,
            }
        };

        match bigger {
            None => {
                // Case 1: no bigger child; replace by the smaller child.
                replace_in_parent(self, smaller);
                if let Some(s) = smaller {
                    self.arena[s.0].tree_parent = parent;
                }
            }
            Some(b) if self.arena[b.0].tree_smaller.is_none() => {
                // Case 2: bigger child has no smaller child; it takes the node's place.
                replace_in_parent(self, Some(b));
                self.arena[b.0].tree_parent = parent;
                self.arena[b.0].tree_smaller = smaller;
                if let Some(s) = smaller {
                    self.arena[s.0].tree_parent = Some(b);
                }
            }
            Some(b) => {
                // Case 3: replace by the in-order successor (min of the right subtree).
                // `b.tree_smaller` is guaranteed `Some` here (case 2 handled the other
                // branch), so the successor is strictly below `b` and its parent is
                // never `item` itself.
                let mut succ = b;
                while let Some(s) = self.arena[succ.0].tree_smaller {
                    succ = s;
                }
                let succ_parent = self.arena[succ.0].tree_parent.unwrap();
                let succ_bigger = self.arena[succ.0].tree_bigger;

                if self.arena[succ_parent.0].tree_bigger == Some(succ) {
                    self.arena[succ_parent.0].tree_bigger = succ_bigger;
                } else {
                    self.arena[succ_parent.0].tree_smaller = succ_bigger;
                }
                if let Some(sb) = succ_bigger {
                    self.arena[sb.0].tree_parent = succ_parent;
                }

                replace_in_parent(self, Some(succ));
                self.arena[succ.0].tree_parent = parent;
                self.arena[succ.0].tree_smaller = smaller;
                if let Some(s) = smaller {
                    self.arena[s.0].tree_parent = Some(succ);
                }
                self.arena[succ.0].tree_bigger = bigger;
                if let Some(bi) = bigger {
                    self.arena[bi.0].tree_parent = Some(succ);
                }
            }
        }

        self.arena[item.0].tree_parent = None;
        self.arena[item.0].tree_smaller = None;
        self.arena[item.0].tree_bigger = None;
    }

    /// Height of the tree, for the `height <= 2*log2(n)+c` invariant check.
    pub fn height(&self) -> usize {
        fn go(tree: &ItemTree, node: Option<ItemId>) -> usize {
            match node {
                None => 0,
                Some(id) => {
                    1 + go(tree, tree.arena[id.0].tree_smaller).max(go(tree, tree.arena[id.0].tree_bigger))
                }
            }
        }
        go(self, self.root)
    }

    /// DSW (tree -> vine -> balanced tree) rebalance, as in the source's
    /// `tree_balance` (spec.md §4.2): O(n), invoked every 1000 inserts.
    pub fn rebalance(&mut self) {
        if self.root.is_none() {
            return;
        }

        // Tree -> vine (right-leaning linked list via right rotations).
        let mut a = self.root;
        let mut c = a;
        let mut count: i64 = 0;

        while let Some(a_id) = a {
            if self.arena[a_id.0].tree_bigger.is_none() {
                count += 1;
                c = a;
                a = self.arena[a_id.0].tree_smaller;
                continue;
            }
            let b_id = self.arena[a_id.0].tree_bigger.unwrap();
            if self.root == a {
                self.root = Some(b_id);
            }
            self.arena[a_id.0].tree_bigger = self.arena[b_id.0].tree_smaller;
            if let Some(ab) = self.arena[a_id.0].tree_bigger {
                self.arena[ab.0].tree_parent = Some(a_id);
            }
            self.arena[b_id.0].tree_parent = self.arena[a_id.0].tree_parent;
            if let Some(bp) = self.arena[b_id.0].tree_parent {
                if self.arena[bp.0].tree_smaller == Some(a_id) {
                    self.arena[bp.0].tree_smaller = Some(b_id);
                } else {
                    self.arena[bp.0].tree_bigger = Some(b_id);
                }
            }
            self.arena[b_id.0].tree_smaller = Some(a_id);
            self.arena[a_id.0].tree_parent = Some(b_id);
            a = Some(b_id);
        }

        // Vine -> balanced tree via a bounded sequence of left rotations.
        let mut skip: i64 = 1;
        while skip < count + 2 {
            skip <<= 1;
        }
        skip = count + 1 - (skip >> 1);

        let mut c_cursor = c;
        while let Some(c_id) = c_cursor {
            if skip <= 0 {
                c_cursor = self.arena[c_id.0].tree_parent;
            }
            let mut a_cursor = c_cursor;

            loop {
                let Some(a_id) = a_cursor else { break };
                let b_id = a_id;
                let Some(parent_of_b) = self.arena[b_id.0].tree_parent else { break };
                a_cursor = self.arena[parent_of_b.0].tree_parent;

                // Rotate left at `parent_of_b` (source variable name: A).
                let a_id = parent_of_b;
                if self.root == Some(a_id) {
                    self.root = Some(b_id);
                }
                self.arena[a_id.0].tree_smaller = self.arena[b_id.0].tree_bigger;
                if let Some(as_) = self.arena[a_id.0].tree_smaller {
                    self.arena[as_.0].tree_parent = Some(a_id);
                }
                self.arena[b_id.0].tree_parent = self.arena[a_id.0].tree_parent;
                if let Some(bp) = self.arena[b_id.0].tree_parent {
                    if self.arena[bp.0].tree_smaller == Some(a_id) {
                        self.arena[bp.0].tree_smaller = Some(b_id);
                    } else {
                        self.arena[bp.0].tree_bigger = Some(b_id);
                    }
                }
                self.arena[a_id.0].tree_parent = Some(b_id);
                self.arena[b_id.0].tree_bigger = Some(a_id);

                a_cursor = self.arena[b_id.0].tree_parent;
                skip -= 1;
                if skip == 0 {
                    break;
                }
            }
        }
    }
}

impl Default for ItemTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn item_at(lcn: u64) -> Item {
        let mut it = Item::new(None, 0, false);
        it.fragments = vec![crate::item::Fragment { lcn: Lcn::new(lcn), next_vcn: crate::types::Vcn::new(1) }];
        it
    }

    #[test]
    fn insert_and_inorder_matches_sorted_lcn() {
        let mut tree = ItemTree::new();
        for lcn in [50, 10, 70, 20, 5, 90] {
            tree.insert(item_at(lcn));
        }
        let lcns: Vec<u64> = tree.iter().map(|id| tree.get(id).item_lcn().as_u64()).collect();
        assert_eq!(lcns, vec![5, 10, 20, 50, 70, 90]);
    }

    #[test]
    fn smallest_and_biggest() {
        let mut tree = ItemTree::new();
        for lcn in [50, 10, 70, 20, 5, 90] {
            tree.insert(item_at(lcn));
        }
        let smallest = tree.smallest(tree.root()).unwrap();
        let biggest = tree.biggest(tree.root()).unwrap();
        assert_eq!(tree.get(smallest).item_lcn().as_u64(), 5);
        assert_eq!(tree.get(biggest).item_lcn().as_u64(), 90);
    }

    #[test]
    fn detach_leaf() {
        let mut tree = ItemTree::new();
        let ids: Vec<_> = [50, 10, 70].into_iter().map(|l| tree.insert(item_at(l))).collect();
        tree.detach(ids[1]); // detach the 10 (a leaf, smaller of 50)
        let lcns: Vec<u64> = tree.iter().map(|id| tree.get(id).item_lcn().as_u64()).collect();
        assert_eq!(lcns, vec![50, 70]);
    }

    #[test]
    fn detach_node_with_two_children_uses_successor() {
        let mut tree = ItemTree::new();
        let ids: Vec<_> = [50, 10, 70, 60, 90].into_iter().map(|l| tree.insert(item_at(l))).collect();
        tree.detach(ids[2]); // detach 70, successor is 90
        let lcns: Vec<u64> = tree.iter().map(|id| tree.get(id).item_lcn().as_u64()).collect();
        assert_eq!(lcns, vec![10, 50, 60, 90]);
    }

    #[test]
    fn rebalance_keeps_inorder_and_bounds_height() {
        let mut tree = ItemTree::new();
        for lcn in 0..2000u64 {
            tree.insert(item_at(lcn));
        }
        tree.rebalance();
        let lcns: Vec<u64> = tree.iter().map(|id| tree.get(id).item_lcn().as_u64()).collect();
        let sorted: Vec<u64> = { let mut v = lcns.clone(); v.sort(); v };
        assert_eq!(lcns, sorted);

        let n = tree.len() as f64;
        let bound = 2.0 * n.log2() + 8.0;
        assert!((tree.height() as f64) <= bound, "height {} exceeds bound {}", tree.height(), bound);
    }

    #[test]
    fn next_and_prev_walk_in_order() {
        let mut tree = ItemTree::new();
        let ids: Vec<_> = [50, 10, 70, 20, 5, 90].into_iter().map(|l| tree.insert(item_at(l))).collect();
        let smallest = tree.smallest(tree.root()).unwrap();
        let mut collected = vec![tree.get(smallest).item_lcn().as_u64()];
        let mut cur = smallest;
        while let Some(next) = tree.next(cur) {
            collected.push(tree.get(next).item_lcn().as_u64());
            cur = next;
        }
        assert_eq!(collected, vec![5, 10, 20, 50, 70, 90]);
        let _ = ids;
    }
}
