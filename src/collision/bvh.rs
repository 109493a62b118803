//! The dynamic AABB tree backing the broad phase.
//!
//! A self-balancing binary tree of fat AABBs. Leaves are collider proxies;
//! internal nodes enclose their children. Insertion follows the surface area
//! heuristic and every structural change attempts a local rotation to keep
//! the tree cost near optimal without full rebuilds.

use std::collections::BinaryHeap;

use super::{ray_aabb, Aabb, RayCastInput};
use crate::math::Vec2;
use crate::settings::{AABB_MARGIN, VELOCITY_MULTIPLIER};
use crate::world::ColliderKey;

pub type NodeIndex = u32;
pub const NULL_NODE: NodeIndex = u32::MAX;

#[derive(Clone, Copy, Debug)]
struct Node {
    aabb: Aabb,
    parent: NodeIndex,
    child1: NodeIndex,
    child2: NodeIndex,
    /// Freelist link while the node is unused.
    next: NodeIndex,
    moved: bool,
    data: ColliderKey,
}

impl Node {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// A "call stack" entry for traversing the tree in spatial order along a ray.
#[derive(Clone, Copy, Debug, PartialEq)]
struct RayStackEntry {
    node: NodeIndex,
    t: f64,
}
impl Eq for RayStackEntry {}
impl PartialOrd for RayStackEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        // reversed so the BinaryHeap pops the nearest entry first
        other.t.partial_cmp(&self.t)
    }
}
impl Ord for RayStackEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .t
            .partial_cmp(&self.t)
            .expect("NaN in ray traversal order")
    }
}

/// Dynamic AABB tree with incremental insert, remove and move.
pub struct AabbTree {
    nodes: Vec<Node>,
    root: NodeIndex,
    free_list: NodeIndex,
}

impl AabbTree {
    pub fn new() -> Self {
        AabbTree {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
        }
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.root = NULL_NODE;
        self.free_list = NULL_NODE;
    }

    /// Insert a leaf for `data`. The box is fattened by the tree margin.
    pub fn create_proxy(&mut self, aabb: Aabb, data: ColliderKey) -> NodeIndex {
        let node = self.allocate_node();
        self.nodes[node as usize].aabb = aabb.padded(AABB_MARGIN);
        self.nodes[node as usize].data = data;
        self.nodes[node as usize].moved = true;
        self.insert_leaf(node);
        node
    }

    /// Reposition a leaf.
    ///
    /// If the current fat box still contains `aabb` and `force_move` is not
    /// set this is a no-op returning false. Otherwise the leaf is reinserted
    /// with a margin plus a displacement-predicted extension, its `moved`
    /// flag is set and true is returned.
    pub fn move_proxy(
        &mut self,
        proxy: NodeIndex,
        aabb: Aabb,
        displacement: Vec2,
        force_move: bool,
    ) -> bool {
        debug_assert!((proxy as usize) < self.nodes.len());
        debug_assert!(self.nodes[proxy as usize].is_leaf());

        if self.nodes[proxy as usize].aabb.contains(&aabb) && !force_move {
            return false;
        }

        self.remove_leaf(proxy);
        self.nodes[proxy as usize].aabb = aabb
            .padded(AABB_MARGIN)
            .extended(displacement * VELOCITY_MULTIPLIER);
        self.insert_leaf(proxy);
        self.nodes[proxy as usize].moved = true;
        true
    }

    pub fn destroy_proxy(&mut self, proxy: NodeIndex) {
        debug_assert!((proxy as usize) < self.nodes.len());
        debug_assert!(self.nodes[proxy as usize].is_leaf());
        self.remove_leaf(proxy);
        self.free_node(proxy);
    }

    #[inline]
    pub fn fat_aabb(&self, proxy: NodeIndex) -> &Aabb {
        &self.nodes[proxy as usize].aabb
    }

    #[inline]
    pub fn test_overlap(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.nodes[a as usize]
            .aabb
            .overlaps(&self.nodes[b as usize].aabb)
    }

    #[inline]
    pub fn was_moved(&self, proxy: NodeIndex) -> bool {
        self.nodes[proxy as usize].moved
    }

    #[inline]
    pub fn clear_moved(&mut self, proxy: NodeIndex) {
        self.nodes[proxy as usize].moved = false;
    }

    /// Visit every leaf whose fat AABB overlaps `aabb`. Returning false from
    /// the callback stops the query early.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(NodeIndex, ColliderKey) -> bool) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(current, node.data) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Visit every leaf whose fat AABB contains `point`.
    pub fn query_point(&self, point: Vec2, mut callback: impl FnMut(NodeIndex, ColliderKey) -> bool) {
        if self.root == NULL_NODE {
            return;
        }
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(current) = stack.pop() {
            let node = &self.nodes[current as usize];
            if !node.aabb.contains_point(point) {
                continue;
            }
            if node.is_leaf() {
                if !callback(current, node.data) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Cast a ray (optionally inflated to a circle of `radius`) through the
    /// tree, visiting leaves in spatial order along the ray.
    ///
    /// The callback returns a new maximum fraction: `0` terminates the cast,
    /// a positive value shrinks the search and a negative value leaves it
    /// unchanged.
    pub fn ray_cast(
        &self,
        from: Vec2,
        to: Vec2,
        max_fraction: f64,
        radius: f64,
        callback: impl FnMut(&RayCastInput, ColliderKey) -> f64,
    ) {
        self.cast(from, to, max_fraction, Vec2::new(radius, radius), callback)
    }

    /// Like [`ray_cast`][Self::ray_cast] with a moving box of half-extents
    /// `extents` instead of a point.
    pub fn aabb_cast(
        &self,
        from: Vec2,
        to: Vec2,
        max_fraction: f64,
        extents: Vec2,
        callback: impl FnMut(&RayCastInput, ColliderKey) -> f64,
    ) {
        self.cast(from, to, max_fraction, extents, callback)
    }

    fn cast(
        &self,
        from: Vec2,
        to: Vec2,
        max_fraction: f64,
        extents: Vec2,
        mut callback: impl FnMut(&RayCastInput, ColliderKey) -> f64,
    ) {
        if self.root == NULL_NODE {
            return;
        }
        let d = to - from;
        if d.mag_sq() == 0.0 {
            return;
        }

        let mut max_fraction = max_fraction;
        // sweeping a box against a fat AABB is a ray against the AABB padded
        // by the box's half extents
        let padded = |node: &Node| {
            Aabb::new(node.aabb.min - extents, node.aabb.max + extents)
        };

        let mut heap: BinaryHeap<RayStackEntry> = BinaryHeap::with_capacity(64);
        if let Some(t) = ray_aabb(from, d, &padded(&self.nodes[self.root as usize])) {
            if t <= max_fraction {
                heap.push(RayStackEntry { node: self.root, t });
            }
        }

        while let Some(entry) = heap.pop() {
            if entry.t > max_fraction {
                continue;
            }
            let node = &self.nodes[entry.node as usize];
            if node.is_leaf() {
                let input = RayCastInput {
                    from,
                    to,
                    max_fraction,
                };
                let new_fraction = callback(&input, node.data);
                if new_fraction == 0.0 {
                    return;
                }
                if new_fraction > 0.0 {
                    max_fraction = new_fraction;
                }
            } else {
                for child in [node.child1, node.child2] {
                    if let Some(t) = ray_aabb(from, d, &padded(&self.nodes[child as usize])) {
                        if t <= max_fraction {
                            heap.push(RayStackEntry { node: child, t });
                        }
                    }
                }
            }
        }
    }

    /// Total surface area heuristic cost of the tree.
    pub fn compute_cost(&self) -> f64 {
        let mut cost = 0.0;
        if self.root == NULL_NODE {
            return cost;
        }
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current as usize];
            cost += node.aabb.area();
            if !node.is_leaf() {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
        cost
    }

    /// Rebuild the tree bottom-up by greedily pairing the two subtrees whose
    /// union has minimum surface area. Expensive; intended for offline
    /// defragmentation, not the per-frame path.
    pub fn rebuild(&mut self) {
        // collect leaves and free every internal node
        let mut roots: Vec<NodeIndex> = Vec::new();
        for i in 0..self.nodes.len() as NodeIndex {
            if self.is_allocated(i) {
                if self.nodes[i as usize].is_leaf() {
                    self.nodes[i as usize].parent = NULL_NODE;
                    roots.push(i);
                } else {
                    self.free_node(i);
                }
            }
        }

        if roots.is_empty() {
            self.root = NULL_NODE;
            return;
        }

        while roots.len() > 1 {
            let mut best_cost = f64::MAX;
            let mut best = (0, 1);
            for i in 0..roots.len() {
                for j in i + 1..roots.len() {
                    let cost = self.nodes[roots[i] as usize]
                        .aabb
                        .union(&self.nodes[roots[j] as usize].aabb)
                        .area();
                    if cost < best_cost {
                        best_cost = cost;
                        best = (i, j);
                    }
                }
            }

            let (i, j) = best;
            let child1 = roots[i];
            let child2 = roots[j];
            let parent = self.allocate_node();
            self.nodes[parent as usize].child1 = child1;
            self.nodes[parent as usize].child2 = child2;
            self.nodes[parent as usize].aabb = self.nodes[child1 as usize]
                .aabb
                .union(&self.nodes[child2 as usize].aabb);
            self.nodes[child1 as usize].parent = parent;
            self.nodes[child2 as usize].parent = parent;

            roots[i] = parent;
            roots.swap_remove(j);
        }

        self.root = roots[0];
    }

    //
    // internals
    //

    fn allocate_node(&mut self) -> NodeIndex {
        if self.free_list != NULL_NODE {
            let node = self.free_list;
            self.free_list = self.nodes[node as usize].next;
            self.nodes[node as usize] = Node {
                aabb: Aabb::new(Vec2::zero(), Vec2::zero()),
                parent: NULL_NODE,
                child1: NULL_NODE,
                child2: NULL_NODE,
                next: NULL_NODE,
                moved: false,
                data: ColliderKey::default(),
            };
            node
        } else {
            self.nodes.push(Node {
                aabb: Aabb::new(Vec2::zero(), Vec2::zero()),
                parent: NULL_NODE,
                child1: NULL_NODE,
                child2: NULL_NODE,
                next: NULL_NODE,
                moved: false,
                data: ColliderKey::default(),
            });
            (self.nodes.len() - 1) as NodeIndex
        }
    }

    fn free_node(&mut self, node: NodeIndex) {
        self.nodes[node as usize].next = self.free_list;
        self.nodes[node as usize].parent = node; // marks the node as free
        self.free_list = node;
    }

    fn is_allocated(&self, node: NodeIndex) -> bool {
        self.nodes[node as usize].parent != node
    }

    fn insert_leaf(&mut self, leaf: NodeIndex) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL_NODE;
            return;
        }

        // find the sibling that minimizes the surface area heuristic
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut sibling = self.root;
        while !self.nodes[sibling as usize].is_leaf() {
            let child1 = self.nodes[sibling as usize].child1;
            let child2 = self.nodes[sibling as usize].child2;

            let area = self.nodes[sibling as usize].aabb.area();
            let combined_area = leaf_aabb.union(&self.nodes[sibling as usize].aabb).area();

            // cost of making the leaf a sibling of this node
            let cost = 2.0 * combined_area;
            let inheritance_cost = 2.0 * (combined_area - area);

            let child_cost = |tree: &Self, child: NodeIndex| {
                let combined = leaf_aabb.union(&tree.nodes[child as usize].aabb);
                if tree.nodes[child as usize].is_leaf() {
                    combined.area() + inheritance_cost
                } else {
                    let old_area = tree.nodes[child as usize].aabb.area();
                    (combined.area() - old_area) + inheritance_cost
                }
            };
            let cost1 = child_cost(self, child1);
            let cost2 = child_cost(self, child2);

            if cost < cost1 && cost < cost2 {
                break;
            }
            sibling = if cost1 < cost2 { child1 } else { child2 };
        }

        // splice a new parent in above the chosen sibling
        let old_parent = self.nodes[sibling as usize].parent;
        let new_parent = self.allocate_node();
        self.nodes[new_parent as usize].parent = old_parent;
        self.nodes[new_parent as usize].aabb =
            leaf_aabb.union(&self.nodes[sibling as usize].aabb);
        self.nodes[new_parent as usize].child1 = sibling;
        self.nodes[new_parent as usize].child2 = leaf;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent as usize].child1 == sibling {
                self.nodes[old_parent as usize].child1 = new_parent;
            } else {
                self.nodes[old_parent as usize].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        self.refit_upwards(new_parent);
    }

    fn remove_leaf(&mut self, leaf: NodeIndex) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf as usize].parent;
        let grandparent = self.nodes[parent as usize].parent;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grandparent != NULL_NODE {
            if self.nodes[grandparent as usize].child1 == parent {
                self.nodes[grandparent as usize].child1 = sibling;
            } else {
                self.nodes[grandparent as usize].child2 = sibling;
            }
            self.nodes[sibling as usize].parent = grandparent;
            self.free_node(parent);
            self.refit_upwards(grandparent);
        } else {
            self.root = sibling;
            self.nodes[sibling as usize].parent = NULL_NODE;
            self.free_node(parent);
        }
        self.nodes[leaf as usize].parent = NULL_NODE;
    }

    /// Walk to the root tightening boxes, attempting one rotation per level.
    fn refit_upwards(&mut self, start: NodeIndex) {
        let mut current = start;
        while current != NULL_NODE {
            let child1 = self.nodes[current as usize].child1;
            let child2 = self.nodes[current as usize].child2;
            self.nodes[current as usize].aabb = self.nodes[child1 as usize]
                .aabb
                .union(&self.nodes[child2 as usize].aabb);
            self.rotate(current);
            current = self.nodes[current as usize].parent;
        }
    }

    /// Try the four grandchild-child swaps under `node` and apply the one
    /// that most reduces surface area, if any strictly does.
    fn rotate(&mut self, node: NodeIndex) {
        let child1 = self.nodes[node as usize].child1;
        let child2 = self.nodes[node as usize].child2;
        if child1 == NULL_NODE {
            return;
        }

        let mut best_diff = 0.0;
        let mut best_swap: Option<(NodeIndex, NodeIndex)> = None;

        // candidate: swap `child` with one grandchild under `other`, leaving
        // `other` spanning its remaining child and `child`
        let mut consider = |tree: &Self, child: NodeIndex, other: NodeIndex| {
            if tree.nodes[other as usize].is_leaf() {
                return;
            }
            let area = tree.nodes[other as usize].aabb.area();
            let gc1 = tree.nodes[other as usize].child1;
            let gc2 = tree.nodes[other as usize].child2;
            for (take, keep) in [(gc1, gc2), (gc2, gc1)] {
                let new_area = tree.nodes[child as usize]
                    .aabb
                    .union(&tree.nodes[keep as usize].aabb)
                    .area();
                let diff = new_area - area;
                if diff < best_diff {
                    best_diff = diff;
                    best_swap = Some((child, take));
                }
            }
        };
        consider(self, child1, child2);
        consider(self, child2, child1);

        if let Some((a, b)) = best_swap {
            self.swap_nodes(a, b);
        }
    }

    /// Exchange two disjoint subtrees and refit the deeper parent.
    fn swap_nodes(&mut self, a: NodeIndex, b: NodeIndex) {
        let pa = self.nodes[a as usize].parent;
        let pb = self.nodes[b as usize].parent;

        if self.nodes[pa as usize].child1 == a {
            self.nodes[pa as usize].child1 = b;
        } else {
            self.nodes[pa as usize].child2 = b;
        }
        if self.nodes[pb as usize].child1 == b {
            self.nodes[pb as usize].child1 = a;
        } else {
            self.nodes[pb as usize].child2 = a;
        }
        self.nodes[a as usize].parent = pb;
        self.nodes[b as usize].parent = pa;

        // pb gained `a`; tighten it (pa is refit by the caller's walk)
        let c1 = self.nodes[pb as usize].child1;
        let c2 = self.nodes[pb as usize].child2;
        self.nodes[pb as usize].aabb = self.nodes[c1 as usize]
            .aabb
            .union(&self.nodes[c2 as usize].aabb);
    }
}

impl Default for AabbTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn key_source() -> SlotMap<ColliderKey, ()> {
        SlotMap::with_key()
    }

    fn unit_box(center: Vec2) -> Aabb {
        Aabb::new(
            center - Vec2::new(0.5, 0.5),
            center + Vec2::new(0.5, 0.5),
        )
    }

    /// Every internal node must enclose both children.
    fn check_enclosure(tree: &AabbTree) {
        if tree.root == NULL_NODE {
            return;
        }
        let mut stack = vec![tree.root];
        while let Some(current) = stack.pop() {
            let node = &tree.nodes[current as usize];
            if node.is_leaf() {
                continue;
            }
            let c1 = &tree.nodes[node.child1 as usize];
            let c2 = &tree.nodes[node.child2 as usize];
            assert!(node.aabb.contains(&c1.aabb));
            assert!(node.aabb.contains(&c2.aabb));
            assert_eq!(c1.parent, current);
            assert_eq!(c2.parent, current);
            stack.push(node.child1);
            stack.push(node.child2);
        }
    }

    #[test]
    fn enclosure_after_inserts_and_moves() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        let mut proxies = Vec::new();
        for i in 0..50 {
            let k = keys.insert(());
            let pos = Vec2::new((i % 10) as f64 * 1.5, (i / 10) as f64 * 1.5);
            proxies.push(tree.create_proxy(unit_box(pos), k));
        }
        check_enclosure(&tree);

        for (i, &p) in proxies.iter().enumerate() {
            let pos = Vec2::new((i / 10) as f64 * 2.0, (i % 10) as f64 * 2.0);
            tree.move_proxy(p, unit_box(pos), Vec2::new(3.0, 0.0), true);
        }
        check_enclosure(&tree);
    }

    #[test]
    fn query_completeness() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        let mut boxes = Vec::new();
        for i in 0..40 {
            let k = keys.insert(());
            let pos = Vec2::new((i % 8) as f64 * 2.0, (i / 8) as f64 * 2.0);
            let b = unit_box(pos);
            tree.create_proxy(b, k);
            boxes.push((k, b));
        }

        let region = Aabb::new(Vec2::new(1.0, 1.0), Vec2::new(7.0, 5.0));
        let mut found = Vec::new();
        tree.query(&region, |proxy, key| {
            // the fat AABB is the authoritative one in the tree
            assert!(tree.fat_aabb(proxy).overlaps(&region));
            found.push(key);
            true
        });

        for (k, b) in &boxes {
            let fat = b.padded(AABB_MARGIN);
            assert_eq!(
                found.contains(k),
                fat.overlaps(&region),
                "query must return exactly the overlapping proxies"
            );
        }
    }

    #[test]
    fn move_within_fat_box_is_a_no_op() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        let k = keys.insert(());
        let p = tree.create_proxy(unit_box(Vec2::zero()), k);
        assert!(!tree.move_proxy(p, unit_box(Vec2::new(0.01, 0.0)), Vec2::zero(), false));
        assert!(tree.move_proxy(p, unit_box(Vec2::new(5.0, 0.0)), Vec2::zero(), false));
        assert!(tree.was_moved(p));
        tree.clear_moved(p);
        assert!(!tree.was_moved(p));
    }

    #[test]
    fn ray_cast_visits_candidates_in_order() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        for i in 0..5 {
            let k = keys.insert(());
            tree.create_proxy(unit_box(Vec2::new(i as f64 * 3.0, 0.0)), k);
        }

        let mut hits: Vec<f64> = Vec::new();
        tree.ray_cast(
            Vec2::new(-5.0, 0.0),
            Vec2::new(20.0, 0.0),
            1.0,
            0.0,
            |input, _| {
                hits.push(input.max_fraction);
                -1.0
            },
        );
        assert_eq!(hits.len(), 5);

        // early termination
        let mut count = 0;
        tree.ray_cast(
            Vec2::new(-5.0, 0.0),
            Vec2::new(20.0, 0.0),
            1.0,
            0.0,
            |_, _| {
                count += 1;
                0.0
            },
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn shrinking_max_fraction_prunes_far_leaves() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        for i in 0..5 {
            let k = keys.insert(());
            tree.create_proxy(unit_box(Vec2::new(i as f64 * 4.0, 0.0)), k);
        }
        // shrink to just past the first hit; ordered traversal lets the
        // remaining candidates be pruned
        let mut count = 0;
        tree.ray_cast(
            Vec2::new(-3.0, 0.0),
            Vec2::new(17.0, 0.0),
            1.0,
            0.0,
            |_, _| {
                count += 1;
                0.2
            },
        );
        assert!(count <= 2);
    }

    #[test]
    fn rebuild_preserves_leaves_and_reduces_cost() {
        let mut keys = key_source();
        let mut tree = AabbTree::new();
        // insert in an adversarial diagonal order
        for i in 0..30 {
            let k = keys.insert(());
            tree.create_proxy(unit_box(Vec2::new(i as f64, i as f64)), k);
        }
        let cost_before = tree.compute_cost();
        tree.rebuild();
        check_enclosure(&tree);
        let cost_after = tree.compute_cost();
        assert!(cost_after <= cost_before * 1.01);

        let mut n = 0;
        tree.query(
            &Aabb::new(Vec2::new(-100.0, -100.0), Vec2::new(100.0, 100.0)),
            |_, _| {
                n += 1;
                true
            },
        );
        assert_eq!(n, 30);
    }
}
