//! Broad phase: fat proxy maintenance on top of the AABB tree and candidate
//! pair production.

use super::{Aabb, AabbTree, NodeIndex};
use crate::math::Vec2;

/// Owns the AABB tree and the fattening policy for collider proxies.
pub struct BroadPhase {
    pub tree: AabbTree,
}

impl BroadPhase {
    pub fn new() -> Self {
        BroadPhase {
            tree: AabbTree::new(),
        }
    }

    pub fn reset(&mut self) {
        self.tree.reset();
    }

    pub fn add(&mut self, aabb: Aabb, data: crate::world::ColliderKey) -> NodeIndex {
        self.tree.create_proxy(aabb, data)
    }

    pub fn remove(&mut self, proxy: NodeIndex) {
        self.tree.destroy_proxy(proxy);
    }

    /// Refit a proxy after its collider moved. The displacement extends the
    /// fat box ahead of the motion so slow movement stays within it across
    /// frames. Returns whether the proxy was reinserted.
    pub fn update(&mut self, proxy: NodeIndex, aabb: Aabb, displacement: Vec2) -> bool {
        self.tree.move_proxy(proxy, aabb, displacement, false)
    }

    /// Whether the fat boxes of two proxies still overlap. Contacts whose
    /// proxies no longer overlap are destroyed.
    #[inline]
    pub fn test_overlap(&self, a: NodeIndex, b: NodeIndex) -> bool {
        self.tree.test_overlap(a, b)
    }
}

impl Default for BroadPhase {
    fn default() -> Self {
        Self::new()
    }
}
