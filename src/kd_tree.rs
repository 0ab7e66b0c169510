mod node;

use glam::Vec3A;

pub use self::node::*;
use crate::{Axis, BoundingBox, TlasNode};

/// Spatial index over the active clusters of an agglomerative TLAS build.
///
/// Items are TLAS node ids; the tree partitions their bounds' centroids so
/// [`find_nearest`](Self::find_nearest) can answer "which other cluster
/// merges with this one at the smallest surface area" without scanning the
/// whole set. Clustering churns the item set constantly, so the tree
/// supports O(log n) insertion and removal on top of the full
/// [`rebuild`](Self::rebuild); vacated node slots go through a small
/// free-list and get reused by later insertions.
#[derive(Clone, Debug, Default)]
pub struct KdTree {
    nodes: Vec<KdNode>,
    /// Bounds of the indexed TLAS nodes, copied so lookups stay local.
    bounds: Vec<BoundingBox>,
    /// Item list; leaves own contiguous ranges of it.
    item_ids: Vec<u32>,
    /// Which leaf currently holds a given item; keyed by TLAS node id.
    leaf_of: Vec<u32>,
    node_ptr: u32,
    freed: Vec<u32>,
}

impl KdTree {
    /// Rebuilds the tree over TLAS leaves `1..=count`.
    pub fn rebuild(&mut self, tlas_nodes: &[TlasNode], count: u32) {
        let n = count as usize;

        self.nodes.clear();
        self.nodes.resize(2 * n, KdNode::default());
        self.bounds.clear();
        self.bounds.resize(2 * n, BoundingBox::default());
        self.leaf_of.clear();
        self.leaf_of.resize(2 * n, 0);
        self.item_ids.clear();
        self.item_ids.extend(1..=count);
        self.freed.clear();

        for id in 1..=n {
            self.bounds[id] = tlas_nodes[id].bounds();
        }

        self.nodes[0] = KdNode {
            left: 0,
            right: count,
            parax: LEAF_AXIS,
            ..KdNode::default()
        };

        self.node_ptr = 1;
        self.subdivide(0);
        self.min_refit();
    }

    fn subdivide(&mut self, node_id: usize) {
        let first = self.nodes[node_id].first() as usize;
        let count = self.nodes[node_id].count() as usize;

        // cluster bounds over the contained centroids, and the smallest
        // half-extent seen among the contained boxes
        let mut bounds_min = Vec3A::INFINITY;
        let mut bounds_max = Vec3A::NEG_INFINITY;
        let mut min_size = Vec3A::INFINITY;

        for &id in &self.item_ids[first..first + count] {
            let bounds = self.bounds[id as usize];
            let center = bounds.center();

            min_size = min_size.min(0.5 * bounds.extent());
            bounds_min = bounds_min.min(center);
            bounds_max = bounds_max.max(center);
        }

        {
            let node = &mut self.nodes[node_id];

            node.bounds_min = bounds_min;
            node.bounds_max = bounds_max;
            node.min_size = min_size;
        }

        if count < 2 {
            return;
        }

        let split_by = Axis::dominant(bounds_max - bounds_min);
        let mut split_pos = 0.5 * (bounds_min + bounds_max)[split_by];

        // coarse load balancing for big clusters: pull the plane towards
        // the crowded side, clamped so neither child starves
        if count > 150 {
            let left_count = self.item_ids[first..first + count]
                .iter()
                .filter(|&&id| {
                    self.bounds[id as usize].center()[split_by] <= split_pos
                })
                .count();

            let ratio =
                ((left_count as f32) / (count as f32)).clamp(0.15, 0.85);

            split_pos = ratio * bounds_min[split_by]
                + (1.0 - ratio) * bounds_max[split_by];
        }

        // two-pointer partition; tiny ranges just split 1|rest so identical
        // centroids cannot recurse forever
        let mut last = first + count;

        if count < 3 {
            last = first + 1;
        } else {
            let mut i = first;

            while i < last {
                let center =
                    self.bounds[self.item_ids[i] as usize].center();

                if center[split_by] > split_pos {
                    last -= 1;
                    self.item_ids.swap(i, last);
                } else {
                    i += 1;
                }
            }
        }

        let left_count = last - first;

        if left_count == 0 || left_count == count {
            // split failed; stay a leaf
            return;
        }

        let left_id = self.node_ptr as usize;
        let right_id = left_id + 1;

        self.node_ptr += 2;

        self.nodes[left_id] = KdNode {
            left: first as u32,
            right: left_count as u32,
            parax: ((node_id as u32) << 3) | LEAF_AXIS,
            ..KdNode::default()
        };

        self.nodes[right_id] = KdNode {
            left: last as u32,
            right: (count - left_count) as u32,
            parax: ((node_id as u32) << 3) | LEAF_AXIS,
            ..KdNode::default()
        };

        {
            let node = &mut self.nodes[node_id];

            node.left = left_id as u32;
            node.right = right_id as u32;
            node.parax = (node.parax & !7) | split_by.id();
            node.split_pos = split_pos;
        }

        self.subdivide(left_id);
        self.subdivide(right_id);
    }

    /// Reverse-order pass settling every node's cluster data; also refreshes
    /// the item-to-leaf map.
    fn min_refit(&mut self) {
        for node_id in (0..self.node_ptr as usize).rev() {
            if self.nodes[node_id].is_leaf() {
                self.refit_leaf(node_id);
            } else {
                self.refit_from_children(node_id);
            }
        }
    }

    fn refit_leaf(&mut self, node_id: usize) {
        let first = self.nodes[node_id].first() as usize;
        let count = self.nodes[node_id].count() as usize;

        let mut bounds_min = Vec3A::INFINITY;
        let mut bounds_max = Vec3A::NEG_INFINITY;
        let mut min_size = Vec3A::INFINITY;

        for &id in &self.item_ids[first..first + count] {
            self.leaf_of[id as usize] = node_id as u32;

            let bounds = self.bounds[id as usize];
            let center = bounds.center();

            min_size = min_size.min(0.5 * bounds.extent());
            bounds_min = bounds_min.min(center);
            bounds_max = bounds_max.max(center);
        }

        let node = &mut self.nodes[node_id];

        node.bounds_min = bounds_min;
        node.bounds_max = bounds_max;
        node.min_size = min_size;
    }

    fn refit_from_children(&mut self, node_id: usize) {
        let left = self.nodes[self.nodes[node_id].left as usize];
        let right = self.nodes[self.nodes[node_id].right as usize];
        let node = &mut self.nodes[node_id];

        node.bounds_min = left.bounds_min.min(right.bounds_min);
        node.bounds_max = left.bounds_max.max(right.bounds_max);
        node.min_size = left.min_size.min(right.min_size);
    }

    /// Repairs cluster data on the path from `node_id`'s parent up to the
    /// root.
    pub fn recurse_refit(&mut self, mut node_id: u32) {
        while node_id != 0 {
            node_id = self.nodes[node_id as usize].parent();
            self.refit_from_children(node_id as usize);
        }
    }

    fn claim_slot(&mut self) -> u32 {
        if let Some(slot) = self.freed.pop() {
            slot
        } else {
            self.nodes.push(KdNode::default());

            (self.nodes.len() - 1) as u32
        }
    }

    /// Inserts TLAS node `id` as a fresh singleton leaf, splicing a new
    /// interior node where the descent from the root lands.
    pub fn add(&mut self, id: u32, tlas_nodes: &[TlasNode]) {
        let idx = id as usize;

        if self.bounds.len() <= idx {
            self.bounds.resize(idx + 1, BoundingBox::default());
            self.leaf_of.resize(idx + 1, 0);
        }

        self.bounds[idx] = tlas_nodes[idx].bounds();

        let center = self.bounds[idx].center();

        self.item_ids.push(id);

        let slot = (self.item_ids.len() - 1) as u32;
        let leaf_id = self.claim_slot();
        let mut int_id = self.claim_slot();

        self.leaf_of[idx] = leaf_id;

        self.nodes[leaf_id as usize] = KdNode {
            left: slot,
            right: 1,
            parax: LEAF_AXIS,
            split_pos: 0.0,
            bounds_min: center,
            bounds_max: center,
            min_size: 0.5 * self.bounds[idx].extent(),
        };

        let mut node_id = 0u32;

        loop {
            let node = self.nodes[node_id as usize];

            if !node.is_leaf() {
                node_id = if center[node.axis()] < node.split_pos {
                    node.left
                } else {
                    node.right
                };

                continue;
            }

            let sibling_id;
            let sibling_center;

            if node_id == 0 {
                // the whole tree is one leaf: relocate it and let the new
                // interior take the root slot
                self.nodes[int_id as usize] = node;
                self.nodes[int_id as usize].parax = node.parax & 7;
                self.nodes[leaf_id as usize].parax = LEAF_AXIS;

                for i in 0..node.count() {
                    let item =
                        self.item_ids[(node.first() + i) as usize] as usize;

                    self.leaf_of[item] = int_id;
                }

                sibling_id = int_id;
                sibling_center = node.cluster_center();
                int_id = 0;
                self.nodes[0].parax = 0;
            } else {
                // splice the new interior between the reached leaf and its
                // parent
                let parent_id = node.parent() as usize;
                let parent = &mut self.nodes[parent_id];

                if parent.left == node_id {
                    parent.left = int_id;
                } else {
                    parent.right = int_id;
                }

                self.nodes[int_id as usize].parax = node.parax & !7;
                self.nodes[node_id as usize].parax =
                    (int_id << 3) | LEAF_AXIS;
                self.nodes[leaf_id as usize].parax =
                    (int_id << 3) | LEAF_AXIS;

                sibling_id = node_id;
                sibling_center = node.cluster_center();
            }

            // split the pair along the dominant axis of separation
            let split_by = Axis::dominant((center - sibling_center).abs());
            let split_pos = (0.5 * (center + sibling_center))[split_by];
            let interior = &mut self.nodes[int_id as usize];

            interior.parax = (interior.parax & !7) | split_by.id();
            interior.split_pos = split_pos;

            if center[split_by] < split_pos {
                interior.left = leaf_id;
                interior.right = sibling_id;
            } else {
                interior.left = sibling_id;
                interior.right = leaf_id;
            }

            break;
        }

        self.recurse_refit(leaf_id);
    }

    /// Removes TLAS node `id` from the tree.
    ///
    /// Singleton leaves collapse into their sibling, vacating two node
    /// slots for the free-list; leaves holding several items just shrink.
    pub fn remove_leaf(&mut self, id: u32) {
        let idx = id as usize;
        let to_delete = self.leaf_of[idx];
        let node = self.nodes[to_delete as usize];

        if node.count() > 1 {
            let first = node.first() as usize;
            let count = node.count() as usize;

            for i in first..first + count {
                if self.item_ids[i] == id {
                    self.item_ids[i] = self.item_ids[first + count - 1];
                    break;
                }
            }

            self.nodes[to_delete as usize].right -= 1;
            self.refit_leaf(to_delete as usize);
            self.recurse_refit(to_delete);

            return;
        }

        debug_assert!(
            to_delete != 0,
            "cannot remove the only item in the tree"
        );

        let parent_id = node.parent();
        let parent = self.nodes[parent_id as usize];

        let sibling_id = if parent.left == to_delete {
            parent.right
        } else {
            parent.left
        };

        // the sibling takes over the parent's slot, keeping the parent's
        // place in the tree but its own contents
        let mut sibling = self.nodes[sibling_id as usize];

        sibling.parax = (parent.parax & !7) | (sibling.parax & 7);
        self.nodes[parent_id as usize] = sibling;

        if sibling.is_leaf() {
            for i in 0..sibling.count() {
                let item =
                    self.item_ids[(sibling.first() + i) as usize] as usize;

                self.leaf_of[item] = parent_id;
            }
        } else {
            for child in [sibling.left, sibling.right] {
                let child = &mut self.nodes[child as usize];

                child.parax = (parent_id << 3) | (child.parax & 7);
            }
        }

        self.freed.push(sibling_id);
        self.freed.push(to_delete);
        self.recurse_refit(parent_id);
    }

    /// Finds the item `b != a` minimizing the surface area of the merged
    /// bounds of `a` and `b`, using best-first descent with the per-cluster
    /// lower bound to prune.
    ///
    /// `start_b` / `start_sa` seed the search, so callers holding a prior
    /// guess can start from it; seeding with infinity returns the true
    /// optimum. Returns the best item and its merged surface area.
    pub fn find_nearest(
        &self,
        a: u32,
        start_b: u32,
        start_sa: f32,
    ) -> (u32, f32) {
        let bounds_a = self.bounds[a as usize];
        let center_a = bounds_a.center();
        let extent_a = bounds_a.extent();
        let half_extent_a = 0.5 * extent_a;

        let mut best_b = start_b;
        let mut smallest_sa = start_sa;

        let mut node_id = 0usize;
        let mut stack = [0u32; 60];
        let mut stack_ptr = 0;

        loop {
            let node = &self.nodes[node_id];

            if node.is_leaf() {
                let first = node.first() as usize;
                let count = node.count() as usize;

                for &b in &self.item_ids[first..first + count] {
                    if b == a {
                        continue;
                    }

                    let sa = (bounds_a + self.bounds[b as usize]).area();

                    if sa < smallest_sa || (sa == smallest_sa && b < best_b)
                    {
                        smallest_sa = sa;
                        best_b = b;
                    }
                }
            } else {
                let mut near = node.left as usize;
                let mut far = node.right as usize;

                if center_a[node.axis()] > node.split_pos {
                    (near, far) = (far, near);
                }

                let near_sa =
                    self.lower_bound_sa(near, center_a, extent_a, half_extent_a);
                let far_sa =
                    self.lower_bound_sa(far, center_a, extent_a, half_extent_a);

                // visit subtrees that can still beat the best; nearer side
                // first
                if near_sa < smallest_sa {
                    if far_sa < smallest_sa {
                        stack[stack_ptr] = far as u32;
                        stack_ptr += 1;
                    }

                    node_id = near;
                    continue;
                } else if far_sa < smallest_sa {
                    node_id = far;
                    continue;
                }
            }

            if stack_ptr == 0 {
                break;
            }

            stack_ptr -= 1;
            node_id = stack[stack_ptr] as usize;
        }

        (best_b, smallest_sa)
    }

    /// Lower bound on the merged surface area achievable between `a` (its
    /// centroid, extent and half-extent given) and any item inside the
    /// cluster at `node_id`.
    fn lower_bound_sa(
        &self,
        node_id: usize,
        center_a: Vec3A,
        extent_a: Vec3A,
        half_extent_a: Vec3A,
    ) -> f32 {
        let node = &self.nodes[node_id];

        // componentwise distance from a's centroid to the cluster's
        // centroid bounds
        let v = (node.bounds_min - center_a).max(center_a - node.bounds_max);
        let d = extent_a.max(v - (node.min_size + half_extent_a));

        d.x * d.y + d.y * d.z + d.z * d.x
    }

    /// Asserts that every node's cluster data equals the aggregate of what
    /// it contains, and that the item-to-leaf map points home.
    pub fn validate(&self) {
        let mut stack = vec![0u32];

        while let Some(node_id) = stack.pop() {
            let node = self.nodes[node_id as usize];

            if node.is_leaf() {
                let first = node.first() as usize;
                let count = node.count() as usize;

                assert!(count > 0, "empty kd leaf {node_id}");

                let mut bounds_min = Vec3A::INFINITY;
                let mut bounds_max = Vec3A::NEG_INFINITY;
                let mut min_size = Vec3A::INFINITY;

                for &id in &self.item_ids[first..first + count] {
                    assert_eq!(node_id, self.leaf_of[id as usize]);

                    let bounds = self.bounds[id as usize];
                    let center = bounds.center();

                    min_size = min_size.min(0.5 * bounds.extent());
                    bounds_min = bounds_min.min(center);
                    bounds_max = bounds_max.max(center);
                }

                assert_eq!(bounds_min, node.bounds_min);
                assert_eq!(bounds_max, node.bounds_max);
                assert_eq!(min_size, node.min_size);
            } else {
                let left = self.nodes[node.left as usize];
                let right = self.nodes[node.right as usize];

                for child in [&left, &right] {
                    assert_eq!(node_id, child.parent());
                }

                assert_eq!(
                    left.bounds_min.min(right.bounds_min),
                    node.bounds_min
                );
                assert_eq!(
                    left.bounds_max.max(right.bounds_max),
                    node.bounds_max
                );
                assert_eq!(left.min_size.min(right.min_size), node.min_size);

                stack.push(node.left);
                stack.push(node.right);
            }
        }
    }
}
