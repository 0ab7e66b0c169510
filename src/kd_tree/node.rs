use glam::Vec3A;

use crate::Axis;

/// Axis value in `parax` that marks a leaf; real axes are 0..=2.
pub(super) const LEAF_AXIS: u32 = 7;

/// 64-byte kd node.
///
/// The first word pair does double duty: `(left, right)` children for an
/// interior node, `(first, count)` range into the tree's item list for a
/// leaf. `parax` packs `(parent << 3) | axis`, with axis values above 3
/// marking leaves. The three vectors describe the node's cluster: bounds
/// over the contained items' *centroids* and the componentwise minimum of
/// their half-extents, which together feed the merged-surface-area lower
/// bound during nearest-neighbor searches.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct KdNode {
    pub(super) left: u32,
    pub(super) right: u32,
    pub(super) parax: u32,
    pub(super) split_pos: f32,
    pub(super) bounds_min: Vec3A,
    pub(super) bounds_max: Vec3A,
    pub(super) min_size: Vec3A,
}

impl KdNode {
    pub fn is_leaf(&self) -> bool {
        (self.parax & 7) > 3
    }

    pub fn parent(&self) -> u32 {
        self.parax >> 3
    }

    pub(super) fn axis(&self) -> Axis {
        Axis::from_id(self.parax & 7)
    }

    /// First slot of a leaf's range in the item list.
    pub(super) fn first(&self) -> u32 {
        self.left
    }

    /// Number of items in a leaf.
    pub(super) fn count(&self) -> u32 {
        self.right
    }

    pub(super) fn cluster_center(&self) -> Vec3A {
        (self.bounds_min + self.bounds_max) * 0.5
    }
}
