use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::BoundingBox;

/// 32-byte BVH node.
///
/// `left_first` does double duty: for a leaf (`count > 0`) it is the first
/// slot of the node's range in the triangle-index permutation, otherwise it
/// is the index of the left child, with the right child right after it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct BvhNode {
    pub(super) bounds_min: Vec3,
    pub(super) left_first: u32,
    pub(super) bounds_max: Vec3,
    pub(super) count: u32,
}

impl BvhNode {
    /// Empty leaves do not exist, so a zero count means an interior node.
    pub fn is_leaf(&self) -> bool {
        self.count > 0
    }

    /// First slot of a leaf's triangle-index range.
    pub fn first(&self) -> usize {
        self.left_first as usize
    }

    /// Left child of an interior node; the right child is `left() + 1`.
    pub fn left(&self) -> usize {
        self.left_first as usize
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.bounds_min.into(), self.bounds_max.into())
    }

    pub(super) fn set_bounds(&mut self, bounds: BoundingBox) {
        self.bounds_min = bounds.min().into();
        self.bounds_max = bounds.max().into();
    }

    /// SAH cost of keeping this node a leaf.
    pub fn cost(&self) -> f32 {
        self.bounds().area() * (self.count as f32)
    }
}
