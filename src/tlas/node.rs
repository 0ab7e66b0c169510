use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::BoundingBox;

/// 32-byte top-level node.
///
/// `left_right` packs two 16-bit child indices, `(left << 16) | right`; zero
/// marks a leaf, in which case `instance` indexes the instance array. The
/// root sits at index 0 and leaves at indices 1 and up.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TlasNode {
    pub(crate) bounds_min: Vec3,
    pub(crate) left_right: u32,
    pub(crate) bounds_max: Vec3,
    pub(crate) instance: u32,
}

impl TlasNode {
    pub(crate) fn leaf(instance: u32, bounds: BoundingBox) -> Self {
        Self {
            bounds_min: bounds.min().into(),
            left_right: 0,
            bounds_max: bounds.max().into(),
            instance,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left_right == 0
    }

    pub fn left(&self) -> usize {
        (self.left_right >> 16) as usize
    }

    pub fn right(&self) -> usize {
        (self.left_right & 0xffff) as usize
    }

    /// Index into the instance array; meaningful for leaves only.
    pub fn instance_id(&self) -> u32 {
        self.instance
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(self.bounds_min.into(), self.bounds_max.into())
    }

    pub(crate) fn set_bounds(&mut self, bounds: BoundingBox) {
        self.bounds_min = bounds.min().into();
        self.bounds_max = bounds.max().into();
    }
}
