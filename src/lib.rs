//! Two-level bounding volume hierarchy core for real-time ray tracing.
//!
//! Each [`Mesh`] builds a bottom-level BVH ([`Bvh`]) over its triangles
//! once, at construction. Per frame, [`Instance`]s place those BVHs in the
//! world under affine transforms and the top-level structure ([`Tlas`]) is
//! rebuilt over their bounds - either with a full agglomerative SAH pass
//! ([`Tlas::rebuild`]) or by kd-tree-accelerated reclustering
//! ([`Tlas::rebuild_quick`]). Rays traverse the TLAS, descend into the
//! bottom level through each instance's inverse transform and come back
//! carrying the closest hit.

mod axis;
mod bounding_box;
mod bvh;
mod hit;
mod instance;
mod kd_tree;
mod mesh;
mod ray;
mod tlas;
mod triangle;

pub use self::axis::*;
pub use self::bounding_box::*;
pub use self::bvh::*;
pub use self::hit::*;
pub use self::instance::*;
pub use self::kd_tree::*;
pub use self::mesh::*;
pub use self::ray::*;
pub use self::tlas::*;
pub use self::triangle::*;
