mod builder;
mod node;

pub use self::node::*;
use crate::{BoundingBox, Hit, InstPrim, Ray, Triangle};

/// Number of candidate slabs evaluated per axis when binning the SAH.
pub const BINS: usize = 8;

/// Bottom-level acceleration structure: a binary BVH over the triangles of
/// one mesh.
///
/// The structure owns its node array and a permutation of triangle indices;
/// the triangles themselves stay with the mesh and are borrowed per call,
/// which keeps the ownership tree free of cycles.
#[derive(Clone, Debug, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
    nodes_used: u32,
}

impl Bvh {
    /// Builds the hierarchy with a binned SAH; see [`BINS`].
    pub fn build(triangles: &[Triangle]) -> Self {
        builder::build(triangles)
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn root_bounds(&self) -> BoundingBox {
        self.nodes
            .first()
            .map(BvhNode::bounds)
            .unwrap_or_default()
    }

    /// Re-tightens node bounds after triangles moved, preserving topology;
    /// one reverse-order pass over the nodes.
    pub fn refit(&mut self, triangles: &[Triangle]) {
        for node_id in (0..self.nodes_used as usize).rev() {
            if node_id == 1 {
                // reserved slot, not part of the tree
                continue;
            }

            let node = self.nodes[node_id];

            let bounds = if node.is_leaf() {
                self.indices[node.first()..node.first() + node.count()]
                    .iter()
                    .fold(BoundingBox::default(), |bounds, &idx| {
                        bounds + triangles[idx as usize].bounding_box()
                    })
            } else {
                self.nodes[node.left()].bounds()
                    + self.nodes[node.left() + 1].bounds()
            };

            self.nodes[node_id].set_bounds(bounds);
        }
    }

    /// Finds the closest triangle hit, stamping `instance_id` and the
    /// triangle index into the ray's hit record.
    pub fn intersect(
        &self,
        ray: &mut Ray,
        triangles: &[Triangle],
        instance_id: u32,
    ) {
        if self.nodes.is_empty() {
            return;
        }

        let mut node_id = 0;
        let mut stack = [0u32; 64];
        let mut stack_ptr = 0;

        loop {
            let node = &self.nodes[node_id];

            if node.is_leaf() {
                for &prim in
                    &self.indices[node.first()..node.first() + node.count()]
                {
                    if let Some(hit) = triangles[prim as usize].intersect(ray)
                    {
                        ray.hit = Hit {
                            t: hit.distance,
                            u: hit.u,
                            v: hit.v,
                            inst_prim: InstPrim::new(instance_id, prim),
                        };
                    }
                }
            } else {
                let mut near = node.left();
                let mut far = near + 1;

                let mut near_distance =
                    ray.distance_to_box(self.nodes[near].bounds());
                let mut far_distance =
                    ray.distance_to_box(self.nodes[far].bounds());

                if near_distance > far_distance {
                    (near, far) = (far, near);
                    (near_distance, far_distance) =
                        (far_distance, near_distance);
                }

                // Descend into the nearer child first; the farther one only
                // goes on the stack while it still can contain a closer hit.
                if near_distance < f32::INFINITY {
                    if far_distance < f32::INFINITY {
                        stack[stack_ptr] = far as u32;
                        stack_ptr += 1;
                    }

                    node_id = near;
                    continue;
                }
            }

            if stack_ptr == 0 {
                break;
            }

            stack_ptr -= 1;
            node_id = stack[stack_ptr] as usize;
        }
    }

    /// Asserts structural soundness: node bounds contain their descendants
    /// and the leaves partition the triangle set.
    pub fn validate(&self, triangles: &[Triangle]) {
        if self.nodes.is_empty() {
            assert!(triangles.is_empty());
            return;
        }

        let mut seen = vec![false; triangles.len()];
        let mut stack = vec![0];

        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];

            if node.is_leaf() {
                for &prim in
                    &self.indices[node.first()..node.first() + node.count()]
                {
                    assert!(
                        !seen[prim as usize],
                        "triangle {prim} appears in two leaves"
                    );

                    seen[prim as usize] = true;

                    assert!(node
                        .bounds()
                        .contains(&triangles[prim as usize].bounding_box()));
                }
            } else {
                for child in [node.left(), node.left() + 1] {
                    assert!(node.bounds().contains(&self.nodes[child].bounds()));
                    stack.push(child);
                }
            }
        }

        assert!(
            seen.into_iter().all(|seen| seen),
            "leaves do not cover all triangles"
        );
    }
}
