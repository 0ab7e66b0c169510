use crate::{Bvh, Ray, Triangle, TriangleAttributes};

/// A rigid triangle mesh together with its bottom-level acceleration
/// structure; the BVH is built once, at construction.
#[derive(Clone, Debug)]
pub struct Mesh {
    triangles: Vec<Triangle>,
    attributes: Vec<TriangleAttributes>,
    bvh: Bvh,
}

impl Mesh {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let attributes =
            vec![TriangleAttributes::default(); triangles.len()];

        Self::with_attributes(triangles, attributes)
    }

    pub fn with_attributes(
        triangles: Vec<Triangle>,
        attributes: Vec<TriangleAttributes>,
    ) -> Self {
        assert_eq!(triangles.len(), attributes.len());

        let bvh = Bvh::build(&triangles);

        Self {
            triangles,
            attributes,
            bvh,
        }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Mutable triangle access for vertex animation; callers must [`refit`]
    /// (or rebuild) afterwards.
    ///
    /// [`refit`]: Self::refit
    pub fn triangles_mut(&mut self) -> &mut [Triangle] {
        &mut self.triangles
    }

    pub fn attributes(&self) -> &[TriangleAttributes] {
        &self.attributes
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Re-tightens the BVH after the triangles moved.
    pub fn refit(&mut self) {
        self.bvh.refit(&self.triangles);
    }

    pub fn intersect(&self, ray: &mut Ray, instance_id: u32) {
        self.bvh.intersect(ray, &self.triangles, instance_id);
    }
}
