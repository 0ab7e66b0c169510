use glam::Affine3A;

use crate::{BoundingBox, Mesh, Ray};

/// One placement of a mesh's BLAS in the world: an affine transform, its
/// inverse, and the world-space bounds of the BLAS root under that
/// transform.
///
/// Transforms are assumed rigid (rotation + translation): hit distances
/// carry over between world and object space unchanged.
#[derive(Clone, Copy, Debug)]
pub struct Instance {
    id: u32,
    mesh_id: u32,
    transform: Affine3A,
    transform_inverse: Affine3A,
    bounds: BoundingBox,
}

impl Instance {
    pub fn new(id: u32, mesh_id: u32, mesh: &Mesh, transform: Affine3A) -> Self {
        let mut instance = Self {
            id,
            mesh_id,
            transform: Affine3A::IDENTITY,
            transform_inverse: Affine3A::IDENTITY,
            bounds: BoundingBox::default(),
        };

        instance.set_transform(mesh, transform);
        instance
    }

    /// Id stamped into this instance's hits.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Index into the caller's mesh collection.
    pub fn mesh_id(&self) -> u32 {
        self.mesh_id
    }

    pub fn transform(&self) -> Affine3A {
        self.transform
    }

    /// World-space bounds of the instanced BLAS root.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Callers are responsible for supplying an invertible affine.
    pub fn set_transform(&mut self, mesh: &Mesh, transform: Affine3A) {
        assert!(
            transform.matrix3.determinant() != 0.0,
            "instance transform is not invertible"
        );

        self.transform = transform;
        self.transform_inverse = transform.inverse();
        self.bounds = mesh.bvh().root_bounds().transform(transform);
    }

    /// Intersects in object space: the ray is brought through the inverse
    /// transform, handed to the BLAS, and the updated hit carried back onto
    /// the world-space ray.
    pub fn intersect(&self, ray: &mut Ray, mesh: &Mesh) {
        let origin = self.transform_inverse.transform_point3a(ray.origin());
        let direction =
            self.transform_inverse.transform_vector3a(ray.direction());

        let mut local = Ray::with_hit(origin, direction, ray.hit);

        mesh.intersect(&mut local, self.id);

        ray.hit = local.hit;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{vec3, vec3a, Affine3A, Quat};

    use super::*;
    use crate::Triangle;

    #[test]
    fn intersect_matches_inverse_transformed_query() {
        let mesh = Mesh::new(vec![
            Triangle::new([
                vec3a(0.0, 0.0, 0.0),
                vec3a(1.0, 0.0, 0.0),
                vec3a(0.0, 1.0, 0.0),
            ]),
            Triangle::new([
                vec3a(1.0, 0.0, 0.0),
                vec3a(1.0, 1.0, 0.0),
                vec3a(0.0, 1.0, 0.0),
            ]),
        ]);

        let transform = Affine3A::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            vec3(2.0, -1.0, 3.0),
        );

        let instance = Instance::new(7, 0, &mesh, transform);

        let mut world_ray = Ray::new(
            transform.transform_point3a(vec3a(0.25, 0.25, 1.0)),
            transform.transform_vector3a(vec3a(0.0, 0.0, -1.0)),
        );

        instance.intersect(&mut world_ray, &mesh);

        let mut object_ray =
            Ray::new(vec3a(0.25, 0.25, 1.0), vec3a(0.0, 0.0, -1.0));

        mesh.intersect(&mut object_ray, 7);

        assert!(world_ray.hit.is_some());
        assert_relative_eq!(object_ray.hit.t, world_ray.hit.t, epsilon = 1.0e-4);
        assert_relative_eq!(object_ray.hit.u, world_ray.hit.u, epsilon = 1.0e-4);
        assert_relative_eq!(object_ray.hit.v, world_ray.hit.v, epsilon = 1.0e-4);
        assert_eq!(object_ray.hit.inst_prim, world_ray.hit.inst_prim);
        assert_eq!(7, world_ray.hit.inst_prim.instance_id());
    }

    #[test]
    fn bounds_follow_the_transform() {
        let mesh = Mesh::new(vec![Triangle::new([
            vec3a(0.0, 0.0, 0.0),
            vec3a(1.0, 0.0, 0.0),
            vec3a(0.0, 1.0, 0.0),
        ])]);

        let mut instance =
            Instance::new(0, 0, &mesh, Affine3A::IDENTITY);

        instance.set_transform(
            &mesh,
            Affine3A::from_translation(vec3(10.0, 0.0, 0.0)),
        );

        assert_eq!(vec3a(10.0, 0.0, 0.0), instance.bounds().min());
        assert_eq!(vec3a(11.0, 1.0, 0.0), instance.bounds().max());
    }
}
