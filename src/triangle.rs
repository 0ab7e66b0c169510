use glam::{Vec2, Vec3, Vec3A};

use crate::{BoundingBox, Ray};

/// A single triangle, object space.
#[derive(Clone, Copy, Debug, Default)]
pub struct Triangle {
    positions: [Vec3A; 3],
}

impl Triangle {
    pub fn new(positions: [impl Into<Vec3A>; 3]) -> Self {
        Self {
            positions: positions.map(Into::into),
        }
    }

    pub fn positions(&self) -> [Vec3A; 3] {
        self.positions
    }

    pub fn center(&self) -> Vec3A {
        self.positions.into_iter().sum::<Vec3A>() / 3.0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(self.positions)
    }

    /// Möller-Trumbore; reports a hit only when it beats the distance the
    /// ray already carries.
    pub(crate) fn intersect(&self, ray: &Ray) -> Option<TriangleHit> {
        let [p0, p1, p2] = self.positions;

        let edge1 = p1 - p0;
        let edge2 = p2 - p0;

        // ---

        let pvec = ray.direction().cross(edge2);
        let det = edge1.dot(pvec);

        if det.abs() < f32::EPSILON {
            return None;
        }

        // ---

        let inv_det = 1.0 / det;
        let tvec = ray.origin() - p0;
        let u = tvec.dot(pvec) * inv_det;
        let qvec = tvec.cross(edge1);
        let v = ray.direction().dot(qvec) * inv_det;
        let distance = edge2.dot(qvec) * inv_det;

        if (u < 0.0)
            | (u > 1.0)
            | (v < 0.0)
            | (u + v > 1.0)
            | (distance <= 0.0)
            | (distance >= ray.hit.t)
        {
            return None;
        }

        Some(TriangleHit { distance, u, v })
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct TriangleHit {
    pub distance: f32,
    pub u: f32,
    pub v: f32,
}

/// Shading attributes of one triangle, kept in a record parallel to the
/// triangle array so the hot intersection data stays compact.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriangleAttributes {
    normals: [Vec3; 3],
    uvs: [Vec2; 3],
}

impl TriangleAttributes {
    pub fn with_normals(mut self, normals: [Vec3; 3]) -> Self {
        self.normals = normals;
        self
    }

    pub fn with_uvs(mut self, uvs: [Vec2; 3]) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn normals(&self) -> [Vec3; 3] {
        self.normals
    }

    pub fn uvs(&self) -> [Vec2; 3] {
        self.uvs
    }

    /// Normal interpolated at the given barycentrics.
    pub fn normal_at(&self, u: f32, v: f32) -> Vec3 {
        let [n0, n1, n2] = self.normals;

        (u * n1 + v * n2 + (1.0 - u - v) * n0).normalize()
    }

    /// UV interpolated at the given barycentrics.
    pub fn uv_at(&self, u: f32, v: f32) -> Vec2 {
        let [uv0, uv1, uv2] = self.uvs;

        uv0 + (uv1 - uv0) * u + (uv2 - uv0) * v
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{vec2, vec3, vec3a};

    use super::*;

    fn target() -> Triangle {
        Triangle::new([
            vec3a(0.0, 0.0, 0.0),
            vec3a(1.0, 0.0, 0.0),
            vec3a(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn hit() {
        let ray = Ray::new(vec3a(0.25, 0.25, 1.0), vec3a(0.0, 0.0, -1.0));
        let hit = target().intersect(&ray).unwrap();

        assert_relative_eq!(1.0, hit.distance);
        assert_relative_eq!(0.25, hit.u);
        assert_relative_eq!(0.25, hit.v);
    }

    #[test]
    fn miss() {
        let ray = Ray::new(vec3a(2.0, 2.0, 1.0), vec3a(0.0, 0.0, -1.0));

        assert!(target().intersect(&ray).is_none());
    }

    #[test]
    fn miss_when_already_hit_closer() {
        let mut ray = Ray::new(vec3a(0.25, 0.25, 1.0), vec3a(0.0, 0.0, -1.0));

        ray.hit.t = 0.5;

        assert!(target().intersect(&ray).is_none());
    }

    #[test]
    fn attributes() {
        let target = TriangleAttributes::default()
            .with_normals([vec3(1.0, 0.0, 0.0); 3])
            .with_uvs([
                vec2(0.0, 0.0),
                vec2(1.0, 0.0),
                vec2(0.0, 1.0),
            ]);

        assert_eq!(vec3(1.0, 0.0, 0.0), target.normal_at(0.25, 0.25));

        let uv = target.uv_at(0.25, 0.5);

        assert_relative_eq!(0.25, uv.x);
        assert_relative_eq!(0.5, uv.y);
    }
}
