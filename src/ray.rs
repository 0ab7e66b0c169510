use glam::Vec3A;

use crate::{BoundingBox, Hit};

/// A ray with its reciprocal direction precomputed for slab tests, carrying
/// the closest hit found so far.
///
/// Callers construct the ray with [`Ray::new`] and read `hit` back after
/// intersecting; a `hit.t` of infinity means a miss. Directions with zero
/// components are fine (the reciprocal goes to infinity and the slab
/// arithmetic copes), NaNs are not.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    origin: Vec3A,
    direction: Vec3A,
    inv_direction: Vec3A,
    pub hit: Hit,
}

impl Ray {
    pub fn new(origin: impl Into<Vec3A>, direction: impl Into<Vec3A>) -> Self {
        Self::with_hit(origin.into(), direction.into(), Hit::none())
    }

    pub(crate) fn with_hit(origin: Vec3A, direction: Vec3A, hit: Hit) -> Self {
        Self {
            origin,
            direction,
            inv_direction: direction.recip(),
            hit,
        }
    }

    pub fn origin(&self) -> Vec3A {
        self.origin
    }

    pub fn direction(&self) -> Vec3A {
        self.direction
    }

    pub fn inv_direction(&self) -> Vec3A {
        self.inv_direction
    }

    /// Slab test against `bounds`, returning the entry distance - or
    /// infinity when the box is missed entirely, lies behind the origin or
    /// cannot contain anything closer than the current hit.
    pub(crate) fn distance_to_box(&self, bounds: BoundingBox) -> f32 {
        let t1 = (bounds.min() - self.origin) * self.inv_direction;
        let t2 = (bounds.max() - self.origin) * self.inv_direction;

        let t_min = t1.min(t2).max_element();
        let t_max = t1.max(t2).min_element();

        if t_max >= t_min && t_min < self.hit.t && t_max > 0.0 {
            t_min
        } else {
            f32::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3a;

    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::default() + vec3a(0.0, 0.0, 0.0) + vec3a(1.0, 1.0, 1.0)
    }

    #[test]
    fn hits_box() {
        let ray = Ray::new(vec3a(0.5, 0.5, 2.0), vec3a(0.0, 0.0, -1.0));

        assert_relative_eq!(1.0, ray.distance_to_box(unit_box()));
    }

    #[test]
    fn misses_box() {
        let ray = Ray::new(vec3a(2.0, 2.0, 2.0), vec3a(0.0, 0.0, -1.0));

        assert_eq!(f32::INFINITY, ray.distance_to_box(unit_box()));
    }

    #[test]
    fn ignores_box_behind_origin() {
        let ray = Ray::new(vec3a(0.5, 0.5, -1.0), vec3a(0.0, 0.0, -1.0));

        assert_eq!(f32::INFINITY, ray.distance_to_box(unit_box()));
    }

    #[test]
    fn ignores_box_beyond_current_hit() {
        let mut ray = Ray::new(vec3a(0.5, 0.5, 2.0), vec3a(0.0, 0.0, -1.0));

        ray.hit.t = 0.5;

        assert_eq!(f32::INFINITY, ray.distance_to_box(unit_box()));
    }
}
