use std::ops::Add;

use glam::{Affine3A, Vec3A};

/// Axis-aligned bounding box.
///
/// A fresh box is inverted (`+inf .. -inf`), so growing it by the first point
/// simply adopts that point and growing by an empty box is a no-op.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    min: Vec3A,
    max: Vec3A,
}

impl BoundingBox {
    pub fn new(min: Vec3A, max: Vec3A) -> Self {
        Self { min, max }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3A>) -> Self {
        points.into_iter().fold(Self::default(), Self::add)
    }

    pub fn grow(&mut self, p: Vec3A) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x == f32::INFINITY
    }

    pub fn min(&self) -> Vec3A {
        self.min
    }

    pub fn max(&self) -> Vec3A {
        self.max
    }

    pub fn center(&self) -> Vec3A {
        (self.min + self.max) * 0.5
    }

    pub fn extent(&self) -> Vec3A {
        self.max - self.min
    }

    /// Surface area up to a constant factor; only relative magnitudes matter
    /// to the heuristics built on top of this.
    pub fn area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }

        let e = self.extent();

        e.x * e.y + e.y * e.z + e.z * e.x
    }

    pub fn contains(&self, other: &Self) -> bool {
        if other.is_empty() {
            return true;
        }

        const EPS: f32 = 1.0e-4;

        (other.min - self.min).min_element() >= -EPS
            && (self.max - other.max).min_element() >= -EPS
    }

    /// Bounds of this box under an affine transform, i.e. the box grown over
    /// all eight transformed corners.
    pub fn transform(&self, xform: Affine3A) -> Self {
        let mut out = Self::default();

        for i in 0..8 {
            let corner = Vec3A::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );

            out.grow(xform.transform_point3a(corner));
        }

        out
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3A::INFINITY,
            max: Vec3A::NEG_INFINITY,
        }
    }
}

impl Add<Vec3A> for BoundingBox {
    type Output = Self;

    fn add(mut self, rhs: Vec3A) -> Self::Output {
        self.grow(rhs);
        self
    }
}

impl Add<Self> for BoundingBox {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        if !rhs.is_empty() {
            self.grow(rhs.min);
            self.grow(rhs.max);
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::vec3a;

    use super::*;

    #[test]
    fn grow() {
        let mut target = BoundingBox::default();

        assert!(target.is_empty());

        target.grow(vec3a(1.0, 2.0, 3.0));
        target.grow(vec3a(-1.0, 0.0, 5.0));

        assert!(!target.is_empty());
        assert_eq!(vec3a(-1.0, 0.0, 3.0), target.min());
        assert_eq!(vec3a(1.0, 2.0, 5.0), target.max());

        // growing by an empty box changes nothing
        let grown = target + BoundingBox::default();

        assert_eq!(target, grown);
    }

    #[test]
    fn area() {
        let target = BoundingBox::default()
            + vec3a(0.0, 0.0, 0.0)
            + vec3a(1.0, 1.0, 1.0);

        assert_relative_eq!(3.0, target.area());
        assert_relative_eq!(0.0, BoundingBox::default().area());
    }

    #[test]
    fn transform() {
        let target = BoundingBox::default()
            + vec3a(0.0, 0.0, 0.0)
            + vec3a(1.0, 1.0, 1.0);

        let target =
            target.transform(Affine3A::from_translation(glam::vec3(3.0, 0.0, 0.0)));

        assert_eq!(vec3a(3.0, 0.0, 0.0), target.min());
        assert_eq!(vec3a(4.0, 1.0, 1.0), target.max());
    }

    #[test]
    fn contains() {
        let outer = BoundingBox::default()
            + vec3a(0.0, 0.0, 0.0)
            + vec3a(4.0, 4.0, 4.0);

        let inner = BoundingBox::default()
            + vec3a(1.0, 1.0, 1.0)
            + vec3a(2.0, 2.0, 2.0);

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&BoundingBox::default()));
    }
}
