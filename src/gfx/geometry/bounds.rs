//! Axis-aligned bounding volumes

use cgmath::{Vector3, Zero};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vector3<f32>,
    /// Maximum corner of the bounding box
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Zero-size box at the origin
    pub fn empty_at_origin() -> Self {
        Self::new(Vector3::zero(), Vector3::zero())
    }

    /// Bounding box of a point set, `None` when the set is empty
    pub fn from_points(points: &[[f32; 3]]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::new(Vector3::from(*first), Vector3::from(*first));
        for point in rest {
            aabb.include_point(*point);
        }
        Some(aabb)
    }

    pub fn include_point(&mut self, point: [f32; 3]) {
        self.min.x = self.min.x.min(point[0]);
        self.min.y = self.min.y.min(point[1]);
        self.min.z = self.min.z.min(point[2]);
        self.max.x = self.max.x.max(point[0]);
        self.max.y = self.max.y.max(point[1]);
        self.max.z = self.max.z.max(point[2]);
    }

    /// Smallest box containing both boxes
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(
            Vector3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            Vector3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        )
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Largest edge length
    pub fn max_dim(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [-1.0, -2.0, -1.0]])
            .unwrap();

        assert_eq!(aabb.min, Vector3::new(-1.0, -2.0, -1.0));
        assert_eq!(aabb.max, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(aabb.max_dim(), 3.0);
        assert_eq!(aabb.center(), Vector3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn test_empty_point_set_has_no_bounds() {
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_union_covers_both() {
        let a = Aabb::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Vector3::new(-2.0, 0.5, 0.5), Vector3::new(0.5, 3.0, 0.5));
        let u = a.union(&b);
        assert_eq!(u.min, Vector3::new(-2.0, 0.0, 0.0));
        assert_eq!(u.max, Vector3::new(1.0, 3.0, 1.0));
    }
}
