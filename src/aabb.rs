//! Axis-aligned bounding box in 3D.

use glam::DVec3;

/// Axis-aligned bounding box: `min`, `max` corners.
///
/// Invariant: `min <= max` componentwise for every box produced from
/// geometry. Zero-volume boxes (coincident points) are valid. The only
/// inverted box is [`Aabb::empty`], the identity for [`Aabb::union`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner.
    pub min: DVec3,
    /// Maximum corner.
    pub max: DVec3,
}

impl Aabb {
    /// Creates a box from its corners.
    #[inline]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Inverted box that any union absorbs.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Zero-extent box at `p`.
    #[inline]
    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    /// Tight box around `points`. Returns [`Aabb::empty`] for no points.
    pub fn from_points(points: &[DVec3]) -> Self {
        points.iter().fold(Self::empty(), |mut acc, &p| {
            acc.expand_point(p);
            acc
        })
    }

    /// Grows this box to include `p`.
    #[inline]
    pub fn expand_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Union of two boxes.
    #[inline]
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Returns `true` unless `min > max` on some axis.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    /// Overlap test, inclusive on faces.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Point containment, inclusive on faces.
    #[inline]
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.min.cmple(p).all() && p.cmple(self.max).all()
    }

    /// Returns `true` if `other` lies entirely inside this box.
    #[inline]
    pub fn contains_aabb(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    /// Squared distance from `p` to the box; zero inside.
    #[inline]
    pub fn distance_squared(&self, p: DVec3) -> f64 {
        (self.min - p).max(p - self.max).max(DVec3::ZERO).length_squared()
    }

    /// Sphere overlap test.
    #[inline]
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.distance_squared(center) <= radius * radius
    }

    /// Edge lengths; zero on axes where the box is inverted.
    #[inline]
    pub fn extent(&self) -> DVec3 {
        (self.max - self.min).max(DVec3::ZERO)
    }

    /// Enclosed volume. Zero for degenerate and empty boxes.
    #[inline]
    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e.x * e.y * e.z
    }

    /// Axis of largest extent (0 = x, 1 = y, 2 = z). Ties favour the lower axis.
    #[inline]
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Box center.
    #[inline]
    pub fn centroid(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// The box moved by `offset`.
    #[inline]
    #[must_use]
    pub fn translated(&self, offset: DVec3) -> Self {
        Self {
            min: self.min + offset,
            max: self.max + offset,
        }
    }
}
