//! Exact tetrahedron predicates used to narrow box-level candidates.
//!
//! All routines are division-free for degenerate input or guard their
//! divisions, so zero-volume tetrahedra and zero-area faces never produce
//! NaN or infinity.

use glam::DVec3;

/// Face vertex triples of a tetrahedron.
const FACES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];

/// Edge vertex pairs of a tetrahedron.
const EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Six times the signed volume of `(a, b, c, d)`.
#[inline]
pub fn orient3d(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    (b - a).dot((c - a).cross(d - a))
}

/// Signed volume of a tetrahedron.
#[inline]
pub fn tetrahedron_volume(tet: &[DVec3; 4]) -> f64 {
    orient3d(tet[0], tet[1], tet[2], tet[3]) / 6.0
}

/// Point containment by barycentric sign test, inclusive on the boundary.
///
/// Each sub-tetrahedron formed by replacing one vertex with `p` must have the
/// same orientation as the whole (or be flat). Degenerate tetrahedra contain
/// nothing.
pub fn point_in_tetrahedron(p: DVec3, tet: &[DVec3; 4]) -> bool {
    let [a, b, c, d] = *tet;
    let whole = orient3d(a, b, c, d);
    if whole == 0.0 {
        return false;
    }
    let parts = [
        orient3d(p, b, c, d),
        orient3d(a, p, c, d),
        orient3d(a, b, p, d),
        orient3d(a, b, c, p),
    ];
    parts.iter().all(|&part| part * whole >= 0.0)
}

/// Closest point to `p` on segment `[a, b]`.
#[inline]
pub fn closest_point_on_segment(p: DVec3, a: DVec3, b: DVec3) -> DVec3 {
    let ab = b - a;
    let len2 = ab.length_squared();
    if len2 == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point to `p` on triangle `(a, b, c)` by Voronoi-region walk.
pub fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    if ab.cross(ac).length_squared() <= f64::MIN_POSITIVE {
        // Zero-area face: nearest of its three edges.
        return [
            closest_point_on_segment(p, a, b),
            closest_point_on_segment(p, b, c),
            closest_point_on_segment(p, a, c),
        ]
        .into_iter()
        .min_by(|x, y| x.distance_squared(p).total_cmp(&y.distance_squared(p)))
        .unwrap_or(a);
    }

    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    a + ab * (vb * denom) + ac * (vc * denom)
}

/// Squared distance from `p` to the solid tetrahedron; zero inside.
pub fn point_tetrahedron_distance_squared(p: DVec3, tet: &[DVec3; 4]) -> f64 {
    if point_in_tetrahedron(p, tet) {
        return 0.0;
    }
    FACES
        .iter()
        .map(|&[i, j, k]| closest_point_on_triangle(p, tet[i], tet[j], tet[k]).distance_squared(p))
        .fold(f64::INFINITY, f64::min)
}

/// Projection interval of `points` onto `axis`.
#[inline]
fn project(points: &[DVec3; 4], axis: DVec3) -> (f64, f64) {
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

#[inline]
fn separated_on(a: &[DVec3; 4], b: &[DVec3; 4], axis: DVec3) -> bool {
    if axis.length_squared() == 0.0 {
        return false;
    }
    let (a_lo, a_hi) = project(a, axis);
    let (b_lo, b_hi) = project(b, axis);
    a_hi < b_lo || b_hi < a_lo
}

fn face_normals(tet: &[DVec3; 4]) -> impl Iterator<Item = DVec3> + '_ {
    FACES
        .iter()
        .map(move |&[i, j, k]| (tet[j] - tet[i]).cross(tet[k] - tet[i]))
}

fn edge_vectors(tet: &[DVec3; 4]) -> [DVec3; 6] {
    EDGES.map(|[i, j]| tet[j] - tet[i])
}

/// Exact overlap test between two solid tetrahedra (separating axis test).
///
/// Touching tetrahedra intersect. Candidate axes are the coordinate axes, the
/// face normals of both tetrahedra and the cross products of their edges;
/// zero-length axes are skipped.
pub fn tetrahedra_intersect(a: &[DVec3; 4], b: &[DVec3; 4]) -> bool {
    if [DVec3::X, DVec3::Y, DVec3::Z]
        .into_iter()
        .any(|axis| separated_on(a, b, axis))
    {
        return false;
    }
    if face_normals(a)
        .chain(face_normals(b))
        .any(|axis| separated_on(a, b, axis))
    {
        return false;
    }
    let edges_a = edge_vectors(a);
    let edges_b = edge_vectors(b);
    !edges_a
        .iter()
        .any(|ea| edges_b.iter().any(|eb| separated_on(a, b, ea.cross(*eb))))
}
