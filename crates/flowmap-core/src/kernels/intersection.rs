//! Exact (tet, block) intersection test (spec.md §4.3), evaluated per
//! candidate emitted by the host's Cartesian-product enumeration. Uses the
//! separating-axis theorem between the tetrahedron (four triangular faces)
//! and the axis-aligned block: if no axis among the box's three face
//! normals, the tet's four face normals, and the 18 cross products of box
//! edges with tet edges separates the two shapes, they intersect.
//!
//! Precision policy: the tolerance widens every projected interval so a
//! marginal case resolves to "intersects" rather than "disjoint" — a false
//! positive wastes memory, a false negative loses particles.

use glam::DVec3;

const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];
const BOX_AXES: [DVec3; 3] = [DVec3::X, DVec3::Y, DVec3::Z];

fn project(points: &[DVec3], axis: DVec3) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for p in points {
        let d = p.dot(axis);
        min = min.min(d);
        max = max.max(d);
    }
    (min, max)
}

fn separated_on_axis(tet: &[DVec3; 4], block_min: DVec3, block_max: DVec3, axis: DVec3, eps: f64) -> bool {
    if axis.length_squared() < 1e-18 {
        // Degenerate axis (parallel edges): contributes no separation.
        return false;
    }
    let box_corners = box_corners(block_min, block_max);
    let (tet_min, tet_max) = project(tet, axis);
    let (box_min, box_max) = project(&box_corners, axis);
    tet_max + eps < box_min - eps || box_max + eps < tet_min - eps
}

fn box_corners(min: DVec3, max: DVec3) -> [DVec3; 8] {
    [
        DVec3::new(min.x, min.y, min.z),
        DVec3::new(max.x, min.y, min.z),
        DVec3::new(min.x, max.y, min.z),
        DVec3::new(max.x, max.y, min.z),
        DVec3::new(min.x, min.y, max.z),
        DVec3::new(max.x, min.y, max.z),
        DVec3::new(min.x, max.y, max.z),
        DVec3::new(max.x, max.y, max.z),
    ]
}

/// True iff the tetrahedron and the axis-aligned block `[block_min,
/// block_max]` intersect, under tolerance `eps`.
pub fn tet_block_intersects(tet: [DVec3; 4], block_min: DVec3, block_max: DVec3, eps: f64) -> bool {
    for axis in BOX_AXES {
        if separated_on_axis(&tet, block_min, block_max, axis, eps) {
            return false;
        }
    }

    for face in 0..4 {
        let (a, b, c) = face_triangle(&tet, face);
        let normal = (b - a).cross(c - a);
        if separated_on_axis(&tet, block_min, block_max, normal, eps) {
            return false;
        }
    }

    for &(i, j) in &TET_EDGES {
        let edge = tet[j] - tet[i];
        for box_axis in BOX_AXES {
            let axis = edge.cross(box_axis);
            if separated_on_axis(&tet, block_min, block_max, axis, eps) {
                return false;
            }
        }
    }

    true
}

fn face_triangle(tet: &[DVec3; 4], face: usize) -> (DVec3, DVec3, DVec3) {
    let mut verts = [DVec3::ZERO; 3];
    let mut j = 0;
    for (i, v) in tet.iter().enumerate() {
        if i != face {
            verts[j] = *v;
            j += 1;
        }
    }
    (verts[0], verts[1], verts[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> [DVec3; 4] {
        [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
            DVec3::new(0.0, 0.0, 2.0),
        ]
    }

    #[test]
    fn overlapping_block_intersects() {
        let tet = unit_tet();
        assert!(tet_block_intersects(
            tet,
            DVec3::splat(0.0),
            DVec3::splat(1.0),
            1e-9
        ));
    }

    #[test]
    fn far_away_block_does_not_intersect() {
        let tet = unit_tet();
        assert!(!tet_block_intersects(
            tet,
            DVec3::splat(10.0),
            DVec3::splat(11.0),
            1e-9
        ));
    }

    #[test]
    fn block_fully_containing_tet_intersects() {
        let tet = unit_tet();
        assert!(tet_block_intersects(
            tet,
            DVec3::splat(-1.0),
            DVec3::splat(3.0),
            1e-9
        ));
    }

    #[test]
    fn touching_face_intersects_under_tolerance() {
        let tet = unit_tet();
        // Block starts exactly at the tet's max-x vertex.
        assert!(tet_block_intersects(
            tet,
            DVec3::new(2.0, -1.0, -1.0),
            DVec3::new(3.0, 1.0, 1.0),
            1e-6
        ));
    }

    #[test]
    fn straddling_block_boundary_intersects_both_sides() {
        let tet = [
            DVec3::new(-0.5, -0.5, -0.5),
            DVec3::new(1.5, -0.5, -0.5),
            DVec3::new(-0.5, 1.5, -0.5),
            DVec3::new(-0.5, -0.5, 1.5),
        ];
        assert!(tet_block_intersects(
            tet,
            DVec3::splat(-1.0),
            DVec3::splat(0.0),
            1e-9
        ));
        assert!(tet_block_intersects(
            tet,
            DVec3::splat(0.0),
            DVec3::splat(1.0),
            1e-9
        ));
    }
}
