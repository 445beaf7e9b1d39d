//! Seed lattice generation and point-in-tetrahedron containment
//! (spec.md §4.5), expressed via barycentric coordinates.

use glam::DVec3;

fn signed_volume(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    (b - a).cross(c - a).dot(d - a) / 6.0
}

/// Barycentric weights of `p` with respect to tetrahedron `tet`. Sum to 1
/// for any `p`; all four lie in `[0, 1]` iff `p` is inside the tet.
pub fn barycentric(tet: [DVec3; 4], p: DVec3) -> [f64; 4] {
    let volume = signed_volume(tet[0], tet[1], tet[2], tet[3]);
    [
        signed_volume(p, tet[1], tet[2], tet[3]) / volume,
        signed_volume(tet[0], p, tet[2], tet[3]) / volume,
        signed_volume(tet[0], tet[1], p, tet[3]) / volume,
        signed_volume(tet[0], tet[1], tet[2], p) / volume,
    ]
}

/// True iff `p` lies inside `tet`, within tolerance `eps` on each
/// barycentric weight.
pub fn contains(tet: [DVec3; 4], p: DVec3, eps: f64) -> bool {
    barycentric(tet, p)
        .iter()
        .all(|&w| w >= -eps && w <= 1.0 + eps)
}

/// A Cartesian seed lattice point: its `(i, j, k)` grid index (identity,
/// carried through to the output file) and its 3D coordinates.
#[derive(Debug, Clone, Copy)]
pub struct LatticePoint {
    pub grid_index: (u32, u32, u32),
    pub position: DVec3,
}

/// Enumerates the `(xRes+1)·(yRes+1)·(zRes+1)` lattice over `[min, max]`.
pub fn generate_lattice(min: DVec3, max: DVec3, res: (u32, u32, u32)) -> Vec<LatticePoint> {
    let (x_res, y_res, z_res) = res;
    let step = DVec3::new(
        (max.x - min.x) / x_res as f64,
        (max.y - min.y) / y_res as f64,
        (max.z - min.z) / z_res as f64,
    );
    let mut out = Vec::with_capacity((x_res as usize + 1) * (y_res as usize + 1) * (z_res as usize + 1));
    for i in 0..=x_res {
        for j in 0..=y_res {
            for k in 0..=z_res {
                out.push(LatticePoint {
                    grid_index: (i, j, k),
                    position: min + step * DVec3::new(i as f64, j as f64, k as f64),
                });
            }
        }
    }
    out
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
    fn interior_point_is_contained() {
        assert!(contains(unit_tet(), DVec3::new(0.1, 0.1, 0.1), 1e-9));
    }

    #[test]
    fn exterior_point_is_not_contained() {
        assert!(!contains(unit_tet(), DVec3::new(5.0, 5.0, 5.0), 1e-9));
    }

    #[test]
    fn point_on_face_is_contained_within_tolerance() {
        // On the face opposite the origin vertex: x+y+z == 2.
        assert!(contains(unit_tet(), DVec3::new(1.0, 1.0, 0.0), 1e-9));
    }

    #[test]
    fn lattice_has_expected_point_count() {
        let lattice = generate_lattice(DVec3::ZERO, DVec3::splat(1.0), (2, 3, 1));
        assert_eq!(lattice.len(), 3 * 4 * 2);
    }

    #[test]
    fn lattice_corners_match_bounds() {
        let min = DVec3::new(-1.0, 0.0, 2.0);
        let max = DVec3::new(1.0, 4.0, 6.0);
        let lattice = generate_lattice(min, max, (1, 1, 1));
        assert_eq!(lattice.len(), 8);
        assert!(lattice.iter().any(|p| p.position == min));
        assert!(lattice.iter().any(|p| p.position == max));
    }
}
