//! GPU-assisted exact intersection test per (tet, block) candidate
//! (spec.md §4.3). The host enumerates the Cartesian product of each
//! cell's candidate blocks (from its bounding box in block coordinates)
//! and a device kernel evaluates each candidate; here the evaluation runs
//! directly since `cpu::CpuComputeDevice` is the backend under test.

use glam::DVec3;

use crate::kernels::intersection::tet_block_intersects;
use crate::mesh::Mesh;

/// A surviving (cell, block) candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intersection {
    pub cell: u32,
    pub block: u32,
}

fn block_index_of(p: DVec3, origin: DVec3, block_size: f64, dims: (u32, u32, u32)) -> (u32, u32, u32) {
    let rel = (p - origin) / block_size;
    (
        (rel.x.floor().max(0.0) as u32).min(dims.0 - 1),
        (rel.y.floor().max(0.0) as u32).min(dims.1 - 1),
        (rel.z.floor().max(0.0) as u32).min(dims.2 - 1),
    )
}

fn tet_vertices(mesh: &Mesh, cell: usize) -> [DVec3; 4] {
    let c = &mesh.cells[cell];
    [
        mesh.vertices[c.connectivity[0] as usize],
        mesh.vertices[c.connectivity[1] as usize],
        mesh.vertices[c.connectivity[2] as usize],
        mesh.vertices[c.connectivity[3] as usize],
    ]
}

/// Complexity: O(Σ_t Vol(bbox(t))) candidate evaluations, each O(1)
/// (spec.md §4.3).
pub fn find_intersections(
    mesh: &Mesh,
    origin: DVec3,
    block_size: f64,
    dims: (u32, u32, u32),
    eps: f64,
) -> Vec<Intersection> {
    let mut out = Vec::new();
    for cell_idx in 0..mesh.num_cells() {
        let (cell_min, cell_max) = mesh.cell_bounding_box(cell_idx);
        let lo = block_index_of(cell_min, origin, block_size, dims);
        let hi = block_index_of(cell_max, origin, block_size, dims);
        let tet = tet_vertices(mesh, cell_idx);

        for bx in lo.0..=hi.0 {
            for by in lo.1..=hi.1 {
                for bz in lo.2..=hi.2 {
                    let flat = bx * dims.1 * dims.2 + by * dims.2 + bz;
                    let block_min = origin + DVec3::new(bx as f64, by as f64, bz as f64) * block_size;
                    let block_max = block_min + DVec3::splat(block_size);
                    if tet_block_intersects(tet, block_min, block_max, eps) {
                        out.push(Intersection { cell: cell_idx as u32, block: flat });
                    }
                }
            }
        }
    }
    out
}
