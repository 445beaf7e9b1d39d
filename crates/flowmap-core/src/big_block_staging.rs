//! Copies global-memory staging arrays for blocks too large to fit a
//! work group's scratchpad (spec.md §4.9): positions once per run,
//! velocities once per interval.

use glam::DVec3;

use crate::block_grid::BlockGrid;

/// Global-memory staging for every big block's positions and the current
/// interval's start/end velocity snapshots, laid out by
/// `BlockGrid::big_point_offsets`.
pub struct BigBlockStaging {
    pub positions: Vec<DVec3>,
    pub start_velocities: Vec<DVec3>,
    pub end_velocities: Vec<DVec3>,
}

impl BigBlockStaging {
    /// Positions staging: copied once, since block membership and vertex
    /// positions are immutable across the run.
    pub fn stage_positions(block_grid: &BlockGrid, vertices: &[DVec3]) -> Vec<DVec3> {
        let total: usize = block_grid
            .big_blocks
            .iter()
            .map(|id| block_grid.blocks[id].global_points.len())
            .sum();
        let mut positions = vec![DVec3::ZERO; total];
        for (&block_id, &offset) in block_grid.big_blocks.iter().zip(block_grid.big_point_offsets.iter()) {
            let record = &block_grid.blocks[&block_id];
            for (j, &global_point) in record.global_points.iter().enumerate() {
                positions[offset as usize + j] = vertices[global_point as usize];
            }
        }
        positions
    }

    /// Velocities staging: re-run once per interval after the end-frame
    /// velocities arrive.
    fn stage_velocities(block_grid: &BlockGrid, velocities: &[DVec3]) -> Vec<DVec3> {
        let total: usize = block_grid
            .big_blocks
            .iter()
            .map(|id| block_grid.blocks[id].global_points.len())
            .sum();
        let mut staged = vec![DVec3::ZERO; total];
        for (&block_id, &offset) in block_grid.big_blocks.iter().zip(block_grid.big_point_offsets.iter()) {
            let record = &block_grid.blocks[&block_id];
            for (j, &global_point) in record.global_points.iter().enumerate() {
                staged[offset as usize + j] = velocities[global_point as usize];
            }
        }
        staged
    }

    pub fn new(block_grid: &BlockGrid, vertices: &[DVec3], start_velocities: &[DVec3], end_velocities: &[DVec3]) -> Self {
        Self {
            positions: Self::stage_positions(block_grid, vertices),
            start_velocities: Self::stage_velocities(block_grid, start_velocities),
            end_velocities: Self::stage_velocities(block_grid, end_velocities),
        }
    }

    /// Refreshes only the velocity snapshots for a new interval; positions
    /// stay as they were staged at construction.
    pub fn restage_velocities(&mut self, block_grid: &BlockGrid, start_velocities: &[DVec3], end_velocities: &[DVec3]) {
        self.start_velocities = Self::stage_velocities(block_grid, start_velocities);
        self.end_velocities = Self::stage_velocities(block_grid, end_velocities);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Mesh, Tetrahedron};

    fn single_tet_mesh() -> Mesh {
        Mesh {
            cells: vec![Tetrahedron {
                connectivity: [0, 1, 2, 3],
                links: [-1, -1, -1, -1],
            }],
            vertices: vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 0.0),
                DVec3::new(0.0, 2.0, 0.0),
                DVec3::new(0.0, 0.0, 2.0),
            ],
        }
    }

    #[test]
    fn staged_positions_match_global_points_under_tiny_scratch_budget() {
        let mesh = single_tet_mesh();
        let grid = BlockGrid::build(&mesh, 4.0, 1e-6, 1, 24);
        assert_eq!(grid.big_blocks.len(), grid.blocks.len());

        let staging = BigBlockStaging::new(&grid, &mesh.vertices, &vec![DVec3::ZERO; 4], &vec![DVec3::ZERO; 4]);
        let record = &grid.blocks[&grid.big_blocks[0]];
        for (j, &global_point) in record.global_points.iter().enumerate() {
            assert_eq!(staging.positions[j], mesh.vertices[global_point as usize]);
        }
    }

    #[test]
    fn restaging_velocities_uses_new_snapshot() {
        let mesh = single_tet_mesh();
        let grid = BlockGrid::build(&mesh, 4.0, 1e-6, 1, 24);
        let zero = vec![DVec3::ZERO; 4];
        let mut staging = BigBlockStaging::new(&grid, &mesh.vertices, &zero, &zero);

        let ones = vec![DVec3::ONE; 4];
        staging.restage_velocities(&grid, &ones, &ones);
        assert!(staging.start_velocities.iter().all(|&v| v == DVec3::ONE));
    }
}
