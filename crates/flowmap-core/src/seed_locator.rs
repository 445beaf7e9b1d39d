use std::io::Write;

use glam::DVec3;

use crate::config::Configuration;
use crate::error::Result;
use crate::kernels::seed_locate::{contains, generate_lattice, LatticePoint};
use crate::mesh::Mesh;
use crate::particle_store::ParticleState;

/// The outcome of locating one lattice point: its containing cell, if any.
#[derive(Debug, Clone, Copy)]
pub struct SeedLocation {
    pub point: LatticePoint,
    pub exit_cell: Option<u32>,
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

/// Locates the containing tetrahedron for every seed lattice point
/// (spec.md §4.5). Ties on a shared face resolve to whichever cell is
/// tested last; spec.md §9 notes this is benign since both yield
/// identical subsequent trajectories.
pub fn locate_seeds(mesh: &Mesh, config: &Configuration) -> Vec<SeedLocation> {
    let min = DVec3::new(
        config.bounding_box_min_x,
        config.bounding_box_min_y,
        config.bounding_box_min_z,
    );
    let max = DVec3::new(
        config.bounding_box_max_x,
        config.bounding_box_max_y,
        config.bounding_box_max_z,
    );
    let res = (
        config.bounding_box_x_res,
        config.bounding_box_y_res,
        config.bounding_box_z_res,
    );
    let lattice = generate_lattice(min, max, res);

    lattice
        .into_iter()
        .map(|point| {
            let mut exit_cell = None;
            for cell in 0..mesh.num_cells() {
                let tet = tet_vertices(mesh, cell);
                if contains(tet, point.position, config.epsilon) {
                    exit_cell = Some(cell as u32);
                }
            }
            SeedLocation { point, exit_cell }
        })
        .collect()
}

/// Only lattice points with a valid containing cell become active seeds.
pub fn seed_particles(locations: &[SeedLocation]) -> Vec<ParticleState> {
    locations
        .iter()
        .filter_map(|loc| {
            loc.exit_cell
                .map(|cell| ParticleState::new_seeded(loc.point.grid_index, loc.point.position, cell))
        })
        .collect()
}

/// Writes the debug seed-location dump (spec.md §6 "debug seed-location
/// dump"): one line per lattice point, located or not.
pub fn write_debug_dump(locations: &[SeedLocation], writer: &mut impl Write) -> Result<()> {
    for loc in locations {
        let (i, j, k) = loc.point.grid_index;
        let p = loc.point.position;
        match loc.exit_cell {
            Some(cell) => writeln!(writer, "{i} {j} {k}: {} {} {} -> cell {cell}", p.x, p.y, p.z)?,
            None => writeln!(writer, "{i} {j} {k}: {} {} {} -> outside mesh", p.x, p.y, p.z)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Tetrahedron;

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

    fn config_for(min: DVec3, max: DVec3, res: (u32, u32, u32)) -> Configuration {
        Configuration {
            num_of_frames: 2,
            time_points: vec![0.0, 1.0],
            data_file_prefix: "f".into(),
            data_file_suffix: ".raw".into(),
            data_file_indices: vec!["0".into(), "1".into()],
            integration: crate::config::Integration::RungeKutta4,
            time_step: 0.25,
            time_interval: 1.0,
            block_size: 1.0,
            shared_memory_kilobytes: 16,
            bounding_box_min_x: min.x,
            bounding_box_min_y: min.y,
            bounding_box_min_z: min.z,
            bounding_box_max_x: max.x,
            bounding_box_max_y: max.y,
            bounding_box_max_z: max.z,
            bounding_box_x_res: res.0,
            bounding_box_y_res: res.1,
            bounding_box_z_res: res.2,
            epsilon: 1e-6,
            epsilon_for_tet_blk_intersection: 1e-4,
            num_of_banks: 16,
            use_double: true,
        }
    }

    #[test]
    fn seed_inside_mesh_is_located() {
        let mesh = single_tet_mesh();
        let config = config_for(DVec3::splat(0.05), DVec3::splat(0.15), (1, 1, 1));
        let locations = locate_seeds(&mesh, &config);
        assert!(locations.iter().all(|l| l.exit_cell == Some(0)));
    }

    /// Scenario S6: a seed just outside the mesh is not included in the
    /// initial active set.
    #[test]
    fn seed_outside_mesh_is_not_seeded() {
        let mesh = single_tet_mesh();
        let config = config_for(DVec3::splat(-5.0), DVec3::splat(-4.9), (1, 1, 1));
        let locations = locate_seeds(&mesh, &config);
        assert!(locations.iter().all(|l| l.exit_cell.is_none()));
        assert!(seed_particles(&locations).is_empty());
    }

    #[test]
    fn only_located_points_become_particles() {
        let mesh = single_tet_mesh();
        let config = config_for(DVec3::new(-1.0, 0.05, 0.05), DVec3::new(0.15, 0.15, 0.15), (2, 1, 1));
        let locations = locate_seeds(&mesh, &config);
        let particles = seed_particles(&locations);
        let located_count = locations.iter().filter(|l| l.exit_cell.is_some()).count();
        assert_eq!(particles.len(), located_count);
        assert!(located_count < locations.len());
    }
}
