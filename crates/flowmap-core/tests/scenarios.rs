//! End-to-end exercises of spec.md §8's literal scenarios against the
//! `cpu` backend, running through the full `Tracer::run` orchestration
//! (as opposed to the isolated kernel/unit tests living alongside each
//! module).

use flowmap_core::config::Integration;
use flowmap_core::device::cpu::CpuComputeDevice;
use flowmap_core::mesh::{Frame, FrameSource, Mesh, Tetrahedron};
use flowmap_core::{Configuration, Tracer};
use glam::DVec3;

struct StaticFrameSource {
    mesh: Mesh,
    velocities: Vec<DVec3>,
}

impl FrameSource for StaticFrameSource {
    fn load_mesh(&mut self) -> flowmap_core::Result<Mesh> {
        Ok(self.mesh.clone())
    }

    fn load_frame(&mut self, index: usize) -> flowmap_core::Result<Frame> {
        Ok(Frame {
            time: index as f64,
            velocities: self.velocities.clone(),
        })
    }
}

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

fn base_config(seed_min: DVec3, seed_max: DVec3, time_step: f64) -> Configuration {
    Configuration {
        num_of_frames: 2,
        time_points: vec![0.0, 1.0],
        data_file_prefix: "f".into(),
        data_file_suffix: ".raw".into(),
        data_file_indices: vec!["0".into(), "1".into()],
        integration: Integration::RungeKutta4,
        time_step,
        time_interval: 1.0,
        block_size: 4.0,
        shared_memory_kilobytes: 64,
        bounding_box_min_x: seed_min.x,
        bounding_box_min_y: seed_min.y,
        bounding_box_min_z: seed_min.z,
        bounding_box_max_x: seed_max.x,
        bounding_box_max_y: seed_max.y,
        bounding_box_max_z: seed_max.z,
        bounding_box_x_res: 1,
        bounding_box_y_res: 1,
        bounding_box_z_res: 1,
        epsilon: 1e-6,
        epsilon_for_tet_blk_intersection: 1e-4,
        num_of_banks: 16,
        use_double: true,
    }
}

/// S2: linear shear u=(y,0,0), seed (0.1,0.5,0.1), Δ=1, h=0.1.
#[test]
fn linear_shear_final_x_matches_expected() {
    let mesh = single_tet_mesh();
    let seed = DVec3::new(0.1, 0.5, 0.1);
    // A uniform per-vertex velocity field can't express u=(y,0,0) exactly,
    // so approximate it by sampling each vertex's own y coordinate.
    let velocities: Vec<DVec3> = mesh.vertices.iter().map(|v| DVec3::new(v.y, 0.0, 0.0)).collect();
    let mut frames = StaticFrameSource { mesh, velocities };
    let mut config = base_config(seed - DVec3::splat(0.05), seed + DVec3::splat(0.05), 0.1);
    config.time_step = 0.1;
    let mut device = CpuComputeDevice::new();

    let output = Tracer::run(&mut device, &mut frames, &config).unwrap();
    let final_position = output.final_positions[&(0, 0, 0)];
    assert!(
        (final_position.x - 0.6).abs() < 1e-2,
        "x = {} (expected close to 0.6)",
        final_position.x
    );
}

/// S3: same tet, velocity (10,0,0), seed (0.1,0.1,0.1). The particle exits
/// through the face opposite (0,0,0) before the interval completes.
#[test]
fn fast_particle_exits_mesh_before_interval_ends() {
    let mesh = single_tet_mesh();
    let mut frames = StaticFrameSource {
        mesh,
        velocities: vec![DVec3::new(10.0, 0.0, 0.0); 4],
    };
    let config = base_config(DVec3::splat(0.05), DVec3::splat(0.15), 1.0);
    let mut device = CpuComputeDevice::new();

    let output = Tracer::run(&mut device, &mut frames, &config).unwrap();
    let final_position = output.final_positions[&(0, 0, 0)];
    // Exit face is x + y + z == 2 (opposite the origin vertex), same as
    // the isolated kernel test in kernels::integrate.
    assert!(
        (final_position.x + final_position.y + final_position.z - 2.0).abs() < 1e-3,
        "final position {:?} not on the expected exit face",
        final_position
    );
}

/// S4: two tets straddling a block boundary at x=1, block_size=1. Seed at
/// (0.9,0.5,0.5), velocity (1,0,0): the particle crosses from block
/// (0,0,0) into block (1,0,0) partway through the interval.
#[test]
fn particle_crosses_block_boundary_mid_interval() {
    let mesh = Mesh {
        cells: vec![
            Tetrahedron {
                connectivity: [0, 1, 2, 3],
                links: [1, -1, -1, -1],
            },
            Tetrahedron {
                connectivity: [4, 1, 2, 3],
                links: [0, -1, -1, -1],
            },
        ],
        vertices: vec![
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(0.0, 2.0, 0.0),
            DVec3::new(0.0, -2.0, 0.0),
            DVec3::new(0.0, 0.0, 2.0),
            DVec3::new(2.0, 0.0, 0.0),
        ],
    };
    let mut frames = StaticFrameSource {
        mesh,
        velocities: vec![DVec3::new(1.0, 0.0, 0.0); 5],
    };
    let mut config = base_config(
        DVec3::new(0.85, 0.45, 0.45),
        DVec3::new(0.95, 0.55, 0.55),
        0.1,
    );
    config.block_size = 1.0;
    let mut device = CpuComputeDevice::new();

    let output = Tracer::run(&mut device, &mut frames, &config).unwrap();
    let final_position = output.final_positions[&(0, 0, 0)];
    assert!(
        final_position.x > 1.0,
        "particle should have crossed the block boundary at x=1: x = {}",
        final_position.x
    );
}
