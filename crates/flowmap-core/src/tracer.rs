//! Time-interval and micro-iteration orchestration (spec.md §4.8). Single
//! threaded on the host; every device operation is synchronous from this
//! module's point of view, so the "suspension points" spec.md §5
//! describes collapse to ordinary sequential calls.

use std::collections::HashMap;

use glam::DVec3;
use tracing::info;

use crate::big_block_staging::BigBlockStaging;
use crate::block_grid::BlockGrid;
use crate::config::Configuration;
use crate::device::ComputeDevice;
use crate::error::Result;
use crate::kernels::integrate::StageOutcome;
use crate::mesh::{FrameSource, Mesh};
use crate::particle_store::ParticleStore;
use crate::redistributor::Redistributor;
use crate::seed_locator::{locate_seeds, seed_particles, SeedLocation};

/// A real launch would size this from the device's reported
/// `max_work_group_size`; spec.md §6 leaves it unexposed at the
/// configuration layer, so it is fixed here.
const TRACING_WORK_GROUP_SIZE: usize = 64;

/// Guards against a particle's `past_time` landing a few ULPs short of the
/// interval end after repeated float addition.
const TIME_EPS: f64 = 1e-9;

/// What a full run produces: every seed's location outcome (for the debug
/// dump) and every seed's final recorded position (for the output file).
pub struct TracerOutput {
    pub seed_locations: Vec<SeedLocation>,
    pub final_positions: HashMap<(u32, u32, u32), DVec3>,
}

/// Drives the full run: seeding, then one micro-iteration loop per
/// consecutive frame pair, until every particle has either exited the
/// mesh or completed the final interval.
pub struct Tracer;

impl Tracer {
    pub fn run(
        device: &mut impl ComputeDevice,
        frames: &mut impl FrameSource,
        config: &Configuration,
    ) -> Result<TracerOutput> {
        let mesh = frames.load_mesh()?;
        let seed_locations = locate_seeds(&mesh, config);
        let particles = seed_particles(&seed_locations);
        info!(seeded = particles.len(), lattice_points = seed_locations.len(), "seeded particles");

        let mut store = ParticleStore::new(particles);

        let vec3_bytes = if config.use_double { 24 } else { 12 };
        let scratch_budget_bytes = (config.shared_memory_kilobytes as usize) * 1024;
        let block_grid = BlockGrid::build(
            &mesh,
            config.block_size,
            config.epsilon_for_tet_blk_intersection,
            scratch_budget_bytes,
            vec3_bytes,
        );
        info!(
            blocks = block_grid.blocks.len(),
            big_blocks = block_grid.big_blocks.len(),
            "built block grid"
        );

        let num_stages = config.integration.num_stages();
        let h = config.time_step;

        let mut start_velocities = frames.load_frame(0)?.velocities;
        let mut big_block_staging: Option<BigBlockStaging> = None;
        let run_started_at = std::time::Instant::now();

        for frame_index in 0..config.num_of_frames - 1 {
            let interval_started_at = std::time::Instant::now();
            let interval_start = config.time_points[frame_index];
            let interval_length = config.time_points[frame_index + 1] - interval_start;
            let interval_end = interval_start + interval_length;

            let end_frame = frames.load_frame(frame_index + 1)?;
            let end_velocities = end_frame.velocities;

            match &mut big_block_staging {
                None => {
                    big_block_staging = Some(BigBlockStaging::new(
                        &block_grid,
                        &mesh.vertices,
                        &start_velocities,
                        &end_velocities,
                    ))
                }
                Some(staging) => staging.restage_velocities(&block_grid, &start_velocities, &end_velocities),
            }

            store.compact_active();

            let mut micro_iterations = 0u32;
            let mut active_at_interval_start = 0usize;
            loop {
                let active = Self::collect_interval_active(&store, interval_end);
                if active.is_empty() {
                    break;
                }
                if micro_iterations == 0 {
                    active_at_interval_start = active.len();
                }

                let layout = Redistributor::redistribute(
                    device,
                    &store,
                    &active,
                    &block_grid,
                    num_stages,
                    TRACING_WORK_GROUP_SIZE,
                )?;

                for &particle_id in &layout.blocked_active_particles {
                    store.particle_mut(particle_id).advance_rk4(
                        &mesh,
                        &start_velocities,
                        &end_velocities,
                        interval_start,
                        interval_length,
                        h,
                        config.epsilon,
                    );
                }
                micro_iterations += 1;
            }
            info!(
                frame = frame_index,
                micro_iterations,
                active_particles = active_at_interval_start,
                interval_cost_sec = interval_started_at.elapsed().as_secs_f64(),
                "completed interval"
            );

            start_velocities = end_velocities;
        }

        store.compact_active();

        let final_positions = store
            .particles()
            .iter()
            .map(|p| (p.grid_point_id, p.place_of_interest))
            .collect();

        info!(
            total_tracing_sec = run_started_at.elapsed().as_secs_f64(),
            "tracing run complete"
        );

        Ok(TracerOutput {
            seed_locations,
            final_positions,
        })
    }

    /// A particle is eligible for another RK4 stage this micro-iteration
    /// iff it hasn't exited the mesh and hasn't yet reached the end of the
    /// current interval (spec.md §4.8 step 4a/4b).
    fn collect_interval_active(store: &ParticleStore, interval_end: f64) -> Vec<u32> {
        store
            .particles()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active() && p.past_time < interval_end - TIME_EPS)
            .map(|(i, _)| i as u32)
            .collect()
    }
}
