//! Translates a flat active-particle list into a block-grouped,
//! stage-sorted work layout for one micro-iteration (spec.md §4.7).

use std::collections::HashMap;

use crate::block_grid::BlockGrid;
use crate::device::ComputeDevice;
use crate::error::{FlowMapError, Result};
use crate::particle_store::ParticleStore;
use crate::prefix_scan::PrefixScan;

/// The block-grouped layout one micro-iteration's tracing launch consumes.
pub struct RedistributionLayout {
    /// Block ids in first-seen order; index into this is the
    /// "active-block index" used throughout the other arrays.
    pub active_blocks: Vec<u32>,
    /// Particle ids packed by (active block, stage), per §4.7 step 4.
    pub blocked_active_particles: Vec<u32>,
    /// Per active block, the start offset of its stage-0 bucket in
    /// `blocked_active_particles` (§4.7 step 5).
    pub block_start_offsets: Vec<u32>,
    /// Per work group, which active block it belongs to (§4.7 step 6).
    pub block_of_groups: Vec<u32>,
    /// Per work group, its particle offset within the block's range.
    pub offset_in_blocks: Vec<u32>,
}

impl RedistributionLayout {
    pub fn total_work_groups(&self) -> usize {
        self.block_of_groups.len()
    }
}

/// Stateless: every call recomputes the layout from scratch off whichever
/// particle ids the caller passes as `active`. The caller decides
/// eligibility (e.g. `exit_cell != -1` AND not yet done with the current
/// interval) — the store's own active buffer only tracks the coarser
/// exit_cell test, so `Tracer` computes a finer-grained list itself.
pub struct Redistributor;

impl Redistributor {
    pub fn redistribute(
        device: &mut impl ComputeDevice,
        store: &ParticleStore,
        active: &[u32],
        block_grid: &BlockGrid,
        num_stages: usize,
        tracing_work_group_size: usize,
    ) -> Result<RedistributionLayout> {
        // Step 1: collect active blocks, resolve each particle's block and
        // local tet id, assigning active-block indices in first-seen order.
        let mut block_index: HashMap<u32, u32> = HashMap::new();
        let mut active_blocks = Vec::new();
        let mut particle_block_idx = vec![0u32; active.len()];
        let mut particle_stage = vec![0u8; active.len()];

        for (slot, &particle_id) in active.iter().enumerate() {
            let particle = store.particle(particle_id);
            let cell = particle.exit_cell.ok_or_else(|| {
                FlowMapError::Invariant(format!("particle {particle_id} is in the active set but terminated"))
            })?;
            let block_id = block_grid.block_id_of(particle.place_of_interest).ok_or_else(|| {
                FlowMapError::Invariant(format!(
                    "particle {particle_id}'s position {:?} maps outside the block grid",
                    particle.place_of_interest
                ))
            })?;
            if block_grid.tet_block_map().entries_for(cell as usize).iter().all(|&(b, _)| b != block_id) {
                return Err(FlowMapError::Invariant(format!(
                    "particle {particle_id}'s cell {cell} has no local tet id in block {block_id}"
                )));
            }

            let active_idx = *block_index.entry(block_id).or_insert_with(|| {
                let idx = active_blocks.len() as u32;
                active_blocks.push(block_id);
                idx
            });
            particle_block_idx[slot] = active_idx;
            particle_stage[slot] = particle.stage;
        }

        // Step 2: count per (block, stage), recording each particle's order
        // within its bucket.
        let num_blocks = active_blocks.len();
        let mut counts = vec![0i32; num_blocks * num_stages];
        let mut particle_order = vec![0u32; active.len()];
        for slot in 0..active.len() {
            let bucket = particle_block_idx[slot] as usize * num_stages + particle_stage[slot] as usize;
            particle_order[slot] = counts[bucket] as u32;
            counts[bucket] += 1;
        }
        let bucket_totals = counts.clone();

        // Step 3: scan.
        let mut scan_result = counts;
        PrefixScan::exclusive_scan(device, &mut scan_result)?;

        // Step 4: scatter.
        let mut blocked_active_particles = vec![0u32; active.len()];
        for slot in 0..active.len() {
            let bucket = particle_block_idx[slot] as usize * num_stages + particle_stage[slot] as usize;
            let packed_position = scan_result[bucket] as usize + particle_order[slot] as usize;
            blocked_active_particles[packed_position] = active[slot];
        }

        // Step 5: per-block start offsets (stage 0 of each block).
        let block_start_offsets: Vec<u32> = (0..num_blocks)
            .map(|b| scan_result[b * num_stages] as u32)
            .collect();

        // Step 6: work-group assignment.
        let mut block_of_groups = Vec::new();
        let mut offset_in_blocks = Vec::new();
        let group_size = tracing_work_group_size.max(1);
        for b in 0..num_blocks {
            let particles_in_block: i32 = bucket_totals[b * num_stages..(b + 1) * num_stages].iter().sum();
            let groups = (particles_in_block as usize).div_ceil(group_size);
            for g in 0..groups {
                block_of_groups.push(b as u32);
                offset_in_blocks.push((g * group_size) as u32);
            }
        }

        Ok(RedistributionLayout {
            active_blocks,
            blocked_active_particles,
            block_start_offsets,
            block_of_groups,
            offset_in_blocks,
        })
    }
}
