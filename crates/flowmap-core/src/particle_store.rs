use glam::DVec3;

use crate::kernels::integrate::{advance_rk4_stage, RkState, StageOutcome};
use crate::mesh::Mesh;

/// Per-particle state (spec.md §3 `ParticleState`). The integrator fields
/// (`stage`..`k`) are mutated in place every micro-iteration. Block/tet/
/// order scheduling data is *not* stored here — it is recomputed from
/// scratch by `Redistributor` each micro-iteration and handed back as a
/// `RedistributionLayout`, since nothing ever reads it off a particle
/// between one redistribution and the next.
#[derive(Debug, Clone)]
pub struct ParticleState {
    pub grid_point_id: (u32, u32, u32),

    pub stage: u8,
    pub past_time: f64,
    pub place_of_interest: DVec3,
    pub last_position: DVec3,
    pub k: [DVec3; 3],

    /// `None` ⇔ terminated (spec.md's `exit_cell == -1`).
    pub exit_cell: Option<u32>,
}

impl ParticleState {
    pub fn new_seeded(grid_point_id: (u32, u32, u32), position: DVec3, exit_cell: u32) -> Self {
        Self {
            grid_point_id,
            stage: 0,
            past_time: 0.0,
            place_of_interest: position,
            last_position: position,
            k: [DVec3::ZERO; 3],
            exit_cell: Some(exit_cell),
        }
    }

    pub fn is_active(&self) -> bool {
        self.exit_cell.is_some()
    }

    /// Advances this particle through one RK4 stage (spec.md §4.8).
    /// Returns whether a step completed, the particle terminated, or it is
    /// still mid-step.
    #[allow(clippy::too_many_arguments)]
    pub fn advance_rk4(
        &mut self,
        mesh: &Mesh,
        start_velocities: &[DVec3],
        end_velocities: &[DVec3],
        interval_start: f64,
        interval_length: f64,
        h: f64,
        eps: f64,
    ) -> StageOutcome {
        advance_rk4_stage(
            mesh,
            start_velocities,
            end_velocities,
            interval_start,
            interval_length,
            h,
            eps,
            RkState {
                stage: &mut self.stage,
                past_time: &mut self.past_time,
                place_of_interest: &mut self.place_of_interest,
                last_position: &mut self.last_position,
                k: &mut self.k,
                exit_cell: &mut self.exit_cell,
            },
        )
    }
}

/// Owns the full particle array and the double-buffered active-index
/// arrays the Redistributor and Tracer flip between micro-iterations.
pub struct ParticleStore {
    particles: Vec<ParticleState>,
    active: [Vec<u32>; 2],
    current: usize,
}

impl ParticleStore {
    pub fn new(particles: Vec<ParticleState>) -> Self {
        let initial_active: Vec<u32> = particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_active())
            .map(|(i, _)| i as u32)
            .collect();
        Self {
            particles,
            active: [initial_active, Vec::new()],
            current: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[ParticleState] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [ParticleState] {
        &mut self.particles
    }

    pub fn particle(&self, id: u32) -> &ParticleState {
        &self.particles[id as usize]
    }

    pub fn particle_mut(&mut self, id: u32) -> &mut ParticleState {
        &mut self.particles[id as usize]
    }

    /// The active-particle index array for the current micro-iteration.
    pub fn current_active(&self) -> &[u32] {
        &self.active[self.current]
    }

    /// Recomputes the "next" active array by compacting every particle
    /// whose `exit_cell != -1`, then flips the double buffer so it becomes
    /// "current". Returns the new active count.
    pub fn compact_active(&mut self) -> usize {
        let next = 1 - self.current;
        self.active[next].clear();
        self.active[next].extend(
            self.particles
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_active())
                .map(|(i, _)| i as u32),
        );
        self.current = next;
        self.active[self.current].len()
    }
}
