//! RK4 stage contract (spec.md §4.8): velocity sampling by barycentric
//! interpolation over a cell's four vertices, time-interpolation between
//! the bracketing frame velocity buffers, and the ray walk through
//! adjacent cells via `local_links` when a stage completes a step.
//!
//! FE and RK45 are enumerated in [`crate::config::Integration`] but their
//! per-stage math is left to the device kernel, per spec.md §1/§9; only
//! RK4 is implemented here.

use glam::DVec3;

use crate::kernels::seed_locate::barycentric;
use crate::mesh::Mesh;

/// Where the ray from `from` to `to`, walked through the mesh starting at
/// `start_cell`, ends up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalkOutcome {
    /// Still inside the mesh, in `cell`, at `position` (== `to`, unless the
    /// walk never reached it — which cannot happen for a well-formed mesh
    /// since every ray either lands inside a cell or exits the hull).
    Inside { cell: usize, position: DVec3 },
    /// Left the mesh through a boundary face; `position` is clipped to the
    /// exit point on that face.
    Exited { position: DVec3 },
}

fn tet_positions(mesh: &Mesh, cell: usize) -> [DVec3; 4] {
    let c = &mesh.cells[cell];
    [
        mesh.vertices[c.connectivity[0] as usize],
        mesh.vertices[c.connectivity[1] as usize],
        mesh.vertices[c.connectivity[2] as usize],
        mesh.vertices[c.connectivity[3] as usize],
    ]
}

fn face_triangle(tet: [DVec3; 4], face: usize) -> [DVec3; 3] {
    let mut out = [DVec3::ZERO; 3];
    let mut j = 0;
    for (i, v) in tet.iter().enumerate() {
        if i != face {
            out[j] = *v;
            j += 1;
        }
    }
    out
}

/// Parameter `t` along `from..to` at which the segment crosses the plane
/// through `tri`. Returns `1.0` (i.e. "no crossing before reaching `to`")
/// if the segment runs parallel to the plane.
fn plane_crossing(from: DVec3, to: DVec3, tri: [DVec3; 3]) -> f64 {
    let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
    let denom = normal.dot(to - from);
    if denom.abs() < 1e-15 {
        return 1.0;
    }
    let t = normal.dot(tri[0] - from) / denom;
    t.clamp(0.0, 1.0)
}

/// Walks from `from` to `to`, starting inside `start_cell`, crossing
/// adjacent cells via `local_links`-equivalent mesh connectivity until the
/// destination is located or the mesh boundary is reached. Bounded by
/// `max_hops` as a safety cutoff against malformed topology.
pub fn walk(mesh: &Mesh, start_cell: usize, from: DVec3, to: DVec3, eps: f64, max_hops: usize) -> WalkOutcome {
    let mut current = start_cell;
    let mut segment_from = from;
    for _ in 0..max_hops {
        let tet = tet_positions(mesh, current);
        let weights = barycentric(tet, to);
        if weights.iter().all(|&w| w >= -eps && w <= 1.0 + eps) {
            return WalkOutcome::Inside { cell: current, position: to };
        }
        let (face, _) = weights
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .expect("tetrahedron has four faces");
        let tri = face_triangle(tet, face);
        let t = plane_crossing(segment_from, to, tri);
        let crossing = segment_from + (to - segment_from) * t;
        let neighbor = mesh.cells[current].links[face];
        if neighbor < 0 {
            return WalkOutcome::Exited { position: crossing };
        }
        current = neighbor as usize;
        segment_from = crossing;
    }
    WalkOutcome::Exited { position: to }
}

fn vertex_velocity(start: &[DVec3], end: &[DVec3], frac: f64, vertex: u32) -> DVec3 {
    let v = vertex as usize;
    start[v].lerp(end[v], frac)
}

/// Samples the velocity field at `position` inside `cell`, interpolating
/// spatially via barycentric weights and temporally between the two
/// bracketing frame buffers at `time_frac` ∈ [0, 1].
pub fn sample_velocity(
    mesh: &Mesh,
    start_velocities: &[DVec3],
    end_velocities: &[DVec3],
    time_frac: f64,
    cell: usize,
    position: DVec3,
) -> DVec3 {
    let tet = tet_positions(mesh, cell);
    let weights = barycentric(tet, position);
    let connectivity = mesh.cells[cell].connectivity;
    let mut v = DVec3::ZERO;
    for i in 0..4 {
        v += weights[i] * vertex_velocity(start_velocities, end_velocities, time_frac, connectivity[i]);
    }
    v
}

/// Mutable per-particle integration state the RK4 stage stepper advances.
/// Scheduling-only fields (active block, local tet id, …) live in
/// `ParticleStore` and are not touched here.
pub struct RkState<'a> {
    pub stage: &'a mut u8,
    pub past_time: &'a mut f64,
    pub place_of_interest: &'a mut DVec3,
    pub last_position: &'a mut DVec3,
    pub k: &'a mut [DVec3; 3],
    pub exit_cell: &'a mut Option<u32>,
}

/// Result of advancing one RK4 stage for one particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The particle is still mid-step, awaiting its next stage.
    Continuing,
    /// The step completed; `past_time` advanced by `h`.
    StepCompleted,
    /// The particle left the mesh boundary; `exit_cell` is now `None`.
    Terminated,
}

/// Advances one RK4 stage (spec.md §4.8). `interval_start` is the wall
/// time at the beginning of the current host interval; `h` is the
/// integrator step.
#[allow(clippy::too_many_arguments)]
pub fn advance_rk4_stage(
    mesh: &Mesh,
    start_velocities: &[DVec3],
    end_velocities: &[DVec3],
    interval_start: f64,
    interval_length: f64,
    h: f64,
    eps: f64,
    state: RkState<'_>,
) -> StageOutcome {
    let RkState {
        stage,
        past_time,
        place_of_interest,
        last_position,
        k,
        exit_cell,
    } = state;

    let Some(cell) = *exit_cell else {
        return StageOutcome::Terminated;
    };

    let sample_time_frac = |t: f64| ((t - interval_start) / interval_length).clamp(0.0, 1.0);

    let advance = |from: DVec3,
                   to: DVec3,
                   cell: usize,
                   exit_cell: &mut Option<u32>|
     -> Option<(usize, DVec3)> {
        match walk(mesh, cell, from, to, eps, 4 * mesh.num_cells().max(1)) {
            WalkOutcome::Inside { cell, position } => Some((cell, position)),
            WalkOutcome::Exited { position } => {
                *place_of_interest = position;
                *exit_cell = None;
                None
            }
        }
    };

    match *stage {
        0 => {
            let v = sample_velocity(mesh, start_velocities, end_velocities, sample_time_frac(*past_time), cell, *last_position);
            k[0] = v * h;
            let target = *last_position + k[0] * 0.5;
            match advance(*last_position, target, cell, exit_cell) {
                Some((new_cell, pos)) => {
                    *exit_cell = Some(new_cell as u32);
                    *place_of_interest = pos;
                    *stage = 1;
                    StageOutcome::Continuing
                }
                None => StageOutcome::Terminated,
            }
        }
        1 => {
            let t_mid = *past_time + h * 0.5;
            let v = sample_velocity(mesh, start_velocities, end_velocities, sample_time_frac(t_mid), cell, *place_of_interest);
            k[1] = v * h;
            let target = *last_position + k[1] * 0.5;
            match advance(*place_of_interest, target, cell, exit_cell) {
                Some((new_cell, pos)) => {
                    *exit_cell = Some(new_cell as u32);
                    *place_of_interest = pos;
                    *stage = 2;
                    StageOutcome::Continuing
                }
                None => StageOutcome::Terminated,
            }
        }
        2 => {
            let t_mid = *past_time + h * 0.5;
            let v = sample_velocity(mesh, start_velocities, end_velocities, sample_time_frac(t_mid), cell, *place_of_interest);
            k[2] = v * h;
            let target = *last_position + k[2];
            match advance(*place_of_interest, target, cell, exit_cell) {
                Some((new_cell, pos)) => {
                    *exit_cell = Some(new_cell as u32);
                    *place_of_interest = pos;
                    *stage = 3;
                    StageOutcome::Continuing
                }
                None => StageOutcome::Terminated,
            }
        }
        3 => {
            let t_end = *past_time + h;
            let v = sample_velocity(mesh, start_velocities, end_velocities, sample_time_frac(t_end), cell, *place_of_interest);
            let k4 = v * h;
            let new_position = *last_position + (k[0] + 2.0 * k[1] + 2.0 * k[2] + k4) / 6.0;
            match advance(*place_of_interest, new_position, cell, exit_cell) {
                Some((new_cell, pos)) => {
                    *exit_cell = Some(new_cell as u32);
                    *place_of_interest = pos;
                    *last_position = pos;
                    *past_time += h;
                    *stage = 0;
                    StageOutcome::StepCompleted
                }
                None => StageOutcome::Terminated,
            }
        }
        _ => unreachable!("RK4 has exactly 4 stages"),
    }
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

    /// Scenario S1: constant velocity (1,0,0), Δ=1, h=0.25, RK4, seed at
    /// (0.1,0.1,0.1). Final position ≈ (1.1,0.1,0.1).
    #[test]
    fn constant_velocity_advection_matches_closed_form() {
        let mesh = single_tet_mesh();
        let velocities = vec![DVec3::new(1.0, 0.0, 0.0); 4];
        let eps = 1e-6;
        let h = 0.25;

        let mut stage = 0u8;
        let mut past_time = 0.0;
        let mut place = DVec3::new(0.1, 0.1, 0.1);
        let mut last = place;
        let mut k = [DVec3::ZERO; 3];
        let mut exit_cell = Some(0u32);

        while past_time < 1.0 - 1e-9 {
            let outcome = advance_rk4_stage(
                &mesh,
                &velocities,
                &velocities,
                0.0,
                1.0,
                h,
                eps,
                RkState {
                    stage: &mut stage,
                    past_time: &mut past_time,
                    place_of_interest: &mut place,
                    last_position: &mut last,
                    k: &mut k,
                    exit_cell: &mut exit_cell,
                },
            );
            assert_ne!(outcome, StageOutcome::Terminated);
        }

        assert!((past_time - 1.0).abs() < 1e-6);
        assert!((last.x - 1.1).abs() < 1e-6, "x = {}", last.x);
        assert!((last.y - 0.1).abs() < 1e-6);
        assert!((last.z - 0.1).abs() < 1e-6);
    }

    /// Scenario S3: velocity (10,0,0) from (0.1,0.1,0.1) exits the tet
    /// through the face opposite the origin vertex before Δ=1 elapses.
    #[test]
    fn fast_velocity_terminates_particle_on_exit() {
        let mesh = single_tet_mesh();
        let velocities = vec![DVec3::new(10.0, 0.0, 0.0); 4];
        let eps = 1e-6;
        let h = 0.25;

        let mut stage = 0u8;
        let mut past_time = 0.0;
        let mut place = DVec3::new(0.1, 0.1, 0.1);
        let mut last = place;
        let mut k = [DVec3::ZERO; 3];
        let mut exit_cell = Some(0u32);

        let mut terminated = false;
        for _ in 0..16 {
            let outcome = advance_rk4_stage(
                &mesh,
                &velocities,
                &velocities,
                0.0,
                1.0,
                h,
                eps,
                RkState {
                    stage: &mut stage,
                    past_time: &mut past_time,
                    place_of_interest: &mut place,
                    last_position: &mut last,
                    k: &mut k,
                    exit_cell: &mut exit_cell,
                },
            );
            if outcome == StageOutcome::Terminated {
                terminated = true;
                break;
            }
        }

        assert!(terminated);
        assert!(exit_cell.is_none());
        // Exit face is x + y + z == 2 (opposite the origin vertex).
        assert!((place.x + place.y + place.z - 2.0).abs() < 1e-3);
    }
}
