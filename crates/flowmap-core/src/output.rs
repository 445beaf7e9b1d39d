//! Final-positions file writer (spec.md §6).

use std::io::Write;

use glam::DVec3;

use crate::error::Result;
use crate::seed_locator::SeedLocation;

/// A seed's final recorded position, in lattice order. Terminated
/// particles carry their last recorded position, not the exit point —
/// distinct from the debug dump's containing-cell record.
pub struct FinalPosition {
    pub grid_index: (u32, u32, u32),
    pub position: DVec3,
}

/// Writes one line per seed lattice point, in lattice order:
/// `<x> <y> <z>: <px> <py> <pz>`. Seeds that were never located (outside
/// the mesh) emit their own lattice coordinates as the final position.
pub fn write_final_positions(
    locations: &[SeedLocation],
    final_positions: &std::collections::HashMap<(u32, u32, u32), DVec3>,
    writer: &mut impl Write,
) -> Result<()> {
    for loc in locations {
        let final_position = final_positions
            .get(&loc.point.grid_index)
            .copied()
            .unwrap_or(loc.point.position);
        let p = loc.point.position;
        writeln!(
            writer,
            "{} {} {}: {} {} {}",
            p.x, p.y, p.z, final_position.x, final_position.y, final_position.z
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::seed_locate::LatticePoint;
    use std::collections::HashMap;

    #[test]
    fn located_seed_emits_final_position() {
        let locations = vec![SeedLocation {
            point: LatticePoint {
                grid_index: (0, 0, 0),
                position: DVec3::new(0.1, 0.1, 0.1),
            },
            exit_cell: Some(0),
        }];
        let mut finals = HashMap::new();
        finals.insert((0, 0, 0), DVec3::new(1.1, 0.1, 0.1));

        let mut buffer = Vec::new();
        write_final_positions(&locations, &finals, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "0.1 0.1 0.1: 1.1 0.1 0.1\n");
    }

    #[test]
    fn unlocated_seed_emits_its_own_coordinates() {
        let locations = vec![SeedLocation {
            point: LatticePoint {
                grid_index: (1, 0, 0),
                position: DVec3::new(-5.0, -5.0, -5.0),
            },
            exit_cell: None,
        }];
        let mut buffer = Vec::new();
        write_final_positions(&locations, &HashMap::new(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "-5 -5 -5: -5 -5 -5\n");
    }
}
