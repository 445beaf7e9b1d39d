use glam::DVec3;

use crate::error::Result;

/// A tetrahedral cell: four vertex indices (connectivity) and four
/// face-adjacent neighbor cell indices (links). `-1` denotes a boundary
/// face with no neighbor. Cell index is stable for the run.
#[derive(Debug, Clone, Copy)]
pub struct Tetrahedron {
    pub connectivity: [u32; 4],
    pub links: [i32; 4],
}

impl Tetrahedron {
    /// The local vertex index opposite face `k` is `k` itself: face `k` is
    /// the triangle formed by the three vertices other than `connectivity[k]`.
    pub fn face_vertices(&self, face: usize) -> [u32; 3] {
        let mut out = [0u32; 3];
        let mut j = 0;
        for (i, v) in self.connectivity.iter().enumerate() {
            if i != face {
                out[j] = *v;
                j += 1;
            }
        }
        out
    }
}

/// Immutable, shared-across-frames mesh topology: ordered tetrahedra and
/// ordered vertex positions.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub cells: Vec<Tetrahedron>,
    pub vertices: Vec<DVec3>,
}

impl Mesh {
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Axis-aligned bounding box over all vertices.
    pub fn bounding_box(&self) -> (DVec3, DVec3) {
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for v in &self.vertices {
            min = min.min(*v);
            max = max.max(*v);
        }
        (min, max)
    }

    pub fn cell_bounding_box(&self, cell: usize) -> (DVec3, DVec3) {
        let t = &self.cells[cell];
        let mut min = DVec3::splat(f64::INFINITY);
        let mut max = DVec3::splat(f64::NEG_INFINITY);
        for v in t.connectivity {
            let p = self.vertices[v as usize];
            min = min.min(p);
            max = max.max(p);
        }
        (min, max)
    }
}

/// A time value and a vertex-velocity array, one 3D vector per vertex.
#[derive(Debug, Clone)]
pub struct Frame {
    pub time: f64,
    pub velocities: Vec<DVec3>,
}

/// External collaborator: yields connectivity, vertex positions, and
/// per-frame velocities. Connectivity and links are read once from frame 0;
/// `FlowMap` never mutates what this returns.
pub trait FrameSource {
    /// Reads the shared mesh topology and frame-0 vertex positions.
    fn load_mesh(&mut self) -> Result<Mesh>;

    /// Reads frame `index`'s time value and per-vertex velocities.
    fn load_frame(&mut self, index: usize) -> Result<Frame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tet() -> Tetrahedron {
        Tetrahedron {
            connectivity: [0, 1, 2, 3],
            links: [-1, -1, -1, -1],
        }
    }

    #[test]
    fn face_vertices_excludes_opposite_vertex() {
        let t = sample_tet();
        assert_eq!(t.face_vertices(0), [1, 2, 3]);
        assert_eq!(t.face_vertices(3), [0, 1, 2]);
    }

    #[test]
    fn bounding_box_covers_all_vertices() {
        let mesh = Mesh {
            cells: vec![sample_tet()],
            vertices: vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(2.0, 0.0, 0.0),
                DVec3::new(0.0, 2.0, 0.0),
                DVec3::new(0.0, 0.0, 2.0),
            ],
        };
        let (min, max) = mesh.bounding_box();
        assert_eq!(min, DVec3::ZERO);
        assert_eq!(max, DVec3::new(2.0, 2.0, 2.0));
    }
}
