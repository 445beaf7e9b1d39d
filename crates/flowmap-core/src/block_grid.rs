use std::collections::BTreeMap;

use glam::DVec3;

use crate::mesh::Mesh;

/// Per-interesting-block local topology (spec.md §3 `BlockRecord`).
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub global_cells: Vec<u32>,
    pub global_points: Vec<u32>,
    pub local_connectivity: Vec<[i32; 4]>,
    pub local_links: Vec<[i32; 4]>,
    pub fits_in_scratch: bool,
    /// Start offset of this block's points in the small-and-big combined
    /// flat layout kernels use to load scratchpad data.
    pub combined_point_offset: u32,
}

/// Inverse index: for tetrahedron `t`, the contiguous range in
/// `entries` of `(block_id, local_cell_id)` pairs it belongs to.
#[derive(Debug, Clone, Default)]
pub struct TetBlockMap {
    start_offsets: Vec<u32>,
    entries: Vec<(u32, u32)>,
}

impl TetBlockMap {
    pub fn entries_for(&self, cell: usize) -> &[(u32, u32)] {
        let start = self.start_offsets[cell] as usize;
        let end = self.start_offsets[cell + 1] as usize;
        &self.entries[start..end]
    }
}

/// The block lattice over the mesh's bounding box, its per-block local
/// topology, and the big/small classification (spec.md §4.4).
pub struct BlockGrid {
    pub origin: DVec3,
    pub block_size: f64,
    pub dims: (u32, u32, u32),
    pub blocks: BTreeMap<u32, BlockRecord>,
    /// Flat ids of blocks whose footprint exceeds the scratchpad budget,
    /// in ascending order; index into this is the big-only offset array.
    pub big_blocks: Vec<u32>,
    pub big_point_offsets: Vec<u32>,
    tet_block_map: TetBlockMap,
}

/// On-device footprint model for a block: positions once, two velocity
/// snapshots, plus topology, sized for the configured element width.
fn block_footprint_bytes(record_points: usize, record_cells: usize, vec3_bytes: usize) -> usize {
    let positions = record_points * vec3_bytes;
    let velocities = 2 * record_points * vec3_bytes;
    let connectivity = record_cells * 4 * std::mem::size_of::<i32>();
    let links = record_cells * 4 * std::mem::size_of::<i32>();
    positions + velocities + connectivity + links
}

impl BlockGrid {
    pub fn tet_block_map(&self) -> &TetBlockMap {
        &self.tet_block_map
    }

    pub fn block_id_of(&self, position: DVec3) -> Option<u32> {
        let rel = (position - self.origin) / self.block_size;
        if rel.x < 0.0 || rel.y < 0.0 || rel.z < 0.0 {
            return None;
        }
        let (bx, by, bz) = (rel.x as u32, rel.y as u32, rel.z as u32);
        let (nx, ny, nz) = self.dims;
        if bx >= nx || by >= ny || bz >= nz {
            return None;
        }
        Some(bx * ny * nz + by * nz + bz)
    }

    pub fn block_bounds(&self, flat_id: u32) -> (DVec3, DVec3) {
        let (_, ny, nz) = self.dims;
        let bz = flat_id % nz;
        let by = (flat_id / nz) % ny;
        let bx = flat_id / (ny * nz);
        let min = self.origin + DVec3::new(bx as f64, by as f64, bz as f64) * self.block_size;
        (min, min + DVec3::splat(self.block_size))
    }

    /// Builds the block lattice, per-block local topology, and big/small
    /// classification for `mesh`. `vec3_bytes` is 24 for double precision,
    /// 12 for single (spec.md §6 `useDouble`).
    pub fn build(
        mesh: &Mesh,
        block_size: f64,
        intersection_eps: f64,
        scratch_budget_bytes: usize,
        vec3_bytes: usize,
    ) -> Self {
        let (min, max) = mesh.bounding_box();
        let dims = (
            (((max.x - min.x) / block_size).ceil() as u32).max(1),
            (((max.y - min.y) / block_size).ceil() as u32).max(1),
            (((max.z - min.z) / block_size).ceil() as u32).max(1),
        );

        // global_cells per interesting block, insertion-ordered.
        let mut block_cells: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        // For TetBlockMap: per cell, the (block_id, local_cell_id) pairs.
        let mut per_cell_entries: Vec<Vec<(u32, u32)>> = vec![Vec::new(); mesh.num_cells()];

        for intersection in
            crate::tet_block_intersection::find_intersections(mesh, min, block_size, dims, intersection_eps)
        {
            block_cells
                .entry(intersection.block)
                .or_default()
                .push(intersection.cell);
        }

        let mut blocks = BTreeMap::new();
        let mut combined_offset = 0u32;
        for (&flat, cells) in block_cells.iter() {
            let mut global_points = Vec::new();
            let mut point_local_index: BTreeMap<u32, i32> = BTreeMap::new();
            let mut local_connectivity = Vec::with_capacity(cells.len());

            for (local_cell_id, &global_cell) in cells.iter().enumerate() {
                let conn = mesh.cells[global_cell as usize].connectivity;
                let mut local_conn = [-1i32; 4];
                for k in 0..4 {
                    let gp = conn[k];
                    let local = *point_local_index.entry(gp).or_insert_with(|| {
                        let idx = global_points.len() as i32;
                        global_points.push(gp);
                        idx
                    });
                    local_conn[k] = local;
                }
                local_connectivity.push(local_conn);
                per_cell_entries[global_cell as usize].push((flat, local_cell_id as u32));
            }

            let cell_local_index: BTreeMap<u32, usize> = cells
                .iter()
                .enumerate()
                .map(|(i, &c)| (c, i))
                .collect();
            let mut local_links = Vec::with_capacity(cells.len());
            for &global_cell in cells.iter() {
                let links = mesh.cells[global_cell as usize].links;
                let mut local_link = [-1i32; 4];
                for k in 0..4 {
                    if links[k] >= 0 {
                        if let Some(&local) = cell_local_index.get(&(links[k] as u32)) {
                            local_link[k] = local as i32;
                        }
                    }
                }
                local_links.push(local_link);
            }

            let footprint = block_footprint_bytes(global_points.len(), cells.len(), vec3_bytes);
            let fits_in_scratch = footprint <= scratch_budget_bytes;

            blocks.insert(
                flat,
                BlockRecord {
                    global_cells: cells.clone(),
                    global_points,
                    local_connectivity,
                    local_links,
                    fits_in_scratch,
                    combined_point_offset: combined_offset,
                },
            );
            combined_offset += blocks[&flat].global_points.len() as u32;
        }

        let big_blocks: Vec<u32> = blocks
            .iter()
            .filter(|(_, r)| !r.fits_in_scratch)
            .map(|(&id, _)| id)
            .collect();
        let mut big_point_offsets = Vec::with_capacity(big_blocks.len());
        let mut offset = 0u32;
        for &id in &big_blocks {
            big_point_offsets.push(offset);
            offset += blocks[&id].global_points.len() as u32;
        }

        let mut start_offsets = vec![0u32; mesh.num_cells() + 1];
        let mut entries = Vec::new();
        for (cell_idx, cell_entries) in per_cell_entries.into_iter().enumerate() {
            start_offsets[cell_idx] = entries.len() as u32;
            entries.extend(cell_entries);
        }
        start_offsets[mesh.num_cells()] = entries.len() as u32;

        Self {
            origin: min,
            block_size,
            dims,
            blocks,
            big_blocks,
            big_point_offsets,
            tet_block_map: TetBlockMap {
                start_offsets,
                entries,
            },
        }
    }
}
