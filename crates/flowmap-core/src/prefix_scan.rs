//! Exclusive scan and the compaction primitive built atop it (spec.md
//! §4.2), dispatched through a [`ComputeDevice`] rather than called as a
//! bare host function — this is the component `Redistributor` drives for
//! its scan steps.

use crate::device::{BufferUsage, ComputeDevice, ComputeDeviceExt, DispatchSize, KernelSource, Precision};
use crate::error::Result;

const EXCLUSIVE_SCAN_KERNEL: &str = "exclusive_scan_i32";

/// Thin orchestration over a device's scan kernel: allocate, upload, launch,
/// download, free. Device backends that only implement a subset of named
/// kernels (like the reference `cpu` backend) are exercised exactly the
/// way a real launch sequence would exercise them.
pub struct PrefixScan;

impl PrefixScan {
    /// In place exclusive scan of `values` on `device`. Returns the total
    /// sum, i.e. the value that would occupy `values[len]`.
    pub fn exclusive_scan(device: &mut impl ComputeDevice, values: &mut [i32]) -> Result<i32> {
        if values.is_empty() {
            return Ok(0);
        }
        let kernel = device.compile_kernel(KernelSource {
            name: EXCLUSIVE_SCAN_KERNEL,
            precision: Precision::Single,
        })?;
        let buffer = device.create_typed_buffer::<i32>(values.len(), BufferUsage::ReadWrite)?;
        device.write_typed(buffer, values)?;

        let work_group_size = device.max_work_group_size(kernel)?.min(values.len());
        let token = device.dispatch(
            kernel,
            DispatchSize {
                global: values.len(),
                local: work_group_size.max(1),
            },
            &[buffer],
            &[],
        )?;
        device.finish(token)?;

        let scanned: Vec<i32> = device.read_typed(buffer)?;
        let total = values.iter().sum();
        values.copy_from_slice(&scanned);
        device.destroy_buffer(buffer);
        Ok(total)
    }

    /// Compacts `predicate` into the indices where it is true, via an
    /// exclusive scan of the predicate cast to 0/1.
    pub fn compact(device: &mut impl ComputeDevice, predicate: &[bool]) -> Result<Vec<u32>> {
        let mut flags: Vec<i32> = predicate.iter().map(|&p| i32::from(p)).collect();
        Self::exclusive_scan(device, &mut flags)?;

        let mut out = vec![0u32; predicate.iter().filter(|&&p| p).count()];
        for (i, &is_set) in predicate.iter().enumerate() {
            if is_set {
                out[flags[i] as usize] = i as u32;
            }
        }
        Ok(out)
    }
}
