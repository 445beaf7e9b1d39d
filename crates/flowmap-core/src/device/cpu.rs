//! Reference `ComputeDevice` backend: executes kernels in-process instead
//! of on a GPU. Buffers are plain byte vectors; kernels are named entries
//! in a small dispatch table rather than compiled from source text, since
//! this backend's entire point is to make the rest of the crate runnable
//! and testable without a GPU (spec.md §1's "hardware interaction" is kept
//! external).

use std::collections::HashMap;

use tracing::trace;

use crate::error::{FlowMapError, Result};
use crate::kernels::scan::exclusive_scan;

use super::{BufferId, BufferUsage, CompletionToken, ComputeDevice, DispatchSize, KernelId, KernelSource};

struct Buffer {
    bytes: Vec<u8>,
    usage: BufferUsage,
}

/// The exclusive-scan kernel this backend understands: one `ReadWrite`
/// i32 buffer, scanned in place (mirrors `kernels::scan::exclusive_scan`).
const KERNEL_EXCLUSIVE_SCAN: &str = "exclusive_scan_i32";

/// An in-process `ComputeDevice` that runs every dispatch synchronously on
/// the calling thread. Completion tokens are issued but never actually
/// ordering anything, since there is no asynchrony to order.
pub struct CpuComputeDevice {
    buffers: HashMap<BufferId, Buffer>,
    kernels: HashMap<KernelId, KernelSource>,
    next_buffer: u32,
    next_kernel: u32,
    next_token: u64,
}

impl Default for CpuComputeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuComputeDevice {
    pub fn new() -> Self {
        Self {
            buffers: HashMap::new(),
            kernels: HashMap::new(),
            next_buffer: 0,
            next_kernel: 0,
            next_token: 0,
        }
    }

    fn issue_token(&mut self) -> CompletionToken {
        let token = CompletionToken(self.next_token);
        self.next_token += 1;
        token
    }
}

impl ComputeDevice for CpuComputeDevice {
    fn create_buffer(&mut self, len: usize, elem_size: usize, usage: BufferUsage) -> Result<BufferId> {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            Buffer {
                bytes: vec![0u8; len * elem_size],
                usage,
            },
        );
        trace!(buffer = id.0, len, elem_size, "allocated cpu buffer");
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let entry = self.buffers.get_mut(&buffer).ok_or_else(|| FlowMapError::DeviceOp {
            operation: "write_buffer".into(),
            buffer: buffer.0.to_string(),
            message: "no such buffer".into(),
        })?;
        if entry.bytes.len() != data.len() {
            return Err(FlowMapError::DeviceOp {
                operation: "write_buffer".into(),
                buffer: buffer.0.to_string(),
                message: format!("size mismatch: buffer is {} bytes, write is {}", entry.bytes.len(), data.len()),
            });
        }
        entry.bytes.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>> {
        self.buffers
            .get(&buffer)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| FlowMapError::DeviceOp {
                operation: "read_buffer".into(),
                buffer: buffer.0.to_string(),
                message: "no such buffer".into(),
            })
    }

    fn compile_kernel(&mut self, source: KernelSource) -> Result<KernelId> {
        if source.name != KERNEL_EXCLUSIVE_SCAN {
            return Err(FlowMapError::KernelBuild {
                kernel: source.name.into(),
                log: "cpu backend has no built-in implementation of this kernel".into(),
            });
        }
        let id = KernelId(self.next_kernel);
        self.next_kernel += 1;
        self.kernels.insert(id, source);
        Ok(id)
    }

    fn max_work_group_size(&self, _kernel: KernelId) -> Result<usize> {
        // No real work-group concept on the host; a generous constant
        // keeps callers' work-group-size arithmetic exercised in tests.
        Ok(256)
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        _size: DispatchSize,
        bindings: &[BufferId],
        _deps: &[CompletionToken],
    ) -> Result<CompletionToken> {
        let source = *self.kernels.get(&kernel).ok_or_else(|| FlowMapError::DeviceOp {
            operation: "dispatch".into(),
            buffer: "n/a".into(),
            message: "unknown kernel handle".into(),
        })?;

        match source.name {
            KERNEL_EXCLUSIVE_SCAN => {
                let &[data_buffer] = bindings else {
                    return Err(FlowMapError::DeviceOp {
                        operation: "dispatch".into(),
                        buffer: "n/a".into(),
                        message: format!("{KERNEL_EXCLUSIVE_SCAN} expects exactly one binding"),
                    });
                };
                let entry = self.buffers.get_mut(&data_buffer).ok_or_else(|| FlowMapError::DeviceOp {
                    operation: "dispatch".into(),
                    buffer: data_buffer.0.to_string(),
                    message: "no such buffer".into(),
                })?;
                let values: &mut [i32] = bytemuck::cast_slice_mut(&mut entry.bytes);
                exclusive_scan(values);
            }
            other => {
                return Err(FlowMapError::DeviceOp {
                    operation: "dispatch".into(),
                    buffer: "n/a".into(),
                    message: format!("no dispatch handler registered for kernel '{other}'"),
                })
            }
        }

        Ok(self.issue_token())
    }

    fn finish(&mut self, _token: CompletionToken) -> Result<()> {
        Ok(())
    }
}
