//! The `ComputeDevice` façade: the thin capability surface every other
//! component dispatches through. Buffer allocation, host↔device copy,
//! kernel compile/launch and completion tokens live here; everything else
//! in this crate is written against the [`ComputeDevice`] trait, never
//! against a concrete backend.

pub mod cpu;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use crate::error::Result;

/// Precision binding injected into kernel source at compile time (spec.md
/// §4.1, §9 "Double vs single precision"). Kernel source is kept free of
/// precision-specific literals; a real backend textually aliases the
/// double-precision type to single when `Single` is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

/// How a buffer will be accessed by dispatched kernels. Mirrors the
/// read/write/read-write distinction rhyolite's buffer layer exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Opaque device buffer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Opaque compiled-kernel handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KernelId(pub u32);

/// A token returned by a dispatch, usable as a dependency for a later
/// dispatch. The device need not guarantee in-order execution; ordering
/// between two operations is only guaranteed when one's token is passed as
/// a dependency of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionToken(pub u64);

/// Named kernel source. The device-side math a kernel performs is owned by
/// whatever compute backend runs it; this crate only ever asks for a
/// kernel by name and the precision it should be compiled for.
#[derive(Debug, Clone, Copy)]
pub struct KernelSource {
    pub name: &'static str,
    pub precision: Precision,
}

/// The 1D dispatch shape: total thread count and threads per work group.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSize {
    pub global: usize,
    pub local: usize,
}

/// Abstracts buffer creation, host↔device copy, kernel compile/launch and
/// event-ordered completion. Every dispatch may return a completion token
/// used to order later dispatches.
pub trait ComputeDevice {
    /// Allocates a buffer of `len` elements of size `elem_size` bytes.
    fn create_buffer(&mut self, len: usize, elem_size: usize, usage: BufferUsage) -> Result<BufferId>;

    /// Frees a previously allocated buffer. No-op on handles already freed.
    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Enqueues a host→device copy. `data` is reinterpreted as raw bytes.
    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()>;

    /// Enqueues a device→host copy, blocking until the data is available.
    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>>;

    /// Compiles a kernel from its named source, producing a reusable handle.
    fn compile_kernel(&mut self, source: KernelSource) -> Result<KernelId>;

    /// The maximum work-group size the device supports for `kernel`.
    fn max_work_group_size(&self, kernel: KernelId) -> Result<usize>;

    /// Dispatches a 1D NDRange. `bindings` lists the buffers the kernel
    /// reads/writes, in the kernel's argument order. `deps` are completion
    /// tokens of operations that must finish before this dispatch starts.
    fn dispatch(
        &mut self,
        kernel: KernelId,
        size: DispatchSize,
        bindings: &[BufferId],
        deps: &[CompletionToken],
    ) -> Result<CompletionToken>;

    /// Blocks until `token`'s operation (and its transitive dependencies)
    /// have completed. Used at host-visible barriers (spec.md §5).
    fn finish(&mut self, token: CompletionToken) -> Result<()>;
}

/// Typed convenience helpers layered over the byte-oriented trait methods,
/// implemented for every `T: ComputeDevice` via blanket impl so callers
/// never have to reach for `bytemuck` themselves.
pub trait ComputeDeviceExt: ComputeDevice {
    fn create_typed_buffer<T: bytemuck::Pod>(
        &mut self,
        len: usize,
        usage: BufferUsage,
    ) -> Result<BufferId> {
        self.create_buffer(len, std::mem::size_of::<T>(), usage)
    }

    fn write_typed(&mut self, buffer: BufferId, data: &[impl bytemuck::Pod]) -> Result<()> {
        self.write_buffer(buffer, bytemuck::cast_slice(data))
    }

    fn read_typed<T: bytemuck::Pod + Default + Clone>(&mut self, buffer: BufferId) -> Result<Vec<T>> {
        let bytes = self.read_buffer(buffer)?;
        Ok(bytemuck::cast_slice(&bytes).to_vec())
    }
}

impl<D: ComputeDevice + ?Sized> ComputeDeviceExt for D {}
