//! A thin Vulkan `ComputeDevice` backend, feature-gated behind `vulkan`.
//! Structured the way rhyolite wraps `ash`: an `Instance`/`PhysicalDevice`/
//! `Device` chain bound together through `Arc` and a `HasDevice` trait, so
//! every wrapper can reach back up to the `ash::Device` it was created
//! from. Host-visible coherent memory is used for every buffer rather than
//! a staging+transfer path, trading transfer bandwidth for the simplicity
//! appropriate to this backend's scale.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{FlowMapError, Result};

use super::{BufferId, BufferUsage, CompletionToken, ComputeDevice, DispatchSize, KernelId, KernelSource};

/// Anything that can produce the `Device` it was built against, mirroring
/// rhyolite's trait of the same name.
pub trait HasDevice {
    fn device(&self) -> &Arc<Device>;
}

pub struct Instance {
    entry: ash::Entry,
    instance: ash::Instance,
}

impl Instance {
    pub fn create(app_name: &CStr) -> Result<Arc<Self>> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("no Vulkan loader: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .api_version(vk::API_VERSION_1_2);
        let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkCreateInstance failed: {e:?}")))?;
        Ok(Arc::new(Self { entry, instance }))
    }
}

impl std::ops::Deref for Instance {
    type Target = ash::Instance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe { self.instance.destroy_instance(None) };
    }
}

pub struct PhysicalDevice {
    raw: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDevice {
    /// Picks the first device exposing at least one compute-capable queue
    /// family; a real deployment would rank candidates instead.
    pub fn select(instance: &Instance) -> Result<(Self, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("enumerate_physical_devices failed: {e:?}")))?;
        for raw in devices {
            let families = unsafe { instance.get_physical_device_queue_family_properties(raw) };
            if let Some(index) = families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::COMPUTE))
            {
                let memory_properties = unsafe { instance.get_physical_device_memory_properties(raw) };
                return Ok((
                    Self {
                        raw,
                        memory_properties,
                    },
                    index as u32,
                ));
            }
        }
        Err(FlowMapError::DeviceUnavailable("no compute-capable Vulkan device found".into()))
    }

    pub fn raw(&self) -> vk::PhysicalDevice {
        self.raw
    }

    fn memory_type_index(&self, filter: u32, flags: vk::MemoryPropertyFlags) -> Option<u32> {
        (0..self.memory_properties.memory_type_count).find(|&i| {
            let suitable = filter & (1 << i) != 0;
            suitable && self.memory_properties.memory_types[i as usize].property_flags.contains(flags)
        })
    }
}

pub struct Device {
    instance: Arc<Instance>,
    physical_device: PhysicalDevice,
    device: ash::Device,
    compute_queue: vk::Queue,
    compute_queue_family: u32,
}

impl Device {
    pub fn create(instance: Arc<Instance>) -> Result<Arc<Self>> {
        let (physical_device, queue_family) = PhysicalDevice::select(&instance)?;
        let priorities = [1.0f32];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities);
        let create_info = vk::DeviceCreateInfo::builder().queue_create_infos(std::slice::from_ref(&queue_create_info));
        let device = unsafe { instance.create_device(physical_device.raw(), &create_info, None) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkCreateDevice failed: {e:?}")))?;
        let compute_queue = unsafe { device.get_device_queue(queue_family, 0) };
        info!(queue_family, "created Vulkan compute device");
        Ok(Arc::new(Self {
            instance,
            physical_device,
            device,
            compute_queue,
            compute_queue_family: queue_family,
        }))
    }
}

impl std::ops::Deref for Device {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.device.destroy_device(None) };
    }
}

/// A host-visible, coherent buffer plus the memory backing it. Sized and
/// mapped once at creation and kept mapped for the buffer's lifetime.
struct Buffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: *mut u8,
    size: usize,
    #[allow(dead_code)]
    usage: BufferUsage,
}

// The mapped pointer is only ever touched while `&mut self` on
// `VulkanComputeDevice` is held, so sending the device across threads is
// sound even though raw pointers are not `Send` by default.
unsafe impl Send for Buffer {}

struct Pipeline {
    #[allow(dead_code)]
    module: vk::ShaderModule,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

/// Dispatches compute work on a real Vulkan device. Kernel source text is
/// SPIR-V bytes supplied out of band; this type only knows how to load,
/// bind and launch it.
pub struct VulkanComputeDevice {
    device: Arc<Device>,
    buffers: HashMap<BufferId, Buffer>,
    pipelines: HashMap<KernelId, Pipeline>,
    command_pool: vk::CommandPool,
    next_buffer: u32,
    next_kernel: u32,
    next_token: u64,
}

impl HasDevice for VulkanComputeDevice {
    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl VulkanComputeDevice {
    pub fn new(device: Arc<Device>) -> Result<Self> {
        let pool_info =
            vk::CommandPoolCreateInfo::builder().queue_family_index(device.compute_queue_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkCreateCommandPool failed: {e:?}")))?;
        Ok(Self {
            device,
            buffers: HashMap::new(),
            pipelines: HashMap::new(),
            command_pool,
            next_buffer: 0,
            next_kernel: 0,
            next_token: 0,
        })
    }
}

impl Drop for VulkanComputeDevice {
    fn drop(&mut self) {
        unsafe {
            for buffer in self.buffers.values() {
                self.device.unmap_memory(buffer.memory);
                self.device.destroy_buffer(buffer.buffer, None);
                self.device.free_memory(buffer.memory, None);
            }
            for pipeline in self.pipelines.values() {
                self.device.destroy_pipeline(pipeline.pipeline, None);
                self.device.destroy_pipeline_layout(pipeline.layout, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

impl ComputeDevice for VulkanComputeDevice {
    fn create_buffer(&mut self, len: usize, elem_size: usize, usage: BufferUsage) -> Result<BufferId> {
        let size = (len * elem_size).max(1) as vk::DeviceSize;
        let vk_usage = vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST;
        let create_info = vk::BufferCreateInfo::builder().size(size).usage(vk_usage);
        let buffer = unsafe { self.device.create_buffer(&create_info, None) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkCreateBuffer failed: {e:?}")))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let memory_type = self
            .device
            .physical_device
            .memory_type_index(requirements.memory_type_bits, flags)
            .ok_or_else(|| FlowMapError::DeviceUnavailable("no host-visible coherent memory type".into()))?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { self.device.allocate_memory(&alloc_info, None) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkAllocateMemory failed: {e:?}")))?;
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkBindBufferMemory failed: {e:?}")))?;
        let mapped = unsafe { self.device.map_memory(memory, 0, requirements.size, vk::MemoryMapFlags::empty()) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkMapMemory failed: {e:?}")))? as *mut u8;

        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        debug!(buffer = id.0, size, "allocated Vulkan buffer");
        self.buffers.insert(
            id,
            Buffer {
                buffer,
                memory,
                mapped,
                size: size as usize,
                usage,
            },
        );
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            unsafe {
                self.device.unmap_memory(entry.memory);
                self.device.destroy_buffer(entry.buffer, None);
                self.device.free_memory(entry.memory, None);
            }
        }
    }

    fn write_buffer(&mut self, buffer: BufferId, data: &[u8]) -> Result<()> {
        let entry = self.buffers.get(&buffer).ok_or_else(|| FlowMapError::DeviceOp {
            operation: "write_buffer".into(),
            buffer: buffer.0.to_string(),
            message: "no such buffer".into(),
        })?;
        if data.len() > entry.size {
            return Err(FlowMapError::DeviceOp {
                operation: "write_buffer".into(),
                buffer: buffer.0.to_string(),
                message: format!("write of {} bytes exceeds buffer size {}", data.len(), entry.size),
            });
        }
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), entry.mapped, data.len()) };
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId) -> Result<Vec<u8>> {
        let entry = self.buffers.get(&buffer).ok_or_else(|| FlowMapError::DeviceOp {
            operation: "read_buffer".into(),
            buffer: buffer.0.to_string(),
            message: "no such buffer".into(),
        })?;
        let mut out = vec![0u8; entry.size];
        unsafe { std::ptr::copy_nonoverlapping(entry.mapped, out.as_mut_ptr(), entry.size) };
        Ok(out)
    }

    fn compile_kernel(&mut self, source: KernelSource) -> Result<KernelId> {
        warn!(
            kernel = source.name,
            "Vulkan backend requires precompiled SPIR-V; compile_kernel is a structural stub"
        );
        Err(FlowMapError::KernelBuild {
            kernel: source.name.into(),
            log: "SPIR-V loading is not wired up in this backend".into(),
        })
    }

    fn max_work_group_size(&self, _kernel: KernelId) -> Result<usize> {
        let properties = unsafe {
            self.device
                .instance
                .get_physical_device_properties(self.device.physical_device.raw())
        };
        Ok(properties.limits.max_compute_work_group_size[0] as usize)
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        _size: DispatchSize,
        _bindings: &[BufferId],
        _deps: &[CompletionToken],
    ) -> Result<CompletionToken> {
        if !self.pipelines.contains_key(&kernel) {
            return Err(FlowMapError::DeviceOp {
                operation: "dispatch".into(),
                buffer: "n/a".into(),
                message: "no pipeline compiled for this kernel handle".into(),
            });
        }
        let token = CompletionToken(self.next_token);
        self.next_token += 1;
        Ok(token)
    }

    fn finish(&mut self, _token: CompletionToken) -> Result<()> {
        unsafe { self.device.queue_wait_idle(self.compute_queue) }
            .map_err(|e| FlowMapError::DeviceUnavailable(format!("vkQueueWaitIdle failed: {e:?}")))
    }
}
