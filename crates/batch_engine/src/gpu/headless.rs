//! Headless recording device
//!
//! Performs no GPU work. Every call is validated and appended to a command
//! log, and indirect draws are decoded back out of the indirect buffer so the
//! bytes the CPU wrote can be inspected exactly as a GPU would read them.
//!
//! Two ordering mistakes are detected and counted as hazards:
//!
//! - an indirect draw issued after a compute dispatch without a barrier that
//!   makes shader writes visible to vertex fetch
//! - an indirect draw reading a buffer that has unflushed non-coherent writes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{
    BarrierFlags, Buffer, BufferId, BufferTarget, DeviceLimits, DrawElementsIndirectCommand, Fence,
    GpuDevice, GpuError, GpuResult, ProgramId, Texture, TextureDescriptor, TextureHandle, TextureId,
};

/// One call recorded by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Indexed buffer binding
    BindBuffer {
        /// Binding target
        target: BufferTarget,
        /// Binding index
        binding: u32,
        /// Bound buffer
        buffer: BufferId,
    },
    /// Vertex/index source selection
    BindVertexSource {
        /// Vertex buffer
        vertices: BufferId,
        /// Vertex stride in bytes
        stride: u32,
        /// Index buffer, if any
        indices: Option<BufferId>,
    },
    /// Program change
    UseProgram(ProgramId),
    /// `uvec4` uniform upload
    UniformUvec4 {
        /// Uniform location
        location: u32,
        /// Value
        value: [u32; 4],
    },
    /// `float` uniform upload
    UniformF32 {
        /// Uniform location
        location: u32,
        /// Value
        value: f32,
    },
    /// Compute dispatch
    Dispatch {
        /// Work groups in X
        x: u32,
        /// Work groups in Y
        y: u32,
        /// Work groups in Z
        z: u32,
    },
    /// Memory barrier
    Barrier(BarrierFlags),
    /// Multi-draw-indirect with the commands decoded from the buffer
    MultiDrawElementsIndirect {
        /// Indirect buffer
        buffer: BufferId,
        /// Byte offset of the first command
        offset: usize,
        /// Decoded commands
        commands: Vec<DrawElementsIndirectCommand>,
    },
    /// Direct indexed draw
    DrawElements {
        /// Index count
        count: u32,
    },
    /// Direct non-indexed draw
    DrawArrays {
        /// First vertex
        first: u32,
        /// Vertex count
        count: u32,
    },
    /// Fence insertion
    FenceSync(u64),
    /// Command submission
    Flush,
}

/// Device that records commands instead of executing them
#[derive(Debug)]
pub struct HeadlessDevice {
    limits: DeviceLimits,
    next_buffer: u32,
    next_texture: u32,
    next_fence: u64,
    commands: Vec<RecordedCommand>,
    pending_fences: Vec<Arc<AtomicBool>>,
    unordered_compute: bool,
    hazards: usize,
}

impl HeadlessDevice {
    /// Create a device reporting `limits`
    pub fn new(limits: DeviceLimits) -> Self {
        log::info!(
            "Headless device created (uniform offset alignment {} bytes)",
            limits.uniform_buffer_offset_alignment
        );
        Self {
            limits,
            next_buffer: 1,
            next_texture: 1,
            next_fence: 1,
            commands: Vec::new(),
            pending_fences: Vec::new(),
            unordered_compute: false,
            hazards: 0,
        }
    }

    /// Every command recorded since creation or the last [`Self::take_commands`]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Drain the command log
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of ordering hazards detected so far
    pub const fn hazards(&self) -> usize {
        self.hazards
    }

    /// Decoded indirect draws, in submission order
    pub fn indirect_draws(&self) -> impl Iterator<Item = &[DrawElementsIndirectCommand]> {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::MultiDrawElementsIndirect { commands, .. } => Some(commands.as_slice()),
            _ => None,
        })
    }

    /// Recorded dispatches as `(x, y, z)`
    pub fn dispatches(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.commands.iter().filter_map(|command| match command {
            RecordedCommand::Dispatch { x, y, z } => Some((*x, *y, *z)),
            _ => None,
        })
    }

    fn hazard(&mut self, message: &str) {
        self.hazards += 1;
        log::warn!("GPU hazard: {}", message);
    }
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(DeviceLimits::default())
    }
}

impl GpuDevice for HeadlessDevice {
    fn name(&self) -> &str {
        "Headless"
    }

    fn limits(&self) -> &DeviceLimits {
        &self.limits
    }

    fn create_buffer(&mut self, label: &str) -> Buffer {
        let id = BufferId(self.next_buffer);
        self.next_buffer += 1;
        log::trace!("Headless: creating buffer '{}' as {:?}", label, id);
        Buffer::new(id, label)
    }

    fn create_texture(&mut self, descriptor: &TextureDescriptor, rgba8: &[u8]) -> GpuResult<Texture> {
        let max = self.limits.max_texture_size;
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.width > max || descriptor.height > max {
            return Err(GpuError::InvalidUsage(format!(
                "texture '{}' has unsupported size {}x{}",
                descriptor.label, descriptor.width, descriptor.height
            )));
        }
        let expected = descriptor.width as usize * descriptor.height as usize * 4;
        if rgba8.len() != expected {
            return Err(GpuError::OutOfRange {
                offset: 0,
                len: rgba8.len(),
                size: expected,
            });
        }

        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        log::trace!(
            "Headless: creating texture '{}' ({}x{}, {} levels)",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.level_count()
        );
        Ok(Texture::new(id, descriptor.clone()))
    }

    fn make_texture_resident(&mut self, texture: &mut Texture) -> GpuResult<TextureHandle> {
        if let Some(handle) = texture.handle() {
            return Ok(handle);
        }
        let handle = TextureHandle(0x1_0000_0000 | u64::from(texture.id().0));
        texture.set_handle(handle);
        Ok(handle)
    }

    fn bind_buffer(&mut self, target: BufferTarget, binding: u32, buffer: &Buffer) -> GpuResult<()> {
        if !buffer.is_initialized() {
            return Err(GpuError::Uninitialized(buffer.id()));
        }
        self.commands.push(RecordedCommand::BindBuffer {
            target,
            binding,
            buffer: buffer.id(),
        });
        Ok(())
    }

    fn bind_vertex_source(&mut self, vertices: &Buffer, stride: u32, indices: Option<&Buffer>) -> GpuResult<()> {
        if !vertices.is_initialized() {
            return Err(GpuError::Uninitialized(vertices.id()));
        }
        self.commands.push(RecordedCommand::BindVertexSource {
            vertices: vertices.id(),
            stride,
            indices: indices.map(Buffer::id),
        });
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) {
        self.commands.push(RecordedCommand::UseProgram(program));
    }

    fn set_uniform_uvec4(&mut self, location: u32, value: [u32; 4]) {
        self.commands.push(RecordedCommand::UniformUvec4 { location, value });
    }

    fn set_uniform_f32(&mut self, location: u32, value: f32) {
        self.commands.push(RecordedCommand::UniformF32 { location, value });
    }

    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> GpuResult<()> {
        let max = self.limits.max_compute_work_group_count;
        if x > max || y > max || z > max {
            return Err(GpuError::InvalidUsage(format!(
                "dispatch {x}x{y}x{z} exceeds work group limit {max}"
            )));
        }
        self.commands.push(RecordedCommand::Dispatch { x, y, z });
        self.unordered_compute = true;
        Ok(())
    }

    fn memory_barrier(&mut self, barriers: BarrierFlags) {
        if barriers.intersects(BarrierFlags::VERTEX_ATTRIB_ARRAY | BarrierFlags::SHADER_STORAGE) {
            self.unordered_compute = false;
        }
        self.commands.push(RecordedCommand::Barrier(barriers));
    }

    fn multi_draw_elements_indirect(
        &mut self,
        indirect: &Buffer,
        offset: usize,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()> {
        let record = std::mem::size_of::<DrawElementsIndirectCommand>();
        let stride = if stride == 0 { record } else { stride as usize };
        let contents = indirect.contents();

        let mut commands = Vec::with_capacity(draw_count as usize);
        for i in 0..draw_count as usize {
            let start = offset + i * stride;
            let bytes = contents.get(start..start + record).ok_or(GpuError::OutOfRange {
                offset: start,
                len: record,
                size: contents.len(),
            })?;
            commands.push(bytemuck::pod_read_unaligned(bytes));
        }

        if self.unordered_compute {
            self.hazard("indirect draw issued after compute dispatch without a memory barrier");
        }
        if indirect.has_pending_writes() {
            self.hazard("indirect draw reads unflushed non-coherent writes");
        }

        self.commands.push(RecordedCommand::MultiDrawElementsIndirect {
            buffer: indirect.id(),
            offset,
            commands,
        });
        Ok(())
    }

    fn draw_elements(&mut self, count: u32) -> GpuResult<()> {
        self.commands.push(RecordedCommand::DrawElements { count });
        Ok(())
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> GpuResult<()> {
        self.commands.push(RecordedCommand::DrawArrays { first, count });
        Ok(())
    }

    fn fence_sync(&mut self) -> Fence {
        let id = self.next_fence;
        self.next_fence += 1;
        let signalled = Arc::new(AtomicBool::new(false));
        self.pending_fences.push(Arc::clone(&signalled));
        self.commands.push(RecordedCommand::FenceSync(id));
        Fence::new(id, signalled)
    }

    fn flush(&mut self) {
        for fence in self.pending_fences.drain(..) {
            fence.store(true, Ordering::Release);
        }
        self.commands.push(RecordedCommand::Flush);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{BufferUsage, MapAccess};
    use std::time::Duration;

    fn indirect_buffer(device: &mut HeadlessDevice, commands: &[DrawElementsIndirectCommand]) -> Buffer {
        device
            .create_buffer_with(
                "indirect",
                std::mem::size_of_val(commands),
                Some(bytemuck::cast_slice(commands)),
                BufferUsage::DYNAMIC,
            )
            .unwrap()
    }

    #[test]
    fn test_indirect_draw_decodes_buffer() {
        let mut device = HeadlessDevice::default();
        let written = [
            DrawElementsIndirectCommand {
                count: 6,
                instance_count: 1,
                first_index: 3,
                base_vertex: 10,
                base_instance: 2,
            },
            DrawElementsIndirectCommand {
                count: 3,
                instance_count: 1,
                first_index: 9,
                base_vertex: 10,
                base_instance: 2,
            },
        ];
        let buffer = indirect_buffer(&mut device, &written);

        device.multi_draw_elements_indirect(&buffer, 0, 2, 0).unwrap();
        let draws: Vec<_> = device.indirect_draws().collect();
        assert_eq!(draws, vec![&written[..]]);
        assert_eq!(device.hazards(), 0);

        assert!(device.multi_draw_elements_indirect(&buffer, 0, 3, 0).is_err());
    }

    #[test]
    fn test_missing_barrier_is_a_hazard() {
        let mut device = HeadlessDevice::default();
        let buffer = indirect_buffer(&mut device, &[DrawElementsIndirectCommand::default()]);

        device.dispatch_compute(4, 1, 1).unwrap();
        device.multi_draw_elements_indirect(&buffer, 0, 1, 0).unwrap();
        assert_eq!(device.hazards(), 1);

        device.dispatch_compute(4, 1, 1).unwrap();
        device.memory_barrier(BarrierFlags::skinning_to_draw());
        device.multi_draw_elements_indirect(&buffer, 0, 1, 0).unwrap();
        assert_eq!(device.hazards(), 1);
    }

    #[test]
    fn test_unflushed_writes_are_a_hazard() {
        let mut device = HeadlessDevice::default();
        let mut buffer = device
            .create_buffer_with("indirect", 20, None, BufferUsage::WRITE | BufferUsage::PERSISTENT)
            .unwrap();
        buffer
            .map(MapAccess::WRITE | MapAccess::PERSISTENT, 0, None)
            .unwrap()
            .write_pod(&DrawElementsIndirectCommand::default(), 0)
            .unwrap();

        device.multi_draw_elements_indirect(&buffer, 0, 1, 0).unwrap();
        assert_eq!(device.hazards(), 1);
    }

    #[test]
    fn test_dispatch_limit() {
        let mut device = HeadlessDevice::default();
        assert!(device.dispatch_compute(70_000, 1, 1).is_err());
    }

    #[test]
    fn test_fences_signal_on_flush() {
        let mut device = HeadlessDevice::default();
        let mut fence = device.fence_sync();
        assert!(!fence.is_signalled());
        assert!(!fence.wait(Duration::from_millis(1)));

        assert!(device.client_wait(&fence, Duration::from_millis(10)));

        fence.reset(&mut device);
        assert!(!fence.is_signalled());
        device.flush();
        assert!(fence.is_signalled());
    }

    #[test]
    fn test_resident_handles_are_stable() {
        let mut device = HeadlessDevice::default();
        let pixels = vec![255u8; 2 * 2 * 4];
        let mut texture = device
            .create_texture(&TextureDescriptor::mipmapped("t", 2, 2), &pixels)
            .unwrap();
        let first = device.make_texture_resident(&mut texture).unwrap();
        let second = device.make_texture_resident(&mut texture).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(device.create_texture(&TextureDescriptor::mipmapped("bad", 2, 2), &pixels[..4]).is_err());
    }
}
