//! # GPU Resource Layer
//!
//! The thin seam between the batching pipeline and a graphics API. Everything
//! above this module talks to a [`GpuDevice`]; only device implementations know
//! how commands reach hardware.
//!
//! ## Contents
//!
//! - [`Buffer`] / [`Mapping`]: immutable-size storage with explicit,
//!   ownership-tracked host mappings (transient or persistent)
//! - [`Texture`] / [`TextureHandle`]: 2D textures and their bindless handles
//! - [`DrawElementsIndirectCommand`]: the GPU-read draw record
//! - [`Fence`]: completion polling
//! - [`HeadlessDevice`]: a recording device used by tests and the demo viewer
//!
//! ## Runtime limits
//!
//! Alignment requirements such as the uniform-buffer offset alignment are
//! queried from the device through [`GpuDevice::limits`] and never hardcoded.

pub mod buffer;
pub mod commands;
pub mod fence;
pub mod headless;
pub mod texture;

pub use buffer::{Buffer, BufferUsage, MapAccess, Mapping, MappingCursor, MappingKind};
pub use commands::{DrawElementsIndirectCommand, DRAW_ELEMENTS_STRIDE};
pub use fence::Fence;
pub use headless::{HeadlessDevice, RecordedCommand};
pub use texture::{Filter, Texture, TextureDescriptor, TextureHandle, TextureHandleSet};

use bitflags::bitflags;

/// Result type for GPU resource operations
pub type GpuResult<T> = Result<T, GpuError>;

/// Errors raised by misuse of GPU resources
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// Mapping a buffer that already has a live mapping
    #[error("Buffer {0:?} is already mapped")]
    AlreadyMapped(BufferId),

    /// Requesting the mapping of a buffer that is not persistently mapped
    #[error("Buffer {0:?} is not mapped")]
    NotMapped(BufferId),

    /// Allocating storage twice
    #[error("Buffer {0:?} storage is already initialized")]
    AlreadyInitialized(BufferId),

    /// Using a buffer before its storage exists
    #[error("Buffer {0:?} has no storage")]
    Uninitialized(BufferId),

    /// Access outside a mapped range or buffer
    #[error("Access of {len} bytes at offset {offset} exceeds size {size}")]
    OutOfRange {
        /// Requested offset
        offset: usize,
        /// Requested length
        len: usize,
        /// Size of the mapped range or buffer
        size: usize,
    },

    /// Any other invalid call
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),
}

/// Buffer object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferId(pub u32);

/// Texture object name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u32);

/// Linked shader program name (compilation happens outside this crate)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgramId(pub u32);

/// Implementation limits queried from the driver at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of uniform-buffer binding offsets, in bytes
    pub uniform_buffer_offset_alignment: usize,
    /// Maximum work groups in one compute dispatch dimension
    pub max_compute_work_group_count: u32,
    /// Maximum texture width/height
    pub max_texture_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            uniform_buffer_offset_alignment: 256,
            max_compute_work_group_count: 65_535,
            max_texture_size: 16_384,
        }
    }
}

/// Indexed binding targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Uniform block binding
    Uniform,
    /// Shader storage block binding
    ShaderStorage,
    /// Indirect draw command source
    DrawIndirect,
}

bitflags! {
    /// Memory barrier bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BarrierFlags: u32 {
        /// Vertex fetches see prior shader writes
        const VERTEX_ATTRIB_ARRAY = 0x0001;
        /// Index fetches see prior shader writes
        const ELEMENT_ARRAY = 0x0002;
        /// Uniform reads see prior shader writes
        const UNIFORM = 0x0004;
        /// Indirect command reads see prior shader writes
        const COMMAND = 0x0040;
        /// Shader storage accesses see prior shader writes
        const SHADER_STORAGE = 0x2000;
        /// Host-mapped buffer writes by shaders are visible to the host
        const CLIENT_MAPPED_BUFFER = 0x4000;
    }
}

impl BarrierFlags {
    /// Barrier separating a skinning dispatch from the draws that read its output
    pub const fn skinning_to_draw() -> Self {
        Self::VERTEX_ATTRIB_ARRAY
            .union(Self::COMMAND)
            .union(Self::SHADER_STORAGE)
    }
}

/// Graphics device the pipeline records work into
///
/// Implementations are single-threaded: the render thread owns the device.
pub trait GpuDevice {
    /// Human readable backend name
    fn name(&self) -> &str;

    /// Limits queried at startup
    fn limits(&self) -> &DeviceLimits;

    /// Create a buffer name with no storage
    fn create_buffer(&mut self, label: &str) -> Buffer;

    /// Create a buffer and allocate its storage
    fn create_buffer_with(
        &mut self,
        label: &str,
        size: usize,
        data: Option<&[u8]>,
        usage: BufferUsage,
    ) -> GpuResult<Buffer> {
        let mut buffer = self.create_buffer(label);
        buffer.init(size, data, usage)?;
        Ok(buffer)
    }

    /// Create an RGBA8 texture from tightly packed pixels
    fn create_texture(&mut self, descriptor: &TextureDescriptor, rgba8: &[u8]) -> GpuResult<Texture>;

    /// Create and make resident a bindless handle for `texture`
    fn make_texture_resident(&mut self, texture: &mut Texture) -> GpuResult<TextureHandle>;

    /// Bind `buffer` to an indexed binding point
    fn bind_buffer(&mut self, target: BufferTarget, binding: u32, buffer: &Buffer) -> GpuResult<()>;

    /// Select the vertex and index buffers subsequent draws read from
    fn bind_vertex_source(&mut self, vertices: &Buffer, stride: u32, indices: Option<&Buffer>) -> GpuResult<()>;

    /// Make `program` current
    fn use_program(&mut self, program: ProgramId);

    /// Set a `uvec4` uniform on the current program
    fn set_uniform_uvec4(&mut self, location: u32, value: [u32; 4]);

    /// Set a `float` uniform on the current program
    fn set_uniform_f32(&mut self, location: u32, value: f32);

    /// Launch compute work groups on the current program
    fn dispatch_compute(&mut self, x: u32, y: u32, z: u32) -> GpuResult<()>;

    /// Order prior shader writes before the accesses named by `barriers`
    fn memory_barrier(&mut self, barriers: BarrierFlags);

    /// Issue `draw_count` indexed draws read from `indirect` at `offset`
    fn multi_draw_elements_indirect(
        &mut self,
        indirect: &Buffer,
        offset: usize,
        draw_count: u32,
        stride: u32,
    ) -> GpuResult<()>;

    /// Draw `count` indices from the bound index buffer
    fn draw_elements(&mut self, count: u32) -> GpuResult<()>;

    /// Draw `count` vertices starting at `first`
    fn draw_arrays(&mut self, first: u32, count: u32) -> GpuResult<()>;

    /// Insert a fence after all previously issued commands
    fn fence_sync(&mut self) -> Fence;

    /// Submit pending commands
    fn flush(&mut self);

    /// Flush, then wait for `fence` up to `timeout`
    fn client_wait(&mut self, fence: &Fence, timeout: std::time::Duration) -> bool {
        self.flush();
        fence.wait(timeout)
    }
}
