//! GPU-consumed command records
//!
//! This struct is read by the GPU straight out of an indirect buffer, so
//! its layout is fixed: tightly packed `u32` fields in declaration order.

use bytemuck::{Pod, Zeroable};

/// One indexed draw read from an indirect buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct DrawElementsIndirectCommand {
    /// Number of indices to draw
    pub count: u32,
    /// Number of instances to draw
    pub instance_count: u32,
    /// First index, counted in indices rather than bytes
    pub first_index: u32,
    /// Value added to every index before fetching the vertex
    pub base_vertex: u32,
    /// Instance index of the first instance
    pub base_instance: u32,
}

const _: () = assert!(std::mem::size_of::<DrawElementsIndirectCommand>() == 20);

/// Byte stride between consecutive indexed indirect commands
pub const DRAW_ELEMENTS_STRIDE: u32 = std::mem::size_of::<DrawElementsIndirectCommand>() as u32;
