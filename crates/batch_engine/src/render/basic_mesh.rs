//! Position-only debug geometry
//!
//! Lives in its own buffers outside the geometry arena and is drawn with a
//! plain draw call, for gizmos and bounds visualisation.

use super::RenderResult;
use crate::foundation::math::Vec3;
use crate::gpu::{Buffer, BufferUsage, GpuDevice};

/// Bytes per position
pub const BASIC_VERTEX_STRIDE: u32 = 12;

/// Debug mesh with its own vertex and optional index buffer
#[derive(Debug)]
pub struct BasicMesh {
    vertices: Buffer,
    indices: Option<Buffer>,
    vertex_count: u32,
    index_count: u32,
}

impl BasicMesh {
    /// Upload `positions` and, if non-empty, `indices`
    pub fn new<D>(device: &mut D, label: &str, positions: &[Vec3], indices: &[u32]) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
    {
        let packed: Vec<[f32; 3]> = positions.iter().map(|p| [p.x, p.y, p.z]).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&packed);
        let vertices = device.create_buffer_with(
            &format!("{label}_vertices"),
            bytes.len(),
            Some(bytes),
            BufferUsage::empty(),
        )?;

        let indices = if indices.is_empty() {
            None
        } else {
            let bytes: &[u8] = bytemuck::cast_slice(indices);
            Some(device.create_buffer_with(
                &format!("{label}_indices"),
                bytes.len(),
                Some(bytes),
                BufferUsage::empty(),
            )?)
        };

        Ok(Self {
            vertices,
            index_count: indices.as_ref().map_or(0, |buffer| (buffer.size() / 4) as u32),
            indices,
            vertex_count: positions.len() as u32,
        })
    }

    /// Issue the draw: indexed when the mesh has indices
    pub fn draw<D>(&self, device: &mut D) -> RenderResult<()>
    where
        D: GpuDevice + ?Sized,
    {
        device.bind_vertex_source(&self.vertices, BASIC_VERTEX_STRIDE, self.indices.as_ref())?;
        if self.indices.is_some() {
            device.draw_elements(self.index_count)?;
        } else {
            device.draw_arrays(0, self.vertex_count)?;
        }
        Ok(())
    }

    /// Number of positions
    pub const fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices, zero for an array mesh
    pub const fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{HeadlessDevice, RecordedCommand};

    #[test]
    fn test_indexed_mesh_draws_elements() {
        let mut device = HeadlessDevice::default();
        let mesh = BasicMesh::new(&mut device, "box", &[Vec3::zeros(); 4], &[0, 1, 2, 2, 3, 0]).unwrap();
        mesh.draw(&mut device).unwrap();
        assert_eq!(device.commands().last(), Some(&RecordedCommand::DrawElements { count: 6 }));
    }

    #[test]
    fn test_array_mesh_draws_arrays() {
        let mut device = HeadlessDevice::default();
        let mesh = BasicMesh::new(&mut device, "line", &[Vec3::zeros(), Vec3::x()], &[]).unwrap();
        mesh.draw(&mut device).unwrap();
        assert_eq!(
            device.commands().last(),
            Some(&RecordedCommand::DrawArrays { first: 0, count: 2 })
        );
        assert!(matches!(
            device.commands()[0],
            RecordedCommand::BindVertexSource { stride: 12, indices: None, .. }
        ));
    }
}
