//! Shared geometry storage for every loaded mesh
//!
//! Three long-lived buffers hold the vertices, indices and baked joint
//! matrices of all meshes. Each buffer is persistently mapped for writing and
//! carved up by its own [`ArenaAllocator`], so a mesh only ever receives a
//! lease and never computes offsets itself.

use super::layout::{JOINT_MATRIX_SIZE, VERTEX_STRIDE};
use super::mesh::Mesh;
use super::RenderResult;
use crate::assets::{Animation, MeshData};
use crate::core::ArenaConfig;
use crate::foundation::memory::ArenaAllocator;
use crate::gpu::{Buffer, BufferUsage, GpuDevice, MapAccess};

/// Vertex, index and joint arenas
#[derive(Debug)]
pub struct GeometryArena {
    vertices: Buffer,
    indices: Buffer,
    joints: Buffer,
    vertex_alloc: ArenaAllocator,
    index_alloc: ArenaAllocator,
    joint_alloc: ArenaAllocator,
    joint_alignment: usize,
    mesh_count: usize,
}

impl GeometryArena {
    /// Allocate and persistently map the three arenas
    ///
    /// The joint alignment is taken from the device limits.
    pub fn new<D>(device: &mut D, config: &ArenaConfig) -> RenderResult<Self>
    where
        D: GpuDevice + ?Sized,
    {
        let usage = BufferUsage::persistent_write();
        let vertex_bytes = config.vertex_capacity * VERTEX_STRIDE;
        let joint_bytes = config.joint_capacity_matrices * JOINT_MATRIX_SIZE;

        let mut vertices = device.create_buffer_with("geometry_vertices", vertex_bytes, None, usage)?;
        let mut indices = device.create_buffer_with("geometry_indices", config.index_capacity_bytes, None, usage)?;
        let mut joints = device.create_buffer_with("geometry_joints", joint_bytes, None, usage)?;

        vertices.map(MapAccess::persistent_write(), 0, None)?;
        indices.map(MapAccess::persistent_write(), 0, None)?;
        joints.map(MapAccess::persistent_write(), 0, None)?;

        let joint_alignment = device.limits().uniform_buffer_offset_alignment;
        log::info!(
            "Geometry arena: {} vertices, {} index bytes, {} joint matrices (joint alignment {})",
            config.vertex_capacity,
            config.index_capacity_bytes,
            config.joint_capacity_matrices,
            joint_alignment
        );

        Ok(Self {
            vertices,
            indices,
            joints,
            vertex_alloc: ArenaAllocator::new(vertex_bytes),
            index_alloc: ArenaAllocator::new(config.index_capacity_bytes),
            joint_alloc: ArenaAllocator::new(joint_bytes),
            joint_alignment,
            mesh_count: 0,
        })
    }

    /// Lease space for `data` (and `animation`, if any) and write it
    ///
    /// Fails with an arena error when any of the three arenas is full; space
    /// already leased for this mesh is not reclaimed.
    pub fn upload(&mut self, data: &MeshData, animation: Option<&Animation>) -> RenderResult<Mesh> {
        data.validate();
        let mut mesh = Mesh::new(data);

        let vertex_lease = self.vertex_alloc.allocate(Mesh::vertex_bytes(data), VERTEX_STRIDE)?;
        let vertex_start = (vertex_lease.offset / VERTEX_STRIDE) as u32;
        mesh.write_vertex_data(data, vertex_start, &mut self.vertices.mapping()?)?;

        let index_lease = self
            .index_alloc
            .allocate(Mesh::index_bytes(data), std::mem::size_of::<u32>())?;
        mesh.write_index_data(data, index_lease.offset, &mut self.indices.mapping()?)?;

        if let Some(animation) = animation {
            let joint_lease = self
                .joint_alloc
                .allocate(Mesh::joint_bytes(animation), self.joint_alignment)?;
            mesh.write_joint_data(
                data,
                animation,
                &mut self.joints.mapping()?,
                joint_lease.offset,
                self.joint_alignment,
            )?;
        }

        self.mesh_count += 1;
        log::debug!(
            "Uploaded mesh {}: {} vertices at {}, {} indices at {}{}",
            self.mesh_count,
            mesh.vertex_count(),
            vertex_start,
            mesh.index_count(),
            mesh.index_offset(),
            if mesh.is_animated() { ", animated" } else { "" }
        );
        Ok(mesh)
    }

    /// Shared vertex buffer
    pub const fn vertices(&self) -> &Buffer {
        &self.vertices
    }

    /// Shared index buffer
    pub const fn indices(&self) -> &Buffer {
        &self.indices
    }

    /// Shared joint matrix buffer
    pub const fn joints(&self) -> &Buffer {
        &self.joints
    }

    /// Alignment of joint leases in bytes
    pub const fn joint_alignment(&self) -> usize {
        self.joint_alignment
    }

    /// Meshes uploaded so far
    pub const fn mesh_count(&self) -> usize {
        self.mesh_count
    }

    /// Vertices leased so far, including alignment padding
    pub const fn vertices_used(&self) -> usize {
        self.vertex_alloc.used() / VERTEX_STRIDE
    }

    /// Index bytes leased so far
    pub const fn index_bytes_used(&self) -> usize {
        self.index_alloc.used()
    }

    /// Joint bytes leased so far
    pub const fn joint_bytes_used(&self) -> usize {
        self.joint_alloc.used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3, Vec4};
    use crate::foundation::memory::ArenaError;
    use crate::gpu::{DeviceLimits, HeadlessDevice};
    use crate::render::{GpuVertex, RenderError};

    fn quad() -> MeshData {
        MeshData::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    fn skinned_triangle() -> (MeshData, Animation) {
        let data = MeshData::new(
            vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            vec![0, 1, 2],
        )
        .with_skin(vec![Vec4::new(1.0, 0.0, 0.0, 0.0); 3], vec![[0, 0, 0, 0]; 3])
        .with_joints(vec!["root".into()], vec![-1], vec![Mat4::identity()], vec![Mat4::identity()]);
        let animation = Animation::new(1, 30.0, vec![Mat4::identity(); 3]);
        (data, animation)
    }

    fn small_config() -> ArenaConfig {
        ArenaConfig::new()
            .with_vertex_capacity(16)
            .with_index_capacity_bytes(256)
            .with_joint_capacity(64)
    }

    #[test]
    fn test_meshes_are_packed_back_to_back() {
        let mut device = HeadlessDevice::default();
        let mut arena = GeometryArena::new(&mut device, &small_config()).unwrap();

        let first = arena.upload(&quad(), None).unwrap();
        let second = arena.upload(&quad(), None).unwrap();

        assert_eq!(first.vertex_offset(), Some(0));
        assert_eq!(second.vertex_offset(), Some(4));
        assert_eq!(first.index_offset(), 0);
        assert_eq!(second.index_offset(), 6);
        assert_eq!(arena.vertices_used(), 8);
        assert_eq!(arena.index_bytes_used(), 48);

        let bytes = &arena.vertices().contents()[5 * VERTEX_STRIDE..6 * VERTEX_STRIDE];
        let vertex: GpuVertex = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(vertex.position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_joint_leases_use_device_alignment() {
        let mut device = HeadlessDevice::new(DeviceLimits {
            uniform_buffer_offset_alignment: 256,
            ..DeviceLimits::default()
        });
        let mut arena = GeometryArena::new(&mut device, &small_config()).unwrap();
        let (data, animation) = skinned_triangle();

        let first = arena.upload(&data, Some(&animation)).unwrap();
        let second = arena.upload(&data, Some(&animation)).unwrap();

        assert_eq!(first.start_joint_index(), 0);
        assert_eq!(second.start_joint_index(), 4);
        assert_eq!(second.frame_count(), 3);
        assert_eq!(arena.joint_bytes_used(), 256 + 3 * JOINT_MATRIX_SIZE);
    }

    #[test]
    fn test_exhausted_arena_is_an_error() {
        let mut device = HeadlessDevice::default();
        let config = small_config().with_vertex_capacity(6);
        let mut arena = GeometryArena::new(&mut device, &config).unwrap();

        arena.upload(&quad(), None).unwrap();
        assert!(matches!(
            arena.upload(&quad(), None),
            Err(RenderError::Arena(ArenaError::Exhausted { .. }))
        ));
    }
}
